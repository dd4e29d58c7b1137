//! Per-call token authentication.
//!
//! [`Authenticator`] is a [`tonic::service::Interceptor`] placed in front of
//! the streaming service. It runs before the handler, so a rejected call never
//! reaches the worker pool and yields zero responses.

use crate::server::telemetry::increment_auth_failures;
use std::sync::Arc;
use tidings_core::{
    AuthError, Error,
    token::TokenCodec,
    types::{AUTHORIZATION_KEY, AuthenticatedUser, BEARER_PREFIX},
};
use tonic::{Request, Status, service::Interceptor};

/// Validates the `authorization` metadata of every call.
///
/// - [`Authenticator::Disabled`] lets every call through untouched.
/// - [`Authenticator::Token`] decodes the credential and, on success, attaches
///   an [`AuthenticatedUser`] to the request extensions. Failures become an
///   `UNAUTHENTICATED` status carrying the [`AuthError`] message.
#[derive(Clone, Debug)]
pub enum Authenticator {
    Disabled,
    Token(Arc<TokenCodec>),
}

impl Authenticator {
    pub fn token(codec: TokenCodec) -> Self {
        Self::Token(Arc::new(codec))
    }

    /// Resolves the caller's identity from request metadata.
    pub fn authenticate<T>(&self, req: &Request<T>) -> Result<Option<AuthenticatedUser>, AuthError> {
        let Self::Token(codec) = self else {
            return Ok(None);
        };

        let raw = req
            .metadata()
            .get(AUTHORIZATION_KEY)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?;

        let token = raw.strip_prefix(BEARER_PREFIX).unwrap_or(raw).trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        codec.decode(token).map(|user_id| Some(AuthenticatedUser(user_id)))
    }
}

impl Interceptor for Authenticator {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        match self.authenticate(&req) {
            Ok(Some(user)) => {
                tracing::debug!(user_id = user.user_id(), "Authenticated call");
                req.extensions_mut().insert(user);
                Ok(req)
            }
            Ok(None) => Ok(req),
            Err(reason) => {
                increment_auth_failures();
                tracing::debug!("Rejected call: {reason}");
                Err(Error::Auth(reason).into())
            }
        }
    }
}
