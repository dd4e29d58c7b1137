//! Signed, time-bounded credentials.
//!
//! A credential is a compact JWT signed with HS256 over a shared secret. Its
//! payload is [`Claims`]: the user id and an absolute expiry in unix seconds.
//! The server decodes it from the `authorization` metadata key and, on
//! success, streams for the user id it carries.
//!
//! There is no replay protection: a token stays valid until `exp` passes.

use crate::{AuthError, Error, Result, Secret};
use core::time::Duration;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

/// Current time in unix seconds, the clock `exp` is compared against.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Payload carried by a credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Absent or empty ids are rejected with [`AuthError::MissingUserId`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Expiry as seconds since the unix epoch.
    pub exp: i64,
}

/// Encodes and validates credentials with a single shared secret.
///
/// Build one per process from the configured secret and share it; both keys
/// are derived once at construction.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &Secret<String>) -> Self {
        let key = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact: a token is rejected as soon as `exp` has passed.
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
        }
    }

    /// Issues a credential for `user_id` that expires `ttl` from now.
    pub fn encode(&self, user_id: &str, ttl: Duration) -> Result<String> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = unix_now().saturating_add(ttl);
        self.encode_until(user_id, expires_at)
    }

    /// Issues a credential for `user_id` that expires at `expires_at` (unix
    /// seconds).
    pub fn encode_until(&self, user_id: &str, expires_at: i64) -> Result<String> {
        let claims = Claims {
            user_id: Some(user_id.to_owned()),
            exp: expires_at,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(Error::Encoding)
    }

    /// Verifies `token` and returns the user id it was issued for.
    ///
    /// # Errors
    ///
    /// - [`AuthError::ExpiredToken`] once `exp` is in the past.
    /// - [`AuthError::InvalidToken`] on a bad signature, a malformed token, or
    ///   a payload without `exp`.
    /// - [`AuthError::MissingUserId`] when the payload has no user id.
    pub fn decode(&self, token: &str) -> core::result::Result<String, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            })?;

        match data.claims.user_id {
            Some(user_id) if !user_id.is_empty() => Ok(user_id),
            _ => Err(AuthError::MissingUserId),
        }
    }
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}
