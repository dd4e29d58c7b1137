//! # Shared Constants and Request Types
//!
//! Values both the server and the client must agree on: the metadata key that
//! carries credentials, the default endpoint, and the default shape of a
//! stream.

use core::time::Duration;

/// Metadata key that carries the signed credential.
pub const AUTHORIZATION_KEY: &str = "authorization";

/// Optional scheme prefix accepted in front of the credential.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Address the server binds to when none is configured.
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:50051";

/// Endpoint the client dials when none is configured.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:50051";

/// Number of messages emitted per call.
pub const DEFAULT_MESSAGES_PER_STREAM: usize = 5;

/// Delay between two consecutive messages of the same call.
pub const DEFAULT_PACING: Duration = Duration::from_secs(1);

/// Lifetime of credentials minted by the client.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Identity established by the authentication layer for one call.
///
/// Stored in the request extensions; when present it takes precedence over
/// the `user_id` field of the request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        &self.0
    }
}
