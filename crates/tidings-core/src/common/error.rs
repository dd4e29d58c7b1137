//! Error types for the streaming service and its client.
//!
//! [`Error`] is the single error enum shared by both sides of the wire. On the
//! server it converts into a [`tonic::Status`] so failures reach the client
//! with an explicit code; on the client it is rebuilt from the received
//! [`Status`] (see [`Error::Rpc`]).
//!
//! ## Error Cases
//! - `Auth`: the credential was missing, expired, invalid, or carried no
//!   user id. Always surfaced as `UNAUTHENTICATED`.
//! - `Encoding`: signing a credential failed. Not expected in normal
//!   operation.
//! - `ChannelError`: an internal hand-off between tasks failed.
//! - `RequestCancelled`: the client went away mid-stream.
//! - `ServiceShutdown`: the call arrived while the server was draining.
//! - `Transport`: the client could not establish a channel.
//! - `Rpc`: the server aborted the call with a status.

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// Reasons a credential is rejected.
///
/// The `Display` strings are the exact messages sent back to the client with
/// an `UNAUTHENTICATED` status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization token is missing")]
    MissingToken,

    #[error("Authorization token has expired")]
    ExpiredToken,

    #[error("Invalid authorization token")]
    InvalidToken,

    /// Signature and expiry were fine but the payload has no user id.
    #[error("Invalid token payload")]
    MissingUserId,
}

/// Unified error type for the streaming service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The caller failed authentication.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Serializing or signing a credential failed.
    #[error("Token encoding failed: {0}")]
    Encoding(jsonwebtoken::errors::Error),

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The client stopped consuming the stream.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// The channel to the server could not be established.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The server terminated the call with a non-OK status.
    #[error("{details} (Code: {})", code_name(*code))]
    Rpc { code: Code, details: String },
}

impl Error {
    /// The gRPC status code this error is (or would be) reported with.
    pub fn code(&self) -> Code {
        match self {
            Error::Auth(_) => Code::Unauthenticated,
            Error::Encoding(_) | Error::ChannelError { .. } => Code::Internal,
            Error::RequestCancelled => Code::Cancelled,
            Error::ServiceShutdown | Error::Transport(_) => Code::Unavailable,
            Error::Rpc { code, .. } => *code,
        }
    }
}

/// Canonical upper-case gRPC name of `code`, e.g. `UNAUTHENTICATED`.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Auth(reason) => Status::unauthenticated(reason.to_string()),
            Error::Encoding(e) => Status::internal(format!("Token encoding error: {e}")),
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
            Error::Transport(e) => Status::unavailable(format!("Transport error: {e}")),
            Error::Rpc { code, details } => Status::new(code, details),
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Rpc {
            code: status.code(),
            details: status.message().to_owned(),
        }
    }
}
