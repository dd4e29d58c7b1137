//! gRPC service implementation and call admission.
//!
//! ## Structure
//!
//! - [`auth`] - the [`auth::Authenticator`] interceptor that validates
//!   credentials before a call reaches the handler.
//! - [`handler`] - gRPC service entry point ([`handler::StreamService`]).

pub mod auth;
pub mod handler;
