pub mod error;
pub mod secret;
pub mod types;

pub use error::{AuthError, Error, Result};
pub use secret::Secret;
