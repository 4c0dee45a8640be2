//! Handler module - dispatch targets and their registry.
//!
//! Provides:
//! - [`Handler`] - the dispatch target trait (Query in, Response out)
//! - [`TypedHandler`] - wraps a typed async function, decoding the query
//!   payload and encoding the result through the payload codec
//! - [`HandlerRegistry`] - maps handler names to handlers; names starting
//!   with `_` are reserved for the framework
//!
//! # Example
//!
//! ```ignore
//! use wirecall::handler::HandlerRegistry;
//! use wirecall::codec::MsgPackCodec;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register::<MsgPackCodec, _, i32, i32, _>("add_one", |x: i32| async move {
//!     Ok(x + 1)
//! })?;
//! ```

mod registry;

pub use registry::{BoxFuture, Handler, HandlerRegistry, TypedHandler, RESERVED_PREFIX};

use std::fmt;

/// Failure reported by a handler.
///
/// The message travels back to the caller verbatim as the response's
/// `error_msg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(String);

impl HandlerError {
    /// Create a handler error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The message carried to the caller.
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HandlerError {}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Result type for handler functions.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_verbatim() {
        let err = HandlerError::new("x");
        assert_eq!(err.message(), "x");
        assert_eq!(err.to_string(), "x");
    }

    #[test]
    fn test_from_conversions() {
        let from_str: HandlerError = "broken".into();
        let from_string: HandlerError = String::from("broken").into();
        assert_eq!(from_str, from_string);
    }
}
