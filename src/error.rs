//! Error types for wirecall.

use thiserror::Error;

/// Main error type for all wirecall operations.
#[derive(Debug, Error)]
pub enum WirecallError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload serialization error.
    #[error("MsgPack encode error: {0}")]
    EncodePayload(#[from] rmp_serde::encode::Error),

    /// Payload deserialization error.
    #[error("MsgPack decode error: {0}")]
    DecodePayload(#[from] rmp_serde::decode::Error),

    /// A frame violated the wire layout (bad lengths, bad UTF-8, oversize).
    /// The offending connection is closed.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The peer closed the stream in the middle of a frame.
    #[error("stream ended mid-frame")]
    ShortRead,

    /// The same handler name was registered twice.
    #[error("handler already registered: {0}")]
    HandlerAlreadyRegistered(String),

    /// A user registration used a name reserved for the framework.
    #[error("handler name is reserved: {0}")]
    ReservedName(String),

    /// The server answered with a failure response; message carried verbatim.
    #[error("remote failure: {0}")]
    Remote(String),

    /// No response arrived within the hard query timeout.
    #[error("timeout")]
    Timeout,

    /// The connection is gone; no further calls can be placed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The per-client dispatch counter reached the signed 32-bit boundary.
    #[error("dispatch id space exhausted")]
    DispatchExhausted,
}

/// Result type alias using WirecallError.
pub type Result<T> = std::result::Result<T, WirecallError>;
