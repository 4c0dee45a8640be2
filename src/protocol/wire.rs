//! Wire format encoding and decoding.
//!
//! Every frame on the socket is a 4-byte length prefix followed by a frame
//! body. Clients send Query bodies and receive Response bodies; servers do
//! the inverse. The two body layouts:
//!
//! ```text
//! Query body
//! ┌──────────┬─────────────┬─────────────┬──────────────┐
//! │ dispatch │ handler_len │ handler     │ message_data │
//! │ 4 bytes  │ 4 bytes     │ H bytes     │ rest         │
//! │ i32 BE   │ i32 BE      │ UTF-8       │ opaque       │
//! └──────────┴─────────────┴─────────────┴──────────────┘
//!
//! Response body
//! ┌────────┬──────────┬───────────┬───────────┬──────────────┐
//! │ ok     │ dispatch │ error_len │ error_msg │ message_data │
//! │ 1 byte │ 4 bytes  │ 4 bytes   │ E bytes   │ rest         │
//! │ 0 or 1 │ i32 BE   │ i32 BE    │ UTF-8     │ opaque       │
//! └────────┴──────────┴───────────┴───────────┴──────────────┘
//! ```
//!
//! All multi-byte integers, including the length prefix, are Big Endian.
//! Handler names and error messages are UTF-8.

use crate::error::{Result, WirecallError};

/// Length prefix size in bytes (fixed, exactly 4).
pub const LEN_PREFIX_SIZE: usize = 4;

/// Fixed part of a Query body (dispatch + handler_len).
pub const QUERY_FIXED_SIZE: usize = 8;

/// Fixed part of a Response body (ok + dispatch + error_len).
pub const RESPONSE_FIXED_SIZE: usize = 9;

/// Default maximum frame body size (1 GB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1_073_741_824;

/// Absolute maximum frame body size (~2 GB, max i32).
pub const ABSOLUTE_MAX_FRAME_SIZE: u32 = 2_147_483_647;

/// Error message of a synthesized client-side timeout response.
pub const TIMEOUT_MSG: &str = "timeout";

/// Error message of the response synthesized when the ingress queue is full.
pub const OVERLOADED_MSG: &str = "server overloaded";

/// A request frame: dispatch id, target handler name, opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Correlation id, unique within the sending client's lifetime.
    pub dispatch: i32,
    /// Name of the server-side function to invoke.
    pub handler: String,
    /// Payload bytes as produced by the payload codec.
    pub message_data: Vec<u8>,
}

impl Query {
    /// Create a new query.
    pub fn new(dispatch: i32, handler: impl Into<String>, message_data: Vec<u8>) -> Self {
        Self {
            dispatch,
            handler: handler.into(),
            message_data,
        }
    }

    /// Encode the query body (without the length prefix).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(QUERY_FIXED_SIZE + self.handler.len() + self.message_data.len());
        buf.extend_from_slice(&self.dispatch.to_be_bytes());
        buf.extend_from_slice(&(self.handler.len() as i32).to_be_bytes());
        buf.extend_from_slice(self.handler.as_bytes());
        buf.extend_from_slice(&self.message_data);
        buf
    }

    /// Decode a query body.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` when the body is shorter than the fixed
    /// part, the declared handler length is negative or exceeds the body,
    /// or the handler name is not UTF-8.
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < QUERY_FIXED_SIZE {
            return Err(WirecallError::MalformedFrame(format!(
                "query body too short: {} bytes",
                body.len()
            )));
        }

        let dispatch = i32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let handler_len = i32::from_be_bytes([body[4], body[5], body[6], body[7]]);
        if handler_len < 0 {
            return Err(WirecallError::MalformedFrame(format!(
                "negative handler length: {handler_len}"
            )));
        }

        let name_end = QUERY_FIXED_SIZE + handler_len as usize;
        if name_end > body.len() {
            return Err(WirecallError::MalformedFrame(format!(
                "handler length {} exceeds body of {} bytes",
                handler_len,
                body.len()
            )));
        }

        let handler = std::str::from_utf8(&body[QUERY_FIXED_SIZE..name_end])
            .map_err(|_| WirecallError::MalformedFrame("handler name is not UTF-8".to_string()))?
            .to_string();

        Ok(Self {
            dispatch,
            handler,
            message_data: body[name_end..].to_vec(),
        })
    }
}

/// A reply frame: outcome flag, dispatch id, optional error, opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// True when the handler succeeded.
    pub ok: bool,
    /// Correlation id copied from the originating query.
    pub dispatch: i32,
    /// Failure message; `None` and the empty string are the same wire state.
    pub error_msg: Option<String>,
    /// Payload bytes as produced by the payload codec; empty on failure.
    pub message_data: Vec<u8>,
}

impl Response {
    /// Create a success response carrying a payload.
    pub fn success(dispatch: i32, message_data: Vec<u8>) -> Self {
        Self {
            ok: true,
            dispatch,
            error_msg: None,
            message_data,
        }
    }

    /// Create a failure response carrying an error message.
    pub fn failure(dispatch: i32, error_msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            dispatch,
            error_msg: Some(error_msg.into()),
            message_data: Vec::new(),
        }
    }

    /// The error message, or `""` when there is none.
    #[inline]
    pub fn error_text(&self) -> &str {
        self.error_msg.as_deref().unwrap_or("")
    }

    /// Encode the response body (without the length prefix).
    pub fn encode(&self) -> Vec<u8> {
        let error = self.error_text();
        let mut buf =
            Vec::with_capacity(RESPONSE_FIXED_SIZE + error.len() + self.message_data.len());
        buf.push(u8::from(self.ok));
        buf.extend_from_slice(&self.dispatch.to_be_bytes());
        buf.extend_from_slice(&(error.len() as i32).to_be_bytes());
        buf.extend_from_slice(error.as_bytes());
        buf.extend_from_slice(&self.message_data);
        buf
    }

    /// Decode a response body.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` when the body is shorter than the fixed
    /// part, the `ok` byte is not 0 or 1, the declared error length is
    /// negative or exceeds the body, or the message is not UTF-8.
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < RESPONSE_FIXED_SIZE {
            return Err(WirecallError::MalformedFrame(format!(
                "response body too short: {} bytes",
                body.len()
            )));
        }

        let ok = match body[0] {
            0 => false,
            1 => true,
            other => {
                return Err(WirecallError::MalformedFrame(format!(
                    "invalid ok byte: {other:#04x}"
                )))
            }
        };

        let dispatch = i32::from_be_bytes([body[1], body[2], body[3], body[4]]);
        let error_len = i32::from_be_bytes([body[5], body[6], body[7], body[8]]);
        if error_len < 0 {
            return Err(WirecallError::MalformedFrame(format!(
                "negative error length: {error_len}"
            )));
        }

        let error_end = RESPONSE_FIXED_SIZE + error_len as usize;
        if error_end > body.len() {
            return Err(WirecallError::MalformedFrame(format!(
                "error length {} exceeds body of {} bytes",
                error_len,
                body.len()
            )));
        }

        let error_msg = if error_len == 0 {
            None
        } else {
            Some(
                std::str::from_utf8(&body[RESPONSE_FIXED_SIZE..error_end])
                    .map_err(|_| {
                        WirecallError::MalformedFrame("error message is not UTF-8".to_string())
                    })?
                    .to_string(),
            )
        };

        Ok(Self {
            ok,
            dispatch,
            error_msg,
            message_data: body[error_end..].to_vec(),
        })
    }
}

/// Encode a query body (standalone function).
#[inline]
pub fn encode_query(query: &Query) -> Vec<u8> {
    query.encode()
}

/// Decode a query body (standalone function).
#[inline]
pub fn decode_query(body: &[u8]) -> Result<Query> {
    Query::decode(body)
}

/// Encode a response body (standalone function).
#[inline]
pub fn encode_response(response: &Response) -> Vec<u8> {
    response.encode()
}

/// Decode a response body (standalone function).
#[inline]
pub fn decode_response(body: &[u8]) -> Result<Response> {
    Response::decode(body)
}

/// Build a complete on-wire frame: Big Endian length prefix plus body.
pub fn build_frame(body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LEN_PREFIX_SIZE + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(body);
    buf
}
