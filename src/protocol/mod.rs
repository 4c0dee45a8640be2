//! Protocol module - wire format and framing.
//!
//! This module implements the binary protocol carried over TCP:
//! - Query and Response body encoding/decoding (Big Endian)
//! - 4-byte length-prefix framing
//! - Frame buffer for accumulating partial reads

mod frame_buffer;
mod wire;

pub use frame_buffer::FrameBuffer;
pub use wire::{
    build_frame, decode_query, decode_response, encode_query, encode_response, Query, Response,
    ABSOLUTE_MAX_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE, LEN_PREFIX_SIZE, OVERLOADED_MSG,
    QUERY_FIXED_SIZE, RESPONSE_FIXED_SIZE, TIMEOUT_MSG,
};
