//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. Implements a
//! state machine for handling fragmented frames:
//! - `WaitingForPrefix`: need the 4-byte length prefix
//! - `WaitingForBody`: prefix parsed, need N more body bytes
//!
//! The buffer yields complete frame *bodies*; decoding them into Query or
//! Response values is the caller's job, since only the caller knows which
//! direction the stream flows.
//!
//! # Example
//!
//! ```
//! use wirecall::protocol::{build_frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let frame = build_frame(b"body bytes");
//!
//! let bodies = buffer.push(&frame).unwrap();
//! assert_eq!(&bodies[0][..], b"body bytes");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire::{DEFAULT_MAX_FRAME_SIZE, LEN_PREFIX_SIZE};
use crate::error::{Result, WirecallError};

/// State machine for frame extraction.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the complete 4-byte length prefix.
    WaitingForPrefix,
    /// Prefix parsed, waiting for the body.
    WaitingForBody { body_len: usize },
}

/// Buffer accumulating incoming bytes and extracting complete frame bodies.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed frame body size.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a frame buffer with the default maximum body size (1 GB).
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a frame buffer with a custom maximum body size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForPrefix,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frame bodies.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` when a prefix declares a body larger than
    /// the configured maximum.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut bodies = Vec::new();
        while let Some(body) = self.try_extract_one()? {
            bodies.push(body);
        }
        Ok(bodies)
    }

    /// Try to extract a single frame body from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        match self.state {
            State::WaitingForPrefix => {
                if self.buffer.len() < LEN_PREFIX_SIZE {
                    return Ok(None);
                }

                let body_len = u32::from_be_bytes([
                    self.buffer[0],
                    self.buffer[1],
                    self.buffer[2],
                    self.buffer[3],
                ]);
                if body_len > self.max_frame_size {
                    return Err(WirecallError::MalformedFrame(format!(
                        "frame body of {} bytes exceeds maximum {}",
                        body_len, self.max_frame_size
                    )));
                }

                let _ = self.buffer.split_to(LEN_PREFIX_SIZE);
                self.state = State::WaitingForBody {
                    body_len: body_len as usize,
                };

                // The body may already be buffered.
                self.try_extract_one()
            }

            State::WaitingForBody { body_len } => {
                if self.buffer.len() < body_len {
                    return Ok(None);
                }

                let body = self.buffer.split_to(body_len).freeze();
                self.state = State::WaitingForPrefix;
                Ok(Some(body))
            }
        }
    }

    /// True when bytes of an incomplete frame are pending. Used by reader
    /// loops to distinguish a clean EOF from a stream cut mid-frame.
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForBody { .. })
    }

    /// Number of buffered bytes not yet part of a complete frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::build_frame;

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let bodies = buffer.push(&build_frame(b"hello")).unwrap();

        assert_eq!(bodies.len(), 1);
        assert_eq!(&bodies[0][..], b"hello");
        assert!(buffer.is_empty());
        assert!(!buffer.has_partial());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut data = build_frame(b"first");
        data.extend(build_frame(b"second"));
        data.extend(build_frame(b"third"));

        let bodies = buffer.push(&data).unwrap();

        assert_eq!(bodies.len(), 3);
        assert_eq!(&bodies[0][..], b"first");
        assert_eq!(&bodies[1][..], b"second");
        assert_eq!(&bodies[2][..], b"third");
    }

    #[test]
    fn test_fragmented_prefix() {
        let mut buffer = FrameBuffer::new();
        let frame = build_frame(b"test");

        let bodies = buffer.push(&frame[..2]).unwrap();
        assert!(bodies.is_empty());
        assert!(buffer.has_partial());

        let bodies = buffer.push(&frame[2..]).unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(&bodies[0][..], b"test");
    }

    #[test]
    fn test_fragmented_body() {
        let mut buffer = FrameBuffer::new();
        let frame = build_frame(b"a longer body that arrives in pieces");

        let mid = LEN_PREFIX_SIZE + 10;
        let bodies = buffer.push(&frame[..mid]).unwrap();
        assert!(bodies.is_empty());
        assert!(buffer.has_partial());

        let bodies = buffer.push(&frame[mid..]).unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(&bodies[0][..], b"a longer body that arrives in pieces");
        assert!(!buffer.has_partial());
    }

    #[test]
    fn test_empty_body_frame() {
        let mut buffer = FrameBuffer::new();
        let bodies = buffer.push(&build_frame(b"")).unwrap();

        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let frame = build_frame(b"hi");

        let mut all = Vec::new();
        for byte in &frame {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(&all[0][..], b"hi");
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buffer = FrameBuffer::with_max_frame_size(16);
        let frame = build_frame(&[0u8; 17]);

        let result = buffer.push(&frame);
        assert!(matches!(result, Err(WirecallError::MalformedFrame(_))));
    }

    #[test]
    fn test_oversized_prefix_rejected_before_body_arrives() {
        let mut buffer = FrameBuffer::with_max_frame_size(16);

        // Only the prefix claiming a huge body; no body bytes at all.
        let result = buffer.push(&1_000_000u32.to_be_bytes());
        assert!(matches!(result, Err(WirecallError::MalformedFrame(_))));
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();

        let first = build_frame(b"first");
        let second = build_frame(b"second");

        let mut data = first.clone();
        data.extend_from_slice(&second[..3]);

        let bodies = buffer.push(&data).unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(&bodies[0][..], b"first");
        assert!(buffer.has_partial());

        let bodies = buffer.push(&second[3..]).unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(&bodies[0][..], b"second");
    }

    #[test]
    fn test_has_partial_mid_body() {
        let mut buffer = FrameBuffer::new();
        let frame = build_frame(b"abcd");

        // Exactly the prefix: buffer content consumed, but a body is owed.
        buffer.push(&frame[..LEN_PREFIX_SIZE]).unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.has_partial());
    }
}
