//! Codec module - the payload serialization boundary.
//!
//! The wire layer treats `message_data` as opaque bytes; the
//! [`PayloadCodec`] trait is the seam where typed values become those bytes
//! and back:
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (the default)
//!
//! # Design
//!
//! Codecs are marker structs selected at compile time through a type
//! parameter on `Server` and `Client` rather than trait objects. The frame
//! layouts themselves are fixed and independent of the payload codec.
//!
//! # Example
//!
//! ```
//! use wirecall::codec::{MsgPackCodec, PayloadCodec};
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serialization boundary for `message_data` payloads.
///
/// Both halves of a connection must agree on the codec; nothing on the wire
/// identifies it.
pub trait PayloadCodec {
    /// Encode a value to payload bytes.
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>>;

    /// Decode payload bytes to a value.
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WirecallError;

    /// Codec that tags every payload with a leading magic byte, to prove
    /// the boundary accepts implementations other than the default.
    struct TaggedCodec;

    impl PayloadCodec for TaggedCodec {
        fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
            let mut out = vec![0xAA];
            out.extend(MsgPackCodec::encode(value)?);
            Ok(out)
        }

        fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
            match bytes.split_first() {
                Some((0xAA, rest)) => MsgPackCodec::decode(rest),
                _ => Err(WirecallError::MalformedFrame("missing codec tag".into())),
            }
        }
    }

    #[test]
    fn test_custom_codec_roundtrip() {
        let encoded = TaggedCodec::encode(&42i32).unwrap();
        assert_eq!(encoded[0], 0xAA);
        let decoded: i32 = TaggedCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, 42);
    }

    #[test]
    fn test_custom_codec_rejects_untagged() {
        let plain = MsgPackCodec::encode(&42i32).unwrap();
        let result: Result<i32> = TaggedCodec::decode(&plain);
        assert!(result.is_err());
    }
}
