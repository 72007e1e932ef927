//! Message serialization
//!
//! Packs application values into bounded byte frames and back. The default
//! serializer encodes to JSON and runs a zlib pass over the result; the
//! compression is purely a size measure given the one-datagram limit.

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};
use thiserror::Error;

/// Errors produced while packing or unpacking a frame
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(std::io::Error),

    #[error("Decompression error: {0}")]
    Decompression(std::io::Error),
}

pub type FramingResult<T> = Result<T, FramingError>;

/// Converts an application value to and from a byte frame.
///
/// Implementations must satisfy round-trip identity: `unpack(pack(v))`
/// is structurally equal to `v` for every JSON-representable `v`.
pub trait Serializer: Send + Sync {
    /// Encode a value into a frame
    fn pack(&self, value: &Value) -> FramingResult<Bytes>;

    /// Decode a frame back into a value
    fn unpack(&self, frame: &[u8]) -> FramingResult<Value>;
}

/// The default serializer: JSON text compressed with zlib
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonZlibSerializer;

impl Serializer for JsonZlibSerializer {
    fn pack(&self, value: &Value) -> FramingResult<Bytes> {
        let json = serde_json::to_vec(value)?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).map_err(FramingError::Compression)?;
        let compressed = encoder.finish().map_err(FramingError::Compression)?;

        Ok(Bytes::from(compressed))
    }

    fn unpack(&self, frame: &[u8]) -> FramingResult<Value> {
        let mut decoder = ZlibDecoder::new(frame);
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .map_err(FramingError::Decompression)?;

        Ok(serde_json::from_slice(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(value: Value) {
        let serializer = JsonZlibSerializer;
        let frame = serializer.pack(&value).unwrap();
        let restored = serializer.unpack(&frame).unwrap();
        assert_eq!(value, restored);
    }

    #[test]
    fn test_roundtrip_object() {
        roundtrip(json!({"type": "ping", "seq": 1}));
    }

    #[test]
    fn test_roundtrip_scalars() {
        roundtrip(json!(null));
        roundtrip(json!(true));
        roundtrip(json!(-42));
        roundtrip(json!(3.25));
        roundtrip(json!("héllo multicast"));
    }

    #[test]
    fn test_roundtrip_nested() {
        roundtrip(json!({
            "hosts": ["alpha", "beta"],
            "meta": {"retries": 0, "flags": [true, false, null]},
        }));
    }

    #[test]
    fn test_compression_shrinks_repetitive_payload() {
        let serializer = JsonZlibSerializer;
        let value = json!({"payload": "abc".repeat(200)});
        let frame = serializer.pack(&value).unwrap();
        let raw = serde_json::to_vec(&value).unwrap();
        assert!(frame.len() < raw.len());
    }

    #[test]
    fn test_corrupt_frame_is_framing_error() {
        let serializer = JsonZlibSerializer;
        let err = serializer.unpack(b"definitely not zlib").unwrap_err();
        assert!(matches!(err, FramingError::Decompression(_)));
    }

    #[test]
    fn test_valid_zlib_invalid_json_is_framing_error() {
        let serializer = JsonZlibSerializer;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{not json").unwrap();
        let frame = encoder.finish().unwrap();

        let err = serializer.unpack(&frame).unwrap_err();
        assert!(matches!(err, FramingError::Json(_)));
    }
}
