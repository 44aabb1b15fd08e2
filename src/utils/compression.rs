//! # Compression Stage
//!
//! The wire protocol's zlib frame codec, used when the compression-order
//! guard has to decompress a mid-flight buffer, run it through the pipeline,
//! and recompress it. A compressed frame is:
//!
//! ```text
//! [VarInt uncompressed length, 0 when below the threshold] [zlib data | raw payload]
//! ```
//!
//! Decompression output is capped to protect against decompression bombs.

use crate::core::buffer::ByteBuf;
use crate::core::varint;
use crate::error::{ProtocolError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Default minimum payload size before compression kicks in.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 256;

/// Maximum allowed decompressed size (decompression bomb guard).
pub const MAX_DECOMPRESSED_SIZE: usize = 2 * 1024 * 1024;

/// Raw zlib compression of `data`.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Raw zlib decompression, failing when the output exceeds `max_size`.
pub fn decompress(data: &[u8], max_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut decoder = ZlibDecoder::new(data).take(max_size as u64 + 1);
    decoder.read_to_end(&mut out)?;
    if out.len() > max_size {
        return Err(ProtocolError::CapacityExceeded {
            requested: out.len(),
            max: max_size,
        });
    }
    Ok(out)
}

/// Per-connection zlib frame codec. Mirrors the compressor/decompressor pair
/// the host installs once compression is negotiated.
#[derive(Debug, Clone)]
pub struct CompressionStage {
    threshold: usize,
    max_decompressed: usize,
}

impl CompressionStage {
    pub fn new(threshold: usize) -> Self {
        CompressionStage {
            threshold,
            max_decompressed: MAX_DECOMPRESSED_SIZE,
        }
    }

    pub fn with_max_decompressed(mut self, max: usize) -> Self {
        self.max_decompressed = max;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Decode one compressed frame into a fresh buffer of plain packet bytes.
    pub fn decode_frame(&self, frame: &ByteBuf) -> Result<ByteBuf> {
        let uncompressed_len = varint::read_var_int(frame)?;
        if uncompressed_len == 0 {
            // below-threshold frame: payload is stored raw
            let rest = frame.read_bytes(frame.readable_bytes()?)?;
            return Ok(ByteBuf::from_slice(&rest));
        }
        if uncompressed_len < 0 || uncompressed_len as usize > self.max_decompressed {
            return Err(ProtocolError::CapacityExceeded {
                requested: uncompressed_len.max(0) as usize,
                max: self.max_decompressed,
            });
        }
        let compressed = frame.read_bytes(frame.readable_bytes()?)?;
        let plain = decompress(&compressed, uncompressed_len as usize)?;
        if plain.len() != uncompressed_len as usize {
            return Err(ProtocolError::Custom(format!(
                "compressed frame declared {} bytes but inflated to {}",
                uncompressed_len,
                plain.len()
            )));
        }
        Ok(ByteBuf::from_slice(&plain))
    }

    /// Encode plain packet bytes into one compressed frame.
    pub fn encode_frame(&self, plain: &ByteBuf) -> Result<ByteBuf> {
        let payload = plain.to_vec()?;
        let out = ByteBuf::new();
        if payload.len() < self.threshold {
            varint::write_var_int(&out, 0)?;
            out.write_bytes(&payload)?;
        } else {
            varint::write_var_int(&out, payload.len() as i32)?;
            out.write_bytes(&compress(&payload)?)?;
        }
        Ok(out)
    }
}

impl Default for CompressionStage {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip_above_threshold() {
        let stage = CompressionStage::new(8);
        let payload: Vec<u8> = (0..200u16).map(|i| (i % 7) as u8).collect();
        let plain = ByteBuf::from_slice(&payload);

        let frame = stage.encode_frame(&plain).unwrap();
        let decoded = stage.decode_frame(&frame).unwrap();
        assert_eq!(decoded.to_vec().unwrap(), payload);
    }

    #[test]
    fn frame_roundtrip_below_threshold_is_raw() {
        let stage = CompressionStage::new(64);
        let plain = ByteBuf::from_slice(b"tiny");

        let frame = stage.encode_frame(&plain).unwrap();
        // 0-prefix plus raw payload
        assert_eq!(frame.to_vec().unwrap(), [&[0u8][..], b"tiny"].concat());
        let decoded = stage.decode_frame(&frame).unwrap();
        assert_eq!(decoded.to_vec().unwrap(), b"tiny".to_vec());
    }

    #[test]
    fn declared_length_cap_is_enforced() {
        let stage = CompressionStage::new(8).with_max_decompressed(16);
        let frame = ByteBuf::new();
        varint::write_var_int(&frame, 1024).unwrap();
        frame.write_bytes(&compress(&[0u8; 1024]).unwrap()).unwrap();
        assert!(matches!(
            stage.decode_frame(&frame).unwrap_err(),
            ProtocolError::CapacityExceeded { .. }
        ));
    }

    #[test]
    fn lying_length_prefix_is_rejected() {
        let stage = CompressionStage::new(8);
        let frame = ByteBuf::new();
        varint::write_var_int(&frame, 10).unwrap();
        frame.write_bytes(&compress(&[7u8; 32]).unwrap()).unwrap();
        assert!(stage.decode_frame(&frame).is_err());
    }
}
