//! # VarInt / VarLong Codec
//!
//! Little-endian base-128 variable-length integers: 1-5 byte groups for
//! 32-bit values, 1-10 for 64-bit. Every group except the last carries the
//! continuation bit (0x80). Negative numbers are encoded as their unsigned
//! bit pattern; there is no zig-zag step.
//!
//! Decoding takes a fast path when at least four bytes are readable: the
//! bytes are loaded as one little-endian word, the terminating group is
//! located with `!word & 0x8080_8080`, and the 7-bit payloads are compacted
//! with two masked shifts. Values spanning a fifth group, or buffers shorter
//! than four bytes, go through the byte-at-a-time fallback.
//!
//! The fallback reports [`ProtocolError::IncompleteVarInt`] when the buffer
//! runs out mid-value and restores the reader cursor, so the caller can retry
//! once more bytes arrive. A value wider than the maximum group count is a
//! malformed stream and not retryable.

use crate::core::buffer::ByteBuf;
use crate::error::{ProtocolError, Result};

/// Encoded length in bytes of `value` as a VarInt.
pub fn var_int_len(value: i32) -> usize {
    let v = value as u32;
    match 32 - v.leading_zeros() {
        0..=7 => 1,
        8..=14 => 2,
        15..=21 => 3,
        22..=28 => 4,
        _ => 5,
    }
}

/// Encoded length in bytes of `value` as a VarLong.
pub fn var_long_len(value: i64) -> usize {
    let v = value as u64;
    let bits = 64 - v.leading_zeros() as usize;
    (bits.max(1) + 6) / 7
}

/// Decode a VarInt at the buffer's reader cursor.
pub fn read_var_int(buf: &ByteBuf) -> Result<i32> {
    if buf.readable_bytes()? < 4 {
        return read_var_int_fallback(buf);
    }

    let word = buf.get_u32_le(buf.reader_index()?)?;
    // high bit clear marks the final group of each encoded integer
    let at_stop = !word & 0x8080_8080;
    if at_stop == 0 {
        // spans more bytes than the fast path covers
        return read_var_int_fallback(buf);
    }

    let bits_to_keep = at_stop.trailing_zeros() + 1;
    buf.skip_bytes((bits_to_keep >> 3) as usize)?;

    // zero everything past the first terminating group
    let mut preserved = word & (at_stop ^ at_stop.wrapping_sub(1));
    // compact the four 7-bit payloads into the low 28 bits
    preserved = (preserved & 0x007F_007F) | ((preserved & 0x7F00_7F00) >> 1);
    preserved = (preserved & 0x0000_3FFF) | ((preserved & 0x3FFF_0000) >> 2);
    Ok(preserved as i32)
}

/// Byte-at-a-time decode. Handles short buffers and 5-group values; restores
/// the reader cursor when the value is incomplete.
fn read_var_int_fallback(buf: &ByteBuf) -> Result<i32> {
    let start = buf.reader_index()?;
    let mut value = 0i32;
    for group in 0..5 {
        if !buf.is_readable()? {
            buf.set_reader_index(start)?;
            return Err(ProtocolError::IncompleteVarInt);
        }
        let byte = buf.read_u8()?;
        value |= ((byte & 0x7F) as i32) << (7 * group);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ProtocolError::MalformedVarInt(6))
}

/// Decode a VarLong at the buffer's reader cursor.
pub fn read_var_long(buf: &ByteBuf) -> Result<i64> {
    let start = buf.reader_index()?;
    let mut value = 0i64;
    for group in 0..10 {
        if !buf.is_readable()? {
            buf.set_reader_index(start)?;
            return Err(ProtocolError::IncompleteVarInt);
        }
        let byte = buf.read_u8()?;
        value |= ((byte & 0x7F) as i64) << (7 * group);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ProtocolError::MalformedVarLong(11))
}

/// Encode `value` as a VarInt at the buffer's writer cursor, emitting the
/// minimal group count.
pub fn write_var_int(buf: &ByteBuf, value: i32) -> Result<()> {
    let v = value as u32;
    if v & 0xFFFF_FF80 == 0 {
        buf.write_u8(v as u8)
    } else if v & 0xFFFF_C000 == 0 {
        buf.write_bytes(&[(v as u8 & 0x7F) | 0x80, (v >> 7) as u8])
    } else if v & 0xFFE0_0000 == 0 {
        buf.write_bytes(&[
            (v as u8 & 0x7F) | 0x80,
            ((v >> 7) as u8 & 0x7F) | 0x80,
            (v >> 14) as u8,
        ])
    } else if v & 0xF000_0000 == 0 {
        buf.write_bytes(&[
            (v as u8 & 0x7F) | 0x80,
            ((v >> 7) as u8 & 0x7F) | 0x80,
            ((v >> 14) as u8 & 0x7F) | 0x80,
            (v >> 21) as u8,
        ])
    } else {
        buf.write_bytes(&[
            (v as u8 & 0x7F) | 0x80,
            ((v >> 7) as u8 & 0x7F) | 0x80,
            ((v >> 14) as u8 & 0x7F) | 0x80,
            ((v >> 21) as u8 & 0x7F) | 0x80,
            (v >> 28) as u8,
        ])
    }
}

/// Encode `value` as a VarLong at the buffer's writer cursor.
pub fn write_var_long(buf: &ByteBuf, value: i64) -> Result<()> {
    let mut v = value as u64;
    loop {
        if v & 0xFFFF_FFFF_FFFF_FF80 == 0 {
            return buf.write_u8(v as u8);
        }
        buf.write_u8((v as u8 & 0x7F) | 0x80)?;
        v >>= 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: i32) -> Vec<u8> {
        let buf = ByteBuf::new();
        write_var_int(&buf, value).unwrap();
        buf.to_vec().unwrap()
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(127), vec![0x7F]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(255), vec![0xFF, 0x01]);
        assert_eq!(encode(25565), vec![0xDD, 0xC7, 0x01]);
        assert_eq!(encode(2097151), vec![0xFF, 0xFF, 0x7F]);
        assert_eq!(encode(i32::MAX), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(encode(-1), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(encode(i32::MIN), vec![0x80, 0x80, 0x80, 0x80, 0x08]);
    }

    #[test]
    fn group_count_table() {
        assert_eq!(var_int_len(0), 1);
        assert_eq!(var_int_len(127), 1);
        assert_eq!(var_int_len(128), 2);
        assert_eq!(var_int_len(16383), 2);
        assert_eq!(var_int_len(16384), 3);
        assert_eq!(var_int_len(2097151), 3);
        assert_eq!(var_int_len(2097152), 4);
        assert_eq!(var_int_len(268435455), 4);
        assert_eq!(var_int_len(268435456), 5);
        assert_eq!(var_int_len(-1), 5);
    }

    #[test]
    fn roundtrip_boundary_values() {
        for v in [
            0,
            1,
            127,
            128,
            16383,
            16384,
            2097151,
            2097152,
            268435455,
            268435456,
            i32::MAX,
            -1,
            i32::MIN,
        ] {
            let buf = ByteBuf::new();
            write_var_int(&buf, v).unwrap();
            assert_eq!(buf.readable_bytes().unwrap(), var_int_len(v));
            assert_eq!(read_var_int(&buf).unwrap(), v);
            assert!(!buf.is_readable().unwrap());
        }
    }

    #[test]
    fn varlong_roundtrip_boundary_values() {
        for v in [0i64, 1, 127, 128, i64::from(i32::MAX), -1, i64::MAX, i64::MIN] {
            let buf = ByteBuf::new();
            write_var_long(&buf, v).unwrap();
            assert_eq!(buf.readable_bytes().unwrap(), var_long_len(v));
            assert_eq!(read_var_long(&buf).unwrap(), v);
        }
    }

    #[test]
    fn short_buffer_restores_cursor() {
        // 3 continuation bytes, value incomplete
        let buf = ByteBuf::from_slice(&[0x80, 0x80, 0x80]);
        let err = read_var_int(&buf).unwrap_err();
        assert!(matches!(err, ProtocolError::IncompleteVarInt));
        assert_eq!(buf.reader_index().unwrap(), 0);
        // more data arrives; the retry succeeds
        buf.write_u8(0x01).unwrap();
        assert_eq!(read_var_int(&buf).unwrap(), 1 << 21);
    }

    #[test]
    fn zero_readable_bytes_is_incomplete_not_zero() {
        let buf = ByteBuf::new();
        assert!(matches!(
            read_var_int(&buf).unwrap_err(),
            ProtocolError::IncompleteVarInt
        ));
    }

    #[test]
    fn six_group_value_is_malformed() {
        let buf = ByteBuf::from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(matches!(
            read_var_int(&buf).unwrap_err(),
            ProtocolError::MalformedVarInt(_)
        ));
    }

    #[test]
    fn fast_path_leaves_trailing_bytes() {
        // value 1 followed by three unrelated bytes; exactly one byte consumed
        let buf = ByteBuf::from_slice(&[0x01, 0xAA, 0xBB, 0xCC]);
        assert_eq!(read_var_int(&buf).unwrap(), 1);
        assert_eq!(buf.reader_index().unwrap(), 1);
        assert_eq!(buf.readable_bytes().unwrap(), 3);
    }
}
