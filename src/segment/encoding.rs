// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The entry codec.
//!
//! Every entry is laid out as `[prev_len] [tag] [payload]`:
//!
//! - `prev_len` records the byte length of the *previous* entry (0 for
//!   the first entry), enabling O(1) reverse stepping. It occupies one
//!   byte for lengths below 254, otherwise a `0xFE` marker followed by a
//!   `u32` LE.
//! - The tag byte classifies the payload; integers always use the
//!   smallest representation that holds the value, and byte strings that
//!   parse as a canonical decimal `i64` are re-routed to the integer
//!   encoder, so equal logical values have equal bytes.

use crate::value::{parse_int, Value};
use byteorder::{ByteOrder, LittleEndian};

/// Marker byte introducing a 5-byte prev-length field.
const PREVLEN_MARKER: u8 = 0xFE;

/// Largest prev-length value that fits the 1-byte form.
const PREVLEN_INLINE_MAX: usize = 253;

/// `00xx_xxxx`: unsigned immediate 0..=63.
const TAG_IMMEDIATE_MAX: u8 = 0x3F;

/// `01xx_xxxx`: inline bytes, length 0..=63.
const TAG_BYTES_SHORT: u8 = 0x40;

/// `10xx_xxxx` + 1 byte: bytes with a 14-bit big-endian length.
const TAG_BYTES_MEDIUM: u8 = 0x80;

const TAG_INT16: u8 = 0xC0;
const TAG_INT24: u8 = 0xC1;
const TAG_INT32: u8 = 0xC2;
const TAG_INT64: u8 = 0xC3;
const TAG_UINT64: u8 = 0xC4;
const TAG_FLOAT64: u8 = 0xC5;

/// Bytes with a `u32` LE length.
const TAG_BYTES_LONG: u8 = 0xC6;

const BYTES_SHORT_MAX: usize = 63;
const BYTES_MEDIUM_MAX: usize = (1 << 14) - 1;

const INT24_MIN: i64 = -(1 << 23);
const INT24_MAX: i64 = (1 << 23) - 1;

/// Width of the prev-length field needed for an entry of `prev_len` bytes.
pub const fn prevlen_width(prev_len: usize) -> usize {
    if prev_len <= PREVLEN_INLINE_MAX {
        1
    } else {
        5
    }
}

/// Appends a minimal prev-length field.
pub fn write_prevlen(out: &mut Vec<u8>, prev_len: usize) {
    if prev_len <= PREVLEN_INLINE_MAX {
        #[allow(clippy::cast_possible_truncation)]
        out.push(prev_len as u8);
    } else {
        out.push(PREVLEN_MARKER);
        let mut word = [0; 4];
        LittleEndian::write_u32(&mut word, u32::try_from(prev_len).expect("entry too large"));
        out.extend_from_slice(&word);
    }
}

/// Rewrites a prev-length field in place, keeping its current width.
///
/// The caller guarantees the value fits the width (a 1-byte field is
/// only ever rewritten with values below 254).
pub fn rewrite_prevlen(field: &mut [u8], prev_len: usize) {
    match field.len() {
        1 => {
            debug_assert!(prev_len <= PREVLEN_INLINE_MAX);

            #[allow(clippy::cast_possible_truncation)]
            {
                field[0] = prev_len as u8;
            }
        }
        5 => {
            field[0] = PREVLEN_MARKER;
            LittleEndian::write_u32(
                &mut field[1..5],
                u32::try_from(prev_len).expect("entry too large"),
            );
        }
        _ => unreachable!("invalid prev-length field width"),
    }
}

/// Reads a prev-length field; returns `(prev_len, field_width)`.
pub fn read_prevlen(buf: &[u8]) -> (usize, usize) {
    match buf[0] {
        PREVLEN_MARKER => (LittleEndian::read_u32(&buf[1..5]) as usize, 5),
        0xFF => panic!("corrupted entry: invalid prev-length byte"),
        b => (usize::from(b), 1),
    }
}

/// Folds a value into its canonical form: byte strings that parse as a
/// decimal `i64` become integers, unsigned values within `i64` range
/// take the signed path.
pub fn canonicalize<'a>(value: Value<'a>) -> Value<'a> {
    match value {
        Value::Bytes(b) => match parse_int(b) {
            Some(v) => Value::Int(v),
            None => value,
        },
        Value::Uint(v) => match i64::try_from(v) {
            Ok(v) => Value::Int(v),
            Err(_) => value,
        },
        _ => value,
    }
}

/// Encoded size (tag + payload) of a canonicalized value.
pub fn encoded_size(value: &Value<'_>) -> usize {
    match *value {
        Value::Int(v) => {
            if (0..=63).contains(&v) {
                1
            } else if i64::from(i16::MIN) <= v && v <= i64::from(i16::MAX) {
                3
            } else if (INT24_MIN..=INT24_MAX).contains(&v) {
                4
            } else if i64::from(i32::MIN) <= v && v <= i64::from(i32::MAX) {
                5
            } else {
                9
            }
        }
        Value::Uint(_) => 9,
        Value::F64(_) => 9,
        Value::Bytes(b) => {
            if b.len() <= BYTES_SHORT_MAX {
                1 + b.len()
            } else if b.len() <= BYTES_MEDIUM_MAX {
                2 + b.len()
            } else {
                5 + b.len()
            }
        }
    }
}

/// Appends the tag + payload of a canonicalized value.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn write_value(out: &mut Vec<u8>, value: &Value<'_>) {
    let mut word = [0u8; 8];

    match *value {
        Value::Int(v) => {
            if (0..=63).contains(&v) {
                out.push(v as u8);
            } else if i64::from(i16::MIN) <= v && v <= i64::from(i16::MAX) {
                out.push(TAG_INT16);
                LittleEndian::write_i16(&mut word[..2], v as i16);
                out.extend_from_slice(&word[..2]);
            } else if (INT24_MIN..=INT24_MAX).contains(&v) {
                out.push(TAG_INT24);
                LittleEndian::write_i24(&mut word[..3], v as i32);
                out.extend_from_slice(&word[..3]);
            } else if i64::from(i32::MIN) <= v && v <= i64::from(i32::MAX) {
                out.push(TAG_INT32);
                LittleEndian::write_i32(&mut word[..4], v as i32);
                out.extend_from_slice(&word[..4]);
            } else {
                out.push(TAG_INT64);
                LittleEndian::write_i64(&mut word, v);
                out.extend_from_slice(&word);
            }
        }
        Value::Uint(v) => {
            debug_assert!(i64::try_from(v).is_err(), "should have been canonicalized");

            out.push(TAG_UINT64);
            LittleEndian::write_u64(&mut word, v);
            out.extend_from_slice(&word);
        }
        Value::F64(v) => {
            out.push(TAG_FLOAT64);
            LittleEndian::write_u64(&mut word, v.to_bits());
            out.extend_from_slice(&word);
        }
        Value::Bytes(b) => {
            if b.len() <= BYTES_SHORT_MAX {
                out.push(TAG_BYTES_SHORT | (b.len() as u8));
            } else if b.len() <= BYTES_MEDIUM_MAX {
                out.push(TAG_BYTES_MEDIUM | ((b.len() >> 8) as u8));
                out.push((b.len() & 0xFF) as u8);
            } else {
                out.push(TAG_BYTES_LONG);
                LittleEndian::write_u32(
                    &mut word[..4],
                    u32::try_from(b.len()).expect("byte string too large"),
                );
                out.extend_from_slice(&word[..4]);
            }
            out.extend_from_slice(b);
        }
    }
}

/// Decodes the tag + payload at the start of `buf`.
///
/// Returns the decoded value and the number of bytes consumed.
///
/// # Panics
///
/// Panics on an invalid tag byte; entries are engine-written, so this
/// means the backing storage is corrupted.
pub fn read_value(buf: &[u8]) -> (Value<'_>, usize) {
    let tag = buf[0];

    if tag <= TAG_IMMEDIATE_MAX {
        return (Value::Int(i64::from(tag)), 1);
    }

    if tag < TAG_BYTES_MEDIUM {
        let len = usize::from(tag & 0x3F);
        return (Value::Bytes(&buf[1..1 + len]), 1 + len);
    }

    if tag < TAG_INT16 {
        let len = (usize::from(tag & 0x3F) << 8) | usize::from(buf[1]);
        return (Value::Bytes(&buf[2..2 + len]), 2 + len);
    }

    match tag {
        TAG_INT16 => (Value::Int(i64::from(LittleEndian::read_i16(&buf[1..3]))), 3),
        TAG_INT24 => (Value::Int(i64::from(LittleEndian::read_i24(&buf[1..4]))), 4),
        TAG_INT32 => (Value::Int(i64::from(LittleEndian::read_i32(&buf[1..5]))), 5),
        TAG_INT64 => (Value::Int(LittleEndian::read_i64(&buf[1..9])), 9),
        TAG_UINT64 => (Value::Uint(LittleEndian::read_u64(&buf[1..9])), 9),
        TAG_FLOAT64 => (Value::F64(f64::from_bits(LittleEndian::read_u64(&buf[1..9]))), 9),
        TAG_BYTES_LONG => {
            let len = LittleEndian::read_u32(&buf[1..5]) as usize;
            (Value::Bytes(&buf[5..5 + len]), 5 + len)
        }
        _ => panic!("corrupted entry: invalid tag byte {tag:#04x}"),
    }
}

/// Byte length of the tag + payload at the start of `buf`, without
/// materializing the value.
pub fn value_len(buf: &[u8]) -> usize {
    let tag = buf[0];

    if tag <= TAG_IMMEDIATE_MAX {
        return 1;
    }

    if tag < TAG_BYTES_MEDIUM {
        return 1 + usize::from(tag & 0x3F);
    }

    if tag < TAG_INT16 {
        return 2 + ((usize::from(tag & 0x3F) << 8) | usize::from(buf[1]));
    }

    match tag {
        TAG_INT16 => 3,
        TAG_INT24 => 4,
        TAG_INT32 => 5,
        TAG_INT64 | TAG_UINT64 | TAG_FLOAT64 => 9,
        TAG_BYTES_LONG => 5 + LittleEndian::read_u32(&buf[1..5]) as usize,
        _ => panic!("corrupted entry: invalid tag byte {tag:#04x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn roundtrip(value: Value<'_>) -> usize {
        let canonical = canonicalize(value);

        let mut buf = vec![];
        write_value(&mut buf, &canonical);
        assert_eq!(encoded_size(&canonical), buf.len());

        let (decoded, consumed) = read_value(&buf);
        assert_eq!(consumed, buf.len());
        assert_eq!(consumed, value_len(&buf));
        assert_eq!(canonical, decoded);

        buf.len()
    }

    #[test]
    fn value_roundtrip_integers() {
        assert_eq!(1, roundtrip(Value::Int(0)));
        assert_eq!(1, roundtrip(Value::Int(63)));
        assert_eq!(3, roundtrip(Value::Int(64)));
        assert_eq!(3, roundtrip(Value::Int(-1)));
        assert_eq!(3, roundtrip(Value::Int(i64::from(i16::MAX))));
        assert_eq!(4, roundtrip(Value::Int(i64::from(i16::MAX) + 1)));
        assert_eq!(4, roundtrip(Value::Int(INT24_MAX)));
        assert_eq!(5, roundtrip(Value::Int(INT24_MAX + 1)));
        assert_eq!(5, roundtrip(Value::Int(i64::from(i32::MIN))));
        assert_eq!(9, roundtrip(Value::Int(i64::MAX)));
        assert_eq!(9, roundtrip(Value::Int(i64::MIN)));
    }

    #[test]
    fn value_roundtrip_unsigned() {
        // Within i64 range, unsigned canonicalizes to the signed path
        let mut a = vec![];
        let mut b = vec![];
        write_value(&mut a, &canonicalize(Value::Uint(42)));
        write_value(&mut b, &Value::Int(42));
        assert_eq!(a, b);

        assert_eq!(9, roundtrip(Value::Uint(u64::MAX)));
        assert_eq!(9, roundtrip(Value::Uint(1 + i64::MAX as u64)));
    }

    #[test]
    fn value_roundtrip_floats() {
        assert_eq!(9, roundtrip(Value::F64(0.0)));
        assert_eq!(9, roundtrip(Value::F64(-13.37)));
        assert_eq!(9, roundtrip(Value::F64(f64::INFINITY)));
    }

    #[test]
    fn value_roundtrip_bytes() {
        assert_eq!(1, roundtrip(Value::Bytes(b"")));
        assert_eq!(4, roundtrip(Value::Bytes(b"abc")));
        assert_eq!(1 + 63, roundtrip(Value::Bytes(&[b'x'; 63])));
        assert_eq!(2 + 64, roundtrip(Value::Bytes(&[b'x'; 64])));
        assert_eq!(2 + 16383, roundtrip(Value::Bytes(&vec![b'x'; 16383])));
        assert_eq!(5 + 16384, roundtrip(Value::Bytes(&vec![b'x'; 16384])));
    }

    #[test]
    fn canonical_string_to_int() {
        let mut a = vec![];
        let mut b = vec![];
        write_value(&mut a, &canonicalize(Value::Bytes(b"42")));
        write_value(&mut b, &canonicalize(Value::Int(42)));
        assert_eq!(a, b);

        // Non-canonical digit strings stay strings
        let mut c = vec![];
        write_value(&mut c, &canonicalize(Value::Bytes(b"042")));
        assert_eq!(Value::Bytes(b"042"), read_value(&c).0);
    }

    #[test]
    fn prevlen_forms() {
        let mut short = vec![];
        write_prevlen(&mut short, 253);
        assert_eq!(vec![253], short);
        assert_eq!((253, 1), read_prevlen(&short));

        let mut long = vec![];
        write_prevlen(&mut long, 254);
        assert_eq!(5, long.len());
        assert_eq!((254, 5), read_prevlen(&long));

        // Rewriting keeps the existing width
        rewrite_prevlen(&mut long, 7);
        assert_eq!((7, 5), read_prevlen(&long));
    }
}
