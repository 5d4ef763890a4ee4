// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub(crate) mod encoding;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::Value;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use encoding::{
    canonicalize, encoded_size, prevlen_width, read_prevlen, read_value, rewrite_prevlen,
    value_len, write_prevlen, write_value,
};
use std::io::{Read, Write};

/// Byte size of the segment header:
/// `total_bytes: u32 LE` + `tail_offset: u32 LE` + `count: u32 LE`.
const HEADER_SIZE: usize = 12;

/// A packed run of entries in one contiguous buffer.
///
/// Entries are encoded back to back after a fixed header; each entry
/// leads with the byte length of its predecessor, so the buffer can be
/// walked in both directions. All offsets taken and returned by this
/// type are entry-start offsets (the first byte of the prev-length
/// field).
///
/// Offsets are a caller contract: passing an offset that does not point
/// at an entry is a logic error and panics.
#[derive(Clone, Eq, PartialEq)]
pub struct Segment {
    data: Vec<u8>,
}

impl Default for Segment {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Segment({} entries, {}B)", self.len(), self.total_bytes())
    }
}

impl Segment {
    /// Creates an empty segment.
    #[must_use]
    pub fn new() -> Self {
        let mut data = vec![0; HEADER_SIZE];
        LittleEndian::write_u32(&mut data[0..4], HEADER_SIZE as u32);
        Self { data }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        LittleEndian::read_u32(&self.data[8..12]) as usize
    }

    /// Whether the segment holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total buffer size in bytes, header included.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        debug_assert_eq!(
            self.data.len(),
            LittleEndian::read_u32(&self.data[0..4]) as usize,
        );
        self.data.len()
    }

    /// Offset of the first entry.
    #[must_use]
    pub fn head_offset(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(HEADER_SIZE)
        }
    }

    /// Offset of the last entry.
    #[must_use]
    pub fn tail_offset(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.tail_field())
        }
    }

    fn tail_field(&self) -> usize {
        LittleEndian::read_u32(&self.data[4..8]) as usize
    }

    fn set_tail_field(&mut self, offset: usize) {
        #[allow(clippy::cast_possible_truncation)]
        LittleEndian::write_u32(&mut self.data[4..8], offset as u32);
    }

    fn set_len(&mut self, count: usize) {
        LittleEndian::write_u32(
            &mut self.data[8..12],
            u32::try_from(count).expect("entry count too large"),
        );
    }

    fn sync_total(&mut self) {
        let total = u32::try_from(self.data.len()).expect("segment too large");
        LittleEndian::write_u32(&mut self.data[0..4], total);
    }

    /// Wraps an engine-owned buffer without re-validating it.
    pub(crate) fn from_raw_unchecked(data: Vec<u8>) -> Self {
        debug_assert!(Self::validate(&data).is_ok());
        Self { data }
    }

    /// The raw self-describing buffer.
    pub(crate) fn raw_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Logical index of the entry at `offset`.
    pub(crate) fn index_of_offset(&self, offset: usize) -> usize {
        let mut i = 0;
        let mut o = self.head_offset().expect("segment should not be empty");

        while o != offset {
            o = self.next_offset(o).expect("offset should point at an entry");
            i += 1;
        }

        i
    }

    /// Byte length of the entry at `offset`.
    pub(crate) fn entry_len_at(&self, offset: usize) -> usize {
        let (_, width) = read_prevlen(&self.data[offset..]);
        width + value_len(&self.data[offset + width..])
    }

    /// Decodes the entry at `offset`.
    #[must_use]
    pub fn get(&self, offset: usize) -> Value<'_> {
        let (_, width) = read_prevlen(&self.data[offset..]);
        read_value(&self.data[offset + width..]).0
    }

    /// Offset of the entry after the one at `offset`.
    #[must_use]
    pub fn next_offset(&self, offset: usize) -> Option<usize> {
        if offset == self.tail_field() {
            None
        } else {
            Some(offset + self.entry_len_at(offset))
        }
    }

    /// Offset of the entry before the one at `offset`.
    #[must_use]
    pub fn prev_offset(&self, offset: usize) -> Option<usize> {
        if offset == HEADER_SIZE {
            None
        } else {
            let (prev_len, _) = read_prevlen(&self.data[offset..]);
            Some(offset - prev_len)
        }
    }

    /// Offset of the entry at logical index `i`.
    ///
    /// Negative indexes count from the tail (`-1` is the last entry);
    /// the sign also selects the walk direction.
    #[must_use]
    pub fn offset_of_index(&self, i: isize) -> Option<usize> {
        if i >= 0 {
            let mut offset = self.head_offset()?;
            for _ in 0..i {
                offset = self.next_offset(offset)?;
            }
            Some(offset)
        } else {
            let mut offset = self.tail_offset()?;
            for _ in 0..-(i + 1) {
                offset = self.prev_offset(offset)?;
            }
            Some(offset)
        }
    }

    /// Appends a value at the tail.
    pub fn push_tail(&mut self, value: Value<'_>) {
        let value = canonicalize(value);

        let prev_len = if self.is_empty() {
            0
        } else {
            self.data.len() - self.tail_field()
        };

        let offset = self.data.len();
        write_prevlen(&mut self.data, prev_len);
        write_value(&mut self.data, &value);

        self.set_tail_field(offset);
        self.set_len(self.len() + 1);
        self.sync_total();
    }

    /// Prepends a value at the head.
    pub fn push_head(&mut self, value: Value<'_>) {
        self.insert_at(HEADER_SIZE, value);
    }

    /// Inserts a value immediately before the entry at `offset`.
    ///
    /// `offset == total_bytes()` appends at the tail.
    pub fn insert_at(&mut self, offset: usize, value: Value<'_>) {
        assert!(
            (HEADER_SIZE..=self.data.len()).contains(&offset),
            "invalid entry offset",
        );

        if offset == self.data.len() {
            self.push_tail(value);
            return;
        }

        let value = canonicalize(value);

        // The displaced entry's prev-length field carries the length of
        // the entry the new one will now follow
        let (prev_len, _) = read_prevlen(&self.data[offset..]);

        let mut entry = Vec::with_capacity(prevlen_width(prev_len) + encoded_size(&value));
        write_prevlen(&mut entry, prev_len);
        write_value(&mut entry, &value);
        let entry_len = entry.len();

        self.data.splice(offset..offset, entry);

        let mut tail = self.tail_field() + entry_len;
        self.cascade_update(offset + entry_len, entry_len, &mut tail);

        self.set_tail_field(tail);
        self.set_len(self.len() + 1);
        self.sync_total();
    }

    /// Rewrites the prev-length of the entry at `offset` to `prev_len`,
    /// rippling onward while entry byte lengths keep changing.
    ///
    /// Fields never shrink below their current width (a wide field can
    /// hold a small value), so a ripple step only ever grows an entry;
    /// `tail` is kept pointing at the last entry's start throughout.
    fn cascade_update(&mut self, mut offset: usize, mut prev_len: usize, tail: &mut usize) {
        loop {
            let (stored, width) = read_prevlen(&self.data[offset..]);
            let needed = prevlen_width(prev_len);

            if needed <= width {
                if stored != prev_len {
                    rewrite_prevlen(&mut self.data[offset..offset + width], prev_len);
                }
                break;
            }

            // Grow the field 1 -> 5
            let vlen = value_len(&self.data[offset + width..]);

            let mut field = Vec::with_capacity(5);
            write_prevlen(&mut field, prev_len);
            self.data.splice(offset..offset + width, field);

            let entry_len = 5 + vlen;

            log::trace!("prev-length ripple at offset {offset}");

            if offset == *tail {
                break;
            }

            *tail += 5 - width;
            offset += entry_len;
            prev_len = entry_len;
        }
    }

    /// Deletes up to `n` entries starting at `offset`.
    ///
    /// Returns the number of entries actually removed.
    pub fn delete_count(&mut self, offset: usize, n: usize) -> usize {
        assert!(
            (HEADER_SIZE..self.data.len()).contains(&offset),
            "invalid entry offset",
        );

        if n == 0 {
            return 0;
        }

        let (prev_len, _) = read_prevlen(&self.data[offset..]);

        let mut end = offset;
        let mut removed = 0;

        while removed < n && end < self.data.len() {
            end += self.entry_len_at(end);
            removed += 1;
        }

        if end == self.data.len() {
            // The range runs through the tail
            self.data.truncate(offset);

            self.set_tail_field(if offset == HEADER_SIZE {
                0
            } else {
                offset - prev_len
            });
        } else {
            let old_tail = self.tail_field();
            self.data.drain(offset..end);

            let mut tail = old_tail - (end - offset);
            self.cascade_update(offset, prev_len, &mut tail);
            self.set_tail_field(tail);
        }

        self.set_len(self.len() - removed);
        self.sync_total();

        removed
    }

    /// Deletes the entry at `offset`.
    pub fn delete_at(&mut self, offset: usize) {
        let removed = self.delete_count(offset, 1);
        debug_assert_eq!(1, removed);
    }

    /// Replaces the entry at `offset`.
    ///
    /// Rewrites in place when the new encoding occupies exactly the old
    /// entry's payload bytes, otherwise falls back to delete + insert.
    pub fn replace_at(&mut self, offset: usize, value: Value<'_>) {
        let value = canonicalize(value);

        let (_, width) = read_prevlen(&self.data[offset..]);
        let old_vlen = value_len(&self.data[offset + width..]);
        let new_vlen = encoded_size(&value);

        if old_vlen == new_vlen {
            let mut out = Vec::with_capacity(new_vlen);
            write_value(&mut out, &value);
            self.data[offset + width..offset + width + new_vlen].copy_from_slice(&out);
        } else {
            self.delete_at(offset);
            self.insert_at(offset, value);
        }
    }

    /// Removes the entries `[at_index..]` and returns them as a new segment.
    #[must_use]
    pub fn split_off(&mut self, at_index: usize) -> Self {
        let count = self.len();
        assert!(at_index <= count, "split index out of range");

        if at_index == count {
            return Self::new();
        }

        #[allow(clippy::cast_possible_wrap)]
        let offset = self
            .offset_of_index(at_index as isize)
            .expect("index is in range");

        let (prev_len, width) = read_prevlen(&self.data[offset..]);
        let old_tail = self.tail_field();
        let moved = count - at_index;

        let mut other = Self::new();

        // The first moved entry has no predecessor anymore
        other.data.push(0);
        other.data.extend_from_slice(&self.data[offset + width..]);

        let mut other_tail = if moved == 1 {
            HEADER_SIZE
        } else {
            HEADER_SIZE + (old_tail - offset) - (width - 1)
        };

        if moved > 1 {
            let first_len = 1 + value_len(&other.data[HEADER_SIZE + 1..]);
            other.cascade_update(HEADER_SIZE + first_len, first_len, &mut other_tail);
        }

        other.set_tail_field(other_tail);
        other.set_len(moved);
        other.sync_total();

        self.data.truncate(offset);
        self.set_tail_field(if at_index == 0 { 0 } else { offset - prev_len });
        self.set_len(at_index);
        self.sync_total();

        other
    }

    /// Moves all entries of `other` behind this segment's tail.
    pub fn append_all(&mut self, other: Self) {
        if other.is_empty() {
            return;
        }

        if self.is_empty() {
            *self = other;
            return;
        }

        let junction = self.data.len();
        let tail_len = junction - self.tail_field();
        let other_count = other.len();
        let other_tail = other.tail_field();

        // A well-formed first entry always has a 1-byte prev-length field
        let (first_prev, first_width) = read_prevlen(&other.data[HEADER_SIZE..]);
        debug_assert_eq!((0, 1), (first_prev, first_width));

        write_prevlen(&mut self.data, tail_len);
        let new_first_width = self.data.len() - junction;
        self.data
            .extend_from_slice(&other.data[HEADER_SIZE + first_width..]);

        let first_vlen = value_len(&self.data[junction + new_first_width..]);
        let new_first_len = new_first_width + first_vlen;

        let mut tail = if other_count == 1 {
            junction
        } else {
            junction + (other_tail - HEADER_SIZE) + (new_first_width - first_width)
        };

        if other_count > 1 {
            self.cascade_update(junction + new_first_len, new_first_len, &mut tail);
        }

        self.set_tail_field(tail);
        self.set_len(self.len() + other_count);
        self.sync_total();
    }

    /// Compares the entry at `offset` against a byte string.
    ///
    /// Integer entries compare numerically when `needle` itself parses
    /// as a canonical integer; otherwise both sides are compared as
    /// bytes, rendering the entry in its canonical textual form.
    #[must_use]
    pub fn compare_at(&self, offset: usize, needle: &[u8]) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        match self.get(offset) {
            Value::Bytes(b) => b.cmp(needle),
            Value::Int(v) => match crate::value::parse_int(needle) {
                Some(n) => v.cmp(&n),
                None => v.to_string().as_bytes().cmp(needle),
            },
            Value::Uint(v) => match crate::value::parse_int(needle) {
                #[allow(clippy::cast_sign_loss)]
                Some(n) if n >= 0 => v.cmp(&(n as u64)),
                Some(_) => Ordering::Greater,
                None => v.to_string().as_bytes().cmp(needle),
            },
            Value::F64(v) => format!("{v}").as_bytes().cmp(needle),
        }
    }

    /// Checks that `data` is a well-formed segment buffer.
    fn validate(data: &[u8]) -> Result<(), DecodeError> {
        if data.len() < HEADER_SIZE {
            return Err(DecodeError::InvalidHeader("buffer shorter than header"));
        }

        if LittleEndian::read_u32(&data[0..4]) as usize != data.len() {
            return Err(DecodeError::InvalidHeader("total length mismatch"));
        }

        let tail = LittleEndian::read_u32(&data[4..8]) as usize;
        let count = LittleEndian::read_u32(&data[8..12]) as usize;

        if count == 0 {
            return if data.len() == HEADER_SIZE && tail == 0 {
                Ok(())
            } else {
                Err(DecodeError::InvalidHeader("empty segment with body"))
            };
        }

        let mut offset = HEADER_SIZE;
        let mut prev_entry_len = 0;
        let mut walked = 0;
        let mut last_offset = 0;

        while offset < data.len() {
            let rest = &data[offset..];

            let (prev_len, width) = match rest.first() {
                Some(&0xFE) if rest.len() >= 5 => {
                    (LittleEndian::read_u32(&rest[1..5]) as usize, 5)
                }
                Some(&b) if b < 0xFE => (usize::from(b), 1),
                _ => return Err(DecodeError::InvalidHeader("truncated prev-length field")),
            };

            if prev_len != prev_entry_len {
                return Err(DecodeError::InvalidHeader("prev-length chain broken"));
            }

            let Some(vlen) = checked_value_len(&rest[width..]) else {
                return Err(DecodeError::InvalidHeader("truncated entry payload"));
            };

            last_offset = offset;
            prev_entry_len = width + vlen;
            offset += prev_entry_len;
            walked += 1;
        }

        if offset != data.len() {
            return Err(DecodeError::InvalidHeader("entry overruns buffer"));
        }

        if walked != count {
            return Err(DecodeError::InvalidHeader("entry count mismatch"));
        }

        if last_offset != tail {
            return Err(DecodeError::InvalidHeader("tail offset mismatch"));
        }

        Ok(())
    }
}

/// Bounds-checked flavor of [`encoding::value_len`] for untrusted input.
fn checked_value_len(buf: &[u8]) -> Option<usize> {
    let tag = *buf.first()?;

    let len = if tag <= 0x3F {
        1
    } else if tag < 0x80 {
        1 + usize::from(tag & 0x3F)
    } else if tag < 0xC0 {
        2 + ((usize::from(tag & 0x3F) << 8) | usize::from(*buf.get(1)?))
    } else {
        match tag {
            0xC0 => 3,
            0xC1 => 4,
            0xC2 => 5,
            0xC3..=0xC5 => 9,
            0xC6 => {
                if buf.len() < 5 {
                    return None;
                }
                5 + LittleEndian::read_u32(&buf[1..5]) as usize
            }
            _ => return None,
        }
    };

    (len <= buf.len()).then_some(len)
}

impl Encode for Segment {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&self.data)?;
        Ok(())
    }
}

impl Decode for Segment {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let total = reader.read_u32::<LittleEndian>()? as usize;

        if total < HEADER_SIZE {
            return Err(DecodeError::InvalidHeader("total length below header size"));
        }

        let mut data = vec![0; total];
        #[allow(clippy::cast_possible_truncation)]
        LittleEndian::write_u32(&mut data[0..4], total as u32);
        reader.read_exact(&mut data[4..])?;

        Self::validate(&data)?;

        Ok(Self { data })
    }
}
