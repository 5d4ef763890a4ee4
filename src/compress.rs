// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};
use xxhash_rust::xxh3::xxh3_64;

/// Compression algorithm applied to interior list nodes
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompressionType {
    /// No compression
    None,

    /// LZ4 compression
    ///
    /// Recommended; interior nodes are exactly the ones the
    /// working set rarely touches.
    #[cfg(feature = "lz4")]
    Lz4,
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "lz4")]
        {
            Self::Lz4
        }

        #[cfg(not(feature = "lz4"))]
        {
            Self::None
        }
    }
}

impl Encode for CompressionType {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            Self::None => writer.write_u8(0)?,

            #[cfg(feature = "lz4")]
            Self::Lz4 => writer.write_u8(1)?,
        };

        Ok(())
    }
}

impl Decode for CompressionType {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;

        match tag {
            0 => Ok(Self::None),

            #[cfg(feature = "lz4")]
            1 => Ok(Self::Lz4),

            tag => Err(DecodeError::InvalidTag(("CompressionType", tag))),
        }
    }
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "no compression",

                #[cfg(feature = "lz4")]
                Self::Lz4 => "lz4",
            }
        )
    }
}

/// Compresses `bytes` into a self-describing blob.
///
/// Returns `None` when the given algorithm is `None` or the blob would
/// not actually be smaller than the input; the caller then keeps the
/// data uncompressed.
///
/// Blob layout: `[type tag] [uncompressed len varint] [xxh3 u64 LE] [payload]`.
#[must_use]
pub fn compress(bytes: &[u8], compression: CompressionType) -> Option<Vec<u8>> {
    match compression {
        CompressionType::None => None,

        #[cfg(feature = "lz4")]
        CompressionType::Lz4 => {
            let payload = lz4_flex::compress(bytes);

            let mut blob = Vec::with_capacity(payload.len() + 15);

            // NOTE: Infallible, Vec<u8> is the writer
            #[allow(clippy::expect_used)]
            {
                compression.encode_into(&mut blob).expect("vec write");
                blob.write_u64_varint(bytes.len() as u64).expect("vec write");
                blob.write_u64::<LittleEndian>(xxh3_64(bytes)).expect("vec write");
            }

            blob.extend_from_slice(&payload);

            if blob.len() < bytes.len() {
                Some(blob)
            } else {
                None
            }
        }
    }
}

/// Decompresses a blob produced by [`compress`].
///
/// # Errors
///
/// Will return `Err` if the blob is malformed, truncated, or fails its
/// checksum. The blob is engine-owned memory, so this only happens when
/// the backing storage is corrupted.
pub fn decompress(blob: &[u8]) -> crate::Result<Vec<u8>> {
    let mut reader = blob;

    let compression = CompressionType::decode_from(&mut reader)?;

    match compression {
        CompressionType::None => unreachable!("uncompressed data is never stored as a blob"),

        #[cfg(feature = "lz4")]
        CompressionType::Lz4 => {
            let uncompressed_len = reader.read_u64_varint()? as usize;
            let checksum = reader.read_u64::<LittleEndian>()?;

            let mut data = vec![0; uncompressed_len];

            let n = lz4_flex::decompress_into(reader, &mut data)
                .map_err(|_| crate::Error::Decompress(compression))?;

            if n != uncompressed_len || checksum != xxh3_64(&data) {
                return Err(crate::Error::Decompress(compression));
            }

            Ok(data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    #[cfg(feature = "lz4")]
    fn compress_roundtrip() -> crate::Result<()> {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaabbbbbbbbbbbbbbbbbbbb".repeat(10);

        let blob = compress(&data, CompressionType::Lz4).expect("should shrink");
        assert!(blob.len() < data.len());

        assert_eq!(data, decompress(&blob)?);

        Ok(())
    }

    #[test]
    #[cfg(feature = "lz4")]
    fn compress_incompressible_returns_none() {
        // Short high-entropy input cannot shrink
        let data = [0x17, 0xE3, 0x5B, 0x01, 0xFF, 0x80, 0x42, 0x99];
        assert!(compress(&data, CompressionType::Lz4).is_none());
    }

    #[test]
    fn compress_none_returns_none() {
        assert!(compress(b"aaaaaaaaaaaaaaaa", CompressionType::None).is_none());
    }

    #[test]
    #[cfg(feature = "lz4")]
    fn decompress_detects_corruption() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(10);

        let mut blob = compress(&data, CompressionType::Lz4).expect("should shrink");

        // Layout is [tag][len varint: 2 bytes for 400][checksum: 8 bytes][payload],
        // so byte 5 sits inside the checksum field
        blob[5] ^= 0xFF;

        assert!(matches!(
            decompress(&blob),
            Err(crate::Error::Decompress(CompressionType::Lz4)),
        ));
    }
}
