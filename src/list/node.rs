// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::compress::{compress, decompress, CompressionType};
use crate::segment::Segment;

/// Segments below this byte size are never worth compressing.
const MIN_COMPRESS_BYTES: usize = 48;

/// Blobs are engine-owned memory; failing to reinflate one means the
/// backing storage is corrupted, which is not recoverable.
fn reinflate(blob: &[u8]) -> Segment {
    #[allow(clippy::expect_used)]
    Segment::from_raw_unchecked(decompress(blob).expect("node blob should decompress"))
}

#[derive(Clone)]
enum State {
    /// Directly readable and writable
    Plain(Segment),

    /// Replaced by a compressed blob; an earlier read may have left a
    /// cached decompressed copy behind
    Compressed {
        blob: Vec<u8>,
        scratch: Option<Box<Segment>>,
    },
}

/// One segment of a [`Full`](crate::List)-tier list, with cached size
/// metadata that stays valid while the segment itself is compressed.
#[derive(Clone)]
pub(crate) struct Node {
    state: State,

    /// Uncompressed segment size in bytes
    bytes: usize,

    /// Entry count
    count: usize,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Node({} entries, {}B{})",
            self.count,
            self.bytes,
            if self.is_compressed() { ", compressed" } else { "" },
        )
    }
}

impl Node {
    pub fn new(seg: Segment) -> Self {
        Self {
            bytes: seg.total_bytes(),
            count: seg.len(),
            state: State::Plain(seg),
        }
    }

    /// Uncompressed segment size in bytes.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Entry count.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.state, State::Compressed { .. })
    }

    /// Returns the segment if it is readable without decompression work:
    /// either plain, or compressed with a cached decompressed copy.
    pub fn readable_segment(&self) -> Option<&Segment> {
        match &self.state {
            State::Plain(seg) => Some(seg),
            State::Compressed { scratch, .. } => scratch.as_deref(),
        }
    }

    /// Decompresses into a fresh segment, leaving the node untouched.
    ///
    /// Only meaningful for compressed nodes; iterators use this to walk
    /// a node without disturbing its state.
    pub fn decompress_fresh(&self) -> Segment {
        match &self.state {
            State::Plain(seg) => seg.clone(),
            State::Compressed { blob, .. } => reinflate(blob),
        }
    }

    /// Read access; a compressed node fills (and keeps) its cached
    /// decompressed copy.
    pub fn segment_for_read(&mut self) -> &Segment {
        if let State::Compressed { blob, scratch } = &mut self.state {
            if scratch.is_none() {
                *scratch = Some(Box::new(reinflate(blob)));
            }
        }

        match &self.state {
            State::Plain(seg) => seg,
            State::Compressed { scratch, .. } => {
                #[allow(clippy::expect_used)]
                scratch.as_deref().expect("scratch was just filled")
            }
        }
    }

    /// Makes the node plain, decompressing if necessary.
    pub fn ensure_plain(&mut self) {
        if let State::Compressed { blob, scratch } = &mut self.state {
            let seg = match scratch.take() {
                Some(seg) => *seg,
                None => reinflate(blob),
            };

            self.state = State::Plain(seg);
        }
    }

    /// Write access; the node becomes plain. The caller must invoke
    /// [`Node::refresh`] once it is done mutating.
    pub fn segment_mut(&mut self) -> &mut Segment {
        self.ensure_plain();

        match &mut self.state {
            State::Plain(seg) => seg,
            State::Compressed { .. } => unreachable!("node was made plain"),
        }
    }

    /// Re-caches size metadata from the (plain) segment.
    pub fn refresh(&mut self) {
        match &self.state {
            State::Plain(seg) => {
                self.bytes = seg.total_bytes();
                self.count = seg.len();
            }
            State::Compressed { .. } => {
                unreachable!("compressed nodes are never mutated in place")
            }
        }
    }

    /// Unwraps the segment, decompressing if necessary.
    pub fn into_segment(self) -> Segment {
        match self.state {
            State::Plain(seg) => seg,
            State::Compressed { blob, scratch } => match scratch {
                Some(seg) => *seg,
                None => reinflate(&blob),
            },
        }
    }

    /// Tries to compress a plain node.
    ///
    /// Nothing happens if the node is already compressed, too small to
    /// bother, or would not actually shrink.
    pub fn try_compress(&mut self, compression: CompressionType) {
        let State::Plain(seg) = &self.state else {
            return;
        };

        if seg.total_bytes() < MIN_COMPRESS_BYTES {
            return;
        }

        match compress(seg.raw_bytes(), compression) {
            Some(blob) => {
                log::trace!(
                    "compressed node: {}B -> {}B ({compression})",
                    self.bytes,
                    blob.len(),
                );

                self.state = State::Compressed {
                    blob,
                    scratch: None,
                };
            }
            None => {
                // Non-fatal: the node simply stays plain
                log::trace!("node did not shrink under {compression}, keeping it plain");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use test_log::test;

    fn fixture_segment(n: i64) -> Segment {
        let mut seg = Segment::new();

        for i in 0..n {
            seg.push_tail(Value::Int(i));
            seg.push_tail(Value::Bytes(b"abcabcabcabcabcabc"));
        }

        seg
    }

    #[test]
    #[cfg(feature = "lz4")]
    fn node_compress_roundtrip() {
        let seg = fixture_segment(50);
        let reference = seg.clone();

        let mut node = Node::new(seg);
        let (bytes, count) = (node.bytes(), node.count());

        node.try_compress(CompressionType::Lz4);
        assert!(node.is_compressed());

        // Caches survive compression
        assert_eq!(bytes, node.bytes());
        assert_eq!(count, node.count());

        // First read fills the cached copy
        assert!(node.readable_segment().is_none());
        assert_eq!(&reference, node.segment_for_read());
        assert!(node.readable_segment().is_some());
        assert!(node.is_compressed());

        // Write access flips it back to plain
        node.segment_mut().push_tail(Value::Int(999));
        node.refresh();
        assert!(!node.is_compressed());
        assert_eq!(count + 1, node.count());
    }

    #[test]
    fn node_tiny_segment_stays_plain() {
        let mut seg = Segment::new();
        seg.push_tail(Value::Int(1));

        let mut node = Node::new(seg);
        node.try_compress(CompressionType::default());
        assert!(!node.is_compressed());
    }

    #[test]
    #[cfg(feature = "lz4")]
    fn node_decompress_fresh_leaves_state() {
        let seg = fixture_segment(50);
        let reference = seg.clone();

        let mut node = Node::new(seg);
        node.try_compress(CompressionType::Lz4);
        assert!(node.is_compressed());

        assert_eq!(reference, node.decompress_fresh());
        assert!(node.is_compressed());
        assert!(node.readable_segment().is_none());
    }
}
