// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod iter;
pub(crate) mod node;

pub use iter::{Direction, Entry, Iter, IterMut};

use crate::compress::CompressionType;
use crate::policy::FillLevel;
use crate::segment::{encoding, Segment};
use crate::{OwnedValue, Value};
use enum_dispatch::enum_dispatch;
use node::Node;

/// The physical layout a list currently uses.
///
/// A list starts `Small` and promotes itself monotonically as it grows;
/// it never demotes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tier {
    /// One segment
    Small,

    /// Two segments
    Medium,

    /// A list of nodes, each owning one (possibly compressed) segment
    Full,
}

#[enum_dispatch]
trait ReprOps {
    /// Number of entries over all segments.
    fn entry_count(&self) -> usize;

    /// Sum of (uncompressed) segment byte sizes.
    fn byte_size(&self) -> usize;
}

#[derive(Clone)]
struct SmallRepr {
    seg: Segment,
}

impl ReprOps for SmallRepr {
    fn entry_count(&self) -> usize {
        self.seg.len()
    }

    fn byte_size(&self) -> usize {
        self.seg.total_bytes()
    }
}

/// Head of the list is always the head of `f0`; `f0` is never the empty
/// one while the list holds data.
#[derive(Clone)]
struct MediumRepr {
    f0: Segment,
    f1: Segment,
}

impl ReprOps for MediumRepr {
    fn entry_count(&self) -> usize {
        self.f0.len() + self.f1.len()
    }

    fn byte_size(&self) -> usize {
        self.f0.total_bytes() + self.f1.total_bytes()
    }
}

/// Nodes are never empty; the first node is the list head, the last the
/// list tail.
#[derive(Clone)]
struct FullRepr {
    nodes: Vec<Node>,
}

impl ReprOps for FullRepr {
    fn entry_count(&self) -> usize {
        self.nodes.iter().map(Node::count).sum()
    }

    fn byte_size(&self) -> usize {
        self.nodes.iter().map(Node::bytes).sum()
    }
}

#[enum_dispatch(ReprOps)]
#[derive(Clone)]
enum Repr {
    Small(SmallRepr),
    Medium(MediumRepr),
    Full(FullRepr),
}

/// An ordered sequence of [`Value`]s, packed into segments.
///
/// The list transparently promotes itself through three layouts as it
/// grows — one segment, two segments, then a node list whose interior
/// nodes may be kept compressed — trading memory for access cost in a
/// controlled way. The fill level bounds every segment's byte size; the
/// compression depth says how many nodes at each end stay uncompressed.
///
/// The list is single-owner; share it across threads only behind
/// external synchronization.
///
/// # Examples
///
/// ```
/// use tiered_list::{FillLevel, List, Value};
///
/// let mut list = List::new(FillLevel::new(5), 0);
///
/// list.push_tail(Value::Int(1));
/// list.push_tail(Value::Bytes(b"two"));
/// list.push_head(Value::Int(0));
///
/// assert_eq!(3, list.len());
/// assert_eq!(Some(tiered_list::OwnedValue::Int(0)), list.get(0));
/// ```
#[derive(Clone)]
pub struct List {
    repr: Repr,
    fill: FillLevel,
    compress_depth: u8,
    compression: CompressionType,
}

impl Default for List {
    fn default() -> Self {
        Self::new(FillLevel::default(), 0)
    }
}

impl std::fmt::Debug for List {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "List({} entries, {}B, {:?})",
            self.len(),
            self.total_bytes(),
            self.tier(),
        )
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.value == b.value)
    }
}

impl List {
    /// Creates an empty list.
    ///
    /// `fill` selects the per-segment byte ceiling; `compress_depth`
    /// says how many nodes at each end stay uncompressed once the list
    /// reaches the [`Tier::Full`] layout (0 disables compression).
    #[must_use]
    pub fn new(fill: FillLevel, compress_depth: u8) -> Self {
        Self {
            repr: Repr::Small(SmallRepr {
                seg: Segment::new(),
            }),
            fill,
            compress_depth,
            compression: CompressionType::default(),
        }
    }

    /// The current physical layout.
    #[must_use]
    pub fn tier(&self) -> Tier {
        match self.repr {
            Repr::Small(_) => Tier::Small,
            Repr::Medium(_) => Tier::Medium,
            Repr::Full(_) => Tier::Full,
        }
    }

    /// The configured fill level.
    #[must_use]
    pub fn fill_level(&self) -> FillLevel {
        self.fill
    }

    /// The configured compression depth.
    #[must_use]
    pub fn compress_depth(&self) -> u8 {
        self.compress_depth
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.repr.entry_count()
    }

    /// Whether the list holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of all segment byte sizes (uncompressed).
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.repr.byte_size()
    }

    fn incoming_size(value: &Value<'_>) -> usize {
        encoding::encoded_size(&encoding::canonicalize(*value))
    }

    /// Prepends a value.
    pub fn push_head(&mut self, value: Value<'_>) {
        let incoming = Self::incoming_size(&value);
        let fill = self.fill;

        match &mut self.repr {
            Repr::Small(t) => t.seg.push_head(value),

            // The two-segment layout is only bounded by the promotion
            // rule on its total size, checked afterwards
            Repr::Medium(t) => t.f0.push_head(value),

            Repr::Full(t) => match t.nodes.first_mut() {
                Some(node) if fill.allows_insert(node.bytes(), incoming) => {
                    node.segment_mut().push_head(value);
                    node.refresh();
                }
                _ => {
                    let mut seg = Segment::new();
                    seg.push_tail(value);
                    t.nodes.insert(0, Node::new(seg));
                }
            },
        }

        self.after_write();
    }

    /// Appends a value.
    pub fn push_tail(&mut self, value: Value<'_>) {
        let incoming = Self::incoming_size(&value);
        let fill = self.fill;

        match &mut self.repr {
            Repr::Small(t) => t.seg.push_tail(value),
            Repr::Medium(t) => {
                if !t.f1.is_empty() {
                    t.f1.push_tail(value);
                } else if t.f0.is_empty() || fill.allows_insert(t.f0.total_bytes(), incoming) {
                    t.f0.push_tail(value);
                } else {
                    // Start filling the back segment
                    t.f1.push_tail(value);
                }
            }
            Repr::Full(t) => match t.nodes.last_mut() {
                Some(node) if fill.allows_insert(node.bytes(), incoming) => {
                    node.segment_mut().push_tail(value);
                    node.refresh();
                }
                _ => {
                    let mut seg = Segment::new();
                    seg.push_tail(value);
                    t.nodes.push(Node::new(seg));
                }
            },
        }

        self.after_write();
    }

    /// Looks up the entry at logical index `i`.
    ///
    /// Negative indexes count from the tail (`-1` is the last entry).
    /// When `open_node` is set and the target lives in a compressed
    /// node, that node is made plain first, so the returned cursor can
    /// be fed into the insert operations; otherwise a compressed node
    /// only fills its cached read copy.
    ///
    /// The cursor is invalidated by any following mutation.
    pub fn index(&mut self, i: isize, open_node: bool) -> Option<Entry> {
        let (node, in_node) = self.locate(i)?;

        let seg = if open_node {
            self.node_open(node)
        } else {
            self.node_read(node)
        };

        #[allow(clippy::cast_possible_wrap)]
        let offset = seg.offset_of_index(in_node as isize)?;
        let value = seg.get(offset).to_owned();

        Some(Entry {
            value,
            node,
            offset,
        })
    }

    /// Returns the value at logical index `i`.
    pub fn get(&mut self, i: isize) -> Option<OwnedValue> {
        self.index(i, false).map(|e| e.value)
    }

    /// Inserts a value immediately before the cursor's entry.
    ///
    /// The cursor must come from [`List::index`] on the list's current
    /// state (with `open_node` set when it targets a compressed node).
    pub fn insert_before(&mut self, at: &Entry, value: Value<'_>) {
        let head = self
            .node_read(0)
            .head_offset()
            .map(|o| (0, o));

        if head == Some((at.node, at.offset)) {
            self.push_head(value);
        } else {
            self.insert_at_position(at.node, at.offset, value);
        }
    }

    /// Inserts a value immediately after the cursor's entry.
    ///
    /// Inserting after the logical tail is an endpoint push.
    pub fn insert_after(&mut self, at: &Entry, value: Value<'_>) {
        match self.position_after(at.node, at.offset) {
            Some((node, offset)) => self.insert_at_position(node, offset, value),
            None => self.push_tail(value),
        }
    }

    /// Replaces the entry at logical index `i`.
    ///
    /// Returns `false` when the index is out of bounds.
    pub fn replace_at(&mut self, i: isize, value: Value<'_>) -> bool {
        let Some((node, in_node)) = self.locate(i) else {
            return false;
        };

        #[allow(clippy::cast_possible_wrap)]
        let in_node = in_node as isize;

        match &mut self.repr {
            Repr::Small(t) => {
                let offset = t.seg.offset_of_index(in_node).expect("index is in range");
                t.seg.replace_at(offset, value);
            }
            Repr::Medium(t) => {
                let seg = if node == 0 { &mut t.f0 } else { &mut t.f1 };
                let offset = seg.offset_of_index(in_node).expect("index is in range");
                seg.replace_at(offset, value);
            }
            Repr::Full(t) => {
                let nd = &mut t.nodes[node];
                let seg = nd.segment_mut();
                let offset = seg.offset_of_index(in_node).expect("index is in range");
                seg.replace_at(offset, value);
                nd.refresh();
            }
        }

        self.after_write();
        true
    }

    /// Deletes up to `count` entries starting at logical index `start`.
    ///
    /// Negative `start` counts from the tail; `count` is clamped to the
    /// remaining length. Returns `false` (without modification) when the
    /// list is empty, `count` is not positive, or `start` is out of
    /// bounds.
    pub fn delete_range(&mut self, start: isize, count: i64) -> bool {
        if self.is_empty() || count <= 0 {
            return false;
        }

        let len = self.len();

        #[allow(clippy::cast_possible_wrap)]
        let s = if start < 0 {
            start + len as isize
        } else {
            start
        };

        #[allow(clippy::cast_sign_loss)]
        let s = if s < 0 || (s as usize) >= len {
            return false;
        } else {
            s as usize
        };

        let n = usize::try_from(count)
            .unwrap_or(usize::MAX)
            .min(len - s);

        #[allow(clippy::cast_possible_wrap)]
        match &mut self.repr {
            Repr::Small(t) => {
                let offset = t
                    .seg
                    .offset_of_index(s as isize)
                    .expect("start is in range");
                t.seg.delete_count(offset, n);
            }
            Repr::Medium(t) => {
                let f0_len = t.f0.len();
                let mut remaining = n;

                if s < f0_len {
                    let take = remaining.min(f0_len - s);
                    let offset = t
                        .f0
                        .offset_of_index(s as isize)
                        .expect("start is in range");
                    t.f0.delete_count(offset, take);
                    remaining -= take;

                    if remaining > 0 {
                        let offset = t.f1.head_offset().expect("has entries left to delete");
                        t.f1.delete_count(offset, remaining);
                    }
                } else {
                    let offset = t
                        .f1
                        .offset_of_index((s - f0_len) as isize)
                        .expect("start is in range");
                    t.f1.delete_count(offset, remaining);
                }
            }
            Repr::Full(t) => {
                let mut i = 0;
                let mut skip = s;
                let mut remaining = n;

                while i < t.nodes.len() && remaining > 0 {
                    let c = t.nodes[i].count();

                    if skip >= c {
                        skip -= c;
                        i += 1;
                        continue;
                    }

                    if skip == 0 && remaining >= c {
                        // Whole node covered; no need to decompress it
                        t.nodes.remove(i);
                        remaining -= c;
                        continue;
                    }

                    let node = &mut t.nodes[i];
                    let take = remaining.min(c - skip);
                    let seg = node.segment_mut();
                    let offset = seg
                        .offset_of_index(skip as isize)
                        .expect("skip is in range");
                    seg.delete_count(offset, take);
                    node.refresh();

                    remaining -= take;
                    skip = 0;
                    i += 1;
                }
            }
        }

        self.after_delete();
        true
    }

    /// Removes and returns the first entry.
    pub fn pop_head(&mut self) -> Option<OwnedValue> {
        self.pop(false)
    }

    /// Removes and returns the last entry.
    pub fn pop_tail(&mut self) -> Option<OwnedValue> {
        self.pop(true)
    }

    fn pop(&mut self, from_tail: bool) -> Option<OwnedValue> {
        if self.is_empty() {
            return None;
        }

        let value = match &mut self.repr {
            Repr::Small(t) => {
                let offset = if from_tail {
                    t.seg.tail_offset()
                } else {
                    t.seg.head_offset()
                }?;

                let value = t.seg.get(offset).to_owned();
                t.seg.delete_at(offset);
                value
            }
            Repr::Medium(t) => {
                let seg = if from_tail {
                    if t.f1.is_empty() {
                        &mut t.f0
                    } else {
                        &mut t.f1
                    }
                } else {
                    &mut t.f0
                };

                let offset = if from_tail {
                    seg.tail_offset()
                } else {
                    seg.head_offset()
                }?;

                let value = seg.get(offset).to_owned();
                seg.delete_at(offset);
                value
            }
            Repr::Full(t) => {
                let idx = if from_tail { t.nodes.len() - 1 } else { 0 };

                let node = &mut t.nodes[idx];
                let seg = node.segment_mut();

                let offset = if from_tail {
                    seg.tail_offset()
                } else {
                    seg.head_offset()
                }?;

                let value = seg.get(offset).to_owned();
                seg.delete_at(offset);
                node.refresh();

                if node.count() == 0 {
                    t.nodes.remove(idx);
                }

                value
            }
        };

        self.after_delete();
        Some(value)
    }

    /// Moves the tail entry in front of the head.
    ///
    /// A no-op for lists with less than two entries.
    pub fn rotate(&mut self) {
        if self.len() <= 1 {
            return;
        }

        let value = self.pop_tail().expect("list has entries");
        self.push_head(value.as_value());
    }

    /// Iterates front to back.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self, Direction::Forward)
    }

    /// Iterates back to front.
    #[must_use]
    pub fn iter_rev(&self) -> Iter<'_> {
        Iter::new(self, Direction::Reverse)
    }

    /// Iterates in the given direction, starting at logical index `i`.
    #[must_use]
    pub fn iter_at(&self, i: isize, dir: Direction) -> Option<Iter<'_>> {
        Iter::new_at(self, i, dir)
    }

    /// Mutable front-to-back iteration supporting the one-step delete
    /// protocol (see [`IterMut::delete_current`]).
    pub fn iter_mut(&mut self) -> IterMut<'_> {
        IterMut::new(self, Direction::Forward)
    }

    /// Mutable back-to-front iteration.
    pub fn iter_mut_rev(&mut self) -> IterMut<'_> {
        IterMut::new(self, Direction::Reverse)
    }

    // ---------------------------------------------------------------
    // Position plumbing shared with the iterators

    /// Number of storage segments (1, 2, or the node count).
    pub(crate) fn storage_nodes(&self) -> usize {
        match &self.repr {
            Repr::Small(_) => 1,
            Repr::Medium(_) => 2,
            Repr::Full(t) => t.nodes.len(),
        }
    }

    /// The segment of `node`, if readable without decompression work.
    pub(crate) fn node_readable(&self, node: usize) -> Option<&Segment> {
        match &self.repr {
            Repr::Small(t) => Some(&t.seg),
            Repr::Medium(t) => Some(if node == 0 { &t.f0 } else { &t.f1 }),
            Repr::Full(t) => t.nodes[node].readable_segment(),
        }
    }

    /// Decompressed copy of `node`, leaving the node untouched.
    pub(crate) fn node_decompress_fresh(&self, node: usize) -> Segment {
        match &self.repr {
            Repr::Full(t) => t.nodes[node].decompress_fresh(),
            _ => unreachable!("only node-list segments are ever compressed"),
        }
    }

    /// Read access to the segment of `node`; a compressed node fills
    /// its cached read copy.
    pub(crate) fn node_read(&mut self, node: usize) -> &Segment {
        match &mut self.repr {
            Repr::Small(t) => {
                debug_assert_eq!(0, node);
                &t.seg
            }
            Repr::Medium(t) => {
                if node == 0 {
                    &t.f0
                } else {
                    &t.f1
                }
            }
            Repr::Full(t) => t.nodes[node].segment_for_read(),
        }
    }

    /// Like [`List::node_read`], but a compressed node becomes plain.
    pub(crate) fn node_open(&mut self, node: usize) -> &Segment {
        if let Repr::Full(t) = &mut self.repr {
            t.nodes[node].ensure_plain();
        }

        self.node_read(node)
    }

    /// Maps a logical index to `(node, in-node index)`.
    ///
    /// The node list is walked from whichever end the sign of `i`
    /// selects.
    fn locate(&self, i: isize) -> Option<(usize, usize)> {
        let count = self.len();

        #[allow(clippy::cast_possible_wrap)]
        let idx = if i < 0 { i + count as isize } else { i };

        #[allow(clippy::cast_sign_loss)]
        let idx = if idx < 0 || (idx as usize) >= count {
            return None;
        } else {
            idx as usize
        };

        match &self.repr {
            Repr::Small(_) => Some((0, idx)),
            Repr::Medium(t) => {
                let f0_len = t.f0.len();

                if idx < f0_len {
                    Some((0, idx))
                } else {
                    Some((1, idx - f0_len))
                }
            }
            Repr::Full(t) => {
                if i >= 0 {
                    let mut rem = idx;

                    for (k, node) in t.nodes.iter().enumerate() {
                        if rem < node.count() {
                            return Some((k, rem));
                        }
                        rem -= node.count();
                    }
                } else {
                    let mut suffix = count - idx;

                    for (k, node) in t.nodes.iter().enumerate().rev() {
                        if suffix <= node.count() {
                            return Some((k, node.count() - suffix));
                        }
                        suffix -= node.count();
                    }
                }

                unreachable!("cached node counts sum to the list length")
            }
        }
    }

    /// The position right after `(node, offset)`, or `None` at the
    /// logical tail.
    fn position_after(&mut self, node: usize, offset: usize) -> Option<(usize, usize)> {
        let nodes = self.storage_nodes();

        if let Some(next) = self.node_read(node).next_offset(offset) {
            return Some((node, next));
        }

        let mut next_node = node + 1;

        while next_node < nodes {
            if let Some(head) = self.node_read(next_node).head_offset() {
                return Some((next_node, head));
            }

            // Only a trailing two-segment layout can have an empty segment
            next_node += 1;
        }

        None
    }

    /// Inserts before the entry at `(node, offset)`.
    fn insert_at_position(&mut self, node: usize, offset: usize, value: Value<'_>) {
        if matches!(self.repr, Repr::Full(_)) {
            self.full_insert_at(node, offset, value);
            self.after_write();
            return;
        }

        match &mut self.repr {
            Repr::Small(t) => t.seg.insert_at(offset, value),
            Repr::Medium(t) => {
                let seg = if node == 0 { &mut t.f0 } else { &mut t.f1 };
                seg.insert_at(offset, value);
            }
            Repr::Full(_) => unreachable!("handled above"),
        }

        self.after_write();
    }

    /// Node-list insert honoring the admission policy: splits the target
    /// node at the insertion point when it cannot absorb the entry.
    fn full_insert_at(&mut self, node_idx: usize, offset: usize, value: Value<'_>) {
        let incoming = Self::incoming_size(&value);
        let fill = self.fill;

        let Repr::Full(t) = &mut self.repr else {
            unreachable!("caller checked the layout");
        };

        {
            let node = &mut t.nodes[node_idx];

            if node.count() == 0 || fill.allows_insert(node.bytes(), incoming) {
                node.segment_mut().insert_at(offset, value);
                node.refresh();
                return;
            }
        }

        let right_seg = {
            let node = &mut t.nodes[node_idx];
            let seg = node.segment_mut();
            let split_idx = seg.index_of_offset(offset);
            let right = seg.split_off(split_idx);
            node.refresh();
            right
        };

        let mut right = Node::new(right_seg);

        let left_accepts = {
            let left = &t.nodes[node_idx];
            left.count() == 0 || fill.allows_insert(left.bytes(), incoming)
        };

        if left_accepts {
            let left = &mut t.nodes[node_idx];
            left.segment_mut().push_tail(value);
            left.refresh();
            t.nodes.insert(node_idx + 1, right);
        } else if fill.allows_insert(right.bytes(), incoming) {
            right.segment_mut().push_head(value);
            right.refresh();
            t.nodes.insert(node_idx + 1, right);
        } else {
            // Neither half takes it; the entry gets a node of its own
            let mut seg = Segment::new();
            seg.push_tail(value);
            t.nodes.insert(node_idx + 1, Node::new(seg));
            t.nodes.insert(node_idx + 2, right);
        }

        log::trace!("split node {node_idx} around a mid-list insert");
    }

    /// Deletes the entry at `(node, offset)` on behalf of a mutable
    /// iterator and returns the re-anchored position: the entry after
    /// the deleted one for forward iteration, the one before for
    /// reverse.
    pub(crate) fn delete_at_position(
        &mut self,
        node: usize,
        offset: usize,
        dir: Direction,
    ) -> Option<(usize, Option<usize>)> {
        let anchor = match &mut self.repr {
            Repr::Small(t) => {
                let prev = t.seg.prev_offset(offset);
                t.seg.delete_at(offset);

                match dir {
                    Direction::Forward => (offset < t.seg.total_bytes())
                        .then_some((0, Some(offset))),
                    Direction::Reverse => prev.map(|p| (0, Some(p))),
                }
            }
            Repr::Medium(t) => {
                let prev = if node == 0 {
                    t.f0.prev_offset(offset)
                } else {
                    t.f1.prev_offset(offset)
                };

                if node == 0 {
                    t.f0.delete_at(offset);
                } else {
                    t.f1.delete_at(offset);
                }

                let seg_bytes = if node == 0 {
                    t.f0.total_bytes()
                } else {
                    t.f1.total_bytes()
                };

                let anchor = match dir {
                    Direction::Forward => {
                        if offset < seg_bytes {
                            Some((node, Some(offset)))
                        } else if node == 0 && !t.f1.is_empty() {
                            Some((1, None))
                        } else {
                            None
                        }
                    }
                    Direction::Reverse => match prev {
                        Some(p) => Some((node, Some(p))),
                        None if node == 1 && !t.f0.is_empty() => Some((0, None)),
                        None => None,
                    },
                };

                // Keep data in the front segment; the anchor moves with it
                let swapped = t.f0.is_empty() && !t.f1.is_empty();
                if swapped {
                    std::mem::swap(&mut t.f0, &mut t.f1);
                }

                anchor.map(|(n, o)| if swapped { (n - 1, o) } else { (n, o) })
            }
            Repr::Full(t) => {
                let (prev, seg_bytes, emptied) = {
                    let nd = &mut t.nodes[node];
                    let seg = nd.segment_mut();
                    let prev = seg.prev_offset(offset);
                    seg.delete_at(offset);
                    let bytes = seg.total_bytes();
                    nd.refresh();
                    (prev, bytes, nd.count() == 0)
                };

                if emptied {
                    t.nodes.remove(node);
                }

                let n_nodes = t.nodes.len();

                match dir {
                    Direction::Forward => {
                        if !emptied && offset < seg_bytes {
                            Some((node, Some(offset)))
                        } else {
                            let next = if emptied { node } else { node + 1 };
                            (next < n_nodes).then_some((next, None))
                        }
                    }
                    Direction::Reverse => match prev {
                        Some(p) => Some((node, Some(p))),
                        None => node.checked_sub(1).map(|n| (n, None)),
                    },
                }
            }
        };

        // No merging here: it would move entries between nodes under the
        // iterator's feet
        self.sweep_compression();

        anchor
    }

    // ---------------------------------------------------------------
    // Promotion and maintenance

    fn after_write(&mut self) {
        match self.repr {
            Repr::Small(_) => self.maybe_promote_small(),
            Repr::Medium(_) => self.maybe_promote_medium(),
            Repr::Full(_) => {
                self.split_oversized();
                self.sweep_compression();
            }
        }
    }

    fn after_delete(&mut self) {
        match self.repr {
            Repr::Small(_) => {}
            Repr::Medium(_) => self.rebalance_medium(),
            Repr::Full(_) => {
                self.merge_small_nodes();
                self.sweep_compression();
            }
        }
    }

    fn maybe_promote_small(&mut self) {
        let Some(ceiling) = self.fill.ceiling() else {
            return;
        };

        let Repr::Small(t) = &mut self.repr else {
            return;
        };

        // A single entry cannot be split; wait for the next write
        if t.seg.total_bytes() <= ceiling || t.seg.len() < 2 {
            return;
        }

        let mid = t.seg.len() / 2;
        let f1 = t.seg.split_off(mid);
        let f0 = std::mem::take(&mut t.seg);

        log::debug!(
            "promoting list to the two-segment layout ({} + {} entries)",
            f0.len(),
            f1.len(),
        );

        self.repr = Repr::Medium(MediumRepr { f0, f1 });

        self.maybe_promote_medium();
    }

    fn maybe_promote_medium(&mut self) {
        let Some(ceiling) = self.fill.ceiling() else {
            return;
        };

        let Repr::Medium(t) = &self.repr else {
            return;
        };

        if t.f0.total_bytes() + t.f1.total_bytes() <= 3 * ceiling {
            return;
        }

        self.promote_medium_to_full();
        self.split_oversized();
        self.sweep_compression();
    }

    /// Wraps the two segments as the first nodes of the node-list
    /// layout. Existing `(node, offset)` positions stay valid.
    fn promote_medium_to_full(&mut self) {
        let repr = std::mem::replace(
            &mut self.repr,
            Repr::Small(SmallRepr {
                seg: Segment::new(),
            }),
        );

        let Repr::Medium(t) = repr else {
            unreachable!("caller checked the layout");
        };

        debug_assert!(
            !t.f0.is_empty() || t.f1.is_empty(),
            "data always lives in the front segment first",
        );

        let mut nodes = vec![Node::new(t.f0)];

        if !t.f1.is_empty() {
            nodes.push(Node::new(t.f1));
        }

        log::debug!("promoting list to the node-list layout ({} nodes)", nodes.len());

        self.repr = Repr::Full(FullRepr { nodes });
    }

    fn rebalance_medium(&mut self) {
        let Repr::Medium(t) = &mut self.repr else {
            return;
        };

        if t.f0.is_empty() && !t.f1.is_empty() {
            std::mem::swap(&mut t.f0, &mut t.f1);
            log::trace!("swapped segments to keep data in front");
        }
    }

    /// Splits node-list nodes that exceed the byte ceiling, until every
    /// node obeys it (or holds a single entry).
    fn split_oversized(&mut self) {
        let Some(ceiling) = self.fill.ceiling() else {
            return;
        };

        let Repr::Full(t) = &mut self.repr else {
            return;
        };

        let mut i = 0;

        while i < t.nodes.len() {
            let node = &mut t.nodes[i];

            if node.bytes() > ceiling && node.count() >= 2 {
                let mid = node.count() / 2;
                let seg = node.segment_mut();
                let right = seg.split_off(mid);
                node.refresh();
                t.nodes.insert(i + 1, Node::new(right));

                log::trace!("split oversized node {i}");
                // Re-check the left half before moving on
            } else {
                i += 1;
            }
        }
    }

    /// Merges adjacent nodes that fit under the ceiling together again.
    fn merge_small_nodes(&mut self) {
        let fill = self.fill;

        let Repr::Full(t) = &mut self.repr else {
            return;
        };

        let mut i = 0;

        while i + 1 < t.nodes.len() {
            if fill.allows_merge(t.nodes[i].bytes(), t.nodes[i + 1].bytes()) {
                let right = t.nodes.remove(i + 1).into_segment();
                let node = &mut t.nodes[i];
                node.segment_mut().append_all(right);
                node.refresh();

                log::trace!("merged neighbor into node {i}");
                // The merged node might swallow its next neighbor, too
            } else {
                i += 1;
            }
        }
    }

    /// Re-establishes the compression regime: nodes within
    /// `compress_depth` of an end are plain, interior nodes are
    /// compressed.
    fn sweep_compression(&mut self) {
        let depth = usize::from(self.compress_depth);
        let compression = self.compression;

        if depth == 0 || compression == CompressionType::None {
            return;
        }

        let Repr::Full(t) = &mut self.repr else {
            return;
        };

        let n = t.nodes.len();

        for (i, node) in t.nodes.iter_mut().enumerate() {
            if i < depth || i + depth >= n {
                node.ensure_plain();
            } else {
                node.try_compress(compression);
            }
        }
    }
}

impl<'a> Extend<Value<'a>> for List {
    fn extend<T: IntoIterator<Item = Value<'a>>>(&mut self, iter: T) {
        for value in iter {
            self.push_tail(value);
        }
    }
}
