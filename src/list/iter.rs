// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::List;
use crate::segment::Segment;
use crate::OwnedValue;

/// Iteration direction
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Front to back
    Forward,

    /// Back to front
    Reverse,
}

/// A cursor: the decoded value of one entry plus the physical position
/// it was read from.
///
/// Cursors can be fed into [`List::insert_before`] and
/// [`List::insert_after`]; any mutation of the list invalidates every
/// cursor handed out before it.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    /// The decoded value
    pub value: OwnedValue,

    pub(crate) node: usize,
    pub(crate) offset: usize,
}

/// Position of the neighboring storage segment, if any.
fn neighbor(dir: Direction, node: usize, n_nodes: usize) -> Option<(usize, Option<usize>)> {
    match dir {
        Direction::Forward => (node + 1 < n_nodes).then_some((node + 1, None)),
        Direction::Reverse => node.checked_sub(1).map(|n| (n, None)),
    }
}

/// Read-only list iterator.
///
/// Walking a compressed node decompresses it into an iterator-owned
/// scratch segment, leaving the node itself untouched.
pub struct Iter<'a> {
    list: &'a List,
    dir: Direction,

    /// Next position to yield: `(node, offset)`, where a `None` offset
    /// means "the node's first entry in walk direction"
    pos: Option<(usize, Option<usize>)>,

    /// Decompressed copy of the node currently being walked
    scratch: Option<(usize, Segment)>,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(list: &'a List, dir: Direction) -> Self {
        let pos = if list.is_empty() {
            None
        } else {
            let node = match dir {
                Direction::Forward => 0,
                Direction::Reverse => list.storage_nodes() - 1,
            };
            Some((node, None))
        };

        Self {
            list,
            dir,
            pos,
            scratch: None,
        }
    }

    pub(crate) fn new_at(list: &'a List, i: isize, dir: Direction) -> Option<Self> {
        let (node, in_node) = list.locate(i)?;

        let mut scratch = None;

        #[allow(clippy::cast_possible_wrap)]
        let offset = match list.node_readable(node) {
            Some(seg) => seg.offset_of_index(in_node as isize),
            None => {
                let seg = list.node_decompress_fresh(node);
                let offset = seg.offset_of_index(in_node as isize);
                scratch = Some((node, seg));
                offset
            }
        }?;

        Some(Self {
            list,
            dir,
            pos: Some((node, Some(offset))),
            scratch,
        })
    }

    /// Makes sure `node` is readable, decompressing into the scratch
    /// slot if needed.
    fn prepare(&mut self, node: usize) {
        if self.list.node_readable(node).is_some() {
            return;
        }

        if self.scratch.as_ref().map(|(n, _)| *n) != Some(node) {
            self.scratch = Some((node, self.list.node_decompress_fresh(node)));
        }
    }

    fn view(&self, node: usize) -> &Segment {
        if let Some(seg) = self.list.node_readable(node) {
            return seg;
        }

        match &self.scratch {
            Some((n, seg)) if *n == node => seg,
            _ => unreachable!("scratch was prepared"),
        }
    }
}

impl Iterator for Iter<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            let (node, stored) = self.pos?;
            let n_nodes = self.list.storage_nodes();
            let dir = self.dir;

            self.prepare(node);
            let seg = self.view(node);

            let offset = stored.or_else(|| match dir {
                Direction::Forward => seg.head_offset(),
                Direction::Reverse => seg.tail_offset(),
            });

            let Some(offset) = offset else {
                // Empty segment (a drained back segment); skip over it
                self.pos = neighbor(dir, node, n_nodes);
                continue;
            };

            let value = seg.get(offset).to_owned();

            self.pos = match dir {
                Direction::Forward => seg.next_offset(offset).map(|o| (node, Some(o))),
                Direction::Reverse => seg.prev_offset(offset).map(|o| (node, Some(o))),
            }
            .or_else(|| neighbor(dir, node, n_nodes));

            return Some(Entry {
                value,
                node,
                offset,
            });
        }
    }
}

/// Mutable list iterator supporting the one-step delete protocol.
///
/// After [`IterMut::next_entry`] returns an entry, the caller may call
/// [`IterMut::delete_current`] at most once; the iterator then
/// re-anchors itself on the entry that was after the deleted one
/// (forward) respectively before it (reverse). No other mutation is
/// possible while the iterator exists.
pub struct IterMut<'a> {
    list: &'a mut List,
    dir: Direction,
    pos: Option<(usize, Option<usize>)>,

    /// Position of the most recently yielded entry
    current: Option<(usize, usize)>,
}

impl<'a> IterMut<'a> {
    pub(crate) fn new(list: &'a mut List, dir: Direction) -> Self {
        let pos = if list.is_empty() {
            None
        } else {
            let node = match dir {
                Direction::Forward => 0,
                Direction::Reverse => list.storage_nodes() - 1,
            };
            Some((node, None))
        };

        Self {
            list,
            dir,
            pos,
            current: None,
        }
    }

    /// Yields the next entry in walk direction.
    pub fn next_entry(&mut self) -> Option<Entry> {
        loop {
            let (node, stored) = self.pos?;
            let n_nodes = self.list.storage_nodes();
            let dir = self.dir;

            // Mutating iteration opens nodes for writing
            let seg = self.list.node_open(node);

            let offset = stored.or_else(|| match dir {
                Direction::Forward => seg.head_offset(),
                Direction::Reverse => seg.tail_offset(),
            });

            let Some(offset) = offset else {
                self.pos = neighbor(dir, node, n_nodes);
                continue;
            };

            let value = seg.get(offset).to_owned();

            self.pos = match dir {
                Direction::Forward => seg.next_offset(offset).map(|o| (node, Some(o))),
                Direction::Reverse => seg.prev_offset(offset).map(|o| (node, Some(o))),
            }
            .or_else(|| neighbor(dir, node, n_nodes));

            self.current = Some((node, offset));

            return Some(Entry {
                value,
                node,
                offset,
            });
        }
    }

    /// Deletes the most recently yielded entry and re-anchors the
    /// iterator behind it.
    ///
    /// Returns `false` if there is no current entry (nothing yielded
    /// yet, or it was already deleted).
    pub fn delete_current(&mut self) -> bool {
        let Some((node, offset)) = self.current.take() else {
            return false;
        };

        self.pos = self.list.delete_at_position(node, offset, self.dir);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FillLevel, Value};
    use test_log::test;

    fn int_list(fill: FillLevel, depth: u8, n: i64) -> List {
        let mut list = List::new(fill, depth);

        for i in 0..n {
            list.push_tail(Value::Int(i));
        }

        list
    }

    fn collect(list: &List) -> Vec<i64> {
        list.iter()
            .map(|e| e.value.as_int().expect("test data is integers"))
            .collect()
    }

    #[test]
    fn iter_empty() {
        let list = List::new(FillLevel::new(2), 0);
        assert_eq!(0, list.iter().count());
        assert_eq!(0, list.iter_rev().count());
        assert!(list.iter_at(0, Direction::Forward).is_none());
    }

    #[test]
    fn iter_forward_and_reverse() {
        for fill in [FillLevel::unbounded(), FillLevel::new(2), FillLevel::new(1)] {
            let list = int_list(fill, 0, 200);

            let fwd: Vec<_> = collect(&list);
            assert_eq!((0..200).collect::<Vec<_>>(), fwd);

            let rev: Vec<_> = list
                .iter_rev()
                .map(|e| e.value.as_int().unwrap())
                .collect();
            assert_eq!((0..200).rev().collect::<Vec<_>>(), rev);
        }
    }

    #[test]
    fn iter_at_offsets() {
        let list = int_list(FillLevel::new(1), 0, 300);

        let tail_half: Vec<_> = list
            .iter_at(150, Direction::Forward)
            .unwrap()
            .map(|e| e.value.as_int().unwrap())
            .collect();
        assert_eq!((150..300).collect::<Vec<_>>(), tail_half);

        let head_half_rev: Vec<_> = list
            .iter_at(149, Direction::Reverse)
            .unwrap()
            .map(|e| e.value.as_int().unwrap())
            .collect();
        assert_eq!((0..150).rev().collect::<Vec<_>>(), head_half_rev);

        let last: Vec<_> = list
            .iter_at(-1, Direction::Forward)
            .unwrap()
            .map(|e| e.value.as_int().unwrap())
            .collect();
        assert_eq!(vec![299], last);

        assert!(list.iter_at(300, Direction::Forward).is_none());
    }

    #[test]
    #[cfg(feature = "lz4")]
    fn iter_over_compressed_nodes() {
        let mut list = List::new(FillLevel::new(3), 2);

        for i in 0..400i64 {
            let payload = format!("some longer repetitive payload {i:05}");
            list.push_tail(Value::Bytes(payload.as_bytes()));
        }

        assert_eq!(crate::Tier::Full, list.tier());

        // Walking must not disturb node states
        let values: Vec<_> = list.iter().map(|e| e.value).collect();
        assert_eq!(400, values.len());

        for (i, value) in values.iter().enumerate() {
            let expected = format!("some longer repetitive payload {i:05}");
            assert_eq!(&crate::OwnedValue::Bytes(expected.into_bytes()), value);
        }

        // Starting in the middle of a compressed node works, too
        let mid: Vec<_> = list
            .iter_at(200, Direction::Forward)
            .unwrap()
            .take(3)
            .map(|e| e.value)
            .collect();
        assert_eq!(3, mid.len());
        assert_eq!(values[200], mid[0]);
    }

    #[test]
    fn iter_mut_delete_every_other() {
        let mut list = int_list(FillLevel::new(1), 0, 100);

        {
            let mut iter = list.iter_mut();

            while let Some(entry) = iter.next_entry() {
                if entry.value.as_int().unwrap() % 2 == 0 {
                    assert!(iter.delete_current());
                }
            }
        }

        assert_eq!(50, list.len());
        assert_eq!(
            (0..100).filter(|i| i % 2 == 1).collect::<Vec<_>>(),
            collect(&list),
        );
    }

    #[test]
    fn iter_mut_delete_reverse() {
        let mut list = int_list(FillLevel::new(2), 0, 50);

        {
            let mut iter = list.iter_mut_rev();

            while let Some(entry) = iter.next_entry() {
                if entry.value.as_int().unwrap() < 25 {
                    assert!(iter.delete_current());
                }
            }
        }

        assert_eq!((25..50).collect::<Vec<_>>(), collect(&list));
    }

    #[test]
    fn iter_mut_delete_everything() {
        let mut list = int_list(FillLevel::new(1), 0, 120);

        {
            let mut iter = list.iter_mut();

            while iter.next_entry().is_some() {
                assert!(iter.delete_current());
            }
        }

        assert!(list.is_empty());
    }

    #[test]
    fn iter_mut_delete_current_is_single_shot() {
        let mut list = int_list(FillLevel::new(2), 0, 10);

        let mut iter = list.iter_mut();
        assert!(!iter.delete_current(), "nothing yielded yet");

        let _ = iter.next_entry().unwrap();
        assert!(iter.delete_current());
        assert!(!iter.delete_current(), "already deleted this step");
    }

    #[test]
    #[cfg(feature = "lz4")]
    fn iter_mut_delete_across_compressed_nodes() {
        let mut list = List::new(FillLevel::new(3), 1);

        for i in 0..300i64 {
            let payload = format!("another repetitive payload body {i:05}");
            list.push_tail(Value::Bytes(payload.as_bytes()));
        }

        {
            let mut iter = list.iter_mut();
            let mut i = 0;

            while iter.next_entry().is_some() {
                if i % 3 == 0 {
                    assert!(iter.delete_current());
                }
                i += 1;
            }

            assert_eq!(300, i);
        }

        assert_eq!(200, list.len());
    }
}
