// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segment admission policy.
//!
//! Pure, allocation-free decisions over cached byte sizes; the sole
//! arbiter for tier promotions, node splits and node merges.

/// Per-segment byte ceilings, selected by [`FillLevel`].
///
/// Index 0 disables the ceiling entirely.
pub const CEILINGS: [usize; 12] = [
    0, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768, 65536,
];

/// Entry framing estimate for small payloads (prev-length + tag byte).
const SMALL_FRAMING: usize = 2;

/// Entry framing estimate for larger payloads.
const LARGE_FRAMING: usize = 4;

/// Payload size up to which the small framing estimate applies.
const SMALL_PAYLOAD_MAX: usize = 24;

/// Fixed header overhead reclaimed when two segments merge.
const MERGE_HEADER_SAVINGS: usize = 3;

/// Selects a per-segment byte ceiling.
///
/// Out-of-range indexes are clamped to the largest level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FillLevel(u8);

impl FillLevel {
    /// Highest valid level index.
    pub const MAX_INDEX: u8 = (CEILINGS.len() - 1) as u8;

    /// Creates a fill level from a table index, clamping to the table.
    #[must_use]
    pub fn new(index: u8) -> Self {
        Self(index.min(Self::MAX_INDEX))
    }

    /// The level that disables the size ceiling.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self(0)
    }

    /// Returns the table index.
    #[must_use]
    pub fn index(self) -> u8 {
        self.0
    }

    /// Returns the byte ceiling, or `None` if disabled.
    #[must_use]
    pub fn ceiling(self) -> Option<usize> {
        match CEILINGS[usize::from(self.0)] {
            0 => None,
            n => Some(n),
        }
    }

    /// Whether a segment of `current_bytes` may absorb an insertion of
    /// `incoming_bytes` of payload.
    ///
    /// An empty segment always accepts. The post-insertion size is
    /// estimated as payload plus entry framing, counted twice: once for
    /// the new entry, once for the prev-length growth of the entry
    /// shifted behind it.
    #[must_use]
    pub fn allows_insert(self, current_bytes: usize, incoming_bytes: usize) -> bool {
        let Some(ceiling) = self.ceiling() else {
            return true;
        };

        if current_bytes == 0 {
            return true;
        }

        let framing = if incoming_bytes <= SMALL_PAYLOAD_MAX {
            SMALL_FRAMING
        } else {
            LARGE_FRAMING
        };

        current_bytes + incoming_bytes + 2 * framing <= ceiling
    }

    /// Whether two segments of the given byte sizes may be merged into one.
    #[must_use]
    pub fn allows_merge(self, a_bytes: usize, b_bytes: usize) -> bool {
        let Some(ceiling) = self.ceiling() else {
            return true;
        };

        (a_bytes + b_bytes).saturating_sub(MERGE_HEADER_SAVINGS) <= ceiling
    }
}

impl Default for FillLevel {
    fn default() -> Self {
        // 8 KiB, a sensible default segment granularity
        Self(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn fill_level_clamps() {
        assert_eq!(FillLevel::MAX_INDEX, FillLevel::new(200).index());
        assert_eq!(Some(65536), FillLevel::new(200).ceiling());
    }

    #[test]
    fn fill_level_zero_always_accepts() {
        let fill = FillLevel::unbounded();
        assert_eq!(None, fill.ceiling());
        assert!(fill.allows_insert(usize::MAX / 2, usize::MAX / 4));
        assert!(fill.allows_merge(usize::MAX / 2, usize::MAX / 4));
    }

    #[test]
    fn empty_segment_always_accepts() {
        let fill = FillLevel::new(1); // 64 B
        assert!(fill.allows_insert(0, 1_000_000));
    }

    #[test]
    fn insert_estimate_includes_double_framing() {
        let fill = FillLevel::new(1); // 64 B

        // Small payloads pay 2x2 bytes of framing: 36 + 24 + 4 == 64
        assert!(fill.allows_insert(36, 24));
        assert!(!fill.allows_insert(37, 24));

        // Payloads above 24 B pay 2x4 bytes: 31 + 25 + 8 == 64
        assert!(fill.allows_insert(31, 25));
        assert!(!fill.allows_insert(32, 25));
    }

    #[test]
    fn merge_reclaims_one_header() {
        let fill = FillLevel::new(1); // 64 B

        assert!(fill.allows_merge(33, 34)); // 67 - 3 == 64
        assert!(!fill.allows_merge(34, 34));
    }
}
