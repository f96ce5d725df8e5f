//! A fixed-capacity bit vector with range operations.
//!
//! Bits are packed 64 per word. Besides the usual point operations the set
//! supports half-open range queries and updates, which is what the variable
//! allocator needs to test and claim a live range in one step.
//!
//! # Example
//!
//! ```rust
//! use typesplit::utils::BitSet;
//!
//! let mut track = BitSet::new(16);
//! assert!(track.is_range_clear(2..8));
//!
//! track.insert_range(2..8);
//! assert!(track.contains(5));
//! assert!(!track.is_range_clear(7..10));
//! assert!(track.is_range_clear(8..16));
//! ```

use std::ops::Range;

/// Occupancy bits over instruction positions.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
    /// Capacity in bits
    len: usize,
}

impl BitSet {
    /// An all-clear set of `capacity` bits.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Capacity in bits.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Marks position `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) {
        assert!(index < self.len, "position {index} past capacity {}", self.len);
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Whether position `index` is marked. Positions past the capacity are not.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.len && (self.words[index / 64] & (1u64 << (index % 64))) != 0
    }

    /// Number of marked positions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no bit in `range` is set. Empty ranges are always clear.
    ///
    /// The range is clamped to the capacity.
    #[must_use]
    pub fn is_range_clear(&self, range: Range<usize>) -> bool {
        let end = range.end.min(self.len);
        if range.start >= end {
            return true;
        }
        Self::masks(range.start, end).all(|(word, mask)| self.words[word] & mask == 0)
    }

    /// Sets every bit in `range` (clamped to the capacity).
    pub fn insert_range(&mut self, range: Range<usize>) {
        let end = range.end.min(self.len);
        if range.start >= end {
            return;
        }
        for (word, mask) in Self::masks(range.start, end) {
            self.words[word] |= mask;
        }
    }

    /// Marked positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &bits)| {
            (0..64)
                .filter(move |bit| bits & (1u64 << bit) != 0)
                .map(move |bit| w * 64 + bit)
        })
    }

    /// Yields `(word index, mask)` pairs covering `[start, end)`; requires `start < end`.
    fn masks(start: usize, end: usize) -> impl Iterator<Item = (usize, u64)> {
        let first = start / 64;
        let last = (end - 1) / 64;
        (first..=last).map(move |word| {
            let lo = if word == first { start % 64 } else { 0 };
            let hi = if word == last { (end - 1) % 64 } else { 63 };
            let upper = if hi == 63 { u64::MAX } else { (1u64 << (hi + 1)) - 1 };
            (word, upper & !((1u64 << lo) - 1))
        })
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut track = BitSet::new(100);
        assert!(track.is_empty());

        for position in [0, 50, 99] {
            track.insert(position);
        }
        assert_eq!(track.count(), 3);
        assert!(track.contains(50));
        assert!(!track.contains(1));
        assert!(!track.contains(1000));
        assert_eq!(format!("{track:?}"), "{0, 50, 99}");
    }

    #[test]
    fn test_bitset_range_within_word() {
        let mut track = BitSet::new(64);
        track.insert_range(3..7);
        assert_eq!(track.iter().collect::<Vec<_>>(), vec![3, 4, 5, 6]);
        assert!(track.is_range_clear(0..3));
        assert!(track.is_range_clear(7..64));
        assert!(!track.is_range_clear(6..7));
    }

    #[test]
    fn test_bitset_range_across_words() {
        let mut track = BitSet::new(200);
        track.insert_range(60..130);
        assert_eq!(track.count(), 70);
        assert!(track.contains(60));
        assert!(track.contains(64));
        assert!(track.contains(129));
        assert!(!track.contains(130));
        assert!(track.is_range_clear(130..200));
        assert!(!track.is_range_clear(0..61));
    }

    #[test]
    fn test_bitset_empty_and_clamped_ranges() {
        let mut track = BitSet::new(10);
        track.insert_range(5..5);
        assert!(track.is_empty());
        assert!(track.is_range_clear(9..9));

        track.insert_range(8..40);
        assert_eq!(track.iter().collect::<Vec<_>>(), vec![8, 9]);
    }
}
