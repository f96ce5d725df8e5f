//! Greedy interval allocation of scratch local slots.
//!
//! Values that have to be kept out of the operand stack are parked in fresh
//! locals above every slot the rewritten method already uses. Each slot above
//! that baseline is a *track*: a [`BitSet`] over instruction indices marking
//! where the slot holds a live value. A request for the live range
//! `[min, max)` takes the lowest track (or pair of adjacent tracks for wide
//! components) that is free over the whole range.

use crate::{metadata::typesystem::JvmType, utils::BitSet};

/// Scratch slot allocator for one method.
#[derive(Debug, Clone)]
pub struct VariableAllocator {
    baseline: usize,
    positions: usize,
    tracks: Vec<BitSet>,
}

impl VariableAllocator {
    /// Creates an allocator for a method of `positions` instructions whose
    /// rewritten frames use at most `baseline` slots.
    #[must_use]
    pub fn new(baseline: usize, positions: usize) -> Self {
        Self {
            baseline,
            positions: positions + 1,
            tracks: Vec::new(),
        }
    }

    /// Reserves a slot for a value of type `ty` live over `[min, max)` and
    /// returns its local index.
    ///
    /// An empty range still occupies the slot at `min`.
    pub fn allocate(&mut self, min: usize, max: usize, ty: &JvmType) -> u16 {
        let width = ty.size().max(1);
        let range = min..max.max(min + 1);

        let mut track = 0;
        loop {
            while self.tracks.len() < track + width {
                self.tracks.push(BitSet::new(self.positions));
            }
            let free = self.tracks[track..track + width]
                .iter()
                .all(|t| t.is_range_clear(range.clone()));
            if free {
                for t in &mut self.tracks[track..track + width] {
                    t.insert_range(range.clone());
                }
                return u16::try_from(self.baseline + track).unwrap_or(u16::MAX);
            }
            track += 1;
        }
    }

    /// First slot handed out by this allocator.
    #[must_use]
    pub const fn baseline(&self) -> usize {
        self.baseline
    }

    /// Slots in use including the baseline.
    #[must_use]
    pub fn max_slots(&self) -> usize {
        self.baseline + self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_disjoint_ranges() {
        let mut allocator = VariableAllocator::new(0, 10);
        let a = allocator.allocate(0, 5, &JvmType::Int);
        let b = allocator.allocate(5, 10, &JvmType::Int);
        let c = allocator.allocate(2, 8, &JvmType::Long);
        assert_eq!(a, 0);
        assert_eq!(b, 0);
        assert!(c >= 1);
        assert_eq!(allocator.max_slots(), 3);
    }

    #[test]
    fn test_offsets_by_baseline() {
        let mut allocator = VariableAllocator::new(4, 6);
        assert_eq!(allocator.allocate(1, 3, &JvmType::Int), 4);
        assert_eq!(allocator.allocate(2, 4, &JvmType::object("a/B")), 5);
        assert_eq!(allocator.allocate(3, 3, &JvmType::Int), 4);
        assert_eq!(allocator.allocate(2, 3, &JvmType::Int), 6);
    }
}
