//! Supporting data structures.

mod bitset;

pub use bitset::BitSet;
