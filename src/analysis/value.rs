//! Tracked values.

use std::{collections::BTreeSet, fmt};

use rustc_hash::FxHashSet;

use crate::{
    analysis::{CellId, CheckId},
    metadata::{identity::FieldId, typesystem::JvmType},
};

/// Index of a value in its [`crate::analysis::Lattice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One abstract value of a local slot or stack entry.
///
/// Producers and consumers are instruction indices of the method the value
/// belongs to. Parameters and caught exceptions have no producer.
#[derive(Debug, Clone)]
pub struct TrackedValue {
    /// Static type
    pub ty: JvmType,
    /// Classification cell, possibly shared with other values
    pub cell: CellId,
    /// Instructions that push or store this value
    pub producers: BTreeSet<usize>,
    /// Instructions that pop or read this value
    pub consumers: BTreeSet<usize>,
    /// Fields this value was read from or written to
    pub field_sources: FxHashSet<FieldId>,
    /// Call-site checks this value takes part in
    pub checks: Vec<CheckId>,
}

impl TrackedValue {
    pub(crate) fn new(ty: JvmType, cell: CellId) -> Self {
        Self {
            ty,
            cell,
            producers: BTreeSet::new(),
            consumers: BTreeSet::new(),
            field_sources: FxHashSet::default(),
            checks: Vec::new(),
        }
    }

    /// Slot width of the untransformed value.
    #[must_use]
    pub fn size(&self) -> usize {
        self.ty.size()
    }

    /// First producing instruction.
    #[must_use]
    pub fn first_producer(&self) -> Option<usize> {
        self.producers.first().copied()
    }

    /// Last consuming instruction.
    #[must_use]
    pub fn last_consumer(&self) -> Option<usize> {
        self.consumers.last().copied()
    }
}
