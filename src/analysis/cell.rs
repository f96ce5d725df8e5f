//! Rule cells.
//!
//! A [`RuleCell`] holds at most one resolved rule for every value that aliases
//! it. Cells live in a [`CellArena`] and form a union-find forest: unifying two
//! cells links one root below the other and moves its subscribers across.
//! Resolution is one-shot, a root that holds a rule can only ever be asked for
//! that same rule again.

use crate::{analysis::ValueId, rules::RuleId, Error, Result};

/// Index of a cell in its [`CellArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u32);

impl CellId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A shared classification slot.
#[derive(Debug, Clone, Default)]
pub struct RuleCell {
    parent: Option<CellId>,
    rule: Option<RuleId>,
    subscribers: Vec<ValueId>,
}

impl RuleCell {
    /// The resolved rule, meaningful on roots only.
    #[must_use]
    pub fn rule(&self) -> Option<RuleId> {
        self.rule
    }

    /// Values sharing this cell, meaningful on roots only.
    #[must_use]
    pub fn subscribers(&self) -> &[ValueId] {
        &self.subscribers
    }
}

/// Storage for every [`RuleCell`] of one analysis run.
#[derive(Debug, Clone, Default)]
pub struct CellArena {
    cells: Vec<RuleCell>,
}

impl CellArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh unresolved cell.
    pub fn alloc(&mut self) -> CellId {
        let id = CellId(self.cells.len() as u32);
        self.cells.push(RuleCell::default());
        id
    }

    /// Number of allocated cells, linked ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if no cell was allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Representative of `cell`'s set.
    #[must_use]
    pub fn find(&self, mut cell: CellId) -> CellId {
        while let Some(parent) = self.cells[cell.index()].parent {
            cell = parent;
        }
        cell
    }

    /// The rule `cell`'s set resolved to.
    #[must_use]
    pub fn rule(&self, cell: CellId) -> Option<RuleId> {
        self.cells[self.find(cell).index()].rule
    }

    /// The root cell of `cell`'s set.
    #[must_use]
    pub fn root(&self, cell: CellId) -> &RuleCell {
        &self.cells[self.find(cell).index()]
    }

    /// Adds `value` to the subscribers of `cell`'s set.
    pub fn subscribe(&mut self, cell: CellId, value: ValueId) {
        let root = self.find(cell);
        self.cells[root.index()].subscribers.push(value);
    }

    /// Resolves `cell`'s set to `rule`.
    ///
    /// Returns the subscribers that just became classified, empty if the set
    /// already held `rule`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleConflict`] if the set holds a different rule.
    pub fn resolve(&mut self, cell: CellId, rule: RuleId) -> Result<Vec<ValueId>> {
        let root = self.find(cell);
        let slot = &mut self.cells[root.index()];
        match slot.rule {
            Some(existing) if existing == rule => Ok(Vec::new()),
            Some(existing) => Err(conflict(existing, rule)),
            None => {
                slot.rule = Some(rule);
                Ok(slot.subscribers.clone())
            }
        }
    }

    /// Merges the sets of `a` and `b`.
    ///
    /// Returns the subscribers that just became classified: those of an
    /// unresolved set joined with a resolved one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuleConflict`] if both sets are resolved to different rules.
    pub fn union(&mut self, a: CellId, b: CellId) -> Result<Vec<ValueId>> {
        let a = self.find(a);
        let b = self.find(b);
        if a == b {
            return Ok(Vec::new());
        }

        let (winner, loser) = match (self.cells[a.index()].rule, self.cells[b.index()].rule) {
            (Some(x), Some(y)) if x != y => return Err(conflict(x, y)),
            (None, Some(_)) => (b, a),
            _ => (a, b),
        };

        let newly_resolved = self.cells[winner.index()].rule.is_some()
            && self.cells[loser.index()].rule.is_none();
        let moved = std::mem::take(&mut self.cells[loser.index()].subscribers);
        self.cells[loser.index()].parent = Some(winner);
        self.cells[winner.index()].subscribers.extend_from_slice(&moved);

        Ok(if newly_resolved { moved } else { Vec::new() })
    }
}

fn conflict(existing: RuleId, requested: RuleId) -> Error {
    Error::RuleConflict {
        existing: existing.to_string(),
        requested: requested.to_string(),
    }
}
