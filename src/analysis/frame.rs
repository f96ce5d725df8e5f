//! Abstract machine state at one program point.

use crate::{
    analysis::{Lattice, MergeOutcome, ValueId},
    Result,
};

/// Locals and operand stack before one instruction.
///
/// A double-width value occupies one stack entry and two local slots; the
/// second slot of a wide local is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Local slots, `None` when undefined
    pub locals: Vec<Option<ValueId>>,
    /// Operand stack, top last
    pub stack: Vec<ValueId>,
}

impl Frame {
    /// Creates a frame with `max_locals` undefined locals and an empty stack.
    #[must_use]
    pub fn new(max_locals: usize) -> Self {
        Self {
            locals: vec![None; max_locals],
            stack: Vec::new(),
        }
    }

    /// The value in local `slot`.
    #[must_use]
    pub fn local(&self, slot: u16) -> Option<ValueId> {
        self.locals.get(usize::from(slot)).copied().flatten()
    }

    /// Writes local `slot`, growing the frame if needed.
    pub fn set_local(&mut self, slot: u16, value: Option<ValueId>) {
        let slot = usize::from(slot);
        if slot >= self.locals.len() {
            self.locals.resize(slot + 1, None);
        }
        self.locals[slot] = value;
    }

    /// Pushes a stack entry.
    pub fn push(&mut self, value: ValueId) {
        self.stack.push(value);
    }

    /// Pops a stack entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on stack underflow.
    pub fn pop(&mut self) -> Result<ValueId> {
        self.stack
            .pop()
            .ok_or_else(|| malformed_error!("Operand stack underflow"))
    }

    /// Pops `count` entries, returned bottom first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on stack underflow.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<ValueId>> {
        if self.stack.len() < count {
            return Err(malformed_error!(
                "Operand stack underflow: need {}, have {}",
                count,
                self.stack.len()
            ));
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    /// Merges `incoming` into this frame. Returns `true` if anything changed.
    ///
    /// Locals that cannot be merged become undefined, stack entries that cannot
    /// be merged make the method malformed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on a stack height or stack type
    /// mismatch and [`crate::Error::RuleConflict`] when merged values are
    /// classified differently.
    pub fn merge(&mut self, incoming: &Frame, lattice: &mut Lattice) -> Result<bool> {
        if self.stack.len() != incoming.stack.len() {
            return Err(malformed_error!(
                "Stack height mismatch at join: {} vs {}",
                self.stack.len(),
                incoming.stack.len()
            ));
        }

        let mut changed = false;
        for (slot, new) in self.stack.iter_mut().zip(&incoming.stack) {
            match lattice.merge(*slot, *new)? {
                MergeOutcome::Unchanged => {}
                MergeOutcome::Replaced(merged) => {
                    *slot = merged;
                    changed = true;
                }
                MergeOutcome::Incompatible => {
                    return Err(malformed_error!(
                        "Incompatible stack entries at join: {} and {}",
                        lattice.value(*slot).ty,
                        lattice.value(*new).ty
                    ));
                }
            }
        }

        if self.locals.len() < incoming.locals.len() {
            self.locals.resize(incoming.locals.len(), None);
        }
        for (index, slot) in self.locals.iter_mut().enumerate() {
            let Some(old) = *slot else {
                continue;
            };
            let Some(new) = incoming.locals.get(index).copied().flatten() else {
                *slot = None;
                changed = true;
                continue;
            };
            match lattice.merge(old, new)? {
                MergeOutcome::Unchanged => {}
                MergeOutcome::Replaced(merged) => {
                    *slot = Some(merged);
                    changed = true;
                }
                MergeOutcome::Incompatible => {
                    *slot = None;
                    changed = true;
                }
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        metadata::{hierarchy::HierarchyTree, typesystem::JvmType},
        rules::RuleId,
        Error,
    };

    fn lattice() -> Lattice {
        let mut tree = HierarchyTree::new();
        tree.add_node("java/lang/Object", None).unwrap();
        Lattice::new(Rc::new(tree))
    }

    #[test]
    fn test_merge_drops_incompatible_locals() {
        let mut lattice = lattice();
        let mut a = Frame::new(3);
        let mut b = Frame::new(3);
        a.set_local(0, Some(lattice.new_value(JvmType::Int)));
        b.set_local(0, Some(lattice.new_value(JvmType::Float)));
        a.set_local(1, Some(lattice.new_value(JvmType::Int)));

        assert!(a.merge(&b, &mut lattice).unwrap());
        assert_eq!(a.local(0), None);
        assert_eq!(a.local(1), None);
        assert!(!a.merge(&b, &mut lattice).unwrap());
    }

    #[test]
    fn test_merge_stack_conflict() {
        let mut lattice = lattice();
        let x = lattice.new_value(JvmType::Long);
        let y = lattice.new_value(JvmType::Long);
        lattice.resolve(x, RuleId(0)).unwrap();
        lattice.resolve(y, RuleId(1)).unwrap();

        let mut a = Frame::default();
        a.push(x);
        let mut b = Frame::default();
        b.push(y);
        assert!(matches!(
            a.merge(&b, &mut lattice),
            Err(Error::RuleConflict { .. })
        ));

        let mut short = Frame::default();
        assert!(short.merge(&a, &mut lattice).is_err());
    }

    #[test]
    fn test_pop_n_order() {
        let mut lattice = lattice();
        let mut frame = Frame::default();
        let values: Vec<_> = (0..3).map(|_| lattice.new_value(JvmType::Int)).collect();
        for v in &values {
            frame.push(*v);
        }
        assert_eq!(frame.pop_n(2).unwrap(), values[1..].to_vec());
        assert!(frame.pop_n(2).is_err());
    }
}
