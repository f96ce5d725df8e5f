//! The value lattice.
//!
//! [`Lattice`] owns every cell, value, call-site check and field slot of one
//! class. Methods of the class are analyzed one after another against the
//! same lattice, so classifications settled while analyzing one method are
//! visible to the next and fields keep a single classification.
//!
//! Classification only ever grows. Whenever a set of cells becomes resolved,
//! the newly classified values are pushed on a worklist and drained:
//!
//! 1. each field the value was read from or written to receives the rule,
//! 2. each pending call-site check the value takes part in is re-evaluated,
//!    and an accepted check resolves the values it declares rules for.
//!
//! Both steps can classify further values, which join the worklist.

use std::rc::Rc;

use crate::{
    analysis::{CellArena, CellId, CheckId, CheckState, PendingCheck, TrackedValue, ValueId},
    metadata::{
        ancestor::AncestorMap,
        hierarchy::HierarchyTree,
        identity::FieldId,
        typesystem::{JvmType, OBJECT},
    },
    rules::{CallSpec, CheckOutcome, RuleId},
    Result,
};

/// Result of merging an incoming value into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The existing value already describes both
    Unchanged,
    /// A new value replaces the existing one
    Replaced(ValueId),
    /// The two values cannot share a slot
    Incompatible,
}

/// Arena of the values of one class and their classifications.
#[derive(Debug, Clone)]
pub struct Lattice {
    cells: CellArena,
    values: Vec<TrackedValue>,
    checks: Vec<PendingCheck>,
    fields: AncestorMap<FieldId, ValueId>,
}

impl Lattice {
    /// Creates an empty lattice resolving inherited fields through `hierarchy`.
    #[must_use]
    pub fn new(hierarchy: Rc<HierarchyTree>) -> Self {
        Self {
            cells: CellArena::new(),
            values: Vec::new(),
            checks: Vec::new(),
            fields: AncestorMap::new(hierarchy),
        }
    }

    /// Allocates an unclassified value with its own cell.
    pub fn new_value(&mut self, ty: JvmType) -> ValueId {
        let id = ValueId::from_raw(self.values.len() as u32);
        let cell = self.cells.alloc();
        self.cells.subscribe(cell, id);
        self.values.push(TrackedValue::new(ty, cell));
        id
    }

    /// The value behind `id`.
    #[must_use]
    pub fn value(&self, id: ValueId) -> &TrackedValue {
        &self.values[id.index()]
    }

    pub(crate) fn value_mut(&mut self, id: ValueId) -> &mut TrackedValue {
        &mut self.values[id.index()]
    }

    /// Number of values allocated so far.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// The rule `id` is classified with.
    #[must_use]
    pub fn rule_of(&self, id: ValueId) -> Option<RuleId> {
        self.cells.rule(self.values[id.index()].cell)
    }

    /// Returns `true` if both values share one cell.
    #[must_use]
    pub fn same_cell(&self, a: ValueId, b: ValueId) -> bool {
        self.root(a) == self.root(b)
    }

    fn root(&self, id: ValueId) -> CellId {
        self.cells.find(self.values[id.index()].cell)
    }

    /// Forces `a` and `b` to end up with the same classification.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuleConflict`] if they are already classified differently,
    /// or if the propagation this triggers runs into a conflict.
    pub fn unify(&mut self, a: ValueId, b: ValueId) -> Result<()> {
        let newly = self
            .cells
            .union(self.values[a.index()].cell, self.values[b.index()].cell)?;
        self.propagate(newly)
    }

    /// Classifies `id` (and everything sharing its cell) with `rule`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuleConflict`] on a contradicting classification.
    pub fn resolve(&mut self, id: ValueId, rule: RuleId) -> Result<()> {
        let newly = self.cells.resolve(self.values[id.index()].cell, rule)?;
        self.propagate(newly)
    }

    /// Registers the persistent slot of a declared field.
    pub fn add_field_slot(&mut self, field: FieldId) -> ValueId {
        if let Some(existing) = self.fields.get(&field) {
            if self.values[existing.index()].ty == field.desc {
                return *existing;
            }
        }
        let slot = self.new_value(field.desc.clone());
        self.values[slot.index()].field_sources.insert(field.clone());
        self.fields.insert(field, slot);
        slot
    }

    /// The slot of `field` or of the inherited field it refers to.
    #[must_use]
    pub fn field_slot(&self, field: &FieldId) -> Option<ValueId> {
        self.fields.get(field).copied()
    }

    /// Every registered field slot.
    pub fn field_slots(&self) -> impl Iterator<Item = (&FieldId, ValueId)> {
        self.fields.iter().map(|(field, slot)| (field, *slot))
    }

    /// Records that `id` was read from or written to `field`, pushing its
    /// classification into the field's slot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuleConflict`] on a contradicting classification.
    pub fn add_field_source(&mut self, id: ValueId, field: FieldId) -> Result<()> {
        if !self.values[id.index()].field_sources.insert(field) {
            return Ok(());
        }
        if self.rule_of(id).is_some() {
            return self.propagate(vec![id]);
        }
        Ok(())
    }

    /// Records a candidate call-site spec and evaluates it right away.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuleConflict`] if accepting the spec contradicts
    /// existing classifications.
    pub fn add_check(
        &mut self,
        spec: CallSpec,
        ret: Option<ValueId>,
        args: Vec<ValueId>,
    ) -> Result<CheckId> {
        let id = CheckId(self.checks.len() as u32);
        let check = PendingCheck::new(spec, ret, args);
        for value in check.values() {
            self.values[value.index()].checks.push(id);
        }
        self.checks.push(check);
        let newly = self.evaluate(id)?;
        self.propagate(newly)?;
        Ok(id)
    }

    /// The check behind `id`.
    #[must_use]
    pub fn check(&self, id: CheckId) -> &PendingCheck {
        &self.checks[id.0 as usize]
    }

    /// Merges `incoming` into `existing` at a control-flow join.
    ///
    /// Both values are unified. The existing value is kept when its producers
    /// already cover the incoming ones and its type does not widen; otherwise
    /// a new value carrying the union of both is created.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuleConflict`] if the values are classified differently.
    pub fn merge(&mut self, existing: ValueId, incoming: ValueId) -> Result<MergeOutcome> {
        if existing == incoming {
            return Ok(MergeOutcome::Unchanged);
        }
        let old = &self.values[existing.index()];
        let new = &self.values[incoming.index()];
        let Some(ty) = common_type(&old.ty, &new.ty) else {
            return Ok(MergeOutcome::Incompatible);
        };
        let covered = new.producers.is_subset(&old.producers) && ty == old.ty;

        self.unify(existing, incoming)?;
        if covered {
            return Ok(MergeOutcome::Unchanged);
        }

        let merged = self.new_value(ty);
        self.unify(merged, existing)?;
        let (old, new) = (&self.values[existing.index()], &self.values[incoming.index()]);
        let producers = old.producers.union(&new.producers).copied().collect();
        let consumers = old.consumers.union(&new.consumers).copied().collect();
        let field_sources = old.field_sources.union(&new.field_sources).cloned().collect();
        let value = &mut self.values[merged.index()];
        value.producers = producers;
        value.consumers = consumers;
        value.field_sources = field_sources;
        Ok(MergeOutcome::Replaced(merged))
    }

    fn propagate(&mut self, mut queue: Vec<ValueId>) -> Result<()> {
        while let Some(id) = queue.pop() {
            let Some(rule) = self.rule_of(id) else {
                continue;
            };

            let slots: Vec<ValueId> = self.values[id.index()]
                .field_sources
                .iter()
                .filter_map(|field| self.fields.get(field).copied())
                .collect();
            for slot in slots {
                let cell = self.values[slot.index()].cell;
                queue.extend(self.cells.resolve(cell, rule)?);
            }

            let checks = self.values[id.index()].checks.clone();
            for check in checks {
                queue.extend(self.evaluate(check)?);
            }
        }
        Ok(())
    }

    /// Re-evaluates a pending check. Returns the values its acceptance classified.
    fn evaluate(&mut self, id: CheckId) -> Result<Vec<ValueId>> {
        let check = &self.checks[id.0 as usize];
        if check.state != CheckState::Pending {
            return Ok(Vec::new());
        }
        let ret = check.ret.and_then(|v| self.rule_of(v));
        let params: Vec<Option<RuleId>> = check.args.iter().map(|v| self.rule_of(*v)).collect();

        match check.spec.check(ret, &params) {
            CheckOutcome::Pending => Ok(Vec::new()),
            CheckOutcome::Reject => {
                log::trace!("{} rejected {}", id, check.spec);
                self.checks[id.0 as usize].state = CheckState::Rejected;
                Ok(Vec::new())
            }
            CheckOutcome::Accept => {
                log::trace!("{} accepted {}", id, check.spec);
                let bindings: Vec<_> = check.bindings().collect();
                self.checks[id.0 as usize].state = CheckState::Accepted;
                let mut newly = Vec::new();
                for (value, rule) in bindings {
                    let cell = self.values[value.index()].cell;
                    newly.extend(self.cells.resolve(cell, rule)?);
                }
                Ok(newly)
            }
        }
    }
}

/// The type two merged values share, `None` if they cannot share a slot.
#[must_use]
pub fn common_type(a: &JvmType, b: &JvmType) -> Option<JvmType> {
    if a == b {
        return Some(a.clone());
    }
    if a.is_reference() && b.is_reference() {
        return Some(JvmType::object(OBJECT));
    }
    if a.is_int_like() && b.is_int_like() {
        return Some(JvmType::Int);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Minimum, Requirement};

    fn lattice() -> Lattice {
        let mut tree = HierarchyTree::new();
        tree.add_node("java/lang/Object", None).unwrap();
        tree.add_node("a/Root", Some("java/lang/Object")).unwrap();
        tree.add_node("a/Mid", Some("a/Root")).unwrap();
        tree.add_node("a/Leaf", Some("a/Mid")).unwrap();
        Lattice::new(Rc::new(tree))
    }

    #[test]
    fn test_merge_keeps_covering_value() {
        let mut lattice = lattice();
        let a = lattice.new_value(JvmType::Long);
        let b = lattice.new_value(JvmType::Long);
        lattice.value_mut(a).producers.extend([1, 2]);
        lattice.value_mut(b).producers.insert(2);

        assert_eq!(lattice.merge(a, b).unwrap(), MergeOutcome::Unchanged);
        assert!(lattice.same_cell(a, b));

        let c = lattice.new_value(JvmType::Long);
        lattice.value_mut(c).producers.insert(7);
        let MergeOutcome::Replaced(m) = lattice.merge(a, c).unwrap() else {
            panic!("expected a merged value");
        };
        assert_eq!(lattice.value(m).producers.iter().copied().collect::<Vec<_>>(), [1, 2, 7]);
        assert!(lattice.same_cell(m, c));
    }

    #[test]
    fn test_merge_incompatible_types() {
        let mut lattice = lattice();
        let a = lattice.new_value(JvmType::Long);
        let b = lattice.new_value(JvmType::Int);
        assert_eq!(lattice.merge(a, b).unwrap(), MergeOutcome::Incompatible);
        let s = lattice.new_value(JvmType::object("java/lang/String"));
        let o = lattice.new_value(JvmType::object("a/Root"));
        let MergeOutcome::Replaced(m) = lattice.merge(s, o).unwrap() else {
            panic!("expected a merged value");
        };
        assert_eq!(lattice.value(m).ty, JvmType::object(OBJECT));
    }

    #[test]
    fn test_field_slot_through_subclass() {
        let mut lattice = lattice();
        let slot = lattice.add_field_slot(FieldId::new("a/Root", "pos", JvmType::Long));
        let via_leaf = FieldId::new("a/Leaf", "pos", JvmType::Long);
        assert_eq!(lattice.field_slot(&via_leaf), Some(slot));

        let value = lattice.new_value(JvmType::Long);
        lattice.resolve(value, RuleId(0)).unwrap();
        lattice.add_field_source(value, via_leaf).unwrap();
        assert_eq!(lattice.rule_of(slot), Some(RuleId(0)));
    }

    #[test]
    fn test_check_accepts_and_binds() {
        let mut lattice = lattice();
        let arg = lattice.new_value(JvmType::Long);
        let ret = lattice.new_value(JvmType::Long);
        let spec = CallSpec {
            method: "s a/Pos#offset (J)J".parse().unwrap(),
            ret: Some(RuleId(0)),
            params: vec![Some(RuleId(0))],
            minimums: Some(vec![Minimum {
                ret: Requirement::Any,
                params: vec![Requirement::Rule(RuleId(0))],
            }]),
            replacement: None,
        };
        let check = lattice.add_check(spec, Some(ret), vec![arg]).unwrap();
        assert_eq!(lattice.check(check).state, CheckState::Pending);
        assert_eq!(lattice.rule_of(ret), None);

        lattice.resolve(arg, RuleId(0)).unwrap();
        assert_eq!(lattice.check(check).state, CheckState::Accepted);
        assert_eq!(lattice.rule_of(ret), Some(RuleId(0)));
    }

    #[test]
    fn test_check_rejection_is_final() {
        let mut lattice = lattice();
        let arg = lattice.new_value(JvmType::Long);
        let spec = CallSpec {
            method: "s a/Pos#use (J)V".parse().unwrap(),
            ret: None,
            params: vec![Some(RuleId(0))],
            minimums: Some(vec![]),
            replacement: None,
        };
        let check = lattice.add_check(spec, None, vec![arg]).unwrap();
        lattice.resolve(arg, RuleId(1)).unwrap();
        assert_eq!(lattice.check(check).state, CheckState::Rejected);
    }
}
