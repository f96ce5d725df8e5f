//! Deferred call bindings.
//!
//! A call to a method of the same class ties the caller's argument and return
//! values to the callee's parameter and return values. When the callee has
//! not been analyzed yet its values do not exist, so the constraint is parked
//! here under the callee's identity and applied once its analysis is done.

use rustc_hash::FxHashMap;

use crate::{
    analysis::{Lattice, MethodAnalysis, ValueId},
    metadata::identity::MethodId,
    Result,
};

/// One call site waiting for its callee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredCallBinding {
    /// `(callee parameter position, caller value)`, receiver at position 0
    pub args: Vec<(usize, ValueId)>,
    /// Value the call returns in the caller
    pub ret: Option<ValueId>,
}

impl DeferredCallBinding {
    /// Unifies the caller values with `params` and `ret` of the callee.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuleConflict`] if caller and callee disagree.
    pub fn bind(&self, lattice: &mut Lattice, params: &[ValueId], ret: Option<ValueId>) -> Result<()> {
        for (position, value) in &self.args {
            if let Some(param) = params.get(*position) {
                lattice.unify(*value, *param)?;
            }
        }
        if let (Some(value), Some(callee_ret)) = (self.ret, ret) {
            lattice.unify(value, callee_ret)?;
        }
        Ok(())
    }

    /// Binds against a finished analysis.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuleConflict`] if caller and callee disagree.
    pub fn apply(&self, lattice: &mut Lattice, callee: &MethodAnalysis) -> Result<()> {
        self.bind(lattice, &callee.params, callee.ret)
    }
}

/// Bindings keyed by the callee they wait for.
#[derive(Debug, Clone, Default)]
pub struct DeferredBindings {
    pending: FxHashMap<MethodId, Vec<DeferredCallBinding>>,
}

impl DeferredBindings {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `binding` until `callee` is analyzed.
    pub fn queue(&mut self, callee: MethodId, binding: DeferredCallBinding) {
        self.pending.entry(callee).or_default().push(binding);
    }

    /// Removes and returns everything waiting for `callee`.
    pub fn take(&mut self, callee: &MethodId) -> Vec<DeferredCallBinding> {
        self.pending.remove(callee).unwrap_or_default()
    }

    /// Number of callees with waiting bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        metadata::{hierarchy::HierarchyTree, typesystem::JvmType},
        rules::RuleId,
    };

    #[test]
    fn test_queue_and_apply() {
        let mut tree = HierarchyTree::new();
        tree.add_node("java/lang/Object", None).unwrap();
        let mut lattice = Lattice::new(Rc::new(tree));

        let caller_arg = lattice.new_value(JvmType::Long);
        let callee_param = lattice.new_value(JvmType::Long);
        lattice.resolve(callee_param, RuleId(2)).unwrap();

        let callee: MethodId = "s a/B#sink (J)V".parse().unwrap();
        let mut deferred = DeferredBindings::new();
        deferred.queue(
            callee.clone(),
            DeferredCallBinding {
                args: vec![(0, caller_arg)],
                ret: None,
            },
        );
        assert_eq!(deferred.len(), 1);

        for binding in deferred.take(&callee) {
            binding.bind(&mut lattice, &[callee_param], None).unwrap();
        }
        assert!(deferred.is_empty());
        assert_eq!(lattice.rule_of(caller_arg), Some(RuleId(2)));
        assert!(deferred.take(&callee).is_empty());
    }
}
