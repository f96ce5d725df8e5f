//! Call-site validity checks.
//!
//! When the interpreter meets a call with registered [`CallSpec`]s it records a
//! [`PendingCheck`] per candidate. The check is subscribed to by every value it
//! mentions and re-evaluated whenever one of them is classified, until it is
//! accepted or rejected. Terminal states are never revisited.

use std::fmt;

use crate::{analysis::ValueId, rules::CallSpec};

/// Index of a check in its [`crate::analysis::Lattice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckId(pub(crate) u32);

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check#{}", self.0)
    }
}

/// Lifecycle of a [`PendingCheck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    /// Still waiting for evidence
    Pending,
    /// The spec applied and its rules were bound
    Accepted,
    /// A classified value contradicted the spec
    Rejected,
}

/// One candidate [`CallSpec`] at one call instruction.
#[derive(Debug, Clone)]
pub struct PendingCheck {
    /// The candidate
    pub spec: CallSpec,
    /// Value returned by the call, if any
    pub ret: Option<ValueId>,
    /// Argument values, receiver first for instance calls
    pub args: Vec<ValueId>,
    /// Current state
    pub state: CheckState,
}

impl PendingCheck {
    pub(crate) fn new(spec: CallSpec, ret: Option<ValueId>, args: Vec<ValueId>) -> Self {
        Self {
            spec,
            ret,
            args,
            state: CheckState::Pending,
        }
    }

    /// Values the check depends on.
    pub fn values(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.ret.iter().copied().chain(self.args.iter().copied())
    }

    /// Pairs of value and the rule the spec declares for it.
    pub fn bindings(&self) -> impl Iterator<Item = (ValueId, crate::rules::RuleId)> + '_ {
        let ret = self.ret.zip(self.spec.ret);
        let args = self
            .args
            .iter()
            .zip(&self.spec.params)
            .filter_map(|(value, rule)| rule.map(|rule| (*value, rule)));
        ret.into_iter().chain(args)
    }
}
