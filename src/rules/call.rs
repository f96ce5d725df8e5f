//! Call-site replacement specifications.
//!
//! A [`CallSpec`] describes how a call to one method changes once some of its
//! arguments or its return value are split: which rule each position must
//! carry, when the specification becomes applicable (its minimums), and the
//! code that replaces the call.
//!
//! Applicability is decided incrementally while inference runs. Every time a
//! participating value gets classified the spec is re-evaluated through
//! [`CallSpec::check`]; the first terminal answer ([`CheckOutcome::Accept`] or
//! [`CheckOutcome::Reject`]) is final.

use std::fmt;

use crate::{
    assembly::Insn,
    metadata::{identity::MethodId, typesystem::JvmType},
    rules::RuleId,
};

/// What a [`Minimum`] demands of one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    /// No constraint
    Any,
    /// The value must not carry a rule
    Unclassified,
    /// The value must be classified with this rule
    Rule(RuleId),
}

impl Requirement {
    /// Returns `true` if a value in state `current` meets this requirement.
    #[must_use]
    pub fn is_met(self, current: Option<RuleId>) -> bool {
        match self {
            Requirement::Any => true,
            Requirement::Unclassified => current.is_none(),
            Requirement::Rule(rule) => current == Some(rule),
        }
    }
}

/// A sufficient condition for a [`CallSpec`] to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minimum {
    /// Requirement on the return value
    pub ret: Requirement,
    /// Requirements on the arguments, receiver first for instance methods
    pub params: Vec<Requirement>,
}

impl Minimum {
    fn is_met(&self, ret: Option<RuleId>, params: &[Option<RuleId>]) -> bool {
        self.ret.is_met(ret)
            && self
                .params
                .iter()
                .zip(params)
                .all(|(req, current)| req.is_met(*current))
    }
}

/// Code substituted for a call.
///
/// Without `indices` the expansion is *direct*: every argument is still on the
/// stack in natural order and the expansions are emitted back to back in place
/// of the call. With `indices` the replacement is a *template*: expansion `e`
/// is preceded by the components listed in `indices[e][param]`, loaded from
/// their generators, which is why template arguments must be removable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Replacement {
    /// One code block per output component
    pub expansions: Vec<Vec<Insn>>,
    /// `indices[expansion][param]` lists the components of `param` loaded before the block
    pub indices: Option<Vec<Vec<Vec<usize>>>>,
    /// Code emitted after every expansion
    pub finalizer: Option<Vec<Insn>>,
    /// `finalizer_indices[param]` lists the components loaded before the finalizer
    pub finalizer_indices: Option<Vec<Vec<usize>>>,
}

impl Replacement {
    /// A direct replacement emitting `code` in place of the call.
    #[must_use]
    pub fn direct(code: Vec<Insn>) -> Self {
        Self {
            expansions: vec![code],
            ..Self::default()
        }
    }

    /// A template replacement.
    #[must_use]
    pub fn template(expansions: Vec<Vec<Insn>>, indices: Vec<Vec<Vec<usize>>>) -> Self {
        Self {
            expansions,
            indices: Some(indices),
            ..Self::default()
        }
    }

    /// Adds a finalizer block.
    #[must_use]
    pub fn with_finalizer(mut self, code: Vec<Insn>, indices: Vec<Vec<usize>>) -> Self {
        self.finalizer = Some(code);
        self.finalizer_indices = Some(indices);
        self
    }

    /// Returns `true` when the template consumes arguments out of stack order.
    #[must_use]
    pub fn changes_parameters(&self) -> bool {
        self.indices.is_some()
    }
}

/// Result of evaluating a [`CallSpec`] against the current classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The spec applies; its declared rules are bound onto the call's values
    Accept,
    /// A classified value contradicts the spec
    Reject,
    /// Not decidable yet
    Pending,
}

/// How one method call is rewritten when its values are split.
#[derive(Debug, Clone)]
pub struct CallSpec {
    /// The method this spec applies to
    pub method: MethodId,
    /// Rule of the return value, `None` when it stays as is
    pub ret: Option<RuleId>,
    /// Rule per argument, receiver first for instance methods
    pub params: Vec<Option<RuleId>>,
    /// Sufficient conditions; `None` accepts as soon as nothing contradicts
    pub minimums: Option<Vec<Minimum>>,
    /// Replacement code; `None` keeps the call with a rewritten descriptor
    pub replacement: Option<Replacement>,
}

impl CallSpec {
    /// Evaluates the spec. `ret` and `params` hold the rule each value carries
    /// right now (`None` if still unclassified).
    ///
    /// A classified value whose rule differs from the declared one rejects the
    /// spec immediately. Otherwise the spec is accepted if it has no minimums
    /// or one of its minimums is met, and stays pending if not.
    #[must_use]
    pub fn check(&self, ret: Option<RuleId>, params: &[Option<RuleId>]) -> CheckOutcome {
        if ret.is_some() && ret != self.ret {
            return CheckOutcome::Reject;
        }
        for (declared, current) in self.params.iter().zip(params) {
            if current.is_some() && current != declared {
                return CheckOutcome::Reject;
            }
        }
        match &self.minimums {
            None => CheckOutcome::Accept,
            Some(minimums) if minimums.iter().any(|m| m.is_met(ret, params)) => {
                CheckOutcome::Accept
            }
            Some(_) => CheckOutcome::Pending,
        }
    }

    /// Returns `true` if any position carries a rule.
    #[must_use]
    pub fn classifies_anything(&self) -> bool {
        self.ret.is_some() || self.params.iter().any(Option::is_some)
    }

    /// Declared types of every argument, receiver included.
    #[must_use]
    pub fn param_types(&self) -> Vec<JvmType> {
        self.method.all_params()
    }
}

impl fmt::Display for CallSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = |rule: &Option<RuleId>| match rule {
            Some(rule) => rule.to_string(),
            None => "-".to_string(),
        };
        write!(f, "{} [{}](", self.method, slot(&self.ret))?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&slot(param))?;
        }
        f.write_str(")")
    }
}
