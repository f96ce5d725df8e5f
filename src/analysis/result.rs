//! Per-method analysis output.

use std::fmt::Write;

use crate::{
    analysis::{Frame, Lattice, ValueId},
    metadata::identity::MethodId,
    rules::{RuleId, RuleRegistry},
};

/// What the analyzer learned about one method.
///
/// Frames, inputs and outputs are indexed by instruction. Classifications are
/// read from the class [`Lattice`], which keeps growing while later methods
/// are analyzed; [`MethodAnalysis::finalize`] freezes the signature view.
#[derive(Debug, Clone)]
pub struct MethodAnalysis {
    /// The analyzed method
    pub method: MethodId,
    /// State before each instruction, `None` when unreachable
    pub frames: Vec<Option<Frame>>,
    /// Stack values each instruction consumed, bottom first
    pub inputs: Vec<Vec<ValueId>>,
    /// Values each instruction produced (pushed values, stored locals, copies)
    pub outputs: Vec<Vec<ValueId>>,
    /// Entry values of the parameters, receiver first for instance methods
    pub params: Vec<ValueId>,
    /// The value every return instruction returns, `None` for `void`
    pub ret: Option<ValueId>,
    param_rules: Vec<Option<RuleId>>,
    ret_rule: Option<RuleId>,
}

impl MethodAnalysis {
    pub(crate) fn new(
        method: MethodId,
        frames: Vec<Option<Frame>>,
        inputs: Vec<Vec<ValueId>>,
        outputs: Vec<Vec<ValueId>>,
        params: Vec<ValueId>,
        ret: Option<ValueId>,
    ) -> Self {
        let param_rules = vec![None; params.len()];
        Self {
            method,
            frames,
            inputs,
            outputs,
            params,
            ret,
            param_rules,
            ret_rule: None,
        }
    }

    /// Returns `true` for methods analyzed from their descriptor only.
    #[must_use]
    pub fn is_descriptor_only(&self) -> bool {
        self.frames.is_empty()
    }

    /// The frame before instruction `index`.
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index).and_then(Option::as_ref)
    }

    /// Returns `true` if instruction `index` can execute.
    #[must_use]
    pub fn is_reachable(&self, index: usize) -> bool {
        self.frame(index).is_some()
    }

    /// Freezes the parameter and return classifications.
    pub fn finalize(&mut self, lattice: &Lattice) {
        self.param_rules = self.params.iter().map(|p| lattice.rule_of(*p)).collect();
        self.ret_rule = self.ret.and_then(|r| lattice.rule_of(r));
    }

    /// Rule per parameter position, receiver first. Valid after [`MethodAnalysis::finalize`].
    #[must_use]
    pub fn param_rules(&self) -> &[Option<RuleId>] {
        &self.param_rules
    }

    /// Rule of the return value. Valid after [`MethodAnalysis::finalize`].
    #[must_use]
    pub fn ret_rule(&self) -> Option<RuleId> {
        self.ret_rule
    }

    /// Returns `true` if the signature carries any rule.
    #[must_use]
    pub fn signature_classified(&self) -> bool {
        self.ret_rule.is_some() || self.param_rules.iter().any(Option::is_some)
    }

    /// Returns `true` if any value of the method is classified.
    #[must_use]
    pub fn has_classified_values(&self, lattice: &Lattice) -> bool {
        let classified = |v: &ValueId| lattice.rule_of(*v).is_some();
        self.params.iter().any(classified)
            || self.ret.iter().any(classified)
            || self.outputs.iter().flatten().any(classified)
            || self.inputs.iter().flatten().any(classified)
    }

    /// One line describing the signature classification.
    #[must_use]
    pub fn describe(&self, registry: &RuleRegistry) -> String {
        let name = |rule: Option<RuleId>| match rule {
            Some(rule) => registry.rule(rule).id().to_string(),
            None => "-".to_string(),
        };
        let mut out = format!("{} -> {} (", self.method, name(self.ret_rule));
        for (i, rule) in self.param_rules.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}", name(*rule));
        }
        out.push(')');
        out
    }
}
