//! Per-method rewrite state.
//!
//! A [`RewriteContext`] is built once per transformed method from its frozen
//! analysis. It answers the questions every later stage asks (which rule a
//! value carries, which slot an original local moves to, which call-site
//! specification was accepted) and collects the edits the emitter synthesis
//! stage schedules around individual instructions.

use rustc_hash::FxHashMap;

use crate::{
    analysis::{Lattice, MethodAnalysis, ValueId},
    assembly::{Insn, Opcode},
    compiler::{emitters::Generator, VariableAllocator},
    metadata::{
        identity::{FieldId, MethodId},
        method::MethodBody,
        typesystem::{JvmType, MethodDescriptor},
    },
    rules::{CallSpec, CheckOutcome, RuleId, RuleRegistry, TransformRule},
    Error, Result,
};

/// How one method of the class looks after transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPlan {
    /// The method as declared
    pub original: MethodId,
    /// Name of the rewritten method
    pub name: String,
    /// Descriptor of the rewritten method
    pub desc: MethodDescriptor,
    /// Whether any value of the method is classified
    pub transformed: bool,
    /// Rule per parameter position, receiver first
    pub param_rules: Vec<Option<RuleId>>,
    /// Rule of the return value
    pub ret_rule: Option<RuleId>,
    /// The split return value is rebuilt into the original type before
    /// returning, and callers unpack it again.
    pub packs_return: bool,
}

impl MethodPlan {
    /// Returns `true` if the rewritten method kept the descriptor and got a new name.
    #[must_use]
    pub fn is_renamed(&self) -> bool {
        self.name != self.original.name
    }

    /// Returns `true` if the rewritten method has a different descriptor.
    #[must_use]
    pub fn changes_descriptor(&self) -> bool {
        self.desc != self.original.desc
    }

    /// Identity of the rewritten method.
    #[must_use]
    pub fn target(&self) -> MethodId {
        MethodId::new(
            self.original.kind,
            self.original.owner.clone(),
            self.name.clone(),
            self.desc.clone(),
        )
    }
}

/// Class-wide, read-only view shared by the rewrite of every method.
#[derive(Clone, Copy)]
pub(crate) struct ClassEnv<'a> {
    pub owner: &'a str,
    pub registry: &'a RuleRegistry,
    pub lattice: &'a Lattice,
    pub plans: &'a FxHashMap<MethodId, MethodPlan>,
    /// Retyped fields and the component type they hold
    pub retyped: &'a FxHashMap<FieldId, JvmType>,
    /// Retyped fields are declared with their component type instead of `Object`
    pub duplicate: bool,
}

impl<'a> ClassEnv<'a> {
    pub fn rule(&self, value: ValueId) -> Option<&'a TransformRule> {
        self.lattice.rule_of(value).map(|id| self.registry.rule(id))
    }

    /// Component types a value is represented by after the rewrite.
    pub fn shape(&self, value: ValueId) -> Vec<JvmType> {
        match self.rule(value) {
            Some(rule) => rule.components().to_vec(),
            None => vec![self.lattice.value(value).ty.clone()],
        }
    }

    /// Returns `true` when the value no longer fits where the original did.
    pub fn changes_shape(&self, value: ValueId) -> bool {
        match self.rule(value) {
            Some(rule) => {
                rule.component_count() != 1
                    || rule.components()[0].erased() != self.lattice.value(value).ty.erased()
            }
            None => false,
        }
    }

    /// Local slots the value occupies after the rewrite.
    pub fn width(&self, value: ValueId) -> usize {
        match self.rule(value) {
            Some(rule) => rule.slot_size(),
            None => self.lattice.value(value).size(),
        }
    }

    /// Expands `types` (one per value) into the rewritten parameter list.
    pub fn expand(&self, values: &[ValueId], declared: &[JvmType]) -> Vec<JvmType> {
        values
            .iter()
            .zip(declared)
            .flat_map(|(value, ty)| match self.rule(*value) {
                Some(rule) => rule.components().to_vec(),
                None => vec![ty.clone()],
            })
            .collect()
    }
}

/// Remapped slot layout of one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SlotTable {
    slots: Vec<u16>,
    end: usize,
    len: usize,
}

impl SlotTable {
    fn build(env: &ClassEnv<'_>, locals: &[Option<ValueId>]) -> Self {
        let mut slots = vec![0u16; locals.len()];
        let mut cursor = 0usize;
        let mut j = 0;
        while j < locals.len() {
            slots[j] = to_slot(cursor);
            match locals[j] {
                Some(value) => {
                    let wide = env.lattice.value(value).size() == 2;
                    cursor += env.width(value);
                    if wide && j + 1 < locals.len() {
                        slots[j + 1] = to_slot(cursor.saturating_sub(1));
                        j += 1;
                    }
                }
                None => cursor += 1,
            }
            j += 1;
        }
        Self {
            slots,
            end: cursor,
            len: locals.len(),
        }
    }

    /// New index of original slot `var`; slots past the frame continue linearly.
    pub fn get(&self, var: u16) -> u16 {
        let var = usize::from(var);
        match self.slots.get(var) {
            Some(slot) => *slot,
            None => to_slot(self.end + (var - self.len)),
        }
    }

    /// Slots the frame occupies after the rewrite.
    pub const fn end(&self) -> usize {
        self.end
    }
}

/// The array pseudo method instruction `index` stands for, on the array
/// type the analysis saw.
fn array_callee(insn: &Insn, analysis: &MethodAnalysis, index: usize, lattice: &Lattice) -> Option<MethodId> {
    let opcode = insn.opcode().filter(|opcode| opcode.is_array_op())?;
    let array = match opcode {
        Opcode::NEWARRAY | Opcode::ANEWARRAY => analysis.outputs[index].first(),
        _ => analysis.inputs[index].first(),
    }?;
    MethodId::array_op(opcode, &lattice.value(*array).ty)
}

fn to_slot(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(u16::MAX)
}

/// Mutable state of one method rewrite.
pub struct RewriteContext<'a> {
    pub(crate) env: ClassEnv<'a>,
    pub(crate) method: &'a MethodBody,
    pub(crate) analysis: &'a MethodAnalysis,
    pub(crate) name: String,
    tables: Vec<Option<SlotTable>>,
    pub(crate) accepted: Vec<Option<&'a CallSpec>>,
    /// Producers whose value no longer stays on the stack
    pub(crate) removed: Vec<bool>,
    /// Removed producers dropped from the output entirely
    pub(crate) deleted: Vec<bool>,
    pub(crate) before: Vec<Vec<Insn>>,
    pub(crate) after: Vec<Vec<Insn>>,
    /// Generators by producer index
    pub(crate) generators: FxHashMap<usize, Generator>,
    pub(crate) allocator: VariableAllocator,
}

impl<'a> RewriteContext<'a> {
    pub(crate) fn new(env: ClassEnv<'a>, method: &'a MethodBody, analysis: &'a MethodAnalysis) -> Result<Self> {
        let count = method.instructions.len();
        let name = analysis.method.to_string();

        let mut tables = Vec::with_capacity(count);
        let mut baseline = method.arg_slots();
        for index in 0..count {
            let table = analysis
                .frame(index)
                .map(|frame| SlotTable::build(&env, &frame.locals));
            if let Some(table) = &table {
                baseline = baseline.max(table.end());
            }
            tables.push(table);
        }

        let mut accepted = vec![None; count];
        for (index, insn) in method.instructions.iter().enumerate() {
            if !analysis.is_reachable(index) {
                continue;
            }
            let callee = MethodId::from_insn(insn)
                .or_else(|| array_callee(insn, analysis, index, env.lattice));
            if let Some(callee) = callee {
                let ret = match callee.desc.ret() {
                    JvmType::Void => None,
                    _ => analysis.outputs[index].first().copied(),
                };
                let ret_rule = ret.and_then(|v| env.lattice.rule_of(v));
                let arg_rules: Vec<_> = analysis.inputs[index]
                    .iter()
                    .map(|v| env.lattice.rule_of(*v))
                    .collect();
                accepted[index] = env
                    .registry
                    .call_specs(&callee)
                    .iter()
                    .find(|spec| spec.check(ret_rule, &arg_rules) == CheckOutcome::Accept);
            }
        }

        let mut context = Self {
            env,
            method,
            analysis,
            name,
            tables,
            accepted,
            removed: vec![false; count],
            deleted: vec![false; count],
            before: vec![Vec::new(); count],
            after: vec![Vec::new(); count],
            generators: FxHashMap::default(),
            allocator: VariableAllocator::new(baseline, count),
        };
        let store_end = context.max_store_extent()?;
        context.allocator = VariableAllocator::new(baseline.max(store_end), count);
        Ok(context)
    }

    fn max_store_extent(&self) -> Result<usize> {
        let mut end = 0;
        for (index, insn) in self.method.instructions.iter().enumerate() {
            if let Insn::Var { opcode, var } = insn {
                if opcode.is_var_store() && self.analysis.is_reachable(index) {
                    end = end.max(self.store_table(index, *var)?.end());
                }
            }
        }
        Ok(end)
    }

    /// Layout before instruction `index`.
    pub(crate) fn table(&self, index: usize) -> Result<&SlotTable> {
        self.tables
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| malformed_error!("No frame at instruction {} of {}", index, self.name))
    }

    /// Layout right after the store at `index` wrote `var`.
    pub(crate) fn store_table(&self, index: usize, var: u16) -> Result<SlotTable> {
        let frame = self
            .analysis
            .frame(index)
            .ok_or_else(|| malformed_error!("No frame at instruction {} of {}", index, self.name))?;
        let stored = self.stored_value(index)?;
        let lattice = self.env.lattice;

        let mut locals = frame.locals.clone();
        let slot = usize::from(var);
        let needed = slot + lattice.value(stored).size();
        if locals.len() < needed {
            locals.resize(needed, None);
        }
        locals[slot] = Some(stored);
        if lattice.value(stored).size() == 2 {
            locals[slot + 1] = None;
        }
        if slot > 0 {
            if let Some(previous) = locals[slot - 1] {
                if lattice.value(previous).size() == 2 {
                    locals[slot - 1] = None;
                }
            }
        }
        Ok(SlotTable::build(&self.env, &locals))
    }

    fn stored_value(&self, index: usize) -> Result<ValueId> {
        self.analysis.outputs[index]
            .first()
            .copied()
            .ok_or_else(|| malformed_error!("Store at {} of {} produced no value", index, self.name))
    }

    /// Value held by local `var` before instruction `index`.
    pub(crate) fn local(&self, index: usize, var: u16) -> Result<ValueId> {
        self.analysis
            .frame(index)
            .and_then(|frame| frame.local(var))
            .ok_or_else(|| malformed_error!("Local {} undefined at {} of {}", var, index, self.name))
    }

    /// The single value instruction `index` pushes.
    pub(crate) fn output(&self, index: usize) -> Result<ValueId> {
        self.analysis.outputs[index]
            .first()
            .copied()
            .ok_or_else(|| malformed_error!("Instruction {} of {} produced no value", index, self.name))
    }

    pub(crate) fn inputs(&self, index: usize) -> &'a [ValueId] {
        &self.analysis.inputs[index]
    }

    /// Returns whether `value`'s producers were removed, failing if only some were.
    pub(crate) fn is_removed(&self, value: ValueId, consumer: usize) -> Result<bool> {
        let producers = &self.env.lattice.value(value).producers;
        if producers.is_empty() {
            return Ok(false);
        }
        let removed = producers.iter().filter(|p| self.removed[**p]).count();
        if removed == 0 {
            Ok(false)
        } else if removed == producers.len() {
            Ok(true)
        } else {
            Err(Error::MixedRemoval { index: consumer })
        }
    }

    /// Marks every producer of `value` removed; returns `true` if anything changed.
    pub(crate) fn mark_removed(&mut self, value: ValueId) -> bool {
        let mut changed = false;
        for producer in &self.env.lattice.value(value).producers {
            changed |= !self.removed[*producer];
            self.removed[*producer] = true;
        }
        changed
    }

    pub(crate) fn generator(&self, value: ValueId) -> Result<&Generator> {
        self.env
            .lattice
            .value(value)
            .first_producer()
            .and_then(|p| self.generators.get(&p))
            .ok_or_else(|| malformed_error!("No generator for {} in {}", value, self.name))
    }

    /// Checks that every local read sees the slot its producing stores wrote.
    pub(crate) fn verify_layout(&self) -> Result<()> {
        let entry = self.table(0)?;
        for (index, insn) in self.method.instructions.iter().enumerate() {
            let var = match insn {
                Insn::Var { opcode, var } if opcode.is_var_load() => *var,
                Insn::Iinc { var, .. } => *var,
                _ => continue,
            };
            if !self.analysis.is_reachable(index) {
                continue;
            }
            let slot = self.table(index)?.get(var);
            let local = self.local(index, var)?;
            let layout_error = || Error::VariableLayout {
                method: self.name.clone(),
                var,
                index,
            };

            if self.analysis.params.contains(&local) && entry.get(var) != slot {
                return Err(layout_error());
            }
            for producer in &self.env.lattice.value(local).producers {
                let written = match &self.method.instructions[*producer] {
                    Insn::Var { opcode, var: stored } if opcode.is_var_store() && *stored == var => {
                        self.store_table(*producer, var)?.get(var)
                    }
                    Insn::Iinc { var: incremented, .. } if *incremented == var => {
                        self.table(*producer)?.get(var)
                    }
                    _ => continue,
                };
                if written != slot {
                    return Err(layout_error());
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if an instruction strictly between `from` and `to` writes `var`.
    pub(crate) fn written_between(&self, var: u16, from: usize, to: usize) -> bool {
        self.method.instructions[from + 1..to.max(from + 1)]
            .iter()
            .any(|insn| match insn {
                Insn::Var { opcode, var: v } => opcode.is_var_store() && *v == var,
                Insn::Iinc { var: v, .. } => *v == var,
                _ => false,
            })
    }

    pub(crate) fn unsupported(&self, message: impl std::fmt::Display) -> Error {
        unsupported_error!(self.name, "{}", message)
    }
}
