//! Fixed-point abstract interpretation of one method.
//!
//! The analyzer runs a forward worklist over instruction indices. The frame
//! stored for an instruction is the state before it; interpreting the
//! instruction yields the state flowing to its successors and exception
//! handlers, where it is merged into whatever state is already there. An
//! instruction is revisited whenever its input frame changes.
//!
//! # Memoization
//!
//! Values produced by an instruction, call-site checks and call bindings are
//! created on the first visit only. Later visits reuse the same value ids, so
//! repeated passes over a loop body do not grow the lattice and the analysis
//! terminates once merges stop widening producer sets.
//!
//! # Unification
//!
//! Instructions that copy a value without changing it (loads, stores, stack
//! duplication, casts, returns) unify the copy with the original. Binary
//! comparisons unify both operands. Field accesses unify with the field slot
//! and same-class calls with the callee's parameters and return value.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{
        interpreter, DeferredBindings, DeferredCallBinding, Frame, Lattice, MethodAnalysis,
        ValueId,
    },
    assembly::{Insn, LabelId, Opcode},
    metadata::{
        constant::{BsmArg, Handle},
        identity::{CallKind, FieldId, MethodId},
        method::MethodBody,
        typesystem::{JvmType, MethodDescriptor},
    },
    rules::{RuleId, RuleRegistry},
    Result,
};

/// Class-wide context shared by the analyzers of one class.
#[derive(Debug, Clone, Copy)]
pub struct ClassScope<'a> {
    /// Internal name of the analyzed class
    pub owner: &'a str,
    /// Methods declared by the class
    pub declared: &'a FxHashSet<MethodId>,
    /// Methods analyzed so far
    pub analyzed: &'a FxHashMap<MethodId, MethodAnalysis>,
    /// Rules and call specifications
    pub registry: &'a RuleRegistry,
}

impl ClassScope<'_> {
    /// Returns `true` if `method` is a declared, analyzable method of this class.
    #[must_use]
    pub fn is_local(&self, method: &MethodId) -> bool {
        method.owner == self.owner && !method.name.starts_with('<') && self.declared.contains(method)
    }
}

#[derive(Debug, Clone)]
struct Handler {
    start: usize,
    end: usize,
    target: usize,
    catch_type: JvmType,
}

/// Abstract interpreter for one method.
pub struct Analyzer<'a> {
    scope: ClassScope<'a>,
    method: &'a MethodBody,
    id: MethodId,
    lattice: &'a mut Lattice,
    deferred: &'a mut DeferredBindings,
    labels: FxHashMap<LabelId, usize>,
    handlers: Vec<Handler>,
    frames: Vec<Option<Frame>>,
    inputs: Vec<Vec<ValueId>>,
    outputs: Vec<Option<Vec<ValueId>>>,
    exceptions: FxHashMap<usize, ValueId>,
    worklist: VecDeque<usize>,
    in_worklist: Vec<bool>,
    params: Vec<ValueId>,
    param_slots: FxHashMap<u16, usize>,
    ret: Option<ValueId>,
    hints: FxHashMap<u16, RuleId>,
    iterations: usize,
}

impl<'a> Analyzer<'a> {
    /// Creates an analyzer for `method` of `scope.owner`.
    #[must_use]
    pub fn new(
        scope: ClassScope<'a>,
        method: &'a MethodBody,
        lattice: &'a mut Lattice,
        deferred: &'a mut DeferredBindings,
    ) -> Self {
        let id = MethodId::of_method(scope.owner, method);
        let hints = scope
            .registry
            .type_hints(scope.owner)
            .and_then(|hints| hints.get(&id))
            .cloned()
            .unwrap_or_default();
        let count = method.instructions.len();
        Self {
            scope,
            method,
            id,
            lattice,
            deferred,
            labels: FxHashMap::default(),
            handlers: Vec::new(),
            frames: vec![None; count],
            inputs: vec![Vec::new(); count],
            outputs: vec![None; count],
            exceptions: FxHashMap::default(),
            worklist: VecDeque::new(),
            in_worklist: vec![false; count],
            params: Vec::new(),
            param_slots: FxHashMap::default(),
            ret: None,
            hints,
            iterations: 0,
        }
    }

    /// Runs the analysis to its fixed point.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unsupported`] for native methods,
    /// [`crate::Error::UnsupportedInstruction`] for code the interpreter cannot
    /// model, [`crate::Error::Malformed`] for inconsistent code and
    /// [`crate::Error::RuleConflict`] for contradictory classifications.
    pub fn analyze(mut self) -> Result<MethodAnalysis> {
        if self.method.is_native() {
            return Err(unsupported_error!(self.id, "native methods cannot be analyzed"));
        }

        let entry = self.entry_frame()?;
        if self.method.is_abstract() {
            return Ok(self.finish());
        }
        if self.method.instructions.is_empty() {
            return Err(malformed_error!("{} has no code", self.id));
        }

        self.labels = self.method.label_positions()?;
        self.handlers = self.collect_handlers()?;
        self.frames[0] = Some(entry);
        self.enqueue(0);

        while let Some(index) = self.worklist.pop_front() {
            self.in_worklist[index] = false;
            self.iterations += 1;
            self.step(index)?;
        }

        log::trace!(
            "{}: fixed point after {} steps over {} instructions",
            self.id,
            self.iterations,
            self.method.instructions.len()
        );
        Ok(self.finish())
    }

    fn finish(self) -> MethodAnalysis {
        let outputs = self
            .outputs
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        let frames = if self.method.is_abstract() {
            Vec::new()
        } else {
            self.frames
        };
        MethodAnalysis::new(self.id, frames, self.inputs, outputs, self.params, self.ret)
    }

    fn entry_frame(&mut self) -> Result<Frame> {
        let max_locals = usize::from(self.method.max_locals).max(self.method.arg_slots());
        let mut frame = Frame::new(max_locals);

        let mut slot = 0u16;
        for ty in self.id.all_params() {
            let value = self.lattice.new_value(ty.clone());
            self.param_slots.insert(slot, self.params.len());
            self.params.push(value);
            frame.set_local(slot, Some(value));
            slot += ty.size() as u16;
        }

        let ret = self.method.desc.ret();
        if *ret != JvmType::Void {
            self.ret = Some(self.lattice.new_value(ret.clone()));
        }

        let mut hinted: Vec<_> = self.hints.iter().map(|(s, r)| (*s, *r)).collect();
        hinted.sort_unstable();
        for (slot, rule) in hinted {
            if let Some(position) = self.param_slots.get(&slot) {
                self.lattice.resolve(self.params[*position], rule)?;
            }
        }
        Ok(frame)
    }

    fn collect_handlers(&self) -> Result<Vec<Handler>> {
        let position = |label: &LabelId| {
            self.labels
                .get(label)
                .copied()
                .ok_or_else(|| malformed_error!("Exception range uses unplaced label {}", label))
        };
        self.method
            .try_catch
            .iter()
            .map(|block| {
                Ok(Handler {
                    start: position(&block.start)?,
                    end: position(&block.end)?,
                    target: position(&block.handler)?,
                    catch_type: JvmType::object(
                        block.catch_type.as_deref().unwrap_or("java/lang/Throwable"),
                    ),
                })
            })
            .collect()
    }

    fn enqueue(&mut self, index: usize) {
        if !self.in_worklist[index] {
            self.in_worklist[index] = true;
            self.worklist.push_back(index);
        }
    }

    fn flow_into(&mut self, target: usize, incoming: &Frame) -> Result<()> {
        let changed = match self.frames[target].as_mut() {
            None => {
                self.frames[target] = Some(incoming.clone());
                true
            }
            Some(existing) => existing.merge(incoming, self.lattice)?,
        };
        if changed {
            self.enqueue(target);
        }
        Ok(())
    }

    fn step(&mut self, index: usize) -> Result<()> {
        let Some(before) = self.frames[index].clone() else {
            return Ok(());
        };
        let first_visit = self.outputs[index].is_none();
        if first_visit {
            self.outputs[index] = Some(Vec::new());
        }

        let method = self.method;
        let mut frame = before.clone();
        self.execute(index, &method.instructions[index], &mut frame, first_visit)?;

        for successor in method.successors(index, &self.labels)? {
            self.flow_into(successor, &frame)?;
        }

        for h in 0..self.handlers.len() {
            let handler = &self.handlers[h];
            if index < handler.start || index >= handler.end {
                continue;
            }
            let target = handler.target;
            let catch_type = handler.catch_type.clone();
            let exception = *self
                .exceptions
                .entry(h)
                .or_insert_with(|| self.lattice.new_value(catch_type));
            let handler_frame = Frame {
                locals: before.locals.clone(),
                stack: vec![exception],
            };
            self.flow_into(target, &handler_frame)?;
        }
        Ok(())
    }

    /// The `k`-th value instruction `index` produces, created on first use.
    fn produce(&mut self, index: usize, k: usize, ty: JvmType) -> ValueId {
        let outputs = self.outputs[index].get_or_insert_with(Vec::new);
        if let Some(existing) = outputs.get(k) {
            let existing = *existing;
            self.lattice.value_mut(existing).ty = ty;
            return existing;
        }
        let value = self.lattice.new_value(ty);
        self.lattice.value_mut(value).producers.insert(index);
        outputs.push(value);
        value
    }

    fn consume(&mut self, value: ValueId, index: usize) {
        self.lattice.value_mut(value).consumers.insert(index);
    }

    fn pop(&mut self, frame: &mut Frame, index: usize, count: usize) -> Result<Vec<ValueId>> {
        let popped = frame.pop_n(count)?;
        for value in &popped {
            self.consume(*value, index);
        }
        Ok(popped)
    }

    fn execute(&mut self, index: usize, insn: &Insn, frame: &mut Frame, first: bool) -> Result<()> {
        let inputs = match insn {
            Insn::Label(_) => Vec::new(),
            Insn::Var { opcode, var } if opcode.is_var_load() => {
                self.load(index, *var, frame)?;
                Vec::new()
            }
            Insn::Var { opcode, var } if opcode.is_var_store() => self.store(index, *var, frame)?,
            Insn::Iinc { var, .. } => {
                let local = self.local(frame, *var, index)?;
                self.consume(local, index);
                let out = self.produce(index, 0, JvmType::Int);
                self.set_local(frame, *var, out);
                Vec::new()
            }
            Insn::Jump { opcode, .. }
                if matches!(
                    opcode,
                    Opcode::IF_ICMPEQ
                        | Opcode::IF_ICMPNE
                        | Opcode::IF_ICMPLT
                        | Opcode::IF_ICMPGE
                        | Opcode::IF_ICMPGT
                        | Opcode::IF_ICMPLE
                        | Opcode::IF_ACMPEQ
                        | Opcode::IF_ACMPNE
                ) =>
            {
                let operands = self.pop(frame, index, 2)?;
                self.lattice.unify(operands[0], operands[1])?;
                operands
            }
            Insn::Op(opcode) if opcode.is_three_way_compare() => {
                let operands = self.pop(frame, index, 2)?;
                self.lattice.unify(operands[0], operands[1])?;
                let out = self.produce(index, 0, JvmType::Int);
                frame.push(out);
                operands
            }
            Insn::Op(Opcode::RETURN) => Vec::new(),
            Insn::Op(opcode) if opcode.is_return() => {
                let value = self.pop(frame, index, 1)?;
                let ret = self
                    .ret
                    .ok_or_else(|| malformed_error!("{} returns a value from a void method", opcode))?;
                self.lattice.unify(value[0], ret)?;
                value
            }
            Insn::Op(
                opcode @ (Opcode::POP
                | Opcode::POP2
                | Opcode::DUP
                | Opcode::DUP_X1
                | Opcode::DUP_X2
                | Opcode::DUP2
                | Opcode::DUP2_X1
                | Opcode::DUP2_X2
                | Opcode::SWAP),
            ) => self.shuffle(index, *opcode, frame)?,
            Insn::Type {
                opcode: Opcode::CHECKCAST,
                desc,
            } => {
                let value = self.pop(frame, index, 1)?;
                let out = self.produce(index, 0, JvmType::from_internal_name(desc)?);
                self.lattice.unify(out, value[0])?;
                frame.push(out);
                value
            }
            Insn::Field {
                opcode,
                owner,
                name,
                desc,
            } => self.field(index, *opcode, FieldId::new(owner.clone(), name.clone(), desc.clone()), frame)?,
            Insn::Method { .. } => self.invoke(index, insn, frame, first)?,
            Insn::InvokeDynamic {
                desc,
                bootstrap,
                args,
                ..
            } => self.invoke_dynamic(index, desc, bootstrap, args, frame, first)?,
            Insn::Op(opcode) | Insn::IntOp { opcode, .. } | Insn::Type { opcode, .. }
                if opcode.is_array_op() =>
            {
                self.array(index, insn, *opcode, frame, first)?
            }
            other => {
                let effect = interpreter::effect(other)?;
                let popped = self.pop(frame, index, effect.pops)?;
                if let Some(ty) = effect.push {
                    let out = self.produce(index, 0, ty);
                    frame.push(out);
                }
                popped
            }
        };
        self.inputs[index] = inputs;
        Ok(())
    }

    fn local(&self, frame: &Frame, var: u16, index: usize) -> Result<ValueId> {
        frame.local(var).ok_or_else(|| {
            malformed_error!(
                "Read of undefined local {} at instruction {} of {}",
                var,
                index,
                self.id
            )
        })
    }

    /// Writes `value` to `var`, invalidating wide halves it overlaps.
    fn set_local(&self, frame: &mut Frame, var: u16, value: ValueId) {
        frame.set_local(var, Some(value));
        if self.lattice.value(value).size() == 2 {
            frame.set_local(var + 1, None);
        }
        if var > 0 {
            if let Some(previous) = frame.local(var - 1) {
                if self.lattice.value(previous).size() == 2 {
                    frame.set_local(var - 1, None);
                }
            }
        }
    }

    fn load(&mut self, index: usize, var: u16, frame: &mut Frame) -> Result<()> {
        let local = self.local(frame, var, index)?;
        self.consume(local, index);
        let ty = self.lattice.value(local).ty.clone();
        let out = self.produce(index, 0, ty);
        self.lattice.unify(out, local)?;
        frame.push(out);
        Ok(())
    }

    fn store(&mut self, index: usize, var: u16, frame: &mut Frame) -> Result<Vec<ValueId>> {
        let value = self.pop(frame, index, 1)?;
        let ty = self.lattice.value(value[0]).ty.clone();
        let out = self.produce(index, 0, ty);
        self.lattice.unify(out, value[0])?;
        self.set_local(frame, var, out);
        if !self.param_slots.contains_key(&var) {
            if let Some(rule) = self.hints.get(&var).copied() {
                self.lattice.resolve(out, rule)?;
            }
        }
        Ok(value)
    }

    fn shuffle(&mut self, index: usize, opcode: Opcode, frame: &mut Frame) -> Result<Vec<ValueId>> {
        let wide = |this: &Self, frame: &Frame, depth: usize| -> Result<bool> {
            let value = frame
                .stack
                .len()
                .checked_sub(depth + 1)
                .and_then(|i| frame.stack.get(i))
                .ok_or_else(|| malformed_error!("Operand stack underflow at {}", opcode))?;
            Ok(this.lattice.value(*value).size() == 2)
        };

        // Pushed entries: an input by position (bottom first), or a copy of one.
        enum Src {
            In(usize),
            Dup(usize),
        }
        use Src::{Dup, In};

        let (count, layout): (usize, Vec<Src>) = match opcode {
            Opcode::POP => (1, vec![]),
            Opcode::POP2 if wide(self, frame, 0)? => (1, vec![]),
            Opcode::POP2 => (2, vec![]),
            Opcode::DUP => (1, vec![In(0), Dup(0)]),
            Opcode::DUP_X1 => (2, vec![Dup(1), In(0), In(1)]),
            Opcode::DUP_X2 if wide(self, frame, 1)? => (2, vec![Dup(1), In(0), In(1)]),
            Opcode::DUP_X2 => (3, vec![Dup(2), In(0), In(1), In(2)]),
            Opcode::DUP2 if wide(self, frame, 0)? => (1, vec![In(0), Dup(0)]),
            Opcode::DUP2 => (2, vec![In(0), In(1), Dup(0), Dup(1)]),
            Opcode::DUP2_X1 if wide(self, frame, 0)? => (2, vec![Dup(1), In(0), In(1)]),
            Opcode::DUP2_X1 => (3, vec![Dup(1), Dup(2), In(0), In(1), In(2)]),
            Opcode::DUP2_X2 if wide(self, frame, 0)? => {
                if wide(self, frame, 1)? {
                    (2, vec![Dup(1), In(0), In(1)])
                } else {
                    (3, vec![Dup(2), In(0), In(1), In(2)])
                }
            }
            Opcode::DUP2_X2 if wide(self, frame, 2)? => {
                (3, vec![Dup(1), Dup(2), In(0), In(1), In(2)])
            }
            Opcode::DUP2_X2 => (4, vec![Dup(2), Dup(3), In(0), In(1), In(2), In(3)]),
            Opcode::SWAP => (2, vec![In(1), In(0)]),
            other => return Err(malformed_error!("{} is not a stack shuffle", other)),
        };

        let inputs = self.pop(frame, index, count)?;
        let mut copies = 0;
        for src in layout {
            match src {
                In(k) => frame.push(inputs[k]),
                Dup(k) => {
                    let ty = self.lattice.value(inputs[k]).ty.clone();
                    let copy = self.produce(index, copies, ty);
                    copies += 1;
                    self.lattice.unify(copy, inputs[k])?;
                    frame.push(copy);
                }
            }
        }
        Ok(inputs)
    }

    fn field(
        &mut self,
        index: usize,
        opcode: Opcode,
        field: FieldId,
        frame: &mut Frame,
    ) -> Result<Vec<ValueId>> {
        let (inputs, moved) = match opcode {
            Opcode::GETSTATIC | Opcode::GETFIELD => {
                let receiver = if opcode == Opcode::GETFIELD {
                    self.pop(frame, index, 1)?
                } else {
                    Vec::new()
                };
                let out = self.produce(index, 0, field.desc.clone());
                frame.push(out);
                (receiver, out)
            }
            Opcode::PUTSTATIC => {
                let inputs = self.pop(frame, index, 1)?;
                let value = inputs[0];
                (inputs, value)
            }
            Opcode::PUTFIELD => {
                let inputs = self.pop(frame, index, 2)?;
                let value = inputs[1];
                (inputs, value)
            }
            other => return Err(malformed_error!("{} is not a field access", other)),
        };

        if let Some(slot) = self.lattice.field_slot(&field) {
            self.lattice.unify(moved, slot)?;
            self.lattice.add_field_source(moved, field)?;
        }
        Ok(inputs)
    }

    fn invoke(&mut self, index: usize, insn: &Insn, frame: &mut Frame, first: bool) -> Result<Vec<ValueId>> {
        let callee = MethodId::from_insn(insn)
            .ok_or_else(|| malformed_error!("Not a method invocation: {}", insn))?;
        let receiver = usize::from(!callee.is_static());
        let args = self.pop(frame, index, callee.desc.params().len() + receiver)?;

        let ret = match callee.desc.ret() {
            JvmType::Void => None,
            ty => {
                let out = self.produce(index, 0, ty.clone());
                frame.push(out);
                Some(out)
            }
        };

        if first {
            let registry = self.scope.registry;
            for spec in registry.call_specs(&callee) {
                self.lattice.add_check(spec.clone(), ret, args.clone())?;
            }
            if self.scope.is_local(&callee) {
                let bound = args.iter().copied().enumerate().skip(receiver).collect();
                self.bind_call(callee, bound, ret)?;
            }
        }
        Ok(args)
    }

    /// Array instructions act like calls to the pseudo methods of
    /// [`MethodId::array_op`] on the type of the array they touch.
    fn array(
        &mut self,
        index: usize,
        insn: &Insn,
        opcode: Opcode,
        frame: &mut Frame,
        first: bool,
    ) -> Result<Vec<ValueId>> {
        let effect = interpreter::effect(insn)?;
        let args = self.pop(frame, index, effect.pops)?;
        let array = match &effect.push {
            Some(allocated @ JvmType::Array(_)) => allocated.clone(),
            _ => self.lattice.value(args[0]).ty.clone(),
        };

        let ret = match effect.push {
            Some(ty) => {
                let ty = match (opcode, array.element()) {
                    (Opcode::AALOAD, Some(element)) => element.clone(),
                    _ => ty,
                };
                let out = self.produce(index, 0, ty);
                frame.push(out);
                Some(out)
            }
            None => None,
        };

        if first {
            if let Some(pseudo) = MethodId::array_op(opcode, &array) {
                let registry = self.scope.registry;
                for spec in registry.call_specs(&pseudo) {
                    self.lattice.add_check(spec.clone(), ret, args.clone())?;
                }
            }
        }
        Ok(args)
    }

    fn invoke_dynamic(
        &mut self,
        index: usize,
        desc: &MethodDescriptor,
        bootstrap: &Handle,
        bsm_args: &[BsmArg],
        frame: &mut Frame,
        first: bool,
    ) -> Result<Vec<ValueId>> {
        let captured = self.pop(frame, index, desc.params().len())?;
        if *desc.ret() != JvmType::Void {
            let out = self.produce(index, 0, desc.ret().clone());
            frame.push(out);
        }

        if first {
            if let Some(target) = self.lambda_target(bootstrap, bsm_args) {
                let skip = usize::from(!target.is_static());
                let bound = captured.iter().copied().enumerate().skip(skip).collect();
                self.bind_call(target, bound, None)?;
            }
        }
        Ok(captured)
    }

    /// The same-class method a lambda call site refers to.
    fn lambda_target(&self, bootstrap: &Handle, bsm_args: &[BsmArg]) -> Option<MethodId> {
        std::iter::once(bootstrap)
            .chain(bsm_args.iter().filter_map(|arg| match arg {
                BsmArg::Handle(handle) => Some(handle),
                _ => None,
            }))
            .filter(|handle| handle.owner == self.scope.owner)
            .find_map(|handle| {
                let desc = handle.desc.parse().ok()?;
                let kind = if handle.kind.is_static() {
                    CallKind::Static
                } else {
                    CallKind::Virtual
                };
                let id = MethodId::new(kind, handle.owner.clone(), handle.name.clone(), desc);
                self.scope.is_local(&id).then_some(id)
            })
    }

    fn bind_call(&mut self, callee: MethodId, args: Vec<(usize, ValueId)>, ret: Option<ValueId>) -> Result<()> {
        let binding = DeferredCallBinding { args, ret };
        if callee == self.id {
            return binding.bind(self.lattice, &self.params, self.ret);
        }
        match self.scope.analyzed.get(&callee) {
            Some(analysis) => binding.apply(self.lattice, analysis),
            None => {
                self.deferred.queue(callee, binding);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::MethodBuilder,
        metadata::{hierarchy::HierarchyTree, method::AccessFlags},
        rules::TransformRule,
        Error,
    };
    use std::rc::Rc;

    fn registry() -> RuleRegistry {
        let mut tree = HierarchyTree::new();
        tree.add_node("java/lang/Object", None).unwrap();
        tree.add_node("a/B", Some("java/lang/Object")).unwrap();
        let mut registry = RuleRegistry::new(tree);
        registry
            .add_rule(TransformRule::new("pos", JvmType::Long, vec![JvmType::Int; 3]).unwrap())
            .unwrap();
        registry
            .add_rule(TransformRule::new("vec", JvmType::Long, vec![JvmType::Float; 2]).unwrap())
            .unwrap();
        registry
    }

    fn run(registry: &RuleRegistry, method: &MethodBody) -> Result<(Lattice, MethodAnalysis)> {
        let mut declared = FxHashSet::default();
        declared.insert(MethodId::of_method("a/B", method));
        let analyzed = FxHashMap::default();
        let mut lattice = Lattice::new(Rc::clone(registry.hierarchy()));
        let mut deferred = DeferredBindings::new();
        let scope = ClassScope {
            owner: "a/B",
            declared: &declared,
            analyzed: &analyzed,
            registry,
        };
        let analysis = Analyzer::new(scope, method, &mut lattice, &mut deferred).analyze()?;
        Ok((lattice, analysis))
    }

    #[test]
    fn test_loop_reaches_fixed_point() {
        let mut registry = registry();
        let mut asm = MethodBuilder::new(AccessFlags::STATIC, "run", "(JI)V").unwrap();
        let (top, end) = (asm.new_label(), asm.new_label());
        asm.var(Opcode::LLOAD, 0)
            .var(Opcode::LSTORE, 3)
            .label(top)
            .var(Opcode::ILOAD, 2)
            .jump(Opcode::IFLE, end)
            .var(Opcode::LLOAD, 3)
            .var(Opcode::LSTORE, 3)
            .iinc(2, -1)
            .jump(Opcode::GOTO, top)
            .label(end)
            .op(Opcode::RETURN);
        let method = asm.build();
        let pos = registry.rule_id("pos").unwrap();
        registry.add_type_hint("a/B", MethodId::of_method("a/B", &method), 0, pos);

        let (lattice, analysis) = run(&registry, &method).unwrap();
        assert_eq!(lattice.rule_of(analysis.params[0]), Some(pos));
        assert_eq!(lattice.rule_of(analysis.outputs[1][0]), Some(pos));
        let exit = analysis.frame(10).unwrap();
        assert_eq!(lattice.rule_of(exit.local(3).unwrap()), Some(pos));
        assert_eq!(exit.local(4), None);
        assert!(lattice.value(analysis.outputs[5][0]).consumers.contains(&6));
    }

    #[test]
    fn test_conflicting_join_is_fatal() {
        let mut registry = registry();
        let mut asm = MethodBuilder::new(AccessFlags::STATIC, "pick", "(JJZ)J").unwrap();
        let (other, join) = (asm.new_label(), asm.new_label());
        asm.var(Opcode::ILOAD, 4)
            .jump(Opcode::IFEQ, other)
            .var(Opcode::LLOAD, 0)
            .jump(Opcode::GOTO, join)
            .label(other)
            .var(Opcode::LLOAD, 2)
            .label(join)
            .op(Opcode::LRETURN);
        let method = asm.build();
        let id = MethodId::of_method("a/B", &method);
        let (pos, vec) = (registry.rule_id("pos").unwrap(), registry.rule_id("vec").unwrap());
        registry.add_type_hint("a/B", id.clone(), 0, pos);
        registry.add_type_hint("a/B", id, 2, vec);

        assert!(matches!(
            run(&registry, &method),
            Err(Error::RuleConflict { .. })
        ));
    }

    #[test]
    fn test_unsupported_subroutine() {
        let registry = registry();
        let mut asm = MethodBuilder::new(AccessFlags::STATIC, "sub", "()V").unwrap();
        let target = asm.new_label();
        asm.jump(Opcode::JSR, target).label(target).op(Opcode::RETURN);
        assert!(matches!(
            run(&registry, &asm.build()),
            Err(Error::UnsupportedInstruction(_))
        ));
    }

    #[test]
    fn test_return_and_field_unify() {
        let registry = registry();
        let pos = registry.rule_id("pos").unwrap();
        let mut asm = MethodBuilder::new(AccessFlags::STATIC, "get", "()J").unwrap();
        asm.field(Opcode::GETSTATIC, "a/B", "cached", "J")
            .unwrap()
            .op(Opcode::LRETURN);
        let method = asm.build();

        let mut declared = FxHashSet::default();
        declared.insert(MethodId::of_method("a/B", &method));
        let analyzed = FxHashMap::default();
        let mut lattice = Lattice::new(Rc::clone(registry.hierarchy()));
        let slot = lattice.add_field_slot(FieldId::new("a/B", "cached", JvmType::Long));
        lattice.resolve(slot, pos).unwrap();
        let mut deferred = DeferredBindings::new();
        let scope = ClassScope {
            owner: "a/B",
            declared: &declared,
            analyzed: &analyzed,
            registry: &registry,
        };
        let analysis = Analyzer::new(scope, &method, &mut lattice, &mut deferred)
            .analyze()
            .unwrap();
        assert_eq!(lattice.rule_of(analysis.ret.unwrap()), Some(pos));
    }
}
