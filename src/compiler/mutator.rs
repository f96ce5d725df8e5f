//! Instruction-level rewriting.
//!
//! The [`Mutator`] walks the original instruction list once, in order, and
//! writes the rewritten sequence into a fresh copy of the method body. For
//! every instruction it emits the code scheduled before it, the rewritten
//! instruction (unless the instruction was deleted) and the code scheduled
//! after it. Instructions whose operands were removed get those operands
//! regenerated in front of them, except where the rewrite consumes the
//! generators itself (templates and comparison chains).

use crate::{
    analysis::ValueId,
    assembly::{Insn, LabelId, Opcode},
    compiler::RewriteContext,
    metadata::{
        identity::FieldId,
        method::{LocalVariable, MethodBody},
        typesystem::{JvmType, OBJECT},
    },
    Error, Result,
};

/// Branch condition shared by the single and two operand branch forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cond {
    fn from_opcode(opcode: Opcode) -> Option<Self> {
        let cond = match opcode {
            Opcode::IFEQ | Opcode::IF_ICMPEQ | Opcode::IF_ACMPEQ => Cond::Eq,
            Opcode::IFNE | Opcode::IF_ICMPNE | Opcode::IF_ACMPNE => Cond::Ne,
            Opcode::IFLT | Opcode::IF_ICMPLT => Cond::Lt,
            Opcode::IFGE | Opcode::IF_ICMPGE => Cond::Ge,
            Opcode::IFGT | Opcode::IF_ICMPGT => Cond::Gt,
            Opcode::IFLE | Opcode::IF_ICMPLE => Cond::Le,
            _ => return None,
        };
        Some(cond)
    }

    const fn if_zero(self) -> Opcode {
        match self {
            Cond::Eq => Opcode::IFEQ,
            Cond::Ne => Opcode::IFNE,
            Cond::Lt => Opcode::IFLT,
            Cond::Ge => Opcode::IFGE,
            Cond::Gt => Opcode::IFGT,
            Cond::Le => Opcode::IFLE,
        }
    }

    const fn if_icmp(self) -> Opcode {
        match self {
            Cond::Eq => Opcode::IF_ICMPEQ,
            Cond::Ne => Opcode::IF_ICMPNE,
            Cond::Lt => Opcode::IF_ICMPLT,
            Cond::Ge => Opcode::IF_ICMPGE,
            Cond::Gt => Opcode::IF_ICMPGT,
            Cond::Le => Opcode::IF_ICMPLE,
        }
    }
}

/// Rewrites the code of one method.
pub(crate) struct Mutator<'c, 'a> {
    pub(crate) ctx: &'c mut RewriteContext<'a>,
    pub(crate) body: MethodBody,
    pub(crate) out: Vec<Insn>,
}

impl<'c, 'a> Mutator<'c, 'a> {
    /// Prepares a rewrite into a copy of the context's method.
    pub fn new(ctx: &'c mut RewriteContext<'a>) -> Self {
        let body = ctx.method.clone();
        let capacity = body.instructions.len();
        Self {
            ctx,
            body,
            out: Vec::with_capacity(capacity),
        }
    }

    /// Rewrites every instruction and returns the new body.
    ///
    /// Name and descriptor are left as in the original; the caller applies
    /// the method's plan.
    ///
    /// # Errors
    ///
    /// Fails with the first rewrite error.
    pub fn run(mut self) -> Result<MethodBody> {
        let method = self.ctx.method;
        for (index, insn) in method.instructions.iter().enumerate() {
            let before = std::mem::take(&mut self.ctx.before[index]);
            self.out.extend(before);
            if self.ctx.deleted[index] {
                continue;
            }
            if self.ctx.analysis.is_reachable(index) {
                self.instruction(index, insn)?;
            } else {
                self.out.push(insn.clone());
            }
            let after = std::mem::take(&mut self.ctx.after[index]);
            self.out.extend(after);
        }

        let locals = self.local_variables()?;
        let mut body = self.body;
        body.instructions = self.out;
        body.local_variables = locals;
        body.recompute_max_locals();
        let scratch = u16::try_from(self.ctx.allocator.max_slots()).unwrap_or(u16::MAX);
        body.max_locals = body.max_locals.max(scratch);
        Ok(body)
    }

    fn instruction(&mut self, index: usize, insn: &Insn) -> Result<()> {
        match insn {
            Insn::Label(_) => self.out.push(insn.clone()),
            Insn::Var { opcode, var } if opcode.is_var_load() => self.load(index, *opcode, *var)?,
            Insn::Var { opcode, var } if opcode.is_var_store() => {
                self.restore_inputs(index)?;
                self.store(index, *opcode, *var)?;
            }
            Insn::Iinc { var, incr } => {
                let local = self.ctx.local(index, *var)?;
                if self.ctx.env.changes_shape(local) {
                    return Err(self.ctx.unsupported(format!("IINC of split local {var}")));
                }
                let var = self.ctx.table(index)?.get(*var);
                self.out.push(Insn::Iinc { var, incr: *incr });
            }
            Insn::Jump { opcode, target } if opcode.is_equality_branch() => {
                self.compare(index, insn, Some((*opcode, *target)))?;
            }
            Insn::Op(opcode) if opcode.is_three_way_compare() => self.compare(index, insn, None)?,
            Insn::Method { .. } => self.call(index, insn)?,
            Insn::InvokeDynamic { .. } => {
                self.restore_inputs(index)?;
                self.invoke_dynamic(index, insn)?;
            }
            Insn::Op(Opcode::POP | Opcode::POP2) => self.pop(index, insn)?,
            Insn::Op(
                Opcode::DUP
                | Opcode::DUP_X1
                | Opcode::DUP_X2
                | Opcode::DUP2
                | Opcode::DUP2_X1
                | Opcode::DUP2_X2
                | Opcode::SWAP,
            ) => self.shuffle(index, insn)?,
            Insn::Op(opcode) if opcode.is_return() => {
                self.restore_inputs(index)?;
                self.ret(index, insn)?;
            }
            Insn::Type {
                opcode: Opcode::CHECKCAST,
                ..
            } => {
                self.restore_inputs(index)?;
                let value = self.ctx.output(index)?;
                let ty = self.single_reference(value, insn)?;
                self.out.push(ty.map_or_else(|| insn.clone(), |ty| type_insn(Opcode::CHECKCAST, &ty)));
            }
            Insn::Type {
                opcode: Opcode::NEW, ..
            } => {
                let value = self.ctx.output(index)?;
                let ty = self.single_reference(value, insn)?;
                self.out.push(ty.map_or_else(|| insn.clone(), |ty| type_insn(Opcode::NEW, &ty)));
            }
            Insn::Field { .. } => {
                self.restore_inputs(index)?;
                self.field(index, insn)?;
            }
            Insn::Op(opcode) | Insn::IntOp { opcode, .. } | Insn::Type { opcode, .. }
                if opcode.is_array_op() && self.ctx.accepted[index].is_some() =>
            {
                self.array_access(index, insn)?;
            }
            other => match other.constant() {
                Some(_) => self.constant(index, other)?,
                None => {
                    self.restore_inputs(index)?;
                    self.passthrough(index, other)?;
                }
            },
        }
        Ok(())
    }

    /// Regenerates the operands of `index` if they were taken off the stack.
    pub(crate) fn restore_inputs(&mut self, index: usize) -> Result<()> {
        let inputs = self.ctx.inputs(index);
        let Some(first) = inputs.first() else {
            return Ok(());
        };
        if !self.ctx.is_removed(*first, index)? {
            return Ok(());
        }
        for value in inputs {
            self.ctx.generator(*value)?.emit(&mut self.out);
        }
        Ok(())
    }

    fn load(&mut self, index: usize, opcode: Opcode, var: u16) -> Result<()> {
        let value = self.ctx.output(index)?;
        let slot = self.ctx.table(index)?.get(var);
        match self.ctx.env.rule(value) {
            None => self.out.push(Insn::var(opcode, slot)),
            Some(rule) => {
                let mut slot = slot;
                for ty in rule.components() {
                    self.out.push(Insn::var(ty.load_opcode(), slot));
                    slot += ty.size() as u16;
                }
            }
        }
        Ok(())
    }

    fn store(&mut self, index: usize, opcode: Opcode, var: u16) -> Result<()> {
        let value = self.ctx.output(index)?;
        let slot = self.ctx.store_table(index, var)?.get(var);
        match self.ctx.env.rule(value) {
            None => self.out.push(Insn::var(opcode, slot)),
            Some(rule) => {
                let mut slots = Vec::with_capacity(rule.component_count());
                let mut next = slot;
                for ty in rule.components() {
                    slots.push((ty, next));
                    next += ty.size() as u16;
                }
                // The last component is on top of the stack.
                for (ty, slot) in slots.into_iter().rev() {
                    self.out.push(Insn::var(ty.store_opcode(), slot));
                }
            }
        }
        Ok(())
    }

    fn constant(&mut self, index: usize, insn: &Insn) -> Result<()> {
        let value = self.ctx.output(index)?;
        let Some(rule) = self.ctx.env.rule(value) else {
            self.out.push(insn.clone());
            return Ok(());
        };
        let Some(constant) = insn.constant() else {
            return Err(malformed_error!("{} is not a constant", insn));
        };
        match rule.constant_replacement(&constant) {
            Some(code) => self.out.extend(code.iter().flatten().cloned()),
            None if rule.component_count() == 1 => {
                self.out.push(Insn::push(&constant.coerce(&rule.components()[0])));
            }
            None => {
                return Err(Error::MissingConstant {
                    rule: rule.id().to_string(),
                    constant: constant.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Equality branches and three-way comparisons. `jump` is the branch
    /// itself for the two operand branch forms.
    fn compare(&mut self, index: usize, insn: &Insn, jump: Option<(Opcode, LabelId)>) -> Result<()> {
        let inputs = self.ctx.inputs(index);
        let [left, right] = inputs else {
            return Err(malformed_error!("{} expects two operands", insn));
        };
        let Some(rule) = self.ctx.env.rule(*left) else {
            self.restore_inputs(index)?;
            self.out.push(insn.clone());
            return Ok(());
        };
        let original = self.ctx.env.lattice.value(*left).ty.erased();
        let components = rule.components();

        if components.len() == 1 {
            self.restore_inputs(index)?;
            let component = &components[0];
            if component.erased() == original {
                self.out.push(insn.clone());
                return Ok(());
            }
            let (cond, target) = match jump {
                Some((opcode, target)) => (self.cond(opcode)?, target),
                None => self.fold_branch(index)?,
            };
            return self.single_compare(component, cond, target);
        }

        let (cond, target) = match jump {
            Some((opcode, target)) => (self.cond(opcode)?, target),
            None => self.fold_branch(index)?,
        };
        let left = self.ctx.generator(*left)?.clone();
        let right = self.ctx.generator(*right)?.clone();
        let last = components.len() - 1;
        match cond {
            Cond::Eq => {
                let fail = self.body.new_label();
                for (c, ty) in components.iter().enumerate() {
                    left.emit_component(c, &mut self.out)?;
                    right.emit_component(c, &mut self.out)?;
                    if c == last {
                        self.single_compare(ty, Cond::Eq, target)?;
                    } else {
                        self.single_compare(ty, Cond::Ne, fail)?;
                    }
                }
                self.out.push(Insn::Label(fail));
            }
            Cond::Ne => {
                for (c, ty) in components.iter().enumerate() {
                    left.emit_component(c, &mut self.out)?;
                    right.emit_component(c, &mut self.out)?;
                    self.single_compare(ty, Cond::Ne, target)?;
                }
            }
            other => {
                return Err(self.ctx.unsupported(format!(
                    "ordered comparison ({other:?}) of split values"
                )))
            }
        }
        Ok(())
    }

    fn cond(&self, opcode: Opcode) -> Result<Cond> {
        Cond::from_opcode(opcode).ok_or_else(|| malformed_error!("{} is not a conditional branch", opcode))
    }

    /// Folds the branch consuming a three-way comparison result into the
    /// comparison and returns its condition and target.
    fn fold_branch(&mut self, index: usize) -> Result<(Cond, LabelId)> {
        let result = self.ctx.output(index)?;
        let consumers = &self.ctx.env.lattice.value(result).consumers;
        let next = index + 1;
        let folded = match self.ctx.method.instructions.get(next) {
            Some(Insn::Jump { opcode, target })
                if consumers.len() == 1 && consumers.contains(&next) =>
            {
                Cond::from_opcode(*opcode)
                    .filter(|_| matches!(opcode, Opcode::IFEQ | Opcode::IFNE | Opcode::IFLT | Opcode::IFGE | Opcode::IFGT | Opcode::IFLE))
                    .map(|cond| (cond, *target))
            }
            _ => None,
        };
        let Some(folded) = folded else {
            return Err(self.ctx.unsupported(format!(
                "result of the comparison at {index} must feed the branch right after it"
            )));
        };
        self.ctx.deleted[next] = true;
        Ok(folded)
    }

    /// Emits a branch to `target` comparing the two `ty` values on the stack.
    fn single_compare(&mut self, ty: &JvmType, cond: Cond, target: LabelId) -> Result<()> {
        let jump = |opcode| Insn::Jump { opcode, target };
        match ty {
            t if t.is_int_like() => self.out.push(jump(cond.if_icmp())),
            t if t.is_reference() => {
                let opcode = match cond {
                    Cond::Eq => Opcode::IF_ACMPEQ,
                    Cond::Ne => Opcode::IF_ACMPNE,
                    other => {
                        return Err(self.ctx.unsupported(format!(
                            "ordered comparison ({other:?}) of references"
                        )))
                    }
                };
                self.out.push(jump(opcode));
            }
            JvmType::Long => {
                self.out.push(Insn::Op(Opcode::LCMP));
                self.out.push(jump(cond.if_zero()));
            }
            JvmType::Float | JvmType::Double => {
                let nan_greater = matches!(cond, Cond::Lt | Cond::Le);
                let opcode = match (ty, nan_greater) {
                    (JvmType::Float, true) => Opcode::FCMPG,
                    (JvmType::Float, false) => Opcode::FCMPL,
                    (_, true) => Opcode::DCMPG,
                    (_, false) => Opcode::DCMPL,
                };
                self.out.push(Insn::Op(opcode));
                self.out.push(jump(cond.if_zero()));
            }
            other => return Err(malformed_error!("Cannot compare values of type {}", other)),
        }
        Ok(())
    }

    fn pop(&mut self, index: usize, insn: &Insn) -> Result<()> {
        let inputs = self.ctx.inputs(index);
        if let Some(first) = inputs.first() {
            if self.ctx.is_removed(*first, index)? {
                return Ok(());
            }
        }
        if inputs.iter().all(|v| self.ctx.env.rule(*v).is_none()) {
            self.out.push(insn.clone());
            return Ok(());
        }
        for value in inputs.iter().rev() {
            for ty in self.ctx.env.shape(*value).iter().rev() {
                self.out.push(Insn::Op(ty.pop_opcode()));
            }
        }
        Ok(())
    }

    fn shuffle(&mut self, index: usize, insn: &Insn) -> Result<()> {
        let inputs = self.ctx.inputs(index);
        for value in inputs {
            if self.ctx.is_removed(*value, index)? {
                return Err(self.ctx.unsupported(format!("{insn} of a value taken off the stack")));
            }
        }
        if !inputs.iter().any(|v| self.ctx.env.changes_shape(*v)) {
            self.out.push(insn.clone());
            return Ok(());
        }
        match (insn, inputs) {
            (Insn::Op(Opcode::DUP | Opcode::DUP2), [value]) => {
                let shape = self.ctx.env.shape(*value);
                match shape.as_slice() {
                    [ty] => self.out.push(Insn::Op(ty.dup_opcode())),
                    _ => return Err(self.ctx.unsupported(format!("{insn} of a split value"))),
                }
            }
            _ => return Err(self.ctx.unsupported(format!("{insn} of a split value"))),
        }
        Ok(())
    }

    fn ret(&mut self, index: usize, insn: &Insn) -> Result<()> {
        let Some(value) = self.ctx.inputs(index).first() else {
            self.out.push(insn.clone());
            return Ok(());
        };
        let Some(rule) = self.ctx.env.rule(*value) else {
            self.out.push(insn.clone());
            return Ok(());
        };
        match rule.components() {
            [ty] => self.out.push(Insn::Op(ty.return_opcode())),
            _ => {
                // Components are on the stack; the method keeps its original return type.
                let Some(pack) = rule.to_original() else {
                    return Err(self.ctx.unsupported(format!(
                        "returning a value split by '{}'",
                        rule.id()
                    )));
                };
                self.out.push(pack.call_insn());
                self.out.push(insn.clone());
            }
        }
        Ok(())
    }

    /// The single reference type a classified value becomes, `None` when unclassified.
    fn single_reference(&self, value: ValueId, insn: &Insn) -> Result<Option<JvmType>> {
        let Some(rule) = self.ctx.env.rule(value) else {
            return Ok(None);
        };
        match rule.components() {
            [ty] if ty.is_reference() => Ok(Some(ty.clone())),
            _ => Err(self.ctx.unsupported(format!("{insn} of a value split by '{}'", rule.id()))),
        }
    }

    fn field(&mut self, index: usize, insn: &Insn) -> Result<()> {
        let Insn::Field {
            opcode,
            owner,
            name,
            desc,
        } = insn
        else {
            return Err(malformed_error!("{} is not a field access", insn));
        };
        let id = FieldId::new(owner.clone(), name.clone(), desc.clone());
        if let Some(component) = self.ctx.env.retyped.get(&id) {
            if self.ctx.env.duplicate {
                self.out
                    .push(Insn::field(*opcode, owner.clone(), name.clone(), component.clone()));
                return Ok(());
            }
            self.out
                .push(Insn::field(*opcode, owner.clone(), name.clone(), JvmType::object(OBJECT)));
            if matches!(opcode, Opcode::GETFIELD | Opcode::GETSTATIC) {
                self.out.push(type_insn(Opcode::CHECKCAST, component));
            }
            return Ok(());
        }
        self.passthrough(index, insn)
    }

    /// Emits `insn` unchanged after checking it touches no split value.
    pub(crate) fn passthrough(&mut self, index: usize, insn: &Insn) -> Result<()> {
        let env = self.ctx.env;
        let touched = self
            .ctx
            .inputs(index)
            .iter()
            .chain(&self.ctx.analysis.outputs[index])
            .find(|v| env.changes_shape(**v));
        if let Some(value) = touched {
            let rule = env.rule(*value).map_or("?", |r| r.id());
            return Err(self.ctx.unsupported(format!(
                "{insn} at {index} cannot handle {value} split by '{rule}'"
            )));
        }
        self.out.push(insn.clone());
        Ok(())
    }

    fn local_variables(&self) -> Result<Vec<LocalVariable>> {
        let method = self.ctx.method;
        if method.local_variables.is_empty() {
            return Ok(Vec::new());
        }
        let labels = method.label_positions()?;
        let mut entries = Vec::with_capacity(method.local_variables.len());
        for local in &method.local_variables {
            let Some(start) = labels.get(&local.start).copied() else {
                return Err(malformed_error!("Local '{}' starts at unplaced label {}", local.name, local.start));
            };
            let Some(frame) = self.ctx.analysis.frame(start) else {
                log::trace!("{}: dropping debug entry '{}' in dead code", self.ctx.name, local.name);
                continue;
            };
            let mut index = self.ctx.table(start)?.get(local.index);
            let rule = frame.local(local.index).and_then(|v| self.ctx.env.rule(v));
            match rule {
                None => entries.push(LocalVariable {
                    index,
                    ..local.clone()
                }),
                Some(rule) if rule.component_count() == 1 => entries.push(LocalVariable {
                    index,
                    desc: rule.components()[0].clone(),
                    ..local.clone()
                }),
                Some(rule) => {
                    for (c, ty) in rule.components().iter().enumerate() {
                        entries.push(LocalVariable {
                            name: format!("{}{}", local.name, rule.suffix(c)),
                            desc: ty.clone(),
                            start: local.start,
                            end: local.end,
                            index,
                        });
                        index += ty.size() as u16;
                    }
                }
            }
        }
        Ok(entries)
    }
}

pub(crate) fn type_insn(opcode: Opcode, ty: &JvmType) -> Insn {
    Insn::Type {
        opcode,
        desc: ty.internal_name().unwrap_or_else(|| ty.descriptor()),
    }
}
