//! Rewriting of method calls, array instructions and lambda call sites.
//!
//! Array instructions on split arrays are rewritten like calls: the registry
//! describes them as pseudo methods whose templates repeat the instruction
//! once per component array.

use crate::{
    analysis::ValueId,
    assembly::Insn,
    compiler::{emitters::Generator, mutator::Mutator},
    metadata::{
        constant::{BsmArg, Handle, HandleKind},
        identity::{CallKind, MethodId},
        typesystem::{JvmType, MethodDescriptor},
    },
    rules::Replacement,
    Result,
};

impl Mutator<'_, '_> {
    pub(crate) fn call(&mut self, index: usize, insn: &Insn) -> Result<()> {
        let Some(callee) = MethodId::from_insn(insn) else {
            return Err(malformed_error!("{} is not a method call", insn));
        };
        if let Some(replacement) = self.ctx.accepted[index].and_then(|spec| spec.replacement.as_ref()) {
            if replacement.changes_parameters() {
                return self.template(index, replacement);
            }
            if let Some(ret) = self.returned(index, &callee) {
                if self.ctx.env.shape(ret).len() > 1 {
                    return Err(self.ctx.unsupported(format!(
                        "direct replacement of {callee} cannot produce a split value"
                    )));
                }
            }
            self.restore_inputs(index)?;
            for code in &replacement.expansions {
                self.out.extend(code.iter().cloned());
            }
            return Ok(());
        }

        self.restore_inputs(index)?;
        if callee.owner == self.ctx.env.owner {
            if let Some(plan) = self.ctx.env.plans.get(&callee).filter(|plan| plan.transformed) {
                let Insn::Method {
                    opcode, interface, ..
                } = insn
                else {
                    return Err(malformed_error!("{} is not a method call", insn));
                };
                self.out.push(Insn::Method {
                    opcode: *opcode,
                    owner: callee.owner.clone(),
                    name: plan.name.clone(),
                    desc: plan.desc.clone(),
                    interface: *interface,
                });
                if plan.packs_return {
                    self.unpack_return(index, &callee)?;
                }
                return Ok(());
            }
        }
        self.retarget(index, insn, &callee)
    }

    pub(crate) fn array_access(&mut self, index: usize, insn: &Insn) -> Result<()> {
        match self.ctx.accepted[index].and_then(|spec| spec.replacement.as_ref()) {
            Some(replacement) if replacement.changes_parameters() => self.template(index, replacement),
            _ => {
                self.restore_inputs(index)?;
                self.passthrough(index, insn)
            }
        }
    }

    fn returned(&self, index: usize, callee: &MethodId) -> Option<ValueId> {
        match callee.desc.ret() {
            JvmType::Void => None,
            _ => self.ctx.analysis.outputs[index].first().copied(),
        }
    }

    /// Splits the packed value a rewritten callee returned back into its
    /// components through a scratch local.
    fn unpack_return(&mut self, index: usize, callee: &MethodId) -> Result<()> {
        let env = self.ctx.env;
        let Some(rule) = self.returned(index, callee).and_then(|value| env.rule(value)) else {
            return Err(malformed_error!("{} returns no split value at {}", callee, index));
        };
        let Some(extractors) = rule.from_original() else {
            return Err(self.ctx.unsupported(format!(
                "{callee} returns a packed '{}' value that cannot be unpacked",
                rule.id()
            )));
        };
        let ty = callee.desc.ret();
        let slot = self.ctx.allocator.allocate(index, index, ty);
        self.out.push(Insn::var(ty.store_opcode(), slot));
        for extractor in extractors {
            self.out.push(Insn::var(ty.load_opcode(), slot));
            self.out.push(extractor.call_insn());
        }
        Ok(())
    }

    /// Loads the requested components of every argument ahead of each block.
    fn template(&mut self, index: usize, replacement: &Replacement) -> Result<()> {
        let generators = self
            .ctx
            .inputs(index)
            .iter()
            .map(|value| self.ctx.generator(*value).cloned())
            .collect::<Result<Vec<Generator>>>()?;
        let Some(indices) = &replacement.indices else {
            return Err(malformed_error!("Template without indices at {}", index));
        };

        for (e, code) in replacement.expansions.iter().enumerate() {
            let per_param = indices
                .get(e)
                .ok_or_else(|| malformed_error!("No indices for expansion {} at {}", e, index))?;
            self.load_components(&generators, per_param)?;
            self.out.extend(code.iter().cloned());
        }
        if let (Some(code), Some(per_param)) = (&replacement.finalizer, &replacement.finalizer_indices) {
            self.load_components(&generators, per_param)?;
            self.out.extend(code.iter().cloned());
        }
        Ok(())
    }

    fn load_components(&mut self, generators: &[Generator], per_param: &[Vec<usize>]) -> Result<()> {
        for (param, components) in per_param.iter().enumerate() {
            let generator = generators
                .get(param)
                .ok_or_else(|| malformed_error!("Template references argument {} of {}", param, generators.len()))?;
            for component in components {
                generator.emit_component(*component, &mut self.out)?;
            }
        }
        Ok(())
    }

    /// Rewrites a call without a specification so the split values fit its
    /// descriptor: arguments expand in place, the return and receiver may
    /// only change type.
    fn retarget(&mut self, index: usize, insn: &Insn, callee: &MethodId) -> Result<()> {
        let Insn::Method {
            opcode,
            owner,
            name,
            interface,
            ..
        } = insn
        else {
            return Err(malformed_error!("{} is not a method call", insn));
        };
        let env = self.ctx.env;
        let inputs = self.ctx.inputs(index);
        let receiver = usize::from(!callee.is_static());
        let (receiver_value, args) = inputs.split_at(receiver.min(inputs.len()));

        let touched = inputs.iter().any(|v| env.rule(*v).is_some())
            || self
                .returned(index, callee)
                .is_some_and(|v| env.rule(v).is_some());
        if !touched {
            self.out.push(insn.clone());
            return Ok(());
        }

        let ret = match self.returned(index, callee) {
            Some(value) => match env.shape(value).as_slice() {
                _ if env.rule(value).is_none() => callee.desc.ret().clone(),
                [ty] => ty.clone(),
                _ => {
                    return Err(self.ctx.unsupported(format!("{callee} cannot return a split value")))
                }
            },
            None => callee.desc.ret().clone(),
        };

        let mut new_owner = owner.clone();
        if let Some(value) = receiver_value.first() {
            if env.rule(*value).is_some() {
                match env.shape(*value).as_slice() {
                    [ty] if ty.is_reference() => {
                        if let Some(internal) = ty.internal_name() {
                            new_owner = internal;
                        }
                    }
                    _ => {
                        return Err(self.ctx.unsupported(format!(
                            "receiver of {callee} must stay a single object"
                        )))
                    }
                }
            }
        }

        let desc = MethodDescriptor::new(env.expand(args, callee.desc.params()), ret);
        self.out.push(Insn::Method {
            opcode: *opcode,
            owner: new_owner,
            name: name.clone(),
            desc,
            interface: *interface,
        });
        Ok(())
    }

    /// Captured arguments expand into the call site descriptor; a handle to
    /// a rewritten method of this class is pointed at the rewritten method.
    pub(crate) fn invoke_dynamic(&mut self, index: usize, insn: &Insn) -> Result<()> {
        let Insn::InvokeDynamic {
            name,
            desc,
            bootstrap,
            args,
        } = insn
        else {
            return Err(malformed_error!("{} is not an invokedynamic", insn));
        };
        let env = self.ctx.env;
        let captured = self.ctx.inputs(index);
        if let Some(site) = self.ctx.analysis.outputs[index].first() {
            if env.rule(*site).is_some() {
                return Err(self.ctx.unsupported(format!("call site {name} cannot produce a classified value")));
            }
        }

        let mut new_args = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                BsmArg::Handle(handle) if handle.owner == env.owner => {
                    new_args.push(BsmArg::Handle(self.retarget_handle(handle, captured.len())?));
                }
                other => new_args.push(other.clone()),
            }
        }

        self.out.push(Insn::InvokeDynamic {
            name: name.clone(),
            desc: MethodDescriptor::new(env.expand(captured, desc.params()), desc.ret().clone()),
            bootstrap: bootstrap.clone(),
            args: new_args,
        });
        Ok(())
    }

    fn retarget_handle(&self, handle: &Handle, captured: usize) -> Result<Handle> {
        let kind = match handle.kind {
            HandleKind::InvokeStatic => CallKind::Static,
            HandleKind::InvokeVirtual => CallKind::Virtual,
            HandleKind::InvokeSpecial | HandleKind::NewInvokeSpecial => CallKind::Special,
            HandleKind::InvokeInterface => CallKind::Interface,
            _ => return Ok(handle.clone()),
        };
        let target = MethodId::new(kind, handle.owner.clone(), handle.name.clone(), handle.desc.parse()?);
        let Some(plan) = self.ctx.env.plans.get(&target).filter(|plan| plan.transformed) else {
            return Ok(handle.clone());
        };

        let split_tail = plan.param_rules.iter().skip(captured).any(Option::is_some);
        if split_tail || plan.ret_rule.is_some() {
            return Err(self.ctx.unsupported(format!(
                "lambda {target} takes or returns split values it does not capture"
            )));
        }
        Ok(Handle {
            name: plan.name.clone(),
            desc: plan.desc.to_string(),
            ..handle.clone()
        })
    }
}
