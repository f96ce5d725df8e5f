//! Emitter synthesis.
//!
//! Multi-component comparisons and parameter-rearranging templates need the
//! components of their operands in an order the operand stack cannot provide.
//! Their operands are *removed*: the producing instructions stop leaving the
//! value on the stack, and a [`Generator`] re-materializes any component on
//! demand right where it is consumed.
//!
//! Removal is decided by a fixed point over all instructions. A producer that
//! is a plain local load or a literal is deleted and replayed by its
//! generator; any other producer keeps running and its result is parked in
//! scratch locals.

use crate::{
    analysis::ValueId,
    assembly::{Insn, Opcode},
    compiler::RewriteContext,
    Error, Result,
};

/// Code that re-materializes one removed value, one block per component.
#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    components: Vec<Vec<Insn>>,
}

impl Generator {
    /// Creates a generator from per-component code.
    #[must_use]
    pub fn new(components: Vec<Vec<Insn>>) -> Self {
        Self { components }
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` for a generator without components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Appends the code of component `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the component does not exist.
    pub fn emit_component(&self, index: usize, out: &mut Vec<Insn>) -> Result<()> {
        let code = self.components.get(index).ok_or_else(|| {
            malformed_error!("Component {} requested from a {}-component value", index, self.len())
        })?;
        out.extend(code.iter().cloned());
        Ok(())
    }

    /// Appends every component in order.
    pub fn emit(&self, out: &mut Vec<Insn>) {
        for code in &self.components {
            out.extend(code.iter().cloned());
        }
    }
}

/// Runs the removal fixed point.
///
/// Returns the number of passes it took.
pub(crate) fn detect_removed(ctx: &mut RewriteContext<'_>) -> Result<usize> {
    let count = ctx.method.instructions.len();
    let mut passes = 0;
    loop {
        passes += 1;
        let mut changed = false;
        for index in 0..count {
            if !ctx.analysis.is_reachable(index) {
                continue;
            }
            let inputs = ctx.inputs(index);

            let rearranged = ctx.accepted[index]
                .and_then(|spec| spec.replacement.as_ref())
                .is_some_and(|replacement| replacement.changes_parameters());
            let split_compare = is_compare(&ctx.method.instructions[index])
                && inputs
                    .first()
                    .and_then(|v| ctx.env.rule(*v))
                    .is_some_and(|rule| rule.component_count() > 1);

            let mut remove_all = rearranged || split_compare;
            for value in inputs {
                remove_all |= ctx.is_removed(*value, index)?;
            }
            if remove_all {
                for value in inputs {
                    changed |= ctx.mark_removed(*value);
                }
            }
        }
        if !changed {
            return Ok(passes);
        }
    }
}

fn is_compare(insn: &Insn) -> bool {
    insn.opcode()
        .is_some_and(|op| op.is_equality_branch() || op.is_three_way_compare())
}

/// Builds a generator for every removed value that is consumed somewhere.
pub(crate) fn build_generators(ctx: &mut RewriteContext<'_>) -> Result<()> {
    for index in 0..ctx.method.instructions.len() {
        if !ctx.analysis.is_reachable(index) {
            continue;
        }
        for value in ctx.inputs(index) {
            if !ctx.is_removed(*value, index)? {
                continue;
            }
            let built = ctx
                .env
                .lattice
                .value(*value)
                .first_producer()
                .is_some_and(|p| ctx.generators.contains_key(&p));
            if !built {
                build(ctx, *value)?;
            }
        }
    }
    Ok(())
}

fn build(ctx: &mut RewriteContext<'_>, value: ValueId) -> Result<()> {
    let tracked = ctx.env.lattice.value(value);
    let producers: Vec<usize> = tracked.producers.iter().copied().collect();
    if producers.is_empty() {
        return Err(ctx.unsupported(format!("{value} has no producing instruction to remove")));
    }

    if let [producer] = producers[..] {
        if let Some(generator) = replay(ctx, value, producer)? {
            ctx.deleted[producer] = true;
            ctx.generators.insert(producer, generator);
            return Ok(());
        }
    }

    let generator = park(ctx, value, &producers)?;
    for producer in producers {
        ctx.generators.insert(producer, generator.clone());
    }
    Ok(())
}

/// A generator replaying a deleted load or literal, `None` if the producer
/// has to keep running.
fn replay(ctx: &RewriteContext<'_>, value: ValueId, producer: usize) -> Result<Option<Generator>> {
    let shape = ctx.env.shape(value);
    match &ctx.method.instructions[producer] {
        Insn::Var { opcode, var } if opcode.is_var_load() => {
            let last = ctx.env.lattice.value(value).last_consumer().unwrap_or(producer);
            if ctx.written_between(*var, producer, last) {
                return Ok(None);
            }
            let mut slot = ctx.table(producer)?.get(*var);
            let components = shape
                .iter()
                .map(|ty| {
                    let load = vec![Insn::var(ty.load_opcode(), slot)];
                    slot += ty.size() as u16;
                    load
                })
                .collect();
            Ok(Some(Generator::new(components)))
        }
        insn => {
            let Some(constant) = insn.constant() else {
                return Ok(None);
            };
            let components = match ctx.env.rule(value) {
                Some(rule) => match rule.constant_replacement(&constant) {
                    Some(code) => code.to_vec(),
                    None if rule.component_count() == 1 => {
                        vec![vec![Insn::push(&constant.coerce(&rule.components()[0]))]]
                    }
                    None => {
                        return Err(Error::MissingConstant {
                            rule: rule.id().to_string(),
                            constant: constant.to_string(),
                        })
                    }
                },
                None => vec![vec![insn.clone()]],
            };
            Ok(Some(Generator::new(components)))
        }
    }
}

/// Stores the value into scratch locals right after each producer and
/// returns loads of those locals.
fn park(ctx: &mut RewriteContext<'_>, value: ValueId, producers: &[usize]) -> Result<Generator> {
    for producer in producers {
        let insn = &ctx.method.instructions[*producer];
        let shuffles = matches!(
            insn.opcode(),
            Some(
                Opcode::DUP
                    | Opcode::DUP_X1
                    | Opcode::DUP_X2
                    | Opcode::DUP2
                    | Opcode::DUP2_X1
                    | Opcode::DUP2_X2
                    | Opcode::SWAP
            )
        );
        if shuffles || ctx.analysis.outputs[*producer].len() != 1 {
            return Err(ctx.unsupported(format!(
                "cannot take the value produced by {insn} off the stack"
            )));
        }
    }

    let tracked = ctx.env.lattice.value(value);
    let min = producers.iter().copied().min().unwrap_or(0);
    let max = tracked.last_consumer().unwrap_or(min).max(min);
    let shape = ctx.env.shape(value);

    let slots: Vec<u16> = shape
        .iter()
        .map(|ty| ctx.allocator.allocate(min, max, ty))
        .collect();
    let stores: Vec<Insn> = shape
        .iter()
        .zip(&slots)
        .rev()
        .map(|(ty, slot)| Insn::var(ty.store_opcode(), *slot))
        .collect();
    for producer in producers {
        ctx.after[*producer].extend(stores.iter().cloned());
    }

    log::trace!("{}: parked {} in slots {:?}", ctx.name, value, slots);
    Ok(Generator::new(
        shape
            .iter()
            .zip(slots)
            .map(|(ty, slot)| vec![Insn::var(ty.load_opcode(), slot)])
            .collect(),
    ))
}
