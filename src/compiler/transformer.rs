//! Class-level driver.
//!
//! [`ClassTransformer`] runs the whole pipeline for one class: analysis of
//! every method against a shared lattice, freezing of signatures and field
//! types, the per-method rewrite and the compatibility shims.
//!
//! With [`TransformerConfig::duplicate_class`] the rewritten methods replace
//! their originals and the finished class is renamed; there are no shims and
//! no safety flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use typesplit::compiler::{ClassTransformer, TransformSession, TransformerConfig};
//!
//! let mut session = TransformSession::new();
//! let mut transformer = ClassTransformer::new(class, &registry, TransformerConfig::default())?;
//! transformer.analyze_all_methods()?;
//! transformer.finalize()?;
//! transformer.transform_all_methods(&mut session)?;
//! let class = transformer.into_class();
//! ```

use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{Analyzer, ClassScope, DeferredBindings, Lattice, MethodAnalysis},
    assembly::Insn,
    compiler::{
        context::{ClassEnv, MethodPlan, RewriteContext},
        emitters,
        mutator::Mutator,
        rename::Renaming,
        shim, TransformSession, TransformerConfig,
    },
    metadata::{
        class::{ClassBody, FieldBody},
        identity::{FieldId, MethodId},
        method::{AccessFlags, MethodBody},
        typesystem::{JvmType, MethodDescriptor, OBJECT},
    },
    rules::RuleRegistry,
    Error, Result,
};

/// Transforms the methods of one class.
pub struct ClassTransformer<'r> {
    registry: &'r RuleRegistry,
    config: TransformerConfig,
    hook: Option<MethodId>,
    class: ClassBody,
    declared: FxHashSet<MethodId>,
    lattice: Lattice,
    deferred: DeferredBindings,
    analyses: FxHashMap<MethodId, MethodAnalysis>,
    /// Analyzed methods in declaration order
    order: Vec<MethodId>,
    plans: FxHashMap<MethodId, MethodPlan>,
    retyped: FxHashMap<FieldId, JvmType>,
    generated: Vec<MethodBody>,
    done: FxHashSet<MethodId>,
    /// Original entry points that convert and forward
    instrumented: FxHashSet<MethodId>,
    finalized: bool,
}

impl<'r> ClassTransformer<'r> {
    /// Prepares `class` for transformation and registers a slot per declared field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured warning hook is invalid or
    /// the options cannot be combined.
    pub fn new(class: ClassBody, registry: &'r RuleRegistry, config: TransformerConfig) -> Result<Self> {
        config.validate()?;
        let hook = config.warning_hook()?;
        let mut lattice = Lattice::new(registry.hierarchy().clone());
        for field in &class.fields {
            lattice.add_field_slot(FieldId::new(class.name.clone(), field.name.clone(), field.desc.clone()));
        }
        let declared = class
            .methods
            .iter()
            .filter(|m| !m.name.starts_with('<'))
            .map(|m| MethodId::of_method(&class.name, m))
            .collect();

        Ok(Self {
            registry,
            config,
            hook,
            class,
            declared,
            lattice,
            deferred: DeferredBindings::new(),
            analyses: FxHashMap::default(),
            order: Vec::new(),
            plans: FxHashMap::default(),
            retyped: FxHashMap::default(),
            generated: Vec::new(),
            done: FxHashSet::default(),
            instrumented: FxHashSet::default(),
            finalized: false,
        })
    }

    /// Analyzes every method except constructors and static initializers.
    ///
    /// Bindings from earlier call sites are applied as soon as their callee
    /// has been analyzed.
    ///
    /// # Errors
    ///
    /// Fails on the first method that cannot be analyzed, tagged with its name.
    pub fn analyze_all_methods(&mut self) -> Result<()> {
        let start = Instant::now();
        for method in &self.class.methods {
            if method.name.starts_with('<') {
                continue;
            }
            let id = MethodId::of_method(&self.class.name, method);
            if self.analyses.contains_key(&id) {
                continue;
            }

            let method_start = Instant::now();
            let scope = ClassScope {
                owner: &self.class.name,
                declared: &self.declared,
                analyzed: &self.analyses,
                registry: self.registry,
            };
            let analysis = Analyzer::new(scope, method, &mut self.lattice, &mut self.deferred)
                .analyze()
                .map_err(|e| e.in_method(id.to_string()))?;
            for binding in self.deferred.take(&id) {
                binding
                    .apply(&mut self.lattice, &analysis)
                    .map_err(|e| e.in_method(id.to_string()))?;
            }
            log::debug!("Analyzed {} in {:?}", id, method_start.elapsed());

            self.analyses.insert(id.clone(), analysis);
            self.order.push(id);
        }

        if !self.deferred.is_empty() {
            log::debug!(
                "{}: {} callees with pending bindings were never analyzed",
                self.class.name,
                self.deferred.len()
            );
        }
        log::debug!(
            "Analyzed {} methods of {} in {:?}",
            self.order.len(),
            self.class.name,
            start.elapsed()
        );
        Ok(())
    }

    /// Freezes parameter and return classifications, decides which fields
    /// are retyped and computes the shape of every rewritten method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for a classified field that cannot be
    /// retyped, a split receiver or a split return value whose rule cannot
    /// rebuild the original type.
    pub fn finalize(&mut self) -> Result<()> {
        for analysis in self.analyses.values_mut() {
            analysis.finalize(&self.lattice);
        }

        self.retyped.clear();
        for (field, slot) in self.lattice.field_slots() {
            let Some(rule) = self.lattice.rule_of(slot) else {
                continue;
            };
            let rule = self.registry.rule(rule);
            let is_static = self
                .class
                .fields
                .iter()
                .find(|f| f.name == field.name && f.desc == field.desc)
                .is_some_and(|f| f.access.contains(AccessFlags::STATIC));
            match rule.components() {
                [ty] if ty.is_reference() && field.desc.is_reference() && !is_static => {
                    self.retyped.insert(field.clone(), ty.clone());
                }
                _ => {
                    return Err(unsupported_error!(
                        field,
                        "field split by '{}' must be an instance field holding one object",
                        rule.id()
                    ))
                }
            }
        }

        self.plans.clear();
        for id in &self.order {
            let plan = self.plan_for(&self.analyses[id])?;
            self.plans.insert(id.clone(), plan);
        }
        self.finalized = true;

        log::info!(
            "{}: {} of {} methods and {} fields classified",
            self.class.name,
            self.plans.values().filter(|p| p.transformed).count(),
            self.plans.len(),
            self.retyped.len()
        );
        Ok(())
    }

    fn plan_for(&self, analysis: &MethodAnalysis) -> Result<MethodPlan> {
        let id = &analysis.method;
        let rules = analysis.param_rules();
        let receiver = usize::from(!id.is_static());

        if let Some(Some(rule)) = rules.first().filter(|_| receiver == 1) {
            let rule = self.registry.rule(*rule);
            if !matches!(rule.components(), [ty] if ty.is_reference()) {
                return Err(unsupported_error!(id, "receiver cannot be split by '{}'", rule.id()));
            }
        }

        let mut params = Vec::with_capacity(id.desc.params().len());
        for (position, ty) in id.desc.params().iter().enumerate() {
            match rules.get(position + receiver).copied().flatten() {
                Some(rule) => params.extend(self.registry.rule(rule).components().iter().cloned()),
                None => params.push(ty.clone()),
            }
        }
        let mut packs_return = false;
        let ret = match analysis.ret_rule().map(|rule| self.registry.rule(rule)) {
            None => id.desc.ret().clone(),
            Some(rule) => match rule.components() {
                [ty] => ty.clone(),
                _ if rule.to_original().is_some() => {
                    packs_return = true;
                    id.desc.ret().clone()
                }
                _ => {
                    return Err(unsupported_error!(
                        id,
                        "cannot return a value split by '{}' without a to_original method",
                        rule.id()
                    ))
                }
            },
        };
        let desc = MethodDescriptor::new(params, ret);

        let transformed = if analysis.is_descriptor_only() {
            desc != id.desc
        } else {
            analysis.has_classified_values(&self.lattice)
        };
        let name = if transformed && desc == id.desc && !self.config.duplicate_class {
            format!("{}{}", id.name, self.config.transformed_suffix)
        } else {
            id.name.clone()
        };

        Ok(MethodPlan {
            original: id.clone(),
            name,
            desc,
            transformed,
            param_rules: rules.to_vec(),
            ret_rule: analysis.ret_rule(),
            packs_return,
        })
    }

    /// Rewrites one method and installs its shim.
    ///
    /// Returns `false` if the method needs no rewrite or was already rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a method that was not analyzed, and
    /// any rewrite error tagged with the method.
    pub fn transform_method(&mut self, id: &MethodId, session: &mut TransformSession) -> Result<bool> {
        if !self.finalized {
            self.finalize()?;
        }
        let plan = self
            .plans
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no analysis for {id}")))?;
        if !plan.transformed || self.done.contains(id) {
            return Ok(false);
        }
        let position = self
            .class
            .methods
            .iter()
            .position(|m| id.matches(&self.class.name, m))
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let start = Instant::now();
        let original = &self.class.methods[position];
        let rewritten = if original.is_abstract() {
            let mut copy = original.clone();
            copy.name = plan.name.clone();
            copy.desc = plan.desc.clone();
            copy
        } else {
            let env = ClassEnv {
                owner: &self.class.name,
                registry: self.registry,
                lattice: &self.lattice,
                plans: &self.plans,
                retyped: &self.retyped,
                duplicate: self.config.duplicate_class,
            };
            rewrite(env, original, &self.analyses[id], &plan).map_err(|e| e.in_method(id.to_string()))?
        };
        log::debug!("Transformed {} in {:?}", id, start.elapsed());

        session.record_transformed(plan.is_renamed());
        if self.config.duplicate_class {
            self.class.methods[position] = rewritten;
            self.done.insert(id.clone());
            return Ok(true);
        }
        let owner = self.class.name.clone();
        let safety = self.safety_field();
        let original = &mut self.class.methods[position];
        if !original.is_abstract() {
            if plan.is_renamed() {
                shim::install_dispatcher(&owner, original, &plan, safety.as_ref());
                session.record_shim();
            } else if self.config.add_safety && !original.access.contains(AccessFlags::SYNTHETIC) {
                let installed = shim::install_converter(
                    &owner,
                    original,
                    &plan,
                    self.registry,
                    safety.as_ref(),
                    self.hook.as_ref(),
                );
                if let Some(transformers) = installed {
                    session.record_shim();
                    self.instrumented.insert(id.clone());
                    for transformer in transformers {
                        let known = self
                            .generated
                            .iter()
                            .any(|m| m.name == transformer.name && m.desc == transformer.desc);
                        if !known {
                            log::debug!("Generated lambda transformer {}{}", transformer.name, transformer.desc);
                            self.generated.push(transformer);
                        }
                    }
                }
            }
        }

        self.generated.push(rewritten);
        self.done.insert(id.clone());
        Ok(true)
    }

    /// Rewrites every analyzed method that carries a classified value.
    ///
    /// Returns the number of rewritten methods.
    ///
    /// # Errors
    ///
    /// Fails on the first method that cannot be rewritten.
    pub fn transform_all_methods(&mut self, session: &mut TransformSession) -> Result<usize> {
        if !self.finalized {
            self.finalize()?;
        }
        let start = Instant::now();
        let ids = self.order.clone();
        let mut count = 0;
        for id in &ids {
            if self.transform_method(id, session)? {
                count += 1;
            }
        }
        let reported = self.report_untransformed_callers(session);
        log::info!(
            "{}: rewrote {} of {} methods in {:?}, {} calls into instrumented entry points",
            self.class.name,
            count,
            ids.len(),
            start.elapsed(),
            reported
        );
        Ok(count)
    }

    /// Reports every call from code that was not rewritten into an original
    /// entry point that now converts and forwards.
    ///
    /// Returns the number of such call sites.
    fn report_untransformed_callers(&self, session: &mut TransformSession) -> usize {
        if self.instrumented.is_empty() {
            return 0;
        }
        let mut sites = 0;
        for method in &self.class.methods {
            let id = MethodId::of_method(&self.class.name, method);
            if self.plans.get(&id).is_some_and(|plan| plan.transformed) {
                continue;
            }
            let caller = format!("{}#{}{}", self.class.name, method.name, method.desc);
            for callee in method.instructions.iter().filter_map(MethodId::from_insn) {
                if self.instrumented.contains(&callee) {
                    session.report_wrong_invocation(&callee.owner, &callee.name, &callee.desc.to_string(), &caller);
                    sites += 1;
                }
            }
        }
        sites
    }

    fn safety_field(&self) -> Option<FieldId> {
        if self.retyped.is_empty() || self.config.duplicate_class {
            None
        } else {
            Some(FieldId::new(
                self.class.name.clone(),
                self.config.safety_field.clone(),
                JvmType::Boolean,
            ))
        }
    }

    /// Adds a constructor that builds instances holding transformed field values.
    ///
    /// `code` is the constructor body for the parameters in `desc`, written
    /// against the component types of retyped fields. The generated
    /// constructor takes an extra trailing `int` that must equal
    /// [`shim::CONSTRUCTOR_MAGIC`] and sets the safety flag after the
    /// superclass constructor returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the class has no safety flag (no retyped
    /// fields, or a duplicated class), [`Error::Malformed`] if the descriptor
    /// is invalid or `code` never calls a superclass constructor.
    pub fn make_constructor(&mut self, desc: &str, code: Vec<Insn>) -> Result<()> {
        if !self.finalized {
            self.finalize()?;
        }
        let Some(safety) = self.safety_field() else {
            return Err(Error::Config(format!(
                "{} has no safety flag, a transformed constructor is not needed",
                self.class.name
            )));
        };
        let desc: MethodDescriptor = desc.parse()?;
        let mut constructor =
            shim::make_constructor(&self.class.name, self.class.super_name.as_deref(), &desc, code, &safety)?;
        let casts = shim::cast_retyped_fields(&mut constructor, &self.retyped, true);
        log::debug!(
            "{}: constructor {} added, {} field accesses retyped",
            self.class.name,
            constructor.desc,
            casts
        );
        self.generated.push(constructor);
        Ok(())
    }

    /// Analysis of a method, once analyzed.
    #[must_use]
    pub fn analysis(&self, id: &MethodId) -> Option<&MethodAnalysis> {
        self.analyses.get(id)
    }

    /// Plan of a method, once finalized.
    #[must_use]
    pub fn plan(&self, id: &MethodId) -> Option<&MethodPlan> {
        self.plans.get(id)
    }

    /// Retyped fields and the component type they hold.
    #[must_use]
    pub fn retyped_fields(&self) -> &FxHashMap<FieldId, JvmType> {
        &self.retyped
    }

    /// The shared lattice.
    #[must_use]
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// The class as it currently stands, without the rewritten copies.
    #[must_use]
    pub fn class(&self) -> &ClassBody {
        &self.class
    }

    /// Field and method classifications, one per line.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("class {}", self.class.name)];

        let mut fields: Vec<_> = self.lattice.field_slots().collect();
        fields.sort_by_key(|(field, _)| field.to_string());
        for (field, slot) in fields {
            let rule = self
                .lattice
                .rule_of(slot)
                .map_or("-", |r| self.registry.rule(r).id());
            lines.push(format!("  field {field}: {rule}"));
        }

        for id in &self.order {
            let mut line = format!("  {}", self.analyses[id].describe(self.registry));
            if let Some(plan) = self.plans.get(id).filter(|p| p.transformed) {
                line.push_str(&format!(" => {}{}", plan.name, plan.desc));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    /// Finishes the class: retyped fields become `Object`, the safety flag is
    /// declared and cleared by every constructor, untransformed code casts its
    /// field reads, and the rewritten methods are appended.
    ///
    /// A duplicated class instead declares retyped fields with their
    /// component type and is renamed.
    #[must_use]
    pub fn into_class(mut self) -> ClassBody {
        if self.config.duplicate_class {
            return self.into_duplicate();
        }
        if let Some(safety) = self.safety_field() {
            let owner = self.class.name.clone();
            for field in &mut self.class.fields {
                let id = FieldId::new(owner.clone(), field.name.clone(), field.desc.clone());
                if self.retyped.contains_key(&id) {
                    field.desc = JvmType::object(OBJECT);
                }
            }
            self.class.fields.push(FieldBody::new(
                AccessFlags::PRIVATE | AccessFlags::FINAL | AccessFlags::SYNTHETIC,
                safety.name.clone(),
                JvmType::Boolean,
            ));

            let mut casts = 0;
            for method in &mut self.class.methods {
                if method.name == "<init>" {
                    shim::clear_flag_in_constructor(&owner, method, &safety);
                }
                casts += shim::cast_retyped_fields(method, &self.retyped, false);
            }
            log::debug!("{}: {} field accesses cast in untransformed code", owner, casts);
        }

        log::info!(
            "{}: {} methods added",
            self.class.name,
            self.generated.len()
        );
        self.class.methods.append(&mut self.generated);
        self.class
    }

    fn into_duplicate(mut self) -> ClassBody {
        let owner = self.class.name.clone();
        for field in &mut self.class.fields {
            let id = FieldId::new(owner.clone(), field.name.clone(), field.desc.clone());
            if let Some(component) = self.retyped.get(&id) {
                field.desc = component.clone();
            }
        }
        for method in &mut self.class.methods {
            for insn in &mut method.instructions {
                let Some(component) = FieldId::from_insn(insn).and_then(|f| self.retyped.get(&f)) else {
                    continue;
                };
                if let Insn::Field { desc, .. } = insn {
                    *desc = component.clone();
                }
            }
        }

        let renamed = format!("{}{}", owner, self.config.duplicate_suffix);
        Renaming {
            from: &owner,
            to: &renamed,
        }
        .apply(&mut self.class);
        log::info!("{}: duplicated as {}, {} methods rewritten", owner, renamed, self.done.len());
        self.class
    }
}

fn rewrite(env: ClassEnv<'_>, method: &MethodBody, analysis: &MethodAnalysis, plan: &MethodPlan) -> Result<MethodBody> {
    let mut ctx = RewriteContext::new(env, method, analysis)?;
    ctx.verify_layout()?;
    let passes = emitters::detect_removed(&mut ctx)?;
    emitters::build_generators(&mut ctx)?;
    log::trace!(
        "{}: removal settled after {} passes, {} generators",
        ctx.name,
        passes,
        ctx.generators.len()
    );

    let mut body = Mutator::new(&mut ctx).run()?;
    body.name = plan.name.clone();
    body.desc = plan.desc.clone();
    Ok(body)
}
