//! The rule registry.
//!
//! [`RuleRegistry`] is the read-only catalog shared by every method of a
//! transformed type: the split rules, the call-site specifications (looked up
//! through the type hierarchy so overriding and inherited methods share one
//! entry), and per-class local variable type hints.
//!
//! Array instructions are looked up like calls, through the pseudo methods
//! of [`MethodId::array_op`], so the array variants of a rule carry ordinary
//! specifications for element access, length and allocation.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::{
    assembly::{Insn, Opcode},
    metadata::{
        ancestor::AncestorMap,
        hierarchy::HierarchyTree,
        identity::{CallKind, MethodId},
        typesystem::{JvmType, MethodDescriptor},
    },
    rules::{
        CallSpec, Functional, Minimum, Replacement, Requirement, RuleId, Subtype, TransformRule,
        MAX_ARRAY_DIMS,
    },
    Error, Result,
};

/// Seed classifications of local slots, keyed by method then slot.
pub type TypeHints = FxHashMap<MethodId, FxHashMap<u16, RuleId>>;

/// Catalog of split rules and call-site specifications.
///
/// # Example
///
/// ```rust
/// use typesplit::rules::{RuleRegistry, TransformRule};
/// use typesplit::metadata::{hierarchy::HierarchyTree, typesystem::JvmType};
///
/// let mut tree = HierarchyTree::new();
/// tree.add_node("java/lang/Object", None)?;
/// let mut registry = RuleRegistry::new(tree);
///
/// let rule = TransformRule::new("pos", JvmType::Long, vec![JvmType::Int; 3])?
///     .with_to_original("s a/Pos#asLong (III)J".parse()?);
/// let id = registry.add_rule(rule)?;
///
/// assert_eq!(registry.rule_id("pos"), Some(id));
/// assert_eq!(registry.call_specs(&"s a/Pos#asLong (III)J".parse()?).len(), 1);
/// # Ok::<(), typesplit::Error>(())
/// ```
#[derive(Debug)]
pub struct RuleRegistry {
    rules: Vec<TransformRule>,
    by_name: FxHashMap<String, RuleId>,
    hierarchy: Rc<HierarchyTree>,
    call_specs: AncestorMap<MethodId, Vec<CallSpec>>,
    type_hints: FxHashMap<String, TypeHints>,
}

impl RuleRegistry {
    /// Creates an empty registry over `hierarchy`.
    #[must_use]
    pub fn new(hierarchy: HierarchyTree) -> Self {
        let hierarchy = Rc::new(hierarchy);
        Self {
            rules: Vec::new(),
            by_name: FxHashMap::default(),
            call_specs: AncestorMap::new(Rc::clone(&hierarchy)),
            hierarchy,
            type_hints: FxHashMap::default(),
        }
    }

    /// Registers a rule, its array, predicate and consumer variants, and the
    /// call specifications implied by its conversion methods.
    ///
    /// Returns the id of `rule` itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a rule or variant with the same id exists.
    pub fn add_rule(&mut self, rule: TransformRule) -> Result<RuleId> {
        let id = self.insert(rule)?;
        let specs = Self::conversion_specs(id, self.rule(id));
        for spec in specs {
            self.add_call_spec(spec)?;
        }

        let mut element = id;
        for dims in 1..=MAX_ARRAY_DIMS {
            let variant = TransformRule::array_of(id, self.rule(id), dims);
            let array = self.insert(variant)?;
            for spec in self.array_specs(array, element) {
                self.add_call_spec(spec)?;
            }
            element = array;
        }

        for kind in [Functional::Predicate, Functional::Consumer] {
            let Some(variant) = TransformRule::functional_of(id, self.rule(id), kind) else {
                continue;
            };
            let functional = self.insert(variant)?;
            let spec = self.functional_spec(functional, id, kind);
            self.add_call_spec(spec)?;
        }
        Ok(id)
    }

    fn insert(&mut self, rule: TransformRule) -> Result<RuleId> {
        if self.by_name.contains_key(rule.id()) {
            return Err(Error::Config(format!("duplicate rule id '{}'", rule.id())));
        }
        let id = RuleId(u32::try_from(self.rules.len()).map_err(|_| {
            Error::Config("too many rules".to_string())
        })?);
        self.by_name.insert(rule.id().to_string(), id);
        self.rules.push(rule);
        Ok(id)
    }

    /// Specs for the array instructions on values of the array variant
    /// `array`, whose elements carry `element`.
    ///
    /// Every spec is a template applying the instruction once per component,
    /// and applies once either the array or its element is classified.
    fn array_specs(&self, array: RuleId, element: RuleId) -> Vec<CallSpec> {
        let rule = self.rule(array);
        let source = rule.source();
        let Some(source_element) = source.element() else {
            return Vec::new();
        };
        let elements: Vec<JvmType> = rule
            .components()
            .iter()
            .filter_map(|c| c.element().cloned())
            .collect();
        let count = elements.len();
        let mut specs = Vec::new();

        let mut add = |opcode: Opcode, ret, params: Vec<Option<RuleId>>, minimums, replacement| {
            if let Some(method) = MethodId::array_op(opcode, source) {
                specs.push(CallSpec {
                    method,
                    ret,
                    params,
                    minimums: Some(minimums),
                    replacement: Some(replacement),
                });
            }
        };
        let on_array = |arity: usize| Minimum {
            ret: Requirement::Any,
            params: (0..arity)
                .map(|p| if p == 0 { Requirement::Rule(array) } else { Requirement::Any })
                .collect(),
        };

        add(
            source_element.array_load_opcode(),
            Some(element),
            vec![Some(array), None],
            vec![
                on_array(2),
                Minimum {
                    ret: Requirement::Rule(element),
                    params: vec![Requirement::Any; 2],
                },
            ],
            Replacement::template(
                elements.iter().map(|e| vec![Insn::Op(e.array_load_opcode())]).collect(),
                (0..count).map(|c| vec![vec![c], vec![0]]).collect(),
            ),
        );
        add(
            source_element.array_store_opcode(),
            None,
            vec![Some(array), None, Some(element)],
            vec![
                on_array(3),
                Minimum {
                    ret: Requirement::Any,
                    params: vec![Requirement::Any, Requirement::Any, Requirement::Rule(element)],
                },
            ],
            Replacement::template(
                elements.iter().map(|e| vec![Insn::Op(e.array_store_opcode())]).collect(),
                (0..count).map(|c| vec![vec![c], vec![0], vec![c]]).collect(),
            ),
        );
        add(
            Opcode::ARRAYLENGTH,
            None,
            vec![Some(array)],
            vec![on_array(1)],
            Replacement::template(vec![vec![Insn::Op(Opcode::ARRAYLENGTH)]], vec![vec![vec![0]]]),
        );
        let allocate = if source_element.newarray_code().is_some() {
            Opcode::NEWARRAY
        } else {
            Opcode::ANEWARRAY
        };
        add(
            allocate,
            Some(array),
            vec![None],
            vec![Minimum {
                ret: Requirement::Rule(array),
                params: vec![Requirement::Any],
            }],
            Replacement::template(
                elements.iter().map(|e| vec![Insn::new_array(e)]).collect(),
                vec![vec![vec![0]]; count],
            ),
        );
        specs
    }

    /// Spec for the single abstract method of a predicate or consumer
    /// variant: the call moves to the transformed interface and takes the
    /// components of its argument.
    fn functional_spec(&self, functional: RuleId, base: RuleId, kind: Functional) -> CallSpec {
        let variant = self.rule(functional);
        let rule = self.rule(base);
        let owner = |ty: &JvmType| ty.internal_name().unwrap_or_else(|| ty.descriptor());
        let method = MethodId::new(
            CallKind::Interface,
            owner(variant.source()),
            kind.method_name(),
            MethodDescriptor::new(vec![rule.source().clone()], kind.return_type()),
        );
        let replaced = MethodId::new(
            CallKind::Interface,
            owner(&variant.components()[0]),
            kind.method_name(),
            MethodDescriptor::new(rule.components().to_vec(), kind.return_type()),
        );
        CallSpec {
            method,
            ret: None,
            params: vec![Some(functional), Some(base)],
            minimums: Some(vec![
                Minimum {
                    ret: Requirement::Any,
                    params: vec![Requirement::Rule(functional), Requirement::Any],
                },
                Minimum {
                    ret: Requirement::Any,
                    params: vec![Requirement::Any, Requirement::Rule(base)],
                },
            ]),
            replacement: Some(Replacement::direct(vec![replaced.call_insn()])),
        }
    }

    /// Call specs for a rule's conversion methods.
    ///
    /// Extraction method `i` consumes a classified value and is replaced by its
    /// component `i`. The constructor method returns a classified value built
    /// directly from its arguments, one argument per component.
    fn conversion_specs(id: RuleId, rule: &TransformRule) -> Vec<CallSpec> {
        let mut specs = Vec::new();

        if let Some(extractors) = rule.from_original() {
            for (component, method) in extractors.iter().enumerate() {
                let arity = method.all_params().len();
                let mut params = vec![None; arity];
                let mut indices = vec![Vec::new(); arity];
                if let Some(first) = params.first_mut() {
                    *first = Some(id);
                    indices[0] = vec![component];
                }
                specs.push(CallSpec {
                    method: method.clone(),
                    ret: None,
                    params,
                    minimums: None,
                    replacement: Some(Replacement::template(vec![Vec::new()], vec![indices])),
                });
            }
        }

        if let Some(constructor) = rule.to_original() {
            let arity = constructor.all_params().len();
            let replacement = if arity == rule.component_count() {
                let indices = (0..arity)
                    .map(|component| {
                        (0..arity)
                            .map(|param| if param == component { vec![0] } else { Vec::new() })
                            .collect()
                    })
                    .collect();
                Some(Replacement::template(vec![Vec::new(); arity], indices))
            } else {
                log::warn!(
                    "{} takes {} arguments but rule '{}' has {} components, calls keep their descriptor",
                    constructor,
                    arity,
                    rule.id(),
                    rule.component_count()
                );
                None
            };
            specs.push(CallSpec {
                method: constructor.clone(),
                ret: Some(id),
                params: vec![None; arity],
                minimums: None,
                replacement,
            });
        }

        specs
    }

    /// Registers a call-site specification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the parameter count does not match the
    /// method (receiver included) or a rule id is unknown.
    pub fn add_call_spec(&mut self, spec: CallSpec) -> Result<()> {
        let arity = spec.method.all_params().len();
        if spec.params.len() != arity {
            return Err(Error::Config(format!(
                "{} takes {} arguments, spec lists {}",
                spec.method,
                arity,
                spec.params.len()
            )));
        }
        let known = self.rules.len();
        if spec
            .ret
            .iter()
            .chain(spec.params.iter().flatten())
            .any(|rule| rule.index() >= known)
        {
            return Err(Error::Config(format!("{} references an unknown rule", spec.method)));
        }
        if let Some(minimums) = &spec.minimums {
            if minimums.iter().any(|m| m.params.len() != arity) {
                return Err(Error::Config(format!(
                    "minimum of {} must list {} parameters",
                    spec.method, arity
                )));
            }
        }
        self.call_specs
            .get_or_insert_with(spec.method.clone(), Vec::new)
            .push(spec);
        Ok(())
    }

    /// Seeds local `slot` of `method` in `class` with `rule`.
    pub fn add_type_hint(&mut self, class: &str, method: MethodId, slot: u16, rule: RuleId) {
        self.type_hints
            .entry(class.to_string())
            .or_default()
            .entry(method)
            .or_default()
            .insert(slot, rule);
    }

    /// The rule behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> &TransformRule {
        &self.rules[id.index()]
    }

    /// Looks a rule up by its textual id.
    #[must_use]
    pub fn rule_id(&self, name: &str) -> Option<RuleId> {
        self.by_name.get(name).copied()
    }

    /// The array variant of `base` with `dims` dimensions.
    #[must_use]
    pub fn array_rule(&self, base: RuleId, dims: u8) -> Option<RuleId> {
        let rule = self.rules.get(base.index())?;
        self.rule_id(&format!("{}{}", rule.id(), "[]".repeat(usize::from(dims))))
            .filter(|id| self.rule(*id).subtype() == Subtype::Array { base, dims })
    }

    /// All rules with their ids.
    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &TransformRule)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (RuleId(i as u32), rule))
    }

    /// Specifications for calls to `method`, inherited ones included.
    #[must_use]
    pub fn call_specs(&self, method: &MethodId) -> &[CallSpec] {
        self.call_specs.get(method).map_or(&[], Vec::as_slice)
    }

    /// Type hints declared for `class`.
    #[must_use]
    pub fn type_hints(&self, class: &str) -> Option<&TypeHints> {
        self.type_hints.get(class)
    }

    /// The type hierarchy.
    #[must_use]
    pub fn hierarchy(&self) -> &Rc<HierarchyTree> {
        &self.hierarchy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::typesystem::JvmType, rules::CheckOutcome};

    fn registry() -> RuleRegistry {
        let mut tree = HierarchyTree::new();
        tree.add_node("java/lang/Object", None).unwrap();
        tree.add_node("a/Base", Some("java/lang/Object")).unwrap();
        tree.add_node("a/Derived", Some("a/Base")).unwrap();
        RuleRegistry::new(tree)
    }

    fn pos_rule() -> TransformRule {
        TransformRule::new("pos", JvmType::Long, vec![JvmType::Int; 3])
            .unwrap()
            .with_from_original(vec![
                "s a/Pos#getX (J)I".parse().unwrap(),
                "s a/Pos#getY (J)I".parse().unwrap(),
                "s a/Pos#getZ (J)I".parse().unwrap(),
            ])
            .unwrap()
            .with_to_original("s a/Pos#asLong (III)J".parse().unwrap())
    }

    #[test]
    fn test_conversion_specs() {
        let mut registry = registry();
        let id = registry.add_rule(pos_rule()).unwrap();

        let get_y = &registry.call_specs(&"s a/Pos#getY (J)I".parse().unwrap())[0];
        assert_eq!(get_y.params, vec![Some(id)]);
        let replacement = get_y.replacement.as_ref().unwrap();
        assert_eq!(replacement.indices, Some(vec![vec![vec![1]]]));

        let as_long = &registry.call_specs(&"s a/Pos#asLong (III)J".parse().unwrap())[0];
        assert_eq!(as_long.ret, Some(id));
        let indices = as_long.replacement.as_ref().unwrap().indices.clone().unwrap();
        assert_eq!(indices[2], vec![vec![], vec![], vec![0]]);
        assert_eq!(as_long.check(None, &[None, None, None]), CheckOutcome::Accept);
    }

    #[test]
    fn test_array_variants() {
        let mut registry = registry();
        let pos = registry.add_rule(pos_rule()).unwrap();
        let line = registry.array_rule(pos, 1).unwrap();
        let grid = registry.array_rule(pos, 2).unwrap();
        assert_eq!(registry.rule(grid).id(), "pos[][]");
        assert!(registry.array_rule(pos, MAX_ARRAY_DIMS + 1).is_none());

        let load = &registry.call_specs(&"v [J#LALOAD (I)J".parse().unwrap())[0];
        assert_eq!(load.params, vec![Some(line), None]);
        assert_eq!(load.ret, Some(pos));
        assert_eq!(load.check(None, &[None, None]), CheckOutcome::Pending);
        assert_eq!(load.check(Some(pos), &[None, None]), CheckOutcome::Accept);
        let replacement = load.replacement.as_ref().unwrap();
        assert_eq!(replacement.expansions[2], vec![Insn::Op(Opcode::IALOAD)]);
        assert_eq!(replacement.indices.as_ref().unwrap()[2], vec![vec![2], vec![0]]);

        let outer = MethodId::array_op(Opcode::AALOAD, &JvmType::Long.array_of(2)).unwrap();
        let outer = &registry.call_specs(&outer)[0];
        assert_eq!(outer.ret, Some(line));
        assert_eq!(outer.replacement.as_ref().unwrap().expansions[0], vec![Insn::Op(Opcode::AALOAD)]);

        let allocate = MethodId::array_op(Opcode::ANEWARRAY, &JvmType::Long.array_of(2)).unwrap();
        let allocate = &registry.call_specs(&allocate)[0];
        assert_eq!(allocate.ret, Some(grid));
        assert_eq!(
            allocate.replacement.as_ref().unwrap().expansions[1],
            vec![Insn::new_array(&JvmType::Int.array_of(1))]
        );
    }

    #[test]
    fn test_predicate_variant() {
        let mut registry = registry();
        let rule = pos_rule().with_predicate(
            JvmType::object("java/util/function/LongPredicate"),
            JvmType::object("a/PosPredicate"),
        );
        let pos = registry.add_rule(rule).unwrap();
        let predicate = registry.rule_id("pos predicate").unwrap();
        assert_eq!(registry.rule(predicate).subtype(), Subtype::Predicate { base: pos });
        assert!(registry.rule_id("pos consumer").is_none());

        let spec = &registry.call_specs(&"i java/util/function/LongPredicate#test (J)Z".parse().unwrap())[0];
        assert_eq!(spec.params, vec![Some(predicate), Some(pos)]);
        assert_eq!(spec.check(None, &[None, Some(pos)]), CheckOutcome::Accept);
        assert_eq!(
            spec.replacement.as_ref().unwrap().expansions[0],
            vec![Insn::invoke(
                Opcode::INVOKEINTERFACE,
                "a/PosPredicate",
                "test",
                "(III)Z".parse().unwrap()
            )]
        );
    }

    #[test]
    fn test_duplicate_rule() {
        let mut registry = registry();
        registry.add_rule(pos_rule()).unwrap();
        assert!(matches!(registry.add_rule(pos_rule()), Err(Error::Config(_))));
    }

    #[test]
    fn test_inherited_spec_lookup() {
        let mut registry = registry();
        let id = registry.add_rule(pos_rule()).unwrap();
        registry
            .add_call_spec(CallSpec {
                method: "v a/Base#move (J)V".parse().unwrap(),
                ret: None,
                params: vec![None, Some(id)],
                minimums: None,
                replacement: None,
            })
            .unwrap();
        assert_eq!(registry.call_specs(&"v a/Derived#move (J)V".parse().unwrap()).len(), 1);
        assert!(registry.call_specs(&"v a/Derived#move (I)V".parse().unwrap()).is_empty());
    }

    #[test]
    fn test_arity_checked() {
        let mut registry = registry();
        let result = registry.add_call_spec(CallSpec {
            method: "v a/Base#move (J)V".parse().unwrap(),
            ret: None,
            params: vec![None],
            minimums: None,
            replacement: None,
        });
        assert!(result.is_err());
    }
}
