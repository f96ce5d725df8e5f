//! JSON rule documents.
//!
//! A rule document declares everything a [`RuleRegistry`] holds. The layout:
//!
//! ```json
//! {
//!   "hierarchy": { "java/lang/Object": { "a/Base": { "__interfaces": ["a/Api"], "a/Leaf": {} } } },
//!   "method_definitions": [ { "id": "asLong", "method": "s a/Pos#asLong (III)J" } ],
//!   "types": [ {
//!     "id": "pos", "original": "J", "transformed": ["I", "I", "I"],
//!     "postfix": ["_x", "_y", "_z"],
//!     "from_original": ["s a/Pos#getX (J)I", "s a/Pos#getY (J)I", "s a/Pos#getZ (J)I"],
//!     "to_original": "asLong",
//!     "constant_replacements": [ { "from": 9223372036854775807, "to": [2147483647, 2147483647, 2147483647] } ],
//!     "original_predicate": "java/util/function/LongPredicate", "transformed_predicate": "a/PosPredicate"
//!   } ],
//!   "methods": [ {
//!     "method": "v a/Base#offset (J)J", "parameters": [null, "pos"], "return": "pos",
//!     "minimums": [ { "parameters": [null, "pos"] } ],
//!     "replacement": [ ["@offsetX"], ["@offsetY"], ["@offsetZ"] ]
//!   } ],
//!   "classes": [ { "class": "a/Leaf", "type_hints": [ { "method": "v a/Leaf#run (J)V", "types": [null, "pos"] } ] } ]
//! }
//! ```
//!
//! Method references are either the id of a `method_definitions` entry or a
//! literal `"<kind> owner#name desc"`. Inside replacement code an `"@id"` line
//! expands to a call of that definition. In `minimums`, `null` accepts anything
//! and `"-"` requires the value to stay unclassified.
//!
//! Every type also registers its array variants (`"pos[]"` up to three
//! dimensions) and, when the interfaces are named, `"pos predicate"` and
//! `"pos consumer"`; all of them can be used wherever a rule id is expected.

use std::{fs, path::Path};

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    assembly::{parse_insn, parse_literal, Insn},
    metadata::{
        constant::Constant, hierarchy::HierarchyTree, identity::MethodId, typesystem::JvmType,
    },
    rules::{CallSpec, Minimum, Replacement, Requirement, RuleId, RuleRegistry, TransformRule},
    Error, Result,
};

#[derive(Debug, Deserialize)]
struct RuleDocument {
    #[serde(default)]
    hierarchy: Map<String, Value>,
    #[serde(default)]
    method_definitions: Vec<MethodDefinition>,
    #[serde(default)]
    types: Vec<TypeEntry>,
    #[serde(default)]
    methods: Vec<MethodEntry>,
    #[serde(default)]
    classes: Vec<ClassEntry>,
}

#[derive(Debug, Deserialize)]
struct MethodDefinition {
    id: String,
    method: String,
}

#[derive(Debug, Deserialize)]
struct TypeEntry {
    id: String,
    original: String,
    transformed: Vec<String>,
    postfix: Option<Vec<String>>,
    from_original: Option<Vec<String>>,
    to_original: Option<String>,
    #[serde(default)]
    constant_replacements: Vec<ConstantEntry>,
    original_predicate: Option<String>,
    transformed_predicate: Option<String>,
    original_consumer: Option<String>,
    transformed_consumer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConstantEntry {
    from: Value,
    to: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MethodEntry {
    method: String,
    #[serde(default)]
    parameters: Option<Vec<Option<String>>>,
    #[serde(default, rename = "return")]
    ret: Option<String>,
    minimums: Option<Vec<MinimumEntry>>,
    replacement: Option<ReplacementEntry>,
}

#[derive(Debug, Deserialize)]
struct MinimumEntry {
    #[serde(default, rename = "return")]
    ret: Option<String>,
    parameters: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplacementEntry {
    Expansions(Vec<Vec<String>>),
    Template {
        expansion: Vec<Vec<String>>,
        indices: Vec<Vec<IndexEntry>>,
        finalizer: Option<Vec<String>>,
        finalizer_indices: Option<Vec<IndexEntry>>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexEntry {
    One(usize),
    Many(Vec<usize>),
}

impl IndexEntry {
    fn into_vec(self) -> Vec<usize> {
        match self {
            IndexEntry::One(index) => vec![index],
            IndexEntry::Many(indices) => indices,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClassEntry {
    class: String,
    #[serde(default)]
    type_hints: Vec<TypeHintEntry>,
}

#[derive(Debug, Deserialize)]
struct TypeHintEntry {
    method: String,
    types: Vec<Option<String>>,
}

/// Resolution state while a document is turned into a registry.
struct Loader {
    definitions: FxHashMap<String, MethodId>,
    registry: RuleRegistry,
}

impl RuleRegistry {
    /// Builds a registry from a JSON rule document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not a rule document and
    /// [`Error::Config`] if its content is inconsistent.
    pub fn from_json(text: &str) -> Result<Self> {
        let document: RuleDocument = serde_json::from_str(text)?;
        Loader::load(document)
    }

    /// Reads and loads a JSON rule document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileError`] if the file cannot be read, otherwise as
    /// [`RuleRegistry::from_json`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl Loader {
    fn load(document: RuleDocument) -> Result<RuleRegistry> {
        let mut tree = HierarchyTree::new();
        load_hierarchy(&mut tree, &document.hierarchy, None)?;

        let mut definitions = FxHashMap::default();
        for definition in document.method_definitions {
            let method: MethodId = definition.method.parse()?;
            definitions.insert(definition.id, method);
        }

        let mut loader = Loader {
            definitions,
            registry: RuleRegistry::new(tree),
        };
        for entry in document.types {
            loader.load_type(entry)?;
        }
        for entry in document.methods {
            loader.load_method(entry)?;
        }
        for entry in document.classes {
            loader.load_class(entry)?;
        }

        log::debug!(
            "Loaded {} rules and {} method definitions",
            loader.registry.rules().count(),
            loader.definitions.len()
        );
        Ok(loader.registry)
    }

    fn method(&self, reference: &str) -> Result<MethodId> {
        match self.definitions.get(reference) {
            Some(method) => Ok(method.clone()),
            None => reference.parse(),
        }
    }

    fn rule(&self, name: &str) -> Result<RuleId> {
        self.registry
            .rule_id(name)
            .ok_or_else(|| Error::Config(format!("unknown rule '{name}'")))
    }

    fn code(&self, lines: &[String]) -> Result<Vec<Insn>> {
        lines
            .iter()
            .map(|line| match line.trim().strip_prefix('@') {
                Some(name) => self
                    .definitions
                    .get(name)
                    .map(MethodId::call_insn)
                    .ok_or_else(|| Error::Config(format!("unknown method definition '{name}'"))),
                None => parse_insn(line),
            })
            .collect()
    }

    fn load_type(&mut self, entry: TypeEntry) -> Result<()> {
        let source: JvmType = entry.original.parse()?;
        let components = entry
            .transformed
            .iter()
            .map(|t| t.parse())
            .collect::<Result<Vec<JvmType>>>()?;
        let mut rule = TransformRule::new(entry.id, source.clone(), components.clone())?;

        if let Some(postfix) = entry.postfix {
            rule = rule.with_suffixes(postfix)?;
        }
        if let Some(methods) = &entry.from_original {
            let methods = methods
                .iter()
                .map(|m| self.method(m))
                .collect::<Result<Vec<_>>>()?;
            rule = rule.with_from_original(methods)?;
        }
        if let Some(method) = &entry.to_original {
            rule = rule.with_to_original(self.method(method)?);
        }
        if let Some((original, transformed)) =
            interface_pair("predicate", &entry.original_predicate, &entry.transformed_predicate)?
        {
            rule = rule.with_predicate(original, transformed);
        }
        if let Some((original, transformed)) =
            interface_pair("consumer", &entry.original_consumer, &entry.transformed_consumer)?
        {
            rule = rule.with_consumer(original, transformed);
        }
        for constant in entry.constant_replacements {
            let from = json_constant(&constant.from, &source)?;
            if constant.to.len() != components.len() {
                return Err(Error::Config(format!(
                    "constant replacement for {from} must list {} components",
                    components.len()
                )));
            }
            let code = constant
                .to
                .iter()
                .zip(&components)
                .map(|(value, ty)| match value {
                    Value::Array(lines) => {
                        let lines = lines
                            .iter()
                            .map(|l| {
                                l.as_str().map(str::to_string).ok_or_else(|| {
                                    Error::Config(format!("expected instruction string, got {l}"))
                                })
                            })
                            .collect::<Result<Vec<_>>>()?;
                        self.code(&lines)
                    }
                    other => Ok(vec![Insn::push(&json_constant(other, ty)?)]),
                })
                .collect::<Result<Vec<_>>>()?;
            rule = rule.with_constant(from, code)?;
        }

        self.registry.add_rule(rule)?;
        Ok(())
    }

    fn load_method(&mut self, entry: MethodEntry) -> Result<()> {
        let method = self.method(&entry.method)?;
        let arity = method.all_params().len();

        let params = match entry.parameters {
            Some(params) => params
                .iter()
                .map(|p| p.as_deref().map(|name| self.rule(name)).transpose())
                .collect::<Result<Vec<_>>>()?,
            None => vec![None; arity],
        };
        let ret = entry.ret.as_deref().map(|name| self.rule(name)).transpose()?;

        let minimums = match entry.minimums {
            Some(minimums) => Some(
                minimums
                    .into_iter()
                    .map(|m| {
                        Ok(Minimum {
                            ret: self.requirement(m.ret.as_deref())?,
                            params: m
                                .parameters
                                .iter()
                                .map(|p| self.requirement(p.as_deref()))
                                .collect::<Result<_>>()?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        let expansions_needed = ret.map_or(1, |r| self.registry.rule(r).component_count());
        let replacement = match entry.replacement {
            Some(ReplacementEntry::Expansions(blocks)) => {
                let mut indices = vec![Vec::with_capacity(params.len()); expansions_needed];
                for param in &params {
                    let width = param.map_or(1, |r| self.registry.rule(r).component_count());
                    if width != 1 && width != expansions_needed {
                        return Err(Error::Config(format!(
                            "{method}: parameter has {width} components but the replacement has {expansions_needed} expansions"
                        )));
                    }
                    for (expansion, per_param) in indices.iter_mut().enumerate() {
                        per_param.push(vec![if width == 1 { 0 } else { expansion }]);
                    }
                }
                Some(Replacement::template(self.blocks(&method, &blocks, expansions_needed)?, indices))
            }
            Some(ReplacementEntry::Template {
                expansion,
                indices,
                finalizer,
                finalizer_indices,
            }) => {
                if indices.len() != expansions_needed
                    || indices.iter().any(|per_param| per_param.len() != params.len())
                {
                    return Err(Error::Config(format!(
                        "{method}: indices must list every parameter for each of {expansions_needed} expansions"
                    )));
                }
                let indices = indices
                    .into_iter()
                    .map(|per_param| per_param.into_iter().map(IndexEntry::into_vec).collect())
                    .collect();
                let mut replacement =
                    Replacement::template(self.blocks(&method, &expansion, expansions_needed)?, indices);
                if let Some(finalizer) = finalizer {
                    let finalizer_indices = finalizer_indices
                        .map(|f| f.into_iter().map(IndexEntry::into_vec).collect())
                        .unwrap_or_else(|| vec![Vec::new(); params.len()]);
                    replacement = replacement.with_finalizer(self.code(&finalizer)?, finalizer_indices);
                }
                Some(replacement)
            }
            None => Some(self.descriptor_rewrite(&method, ret, &params)?),
        };

        self.registry.add_call_spec(CallSpec {
            method,
            ret,
            params,
            minimums,
            replacement,
        })
    }

    fn blocks(&self, method: &MethodId, blocks: &[Vec<String>], needed: usize) -> Result<Vec<Vec<Insn>>> {
        if blocks.len() != needed {
            return Err(Error::Config(format!(
                "{method}: expected {needed} expansion blocks, found {}",
                blocks.len()
            )));
        }
        blocks.iter().map(|block| self.code(block)).collect()
    }

    /// A direct call to the same method with every classified position
    /// expanded to its components.
    fn descriptor_rewrite(
        &self,
        method: &MethodId,
        ret: Option<RuleId>,
        params: &[Option<RuleId>],
    ) -> Result<Replacement> {
        let skip = usize::from(!method.is_static());
        let mut new_params = Vec::new();
        for (ty, rule) in method.all_params().into_iter().zip(params).skip(skip) {
            match rule {
                Some(rule) => new_params.extend(self.registry.rule(*rule).components().iter().cloned()),
                None => new_params.push(ty),
            }
        }
        let new_ret = match ret {
            None => method.desc.ret().clone(),
            Some(rule) => match self.registry.rule(rule).components() {
                [single] => single.clone(),
                _ => {
                    return Err(Error::Config(format!(
                        "{method}: a multi-component return value needs an explicit replacement"
                    )))
                }
            },
        };
        let mut target = method.clone();
        target.desc = crate::metadata::typesystem::MethodDescriptor::new(new_params, new_ret);
        Ok(Replacement::direct(vec![target.call_insn()]))
    }

    fn requirement(&self, name: Option<&str>) -> Result<Requirement> {
        Ok(match name {
            None => Requirement::Any,
            Some("-") => Requirement::Unclassified,
            Some(name) => Requirement::Rule(self.rule(name)?),
        })
    }

    fn load_class(&mut self, entry: ClassEntry) -> Result<()> {
        for hint in entry.type_hints {
            let method = self.method(&hint.method)?;
            for (slot, rule) in hint.types.iter().enumerate() {
                if let Some(name) = rule {
                    let rule = self.rule(name)?;
                    let slot = u16::try_from(slot)
                        .map_err(|_| Error::Config(format!("type hint slot {slot} out of range")))?;
                    self.registry
                        .add_type_hint(&entry.class, method.clone(), slot, rule);
                }
            }
        }
        Ok(())
    }
}

fn load_hierarchy(tree: &mut HierarchyTree, level: &Map<String, Value>, parent: Option<&str>) -> Result<()> {
    for (name, children) in level {
        if name == "__interfaces" {
            let Some(sub_type) = parent else {
                return Err(Error::Config("__interfaces at the hierarchy root".to_string()));
            };
            let interfaces = children
                .as_array()
                .ok_or_else(|| Error::Config(format!("__interfaces of '{sub_type}' must be an array")))?;
            for interface in interfaces {
                let interface = interface.as_str().ok_or_else(|| {
                    Error::Config(format!("interface of '{sub_type}' must be a string"))
                })?;
                tree.add_interface(interface, sub_type)?;
            }
            continue;
        }
        tree.add_node(name, parent)?;
        match children {
            Value::Object(children) => load_hierarchy(tree, children, Some(name))?,
            Value::Null => {}
            other => {
                return Err(Error::Config(format!(
                    "children of '{name}' must be an object, got {other}"
                )))
            }
        }
    }
    Ok(())
}

/// Converts a JSON literal to a constant of `ty`'s width. Integral numbers
/// become `long`/`int` and fractional ones `double`/`float`.
fn json_constant(value: &Value, ty: &JvmType) -> Result<Constant> {
    let wide = ty.size() == 2;
    match value {
        Value::Null => Ok(Constant::Null),
        Value::String(text) => Ok(Constant::String(text.clone())),
        Value::Number(number) => {
            if let Some(integral) = number.as_i64() {
                if wide {
                    return Ok(Constant::Long(integral));
                }
                return i32::try_from(integral)
                    .map(Constant::Int)
                    .map_err(|_| Error::Config(format!("{integral} does not fit a 32-bit constant")));
            }
            let text = number.to_string();
            let constant = parse_literal(&text)?;
            Ok(if wide {
                constant
            } else {
                constant.coerce(&JvmType::Float)
            })
        }
        other => Err(Error::Config(format!("expected a constant literal, got {other}"))),
    }
}

/// Both interfaces of a predicate or consumer declaration, given as internal
/// names.
fn interface_pair(
    kind: &str,
    original: &Option<String>,
    transformed: &Option<String>,
) -> Result<Option<(JvmType, JvmType)>> {
    match (original, transformed) {
        (Some(original), Some(transformed)) => Ok(Some((
            JvmType::from_internal_name(original)?,
            JvmType::from_internal_name(transformed)?,
        ))),
        (None, None) => Ok(None),
        _ => Err(Error::Config(format!(
            "original_{kind} and transformed_{kind} must be given together"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::Opcode, rules::CheckOutcome};

    const DOCUMENT: &str = r#"{
        "hierarchy": {
            "java/lang/Object": {
                "a/Base": { "__interfaces": ["a/Api"], "a/Leaf": {} }
            }
        },
        "method_definitions": [
            { "id": "asLong", "method": "s a/Pos#asLong (III)J" },
            { "id": "offsetX", "method": "s a/Pos#offsetX (II)I" }
        ],
        "types": [ {
            "id": "pos", "original": "J", "transformed": ["I", "I", "I"],
            "postfix": ["_x", "_y", "_z"],
            "to_original": "asLong",
            "constant_replacements": [
                { "from": 9223372036854775807, "to": [2147483647, 2147483647, ["ICONST_0", "ICONST_1", "IADD"]] }
            ]
        } ],
        "methods": [
            { "method": "v a/Base#move (J)V", "parameters": [null, "pos"] },
            {
                "method": "s a/Pos#offset (JI)J", "parameters": ["pos", null], "return": "pos",
                "minimums": [ { "parameters": ["pos", "-"] } ],
                "replacement": [ ["@offsetX"], ["@offsetX"], ["@offsetX"] ]
            }
        ],
        "classes": [
            { "class": "a/Leaf", "type_hints": [ { "method": "v a/Leaf#run (J)V", "types": [null, "pos"] } ] }
        ]
    }"#;

    #[test]
    fn test_load_document() {
        let registry = RuleRegistry::from_json(DOCUMENT).unwrap();
        let pos = registry.rule_id("pos").unwrap();
        let rule = registry.rule(pos);
        assert_eq!(rule.suffixes(), ["_x", "_y", "_z"]);

        let code = rule.constant_replacement(&Constant::Long(i64::MAX)).unwrap();
        assert_eq!(code[0], vec![Insn::push(&Constant::Int(i32::MAX))]);
        assert_eq!(code[2].len(), 3);

        assert!(registry.hierarchy().contains("a/Leaf"));
        let hints = registry.type_hints("a/Leaf").unwrap();
        let run: MethodId = "v a/Leaf#run (J)V".parse().unwrap();
        assert_eq!(hints[&run][&1], pos);
    }

    #[test]
    fn test_descriptor_rewrite_default() {
        let registry = RuleRegistry::from_json(DOCUMENT).unwrap();
        let specs = registry.call_specs(&"v a/Leaf#move (J)V".parse().unwrap());
        assert_eq!(specs.len(), 1);
        let replacement = specs[0].replacement.as_ref().unwrap();
        assert!(!replacement.changes_parameters());
        assert_eq!(
            replacement.expansions[0],
            vec![Insn::invoke(Opcode::INVOKEVIRTUAL, "a/Base", "move", "(III)V".parse().unwrap())]
        );
    }

    #[test]
    fn test_default_indices_and_minimums() {
        let registry = RuleRegistry::from_json(DOCUMENT).unwrap();
        let pos = registry.rule_id("pos").unwrap();
        let spec = &registry.call_specs(&"s a/Pos#offset (JI)J".parse().unwrap())[0];
        let indices = spec.replacement.as_ref().unwrap().indices.clone().unwrap();
        assert_eq!(indices[1], vec![vec![1], vec![0]]);
        assert_eq!(spec.check(None, &[Some(pos), None]), CheckOutcome::Accept);
        assert_eq!(spec.check(None, &[None, None]), CheckOutcome::Pending);
    }

    #[test]
    fn test_variant_rules_by_name() {
        let document = DOCUMENT.replace(
            r#""to_original": "asLong","#,
            r#""to_original": "asLong",
            "original_consumer": "java/util/function/LongConsumer",
            "transformed_consumer": "a/PosConsumer","#,
        )
        .replace(
            r#"{ "method": "v a/Base#move (J)V", "parameters": [null, "pos"] }"#,
            r#"{ "method": "v a/Base#move ([J)V", "parameters": [null, "pos[]"] }"#,
        );
        let registry = RuleRegistry::from_json(&document).unwrap();
        let pos = registry.rule_id("pos").unwrap();

        let consumer = registry.rule_id("pos consumer").unwrap();
        assert_eq!(registry.rule(consumer).components(), [JvmType::object("a/PosConsumer")]);
        assert!(registry.rule_id("pos predicate").is_none());

        let line = registry.array_rule(pos, 1).unwrap();
        let spec = &registry.call_specs(&"v a/Leaf#move ([J)V".parse().unwrap())[0];
        assert_eq!(spec.params, vec![None, Some(line)]);
        assert_eq!(
            spec.replacement.as_ref().unwrap().expansions[0],
            vec![Insn::invoke(Opcode::INVOKEVIRTUAL, "a/Base", "move", "([I[I[I)V".parse().unwrap())]
        );

        let half = DOCUMENT.replace(
            r#""to_original": "asLong","#,
            r#""to_original": "asLong", "original_predicate": "java/util/function/LongPredicate","#,
        );
        assert!(matches!(RuleRegistry::from_json(&half), Err(Error::Config(_))));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(RuleRegistry::from_json("[]"), Err(Error::Json(_))));
        let unknown_rule = r#"{ "hierarchy": { "java/lang/Object": {} },
            "methods": [ { "method": "s a/B#c (J)V", "parameters": ["nope"] } ] }"#;
        assert!(matches!(RuleRegistry::from_json(unknown_rule), Err(Error::Config(_))));
        let two_roots = r#"{ "hierarchy": { "a/A": {}, "b/B": {} } }"#;
        assert!(RuleRegistry::from_json(two_roots).is_err());
    }
}
