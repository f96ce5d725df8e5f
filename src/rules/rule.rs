//! Split rules.
//!
//! A [`TransformRule`] states that values of one source type are represented
//! by an ordered tuple of component types after transformation, e.g. a packed
//! `long` position becoming three `int` coordinates. Rules are immutable once
//! registered and are referred to everywhere else by their [`RuleId`].
//!
//! Registering a rule also registers its [`Subtype`]s: arrays of its values
//! (`pos[]`, `pos[][]`, ...) where every component becomes an array, and,
//! when the rule names them, the predicate and consumer interfaces over its
//! values (`pos predicate`, `pos consumer`).

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{
    assembly::Insn,
    metadata::{constant::Constant, identity::MethodId, typesystem::JvmType},
    Error, Result,
};

/// Index of a rule inside its [`crate::rules::RuleRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) u32);

impl RuleId {
    /// Position in the registry.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// Deepest array variant registered for a rule.
pub const MAX_ARRAY_DIMS: u8 = 3;

/// How a rule derives from the rule it was registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subtype {
    /// A rule declared on its own
    Plain,
    /// Arrays of `base` values, `dims` levels deep
    Array {
        /// The declared rule
        base: RuleId,
        /// Array dimensionality, at least one
        dims: u8,
    },
    /// The original predicate over `base` values, replaced by the transformed one
    Predicate {
        /// The declared rule
        base: RuleId,
    },
    /// The original consumer of `base` values, replaced by the transformed one
    Consumer {
        /// The declared rule
        base: RuleId,
    },
}

/// A functional interface over the values of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Functional {
    /// `boolean test(value)`
    Predicate,
    /// `void accept(value)`
    Consumer,
}

impl Functional {
    /// Name of the single abstract method.
    #[must_use]
    pub const fn method_name(self) -> &'static str {
        match self {
            Functional::Predicate => "test",
            Functional::Consumer => "accept",
        }
    }

    /// Return type of the single abstract method.
    #[must_use]
    pub const fn return_type(self) -> JvmType {
        match self {
            Functional::Predicate => JvmType::Boolean,
            Functional::Consumer => JvmType::Void,
        }
    }

    const fn keyword(self) -> &'static str {
        match self {
            Functional::Predicate => "predicate",
            Functional::Consumer => "consumer",
        }
    }
}

/// A mapping from one wide value type to an ordered tuple of component types.
///
/// # Example
///
/// ```rust
/// use typesplit::rules::TransformRule;
/// use typesplit::metadata::{constant::Constant, typesystem::JvmType};
///
/// let rule = TransformRule::new("pos", JvmType::Long, vec![JvmType::Int; 3])?
///     .with_suffixes(["_x", "_y", "_z"])?
///     .with_constant_values(Constant::Long(i64::MAX), &[const { Constant::Int(i32::MAX) }; 3])?;
///
/// assert_eq!(rule.component_count(), 3);
/// assert_eq!(rule.suffix(1), "_y");
/// assert!(rule.constant_replacement(&Constant::Long(i64::MAX)).is_some());
/// # Ok::<(), typesplit::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct TransformRule {
    id: String,
    source: JvmType,
    components: Vec<JvmType>,
    suffixes: Vec<String>,
    from_original: Option<Vec<MethodId>>,
    to_original: Option<MethodId>,
    constants: FxHashMap<Constant, Vec<Vec<Insn>>>,
    subtype: Subtype,
    /// Original and transformed predicate interface
    predicate: Option<(JvmType, JvmType)>,
    /// Original and transformed consumer interface
    consumer: Option<(JvmType, JvmType)>,
}

impl TransformRule {
    /// Creates a rule with default suffixes (`_<id>` for one component,
    /// `_<id>_<i>` otherwise) and no conversions or constants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the id contains whitespace or there are no components.
    pub fn new(id: impl Into<String>, source: JvmType, components: Vec<JvmType>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.contains(char::is_whitespace) {
            return Err(Error::Config(format!("invalid rule id '{id}'")));
        }
        if components.is_empty() || components.contains(&JvmType::Void) {
            return Err(Error::Config(format!(
                "rule '{id}' needs at least one non-void component"
            )));
        }
        let suffixes = if components.len() == 1 {
            vec![format!("_{id}")]
        } else {
            (0..components.len()).map(|i| format!("_{id}_{i}")).collect()
        };
        Ok(Self {
            id,
            source,
            components,
            suffixes,
            from_original: None,
            to_original: None,
            constants: FxHashMap::default(),
            subtype: Subtype::Plain,
            predicate: None,
            consumer: None,
        })
    }

    /// The array variant holding `dims`-dimensional arrays of `base` values.
    ///
    /// Each component becomes an array of that component; `null` arrays
    /// become `null` components.
    pub(crate) fn array_of(base_id: RuleId, base: &Self, dims: u8) -> Self {
        let depth = usize::from(dims);
        let components: Vec<JvmType> = base.components.iter().map(|c| c.array_of(depth)).collect();
        let mut constants = FxHashMap::default();
        constants.insert(
            Constant::Null,
            vec![vec![Insn::push(&Constant::Null)]; components.len()],
        );
        Self {
            id: format!("{}{}", base.id, "[]".repeat(depth)),
            source: base.source.array_of(depth),
            components,
            suffixes: base.suffixes.clone(),
            from_original: None,
            to_original: None,
            constants,
            subtype: Subtype::Array { base: base_id, dims },
            predicate: None,
            consumer: None,
        }
    }

    /// The variant for the predicate or consumer interface over `base`
    /// values, if `base` names one.
    pub(crate) fn functional_of(base_id: RuleId, base: &Self, kind: Functional) -> Option<Self> {
        let (original, transformed) = base.functional(kind)?;
        let subtype = match kind {
            Functional::Predicate => Subtype::Predicate { base: base_id },
            Functional::Consumer => Subtype::Consumer { base: base_id },
        };
        Some(Self {
            id: format!("{} {}", base.id, kind.keyword()),
            source: original.clone(),
            components: vec![transformed.clone()],
            suffixes: vec![format!("_{}_{}", base.id, kind.keyword())],
            from_original: None,
            to_original: None,
            constants: FxHashMap::default(),
            subtype,
            predicate: None,
            consumer: None,
        })
    }

    /// Names the predicate interface over values of this rule and its
    /// replacement taking the components.
    #[must_use]
    pub fn with_predicate(mut self, original: JvmType, transformed: JvmType) -> Self {
        self.predicate = Some((original, transformed));
        self
    }

    /// Names the consumer interface over values of this rule and its
    /// replacement taking the components.
    #[must_use]
    pub fn with_consumer(mut self, original: JvmType, transformed: JvmType) -> Self {
        self.consumer = Some((original, transformed));
        self
    }

    /// Replaces the per-component name suffixes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the count differs from the component count.
    pub fn with_suffixes<S: Into<String>>(mut self, suffixes: impl IntoIterator<Item = S>) -> Result<Self> {
        let suffixes: Vec<String> = suffixes.into_iter().map(Into::into).collect();
        if suffixes.len() != self.components.len() {
            return Err(Error::Config(format!(
                "rule '{}' has {} components but {} suffixes",
                self.id,
                self.components.len(),
                suffixes.len()
            )));
        }
        self.suffixes = suffixes;
        Ok(self)
    }

    /// Sets the methods extracting each component from an original value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the count differs from the component count.
    pub fn with_from_original(mut self, methods: Vec<MethodId>) -> Result<Self> {
        if methods.len() != self.components.len() {
            return Err(Error::Config(format!(
                "rule '{}' needs one from_original method per component",
                self.id
            )));
        }
        self.from_original = Some(methods);
        Ok(self)
    }

    /// Sets the method building an original value from its components.
    #[must_use]
    pub fn with_to_original(mut self, method: MethodId) -> Self {
        self.to_original = Some(method);
        self
    }

    /// Registers per-component code replacing `constant` when it is classified by this rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the count differs from the component count.
    pub fn with_constant(mut self, constant: Constant, per_component: Vec<Vec<Insn>>) -> Result<Self> {
        if per_component.len() != self.components.len() {
            return Err(Error::Config(format!(
                "constant {} of rule '{}' must expand to {} components",
                constant,
                self.id,
                self.components.len()
            )));
        }
        self.constants.insert(constant, per_component);
        Ok(self)
    }

    /// Registers a constant whose components are plain literals.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the count differs from the component count.
    pub fn with_constant_values(self, constant: Constant, values: &[Constant]) -> Result<Self> {
        let code = values
            .iter()
            .zip(&self.components)
            .map(|(value, ty)| vec![Insn::push(&value.coerce(ty))])
            .collect();
        if values.len() != self.components.len() {
            return Err(Error::Config(format!(
                "constant {} of rule '{}' must expand to {} components",
                constant,
                self.id,
                self.components.len()
            )));
        }
        self.with_constant(constant, code)
    }

    /// Rule identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The wide type values have before transformation.
    #[must_use]
    pub fn source(&self) -> &JvmType {
        &self.source
    }

    /// Component types in push order.
    #[must_use]
    pub fn components(&self) -> &[JvmType] {
        &self.components
    }

    /// Number of components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Total local slots the components occupy.
    #[must_use]
    pub fn slot_size(&self) -> usize {
        self.components.iter().map(JvmType::size).sum()
    }

    /// Name suffix of component `index`.
    #[must_use]
    pub fn suffix(&self, index: usize) -> &str {
        &self.suffixes[index]
    }

    /// All suffixes.
    #[must_use]
    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Component extraction methods, if any.
    #[must_use]
    pub fn from_original(&self) -> Option<&[MethodId]> {
        self.from_original.as_deref()
    }

    /// Original value constructor, if any.
    #[must_use]
    pub fn to_original(&self) -> Option<&MethodId> {
        self.to_original.as_ref()
    }

    /// How this rule relates to the rule it was registered with.
    #[must_use]
    pub const fn subtype(&self) -> Subtype {
        self.subtype
    }

    /// Original and transformed interface of a functional kind, if named.
    #[must_use]
    pub fn functional(&self, kind: Functional) -> Option<(&JvmType, &JvmType)> {
        let pair = match kind {
            Functional::Predicate => &self.predicate,
            Functional::Consumer => &self.consumer,
        };
        pair.as_ref().map(|(original, transformed)| (original, transformed))
    }

    /// Per-component replacement code for `constant`.
    #[must_use]
    pub fn constant_replacement(&self, constant: &Constant) -> Option<&[Vec<Insn>]> {
        self.constants.get(constant).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_suffixes() {
        let single = TransformRule::new("set", JvmType::object("a/Set"), vec![JvmType::object("b/Set")]).unwrap();
        assert_eq!(single.suffixes(), ["_set"]);

        let triple = TransformRule::new("pos", JvmType::Long, vec![JvmType::Int; 3]).unwrap();
        assert_eq!(triple.suffixes(), ["_pos_0", "_pos_1", "_pos_2"]);
        assert_eq!(triple.slot_size(), 3);
    }

    #[test]
    fn test_validation() {
        assert!(TransformRule::new("bad id", JvmType::Long, vec![JvmType::Int]).is_err());
        assert!(TransformRule::new("empty", JvmType::Long, vec![]).is_err());

        let rule = TransformRule::new("pos", JvmType::Long, vec![JvmType::Int; 3]).unwrap();
        assert!(rule.clone().with_suffixes(["_x"]).is_err());
        assert!(rule
            .with_constant_values(Constant::Long(0), &[Constant::Int(0)])
            .is_err());
    }

    #[test]
    fn test_constant_values_are_coerced() {
        let rule = TransformRule::new("wide", JvmType::Object("a/W".into()), vec![JvmType::Long, JvmType::Int])
            .unwrap()
            .with_constant_values(Constant::Null, &[Constant::Int(1), Constant::Int(7)])
            .unwrap();
        let code = rule.constant_replacement(&Constant::Null).unwrap();
        assert_eq!(code[0], vec![Insn::push(&Constant::Long(1))]);
        assert_eq!(code[1], vec![Insn::push(&Constant::Int(7))]);
        assert!(rule.constant_replacement(&Constant::Int(3)).is_none());
    }

    #[test]
    fn test_array_variant() {
        let pos = TransformRule::new("pos", JvmType::Long, vec![JvmType::Int; 3])
            .unwrap()
            .with_suffixes(["_x", "_y", "_z"])
            .unwrap();
        let grid = TransformRule::array_of(RuleId(0), &pos, 2);
        assert_eq!(grid.id(), "pos[][]");
        assert_eq!(grid.source().to_string(), "[[J");
        assert_eq!(grid.components().to_vec(), vec![JvmType::Int.array_of(2); 3]);
        assert_eq!(grid.suffix(2), "_z");
        assert_eq!(grid.subtype(), Subtype::Array { base: RuleId(0), dims: 2 });
        assert!(grid.constant_replacement(&Constant::Null).is_some());
    }

    #[test]
    fn test_functional_variants() {
        let pos = TransformRule::new("pos", JvmType::Long, vec![JvmType::Int; 3])
            .unwrap()
            .with_predicate(JvmType::object("a/PosPredicate"), JvmType::object("a/XyzPredicate"));
        let predicate = TransformRule::functional_of(RuleId(0), &pos, Functional::Predicate).unwrap();
        assert_eq!(predicate.id(), "pos predicate");
        assert_eq!(predicate.source(), &JvmType::object("a/PosPredicate"));
        assert_eq!(predicate.components(), [JvmType::object("a/XyzPredicate")]);
        assert!(TransformRule::functional_of(RuleId(0), &pos, Functional::Consumer).is_none());
    }
}
