//! Split rules and call-site specifications.
//!
//! This module holds the read-only inputs of a transformation run:
//!
//! - [`TransformRule`] - how one wide type splits into components
//! - [`CallSpec`] - how a call changes once its values are split
//! - [`RuleRegistry`] - the catalog of both, plus the type hierarchy and
//!   local variable type hints
//!
//! Registries are built programmatically or loaded from a JSON rule document
//! (see [`RuleRegistry::from_json`]).

mod call;
mod loader;
mod registry;
mod rule;

pub use call::{CallSpec, CheckOutcome, Minimum, Replacement, Requirement};
pub use registry::{RuleRegistry, TypeHints};
pub use rule::{Functional, RuleId, Subtype, TransformRule, MAX_ARRAY_DIMS};
