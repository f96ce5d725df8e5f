//! Rule inference.
//!
//! This module discovers, for every value of every method of a class, whether
//! it must be split and by which [`crate::rules::TransformRule`]. Values are
//! abstract-interpretation values: one per stack entry or local slot per
//! program point, each pointing into a union-find forest of rule cells so that
//! aliased values share one classification.
//!
//! # Architecture
//!
//! - [`CellArena`] / [`RuleCell`] - the union-find forest with one-shot resolution
//! - [`TrackedValue`] - type, cell, producer and consumer instructions of one value
//! - [`PendingCheck`] - a candidate call-site spec waiting for evidence
//! - [`Lattice`] - the class-wide arena of all of the above plus field slots,
//!   with worklist propagation of new classifications
//! - [`Analyzer`] - the fixed-point interpreter for one method
//! - [`DeferredBindings`] - call constraints waiting for a not yet analyzed callee
//! - [`MethodAnalysis`] - frames, inputs, outputs and signature classification
//!
//! # Usage
//!
//! ```rust,ignore
//! use typesplit::analysis::{Analyzer, ClassScope, DeferredBindings, Lattice};
//!
//! let mut lattice = Lattice::new(registry.hierarchy().clone());
//! let mut deferred = DeferredBindings::new();
//! let scope = ClassScope { owner: "a/B", declared: &declared, analyzed: &done, registry: &registry };
//! let analysis = Analyzer::new(scope, &method, &mut lattice, &mut deferred).analyze()?;
//! ```

mod analyzer;
mod bindings;
mod cell;
mod check;
mod frame;
mod interpreter;
mod lattice;
mod result;
mod value;

pub use analyzer::{Analyzer, ClassScope};
pub use bindings::{DeferredBindings, DeferredCallBinding};
pub use cell::{CellArena, CellId, RuleCell};
pub use check::{CheckId, CheckState, PendingCheck};
pub use frame::Frame;
pub use lattice::{common_type, Lattice, MergeOutcome};
pub use result::MethodAnalysis;
pub use value::{TrackedValue, ValueId};
