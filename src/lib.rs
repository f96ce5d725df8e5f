// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # typesplit
//!
//! Whole-method type specialization for JVM bytecode.
//!
//! Given a set of *transform rules* ("a `long` produced by `Pos.asLong(III)J`
//! is really three `int`s"), `typesplit` infers which values of every method
//! of a class carry such a packed type, then rewrites the methods so those
//! values travel as their components: on the operand stack, in locals, in
//! method descriptors and in calls. The packing helpers disappear from the
//! rewritten code.
//!
//! ## Features
//!
//! - **Union-find inference** - aliased values share one classification cell;
//!   evidence from calls, fields, hints and control-flow joins propagates to a
//!   fixed point across the whole class
//! - **Call-site specifications** - rules for library calls with minimum
//!   evidence, direct replacements and component-rearranging templates
//! - **Stack-aware rewriting** - operands that must be consumed out of order
//!   are regenerated from loads, literals or scratch locals
//! - **Backward compatibility** - original entry points keep working through
//!   dispatchers and optional instrumented converters
//! - **Declarative rules** - a JSON document describes types, conversions,
//!   call specifications and per-class hints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use typesplit::prelude::*;
//!
//! let registry = RuleRegistry::from_path("rules.json")?;
//! let class = ClassBody::new("net/example/Chunk", Some("java/lang/Object".to_string()));
//!
//! let mut session = TransformSession::new();
//! let mut transformer = ClassTransformer::new(class, &registry, TransformerConfig::default())?;
//! transformer.analyze_all_methods()?;
//! transformer.finalize()?;
//! transformer.transform_all_methods(&mut session)?;
//! println!("{}", transformer.describe());
//!
//! let class = transformer.into_class();
//! println!("{} methods", class.methods.len());
//! # Ok::<(), typesplit::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - opcodes, instruction nodes, the textual instruction parser and [`assembly::MethodBuilder`]
//! - [`metadata`] - types, descriptors, method and class bodies, member identities, the type hierarchy
//! - [`rules`] - transform rules, call-site specifications and the JSON loader
//! - [`analysis`] - the inference: lattice, rule cells and the per-method analyzer
//! - [`compiler`] - removal analysis, slot allocation, the rewrite and the shims
//! - [`Error`] and [`Result`] - error handling
//!
//! Nothing is global: every run-scoped piece of state lives in a
//! [`compiler::TransformSession`] or a [`compiler::ClassTransformer`].

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use typesplit::prelude::*;
///
/// let config = TransformerConfig::safe();
/// assert!(config.add_safety);
/// ```
pub mod prelude;

/// JVM instructions and their textual form.
///
/// - [`assembly::Opcode`] - the opcode set with mnemonics and numeric values
/// - [`assembly::Insn`] - one instruction node (or a label)
/// - [`assembly::parse_insn`] - `"INVOKESTATIC a/B#c (J)I"` to an [`assembly::Insn`]
/// - [`assembly::MethodBuilder`] - fluent construction of method bodies
pub mod assembly;

/// Types, descriptors, method and class bodies.
///
/// The in-memory class model the transformation reads and writes. Reading
/// and writing class files is left to the caller.
pub mod metadata;

/// Transform rules and call-site specifications.
///
/// A [`rules::RuleRegistry`] holds every [`rules::TransformRule`], the call
/// specifications keyed by method (with hierarchy-aware lookup), the type
/// hierarchy and per-class type hints. It is built in code or loaded from JSON.
pub mod rules;

/// Rule inference over the methods of one class.
pub mod analysis;

/// Method rewriting, compatibility shims and the class driver.
pub mod compiler;

/// Small supporting data structures.
pub mod utils;

/// `typesplit` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust
/// use typesplit::{metadata::typesystem::MethodDescriptor, Result};
///
/// fn parse(desc: &str) -> Result<MethodDescriptor> {
///     desc.parse()
/// }
/// assert!(parse("(III)J").is_ok());
/// assert!(parse("(III").is_err());
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `typesplit` Error type
///
/// The main error type for all operations in this crate. Errors raised while
/// rewriting a method arrive wrapped in [`Error::Method`] naming that method.
///
/// # Examples
///
/// ```rust
/// use typesplit::{assembly::parse_insn, Error};
///
/// match parse_insn("FROB 1") {
///     Ok(insn) => println!("{insn}"),
///     Err(Error::Config(message)) => println!("bad instruction: {message}"),
///     Err(e) => println!("error: {e}"),
/// }
/// ```
pub use error::Error;
