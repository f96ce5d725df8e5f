//! Instruction model.
//!
//! The crate rewrites code at the level of symbolic instruction lists, the way
//! tree-based bytecode libraries expose it: one [`Insn`] per instruction, with
//! [`Insn::Label`] pseudo instructions as branch targets. Encoding to and from
//! the class-file container is left to the caller.
//!
//! # Key Components
//!
//! - [`Opcode`] - The JVM opcode set with mnemonic conversions
//! - [`Insn`] - Instruction nodes and their control-flow properties
//! - [`MethodBuilder`] - Fluent assembler for method bodies
//! - [`parse_insn`] - Textual instruction syntax used by rule templates

mod builder;
mod instruction;
mod opcode;
pub mod parser;

pub use builder::MethodBuilder;
pub use instruction::{FlowType, Insn, LabelId};
pub use opcode::Opcode;
pub use parser::{parse_insn, parse_insns, parse_literal};
