//! # typesplit Prelude
//!
//! The types needed to load rules and transform a class, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all typesplit operations
pub use crate::Error;

/// The result type used throughout typesplit
pub use crate::Result;

// ================================================================================================
// Bytecode Model
// ================================================================================================

pub use crate::assembly::{Insn, LabelId, MethodBuilder, Opcode};
pub use crate::metadata::{
    class::{ClassBody, FieldBody},
    identity::{CallKind, FieldId, MethodId},
    method::{AccessFlags, MethodBody},
    typesystem::{JvmType, MethodDescriptor},
};

// ================================================================================================
// Rules
// ================================================================================================

pub use crate::rules::{CallSpec, Functional, Replacement, RuleId, RuleRegistry, Subtype, TransformRule};

// ================================================================================================
// Transformation
// ================================================================================================

pub use crate::compiler::{
    ClassTransformer, MethodPlan, TransformSession, TransformerConfig, CONSTRUCTOR_MAGIC,
};
