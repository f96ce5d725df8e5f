//! Declarations the transformation operates on.
//!
//! - [`typesystem`] - Field and method descriptors
//! - [`constant`] - Literals and bootstrap operands
//! - [`method`] / [`class`] - Method bodies and class declarations
//! - [`identity`] - Member identities usable as hierarchy-aware keys
//! - [`hierarchy`] - Superclass/interface tree
//! - [`ancestor`] - Lookup map that falls back to ancestor declarations

pub mod ancestor;
pub mod class;
pub mod constant;
pub mod hierarchy;
pub mod identity;
pub mod method;
pub mod typesystem;
