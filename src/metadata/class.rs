//! Class and field declarations.

use crate::metadata::{
    method::{AccessFlags, MethodBody},
    typesystem::{JvmType, MethodDescriptor},
};

/// A declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBody {
    /// Access flags
    pub access: AccessFlags,
    /// Field name
    pub name: String,
    /// Declared type
    pub desc: JvmType,
}

impl FieldBody {
    /// Creates a field declaration.
    #[must_use]
    pub fn new(access: AccessFlags, name: impl Into<String>, desc: JvmType) -> Self {
        Self {
            access,
            name: name.into(),
            desc,
        }
    }
}

/// A class: its place in the hierarchy, fields and methods.
#[derive(Debug, Clone)]
pub struct ClassBody {
    /// Access flags
    pub access: AccessFlags,
    /// Internal name
    pub name: String,
    /// Superclass internal name, `None` only for `java/lang/Object`
    pub super_name: Option<String>,
    /// Implemented interfaces
    pub interfaces: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldBody>,
    /// Declared methods
    pub methods: Vec<MethodBody>,
}

impl ClassBody {
    /// Creates an empty class extending `super_name`.
    #[must_use]
    pub fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            access: AccessFlags::PUBLIC,
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Finds a method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, desc: &MethodDescriptor) -> Option<&MethodBody> {
        self.methods
            .iter()
            .find(|m| m.name == name && &m.desc == desc)
    }

    /// Finds a method by name and descriptor, mutably.
    pub fn method_mut(&mut self, name: &str, desc: &MethodDescriptor) -> Option<&mut MethodBody> {
        self.methods
            .iter_mut()
            .find(|m| m.name == name && &m.desc == desc)
    }

    /// Finds a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldBody> {
        self.fields.iter().find(|f| f.name == name)
    }
}
