//! Field and method descriptors.
//!
//! [`JvmType`] models a single field descriptor (`I`, `J`, `Ljava/lang/String;`,
//! `[[D`, ...) and [`MethodDescriptor`] a full `(params)return` descriptor.
//! Besides parsing and printing, the types know their local/stack slot width
//! and which typed opcode variant (`ILOAD` vs `LLOAD` vs `ALOAD`...) moves them.
//!
//! # Example
//!
//! ```rust
//! use typesplit::metadata::typesystem::{JvmType, MethodDescriptor};
//! use typesplit::assembly::Opcode;
//!
//! let desc: MethodDescriptor = "(IJLjava/lang/Object;)J".parse()?;
//! assert_eq!(desc.params().len(), 3);
//! assert_eq!(desc.arg_slots(), 4);
//! assert_eq!(desc.ret().load_opcode(), Opcode::LLOAD);
//! assert_eq!(desc.to_string(), "(IJLjava/lang/Object;)J");
//! # Ok::<(), typesplit::Error>(())
//! ```

use std::{fmt, str::FromStr};

use crate::{assembly::Opcode, Error, Result};

/// Internal name of `java.lang.Object`.
pub const OBJECT: &str = "java/lang/Object";

/// A field descriptor type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JvmType {
    /// `V`, only valid as a return type
    Void,
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `F`
    Float,
    /// `J`
    Long,
    /// `D`
    Double,
    /// `L<internal name>;`
    Object(String),
    /// `[<component>`
    Array(Box<JvmType>),
}

impl JvmType {
    /// Creates an object type from an internal name (`java/lang/String`).
    #[must_use]
    pub fn object(internal_name: impl Into<String>) -> Self {
        JvmType::Object(internal_name.into())
    }

    /// Parses one type from the front of `input`, returning it and the remaining text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if `input` does not start with a valid descriptor.
    pub fn parse_prefix(input: &str) -> Result<(JvmType, &str)> {
        let mut chars = input.chars();
        let Some(tag) = chars.next() else {
            return Err(malformed_error!("Empty type descriptor"));
        };
        let rest = chars.as_str();
        let ty = match tag {
            'V' => JvmType::Void,
            'Z' => JvmType::Boolean,
            'B' => JvmType::Byte,
            'C' => JvmType::Char,
            'S' => JvmType::Short,
            'I' => JvmType::Int,
            'F' => JvmType::Float,
            'J' => JvmType::Long,
            'D' => JvmType::Double,
            'L' => {
                let end = rest
                    .find(';')
                    .ok_or_else(|| malformed_error!("Unterminated object descriptor '{}'", input))?;
                if end == 0 {
                    return Err(malformed_error!("Empty class name in '{}'", input));
                }
                return Ok((JvmType::Object(rest[..end].to_string()), &rest[end + 1..]));
            }
            '[' => {
                let (component, rest) = JvmType::parse_prefix(rest)?;
                if component == JvmType::Void {
                    return Err(malformed_error!("Array of void in '{}'", input));
                }
                return Ok((JvmType::Array(Box::new(component)), rest));
            }
            other => {
                return Err(malformed_error!(
                    "Invalid descriptor character '{}' in '{}'",
                    other,
                    input
                ))
            }
        };
        Ok((ty, rest))
    }

    /// Parses a type from an internal name as used by `NEW`/`CHECKCAST`/`ANEWARRAY`
    /// (`java/lang/String` or an array descriptor such as `[I`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if an array descriptor is invalid.
    pub fn from_internal_name(name: &str) -> Result<JvmType> {
        if name.starts_with('[') {
            name.parse()
        } else {
            Ok(JvmType::Object(name.to_string()))
        }
    }

    /// Returns the descriptor string.
    #[must_use]
    pub fn descriptor(&self) -> String {
        self.to_string()
    }

    /// Returns the internal name for reference types (`java/lang/String`, `[I`).
    #[must_use]
    pub fn internal_name(&self) -> Option<String> {
        match self {
            JvmType::Object(name) => Some(name.clone()),
            JvmType::Array(_) => Some(self.descriptor()),
            _ => None,
        }
    }

    /// Number of local/stack slots a value of this type occupies.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            JvmType::Void => 0,
            JvmType::Long | JvmType::Double => 2,
            _ => 1,
        }
    }

    /// Returns `true` for object and array types.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, JvmType::Object(_) | JvmType::Array(_))
    }

    /// Returns `true` for the types the verifier treats as `int`.
    #[must_use]
    pub const fn is_int_like(&self) -> bool {
        matches!(
            self,
            JvmType::Boolean | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Int
        )
    }

    /// Collapses the type to its verifier category: int-like types become `Int`,
    /// every reference type becomes `java/lang/Object`.
    #[must_use]
    pub fn erased(&self) -> JvmType {
        match self {
            t if t.is_int_like() => JvmType::Int,
            t if t.is_reference() => JvmType::object(OBJECT),
            other => other.clone(),
        }
    }

    /// The `xLOAD` opcode for this type.
    #[must_use]
    pub fn load_opcode(&self) -> Opcode {
        match self {
            JvmType::Long => Opcode::LLOAD,
            JvmType::Float => Opcode::FLOAD,
            JvmType::Double => Opcode::DLOAD,
            t if t.is_reference() => Opcode::ALOAD,
            _ => Opcode::ILOAD,
        }
    }

    /// The `xSTORE` opcode for this type.
    #[must_use]
    pub fn store_opcode(&self) -> Opcode {
        match self {
            JvmType::Long => Opcode::LSTORE,
            JvmType::Float => Opcode::FSTORE,
            JvmType::Double => Opcode::DSTORE,
            t if t.is_reference() => Opcode::ASTORE,
            _ => Opcode::ISTORE,
        }
    }

    /// The `xRETURN` opcode for this type (`RETURN` for void).
    #[must_use]
    pub fn return_opcode(&self) -> Opcode {
        match self {
            JvmType::Void => Opcode::RETURN,
            JvmType::Long => Opcode::LRETURN,
            JvmType::Float => Opcode::FRETURN,
            JvmType::Double => Opcode::DRETURN,
            t if t.is_reference() => Opcode::ARETURN,
            _ => Opcode::IRETURN,
        }
    }

    /// Wraps the type in `dims` array levels.
    #[must_use]
    pub fn array_of(&self, dims: usize) -> JvmType {
        (0..dims).fold(self.clone(), |ty, _| JvmType::Array(Box::new(ty)))
    }

    /// Element type of an array type.
    #[must_use]
    pub fn element(&self) -> Option<&JvmType> {
        match self {
            JvmType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// The array load opcode reading an element of this type.
    #[must_use]
    pub fn array_load_opcode(&self) -> Opcode {
        match self {
            JvmType::Boolean | JvmType::Byte => Opcode::BALOAD,
            JvmType::Char => Opcode::CALOAD,
            JvmType::Short => Opcode::SALOAD,
            JvmType::Long => Opcode::LALOAD,
            JvmType::Float => Opcode::FALOAD,
            JvmType::Double => Opcode::DALOAD,
            t if t.is_reference() => Opcode::AALOAD,
            _ => Opcode::IALOAD,
        }
    }

    /// The array store opcode writing an element of this type.
    #[must_use]
    pub fn array_store_opcode(&self) -> Opcode {
        match self {
            JvmType::Boolean | JvmType::Byte => Opcode::BASTORE,
            JvmType::Char => Opcode::CASTORE,
            JvmType::Short => Opcode::SASTORE,
            JvmType::Long => Opcode::LASTORE,
            JvmType::Float => Opcode::FASTORE,
            JvmType::Double => Opcode::DASTORE,
            t if t.is_reference() => Opcode::AASTORE,
            _ => Opcode::IASTORE,
        }
    }

    /// `NEWARRAY` type code for a primitive element type (JVMS §6.5.newarray).
    #[must_use]
    pub const fn newarray_code(&self) -> Option<i32> {
        match self {
            JvmType::Boolean => Some(4),
            JvmType::Char => Some(5),
            JvmType::Float => Some(6),
            JvmType::Double => Some(7),
            JvmType::Byte => Some(8),
            JvmType::Short => Some(9),
            JvmType::Int => Some(10),
            JvmType::Long => Some(11),
            _ => None,
        }
    }

    /// The pop instruction that discards one value of this type.
    #[must_use]
    pub const fn pop_opcode(&self) -> Opcode {
        if self.size() == 2 {
            Opcode::POP2
        } else {
            Opcode::POP
        }
    }

    /// The duplicate instruction that copies one value of this type.
    #[must_use]
    pub const fn dup_opcode(&self) -> Opcode {
        if self.size() == 2 {
            Opcode::DUP2
        } else {
            Opcode::DUP
        }
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JvmType::Void => f.write_str("V"),
            JvmType::Boolean => f.write_str("Z"),
            JvmType::Byte => f.write_str("B"),
            JvmType::Char => f.write_str("C"),
            JvmType::Short => f.write_str("S"),
            JvmType::Int => f.write_str("I"),
            JvmType::Float => f.write_str("F"),
            JvmType::Long => f.write_str("J"),
            JvmType::Double => f.write_str("D"),
            JvmType::Object(name) => write!(f, "L{name};"),
            JvmType::Array(component) => write!(f, "[{component}"),
        }
    }
}

impl FromStr for JvmType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (ty, rest) = JvmType::parse_prefix(s)?;
        if !rest.is_empty() {
            return Err(malformed_error!("Trailing characters in type descriptor '{}'", s));
        }
        Ok(ty)
    }
}

/// A method descriptor: parameter types and return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    params: Vec<JvmType>,
    ret: JvmType,
}

impl MethodDescriptor {
    /// Creates a descriptor from its parts.
    #[must_use]
    pub fn new(params: Vec<JvmType>, ret: JvmType) -> Self {
        Self { params, ret }
    }

    /// Parameter types, receiver excluded.
    #[must_use]
    pub fn params(&self) -> &[JvmType] {
        &self.params
    }

    /// Return type.
    #[must_use]
    pub fn ret(&self) -> &JvmType {
        &self.ret
    }

    /// Number of local slots the parameters occupy, receiver excluded.
    #[must_use]
    pub fn arg_slots(&self) -> usize {
        self.params.iter().map(JvmType::size).sum()
    }

    /// Returns a copy with a different return type.
    #[must_use]
    pub fn with_ret(&self, ret: JvmType) -> Self {
        Self {
            params: self.params.clone(),
            ret,
        }
    }

    /// Returns a copy with `ty` inserted as the first parameter.
    #[must_use]
    pub fn with_leading_param(&self, ty: JvmType) -> Self {
        let mut params = Vec::with_capacity(self.params.len() + 1);
        params.push(ty);
        params.extend(self.params.iter().cloned());
        Self {
            params,
            ret: self.ret.clone(),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        write!(f, "){}", self.ret)
    }
}

impl FromStr for MethodDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut rest = s
            .strip_prefix('(')
            .ok_or_else(|| malformed_error!("Method descriptor must start with '(': '{}'", s))?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            if rest.is_empty() {
                return Err(malformed_error!("Unterminated parameter list in '{}'", s));
            }
            let (param, tail) = JvmType::parse_prefix(rest)?;
            if param == JvmType::Void {
                return Err(malformed_error!("Void parameter in '{}'", s));
            }
            params.push(param);
            rest = tail;
        }
        let ret: JvmType = rest[1..].parse()?;
        Ok(Self { params, ret })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives_and_objects() {
        assert_eq!("I".parse::<JvmType>().ok(), Some(JvmType::Int));
        assert_eq!(
            "Ljava/lang/String;".parse::<JvmType>().ok(),
            Some(JvmType::object("java/lang/String"))
        );
        assert_eq!(
            "[[J".parse::<JvmType>().ok(),
            Some(JvmType::Array(Box::new(JvmType::Array(Box::new(JvmType::Long)))))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("Q".parse::<JvmType>().is_err());
        assert!("Ljava/lang/String".parse::<JvmType>().is_err());
        assert!("II".parse::<JvmType>().is_err());
        assert!("(V)V".parse::<MethodDescriptor>().is_err());
        assert!("(I".parse::<MethodDescriptor>().is_err());
    }

    #[test]
    fn test_method_descriptor_roundtrip() {
        let text = "(IJ[Ljava/lang/Object;D)V";
        let desc: MethodDescriptor = text.parse().unwrap();
        assert_eq!(desc.params().len(), 4);
        assert_eq!(desc.arg_slots(), 6);
        assert_eq!(desc.ret(), &JvmType::Void);
        assert_eq!(desc.to_string(), text);
    }

    #[test]
    fn test_array_helpers() {
        let grid = JvmType::Int.array_of(2);
        assert_eq!(grid.to_string(), "[[I");
        assert_eq!(grid.element(), Some(&JvmType::Int.array_of(1)));
        assert_eq!(grid.element().unwrap().array_load_opcode(), Opcode::AALOAD);
        assert_eq!(JvmType::Int.array_store_opcode(), Opcode::IASTORE);
        assert_eq!(JvmType::Boolean.array_load_opcode(), Opcode::BALOAD);
        assert_eq!(JvmType::Long.newarray_code(), Some(11));
        assert_eq!(grid.newarray_code(), None);
    }

    #[test]
    fn test_typed_opcodes() {
        assert_eq!(JvmType::Boolean.load_opcode(), Opcode::ILOAD);
        assert_eq!(JvmType::Double.store_opcode(), Opcode::DSTORE);
        assert_eq!(JvmType::object("a/B").return_opcode(), Opcode::ARETURN);
        assert_eq!(JvmType::Void.return_opcode(), Opcode::RETURN);
        assert_eq!(JvmType::Long.pop_opcode(), Opcode::POP2);
    }

    #[test]
    fn test_internal_name() {
        assert_eq!(
            JvmType::from_internal_name("[I").ok(),
            Some(JvmType::Array(Box::new(JvmType::Int)))
        );
        assert_eq!(JvmType::object("a/B").internal_name().as_deref(), Some("a/B"));
        assert_eq!(JvmType::Int.internal_name(), None);
        assert_eq!(JvmType::Short.erased(), JvmType::Int);
    }
}
