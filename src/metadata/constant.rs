//! Literal constants and bootstrap method operands.
//!
//! [`Constant`] compares floating point literals by bit pattern so that it can
//! key the per-rule constant substitution tables (`0.0` and `-0.0` stay
//! distinct, `NaN` equals itself).

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::metadata::typesystem::{JvmType, MethodDescriptor};

/// A literal pushed by a constant instruction.
#[derive(Debug, Clone)]
pub enum Constant {
    /// `ACONST_NULL`
    Null,
    /// `int` (also used for `boolean`, `byte`, `char` and `short` literals)
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `java.lang.String`
    String(String),
    /// `java.lang.Class` literal
    Type(JvmType),
}

impl Constant {
    /// The static type of the pushed value.
    #[must_use]
    pub fn jvm_type(&self) -> JvmType {
        match self {
            Constant::Null => JvmType::object(crate::metadata::typesystem::OBJECT),
            Constant::Int(_) => JvmType::Int,
            Constant::Long(_) => JvmType::Long,
            Constant::Float(_) => JvmType::Float,
            Constant::Double(_) => JvmType::Double,
            Constant::String(_) => JvmType::object("java/lang/String"),
            Constant::Type(_) => JvmType::object("java/lang/Class"),
        }
    }

    /// Reinterprets an integral constant as `ty`, used when a rule document writes
    /// a plain number for a `long`/`float` component.
    #[must_use]
    pub fn coerce(&self, ty: &JvmType) -> Constant {
        match (self, ty) {
            (Constant::Int(v), JvmType::Long) => Constant::Long(i64::from(*v)),
            (Constant::Int(v), JvmType::Float) => Constant::Float(*v as f32),
            (Constant::Int(v), JvmType::Double) => Constant::Double(f64::from(*v)),
            (Constant::Long(v), t) if t.is_int_like() => Constant::Int(*v as i32),
            (Constant::Long(v), JvmType::Float) => Constant::Float(*v as f32),
            (Constant::Long(v), JvmType::Double) => Constant::Double(*v as f64),
            (Constant::Double(v), JvmType::Float) => Constant::Float(*v as f32),
            (other, _) => other.clone(),
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Null, Constant::Null) => true,
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Long(a), Constant::Long(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) => a == b,
            (Constant::Type(a), Constant::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::Null => {}
            Constant::Int(v) => v.hash(state),
            Constant::Long(v) => v.hash(state),
            Constant::Float(v) => v.to_bits().hash(state),
            Constant::Double(v) => v.to_bits().hash(state),
            Constant::String(v) => v.hash(state),
            Constant::Type(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Float(v) => write!(f, "{v:?}F"),
            Constant::Double(v) => write!(f, "{v:?}D"),
            Constant::String(v) => write!(f, "{v:?}"),
            Constant::Type(v) => write!(f, "{v}.class"),
        }
    }
}

/// The reference kind of a method handle (JVMS §5.4.3.5).
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl HandleKind {
    /// Returns `true` when the referenced method takes no receiver.
    #[must_use]
    pub const fn is_static(self) -> bool {
        matches!(self, HandleKind::InvokeStatic | HandleKind::GetStatic | HandleKind::PutStatic)
    }
}

/// A method handle constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Reference kind
    pub kind: HandleKind,
    /// Owner internal name
    pub owner: String,
    /// Member name
    pub name: String,
    /// Member descriptor (method or field descriptor depending on `kind`)
    pub desc: String,
    /// Whether the owner is an interface
    pub interface: bool,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}#{} {}", self.kind, self.owner, self.name, self.desc)
    }
}

/// A static argument of an `INVOKEDYNAMIC` bootstrap method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BsmArg {
    /// Primitive or string literal
    Constant(Constant),
    /// `MethodType` constant
    MethodType(MethodDescriptor),
    /// `MethodHandle` constant
    Handle(Handle),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn test_float_identity_by_bits() {
        assert_eq!(Constant::Float(f32::NAN), Constant::Float(f32::NAN));
        assert_ne!(Constant::Double(0.0), Constant::Double(-0.0));

        let mut set = FxHashSet::default();
        set.insert(Constant::Long(i64::MAX));
        assert!(set.contains(&Constant::Long(i64::MAX)));
        assert!(!set.contains(&Constant::Int(-1)));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(Constant::Int(5).coerce(&JvmType::Long), Constant::Long(5));
        assert_eq!(Constant::Long(7).coerce(&JvmType::Int), Constant::Int(7));
        assert_eq!(
            Constant::String("x".into()).coerce(&JvmType::Int),
            Constant::String("x".into())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Constant::Long(3).to_string(), "3L");
        assert_eq!(Constant::Float(1.5).to_string(), "1.5F");
        assert_eq!(Constant::Null.to_string(), "null");
    }
}
