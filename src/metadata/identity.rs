//! Member identities.
//!
//! [`MethodId`] and [`FieldId`] name a member by (owner, name, descriptor).
//! Both implement [`Ancestral`], which lets hierarchy-aware lookups re-key
//! them onto a superclass or interface of the original owner.

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use crate::{
    assembly::{parser::split_member, Insn, Opcode},
    metadata::{
        method::MethodBody,
        typesystem::{JvmType, MethodDescriptor},
    },
    Error, Result,
};

/// A key whose owner type can be swapped for one of its ancestors.
pub trait Ancestral: Eq + Hash + Clone {
    /// Internal name of the declaring type.
    fn owner(&self) -> &str;

    /// The same member, declared on `owner` instead.
    #[must_use]
    fn with_owner(&self, owner: &str) -> Self;
}

/// How a method is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `INVOKEVIRTUAL`
    Virtual,
    /// `INVOKESTATIC`
    Static,
    /// `INVOKESPECIAL`
    Special,
    /// `INVOKEINTERFACE`
    Interface,
}

impl CallKind {
    /// The invoke opcode for this kind.
    #[must_use]
    pub const fn opcode(self) -> Opcode {
        match self {
            CallKind::Virtual => Opcode::INVOKEVIRTUAL,
            CallKind::Static => Opcode::INVOKESTATIC,
            CallKind::Special => Opcode::INVOKESPECIAL,
            CallKind::Interface => Opcode::INVOKEINTERFACE,
        }
    }

    /// The kind an invoke opcode uses.
    #[must_use]
    pub const fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::INVOKEVIRTUAL => Some(CallKind::Virtual),
            Opcode::INVOKESTATIC => Some(CallKind::Static),
            Opcode::INVOKESPECIAL => Some(CallKind::Special),
            Opcode::INVOKEINTERFACE => Some(CallKind::Interface),
            _ => None,
        }
    }

    const fn tag(self) -> char {
        match self {
            CallKind::Virtual => 'v',
            CallKind::Static => 's',
            CallKind::Special => 'S',
            CallKind::Interface => 'i',
        }
    }
}

/// A method reference. Equality and hashing ignore the call kind.
#[derive(Debug, Clone)]
pub struct MethodId {
    /// Declaring type
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub desc: MethodDescriptor,
    /// Invocation kind
    pub kind: CallKind,
}

impl MethodId {
    /// Creates a method reference.
    #[must_use]
    pub fn new(
        kind: CallKind,
        owner: impl Into<String>,
        name: impl Into<String>,
        desc: MethodDescriptor,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            desc,
            kind,
        }
    }

    /// Identity of a method declared in `owner`.
    #[must_use]
    pub fn of_method(owner: &str, method: &MethodBody) -> Self {
        let kind = if method.is_static() {
            CallKind::Static
        } else {
            CallKind::Virtual
        };
        Self::new(kind, owner, method.name.clone(), method.desc.clone())
    }

    /// Identity of the method an invoke instruction calls.
    #[must_use]
    pub fn from_insn(insn: &Insn) -> Option<Self> {
        match insn {
            Insn::Method {
                opcode,
                owner,
                name,
                desc,
                ..
            } => Some(Self::new(
                CallKind::from_opcode(*opcode)?,
                owner.clone(),
                name.clone(),
                desc.clone(),
            )),
            _ => None,
        }
    }

    /// Pseudo method standing for an array instruction on `array`, so array
    /// accesses can carry call specifications.
    ///
    /// The array is the receiver of element loads, stores and `ARRAYLENGTH`;
    /// `NEWARRAY` and `ANEWARRAY` are static and return it. Returns `None` for
    /// other opcodes and non-array types.
    #[must_use]
    pub fn array_op(opcode: Opcode, array: &JvmType) -> Option<Self> {
        let element = array.element()?.clone();
        let (kind, desc) = match opcode {
            Opcode::IALOAD
            | Opcode::LALOAD
            | Opcode::FALOAD
            | Opcode::DALOAD
            | Opcode::AALOAD
            | Opcode::BALOAD
            | Opcode::CALOAD
            | Opcode::SALOAD => (CallKind::Virtual, MethodDescriptor::new(vec![JvmType::Int], element)),
            Opcode::IASTORE
            | Opcode::LASTORE
            | Opcode::FASTORE
            | Opcode::DASTORE
            | Opcode::AASTORE
            | Opcode::BASTORE
            | Opcode::CASTORE
            | Opcode::SASTORE => (
                CallKind::Virtual,
                MethodDescriptor::new(vec![JvmType::Int, element], JvmType::Void),
            ),
            Opcode::ARRAYLENGTH => (CallKind::Virtual, MethodDescriptor::new(Vec::new(), JvmType::Int)),
            Opcode::NEWARRAY | Opcode::ANEWARRAY => {
                (CallKind::Static, MethodDescriptor::new(vec![JvmType::Int], array.clone()))
            }
            _ => return None,
        };
        Some(Self::new(kind, array.descriptor(), opcode.to_string(), desc))
    }

    /// Returns `true` if there is no receiver.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.kind == CallKind::Static
    }

    /// Parameter types with the receiver prepended for instance methods.
    #[must_use]
    pub fn all_params(&self) -> Vec<JvmType> {
        let mut params = Vec::with_capacity(self.desc.params().len() + 1);
        if !self.is_static() {
            let receiver = JvmType::from_internal_name(&self.owner)
                .unwrap_or_else(|_| JvmType::object(self.owner.clone()));
            params.push(receiver);
        }
        params.extend(self.desc.params().iter().cloned());
        params
    }

    /// An instruction invoking this method.
    #[must_use]
    pub fn call_insn(&self) -> Insn {
        Insn::invoke(
            self.kind.opcode(),
            self.owner.clone(),
            self.name.clone(),
            self.desc.clone(),
        )
    }

    /// Returns `true` when `method` declared in `owner` is this method.
    #[must_use]
    pub fn matches(&self, owner: &str, method: &MethodBody) -> bool {
        self.owner == owner && self.name == method.name && self.desc == method.desc
    }
}

impl PartialEq for MethodId {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.name == other.name && self.desc == other.desc
    }
}

impl Eq for MethodId {}

impl Hash for MethodId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.name.hash(state);
        self.desc.hash(state);
    }
}

impl Ancestral for MethodId {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn with_owner(&self, owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}#{} {}", self.kind.tag(), self.owner, self.name, self.desc)
    }
}

impl FromStr for MethodId {
    type Err = Error;

    /// Parses `"<kind> owner#name desc"` where kind is `v`, `s`, `S` or `i`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (tag, rest) = s
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::Config(format!("invalid method reference '{s}'")))?;
        let kind = match tag {
            "v" => CallKind::Virtual,
            "s" => CallKind::Static,
            "S" => CallKind::Special,
            "i" => CallKind::Interface,
            other => {
                return Err(Error::Config(format!(
                    "unknown call kind '{other}' in '{s}'"
                )))
            }
        };
        let (owner, name, desc) = split_member(rest.trim(), s)?;
        Ok(Self::new(kind, owner, name, desc.parse()?))
    }
}

/// A field reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldId {
    /// Declaring type
    pub owner: String,
    /// Field name
    pub name: String,
    /// Field type
    pub desc: JvmType,
}

impl FieldId {
    /// Creates a field reference.
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: JvmType) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            desc,
        }
    }

    /// Identity of the field a field instruction accesses.
    #[must_use]
    pub fn from_insn(insn: &Insn) -> Option<Self> {
        match insn {
            Insn::Field {
                owner, name, desc, ..
            } => Some(Self::new(owner.clone(), name.clone(), desc.clone())),
            _ => None,
        }
    }
}

impl Ancestral for FieldId {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn with_owner(&self, owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} {}", self.owner, self.name, self.desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn test_array_pseudo_methods() {
        let longs = JvmType::Long.array_of(1);
        let load = MethodId::array_op(Opcode::LALOAD, &longs).unwrap();
        assert_eq!(load.to_string(), "v [J#LALOAD (I)J");
        assert_eq!(load.all_params(), vec![longs.clone(), JvmType::Int]);

        let create = MethodId::array_op(Opcode::NEWARRAY, &longs).unwrap();
        assert!(create.is_static());
        assert_eq!(create.desc.ret(), &longs);
        assert!(MethodId::array_op(Opcode::IADD, &longs).is_none());
        assert!(MethodId::array_op(Opcode::LALOAD, &JvmType::Long).is_none());
    }

    #[test]
    fn test_parse_and_display() {
        let id: MethodId = "s net/example/Pos#asLong (III)J".parse().unwrap();
        assert_eq!(id.kind, CallKind::Static);
        assert_eq!(id.owner, "net/example/Pos");
        assert_eq!(id.to_string(), "s net/example/Pos#asLong (III)J");
        assert!("x a/B#c ()V".parse::<MethodId>().is_err());
        assert!("v a/B ()V".parse::<MethodId>().is_err());
    }

    #[test]
    fn test_equality_ignores_kind() {
        let a: MethodId = "v a/B#run ()V".parse().unwrap();
        let b: MethodId = "i a/B#run ()V".parse().unwrap();
        assert_eq!(a, b);
        let mut set = FxHashSet::default();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_all_params_and_rekey() {
        let id: MethodId = "v a/B#put (JI)V".parse().unwrap();
        assert_eq!(
            id.all_params(),
            vec![JvmType::object("a/B"), JvmType::Long, JvmType::Int]
        );
        let moved = id.with_owner("a/Base");
        assert_eq!(moved.owner, "a/Base");
        assert_eq!(moved.name, "put");
    }

    #[test]
    fn test_from_insn() {
        let insn = Insn::invoke(
            Opcode::INVOKEINTERFACE,
            "a/I",
            "get",
            "()J".parse().unwrap(),
        );
        let id = MethodId::from_insn(&insn).unwrap();
        assert_eq!(id.kind, CallKind::Interface);
        assert_eq!(id.call_insn(), insn);
    }
}
