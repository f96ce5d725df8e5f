//! Instruction nodes.
//!
//! An [`Insn`] is one element of a method's instruction list. Branch targets
//! are symbolic [`LabelId`]s resolved against [`Insn::Label`] pseudo
//! instructions, so instructions can be inserted or removed without fixing up
//! offsets. The textual form produced by `Display` is the same syntax accepted
//! by [`crate::assembly::parse_insn`].
//!
//! # Example
//!
//! ```rust
//! use typesplit::assembly::{Insn, Opcode};
//! use typesplit::metadata::constant::Constant;
//!
//! let push = Insn::push(&Constant::Int(100));
//! assert_eq!(push, Insn::IntOp { opcode: Opcode::BIPUSH, operand: 100 });
//! assert_eq!(push.to_string(), "BIPUSH 100");
//! assert_eq!(push.constant(), Some(Constant::Int(100)));
//! ```

use std::fmt;

use crate::{
    assembly::Opcode,
    metadata::{
        constant::{BsmArg, Constant, Handle},
        typesystem::{JvmType, MethodDescriptor},
    },
};

/// Symbolic branch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// How control leaves an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to a label, or fall through
    ConditionalBranch,
    /// Always branches to a label
    UnconditionalBranch,
    /// Multi-way branch (switch statement)
    Switch,
    /// Returns from current method
    Return,
    /// Exception throwing
    Throw,
}

/// A single instruction or label.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// Instruction without operands (`IADD`, `ACONST_NULL`, `ARETURN`, ...)
    Op(Opcode),
    /// `BIPUSH`, `SIPUSH` or `NEWARRAY` with its immediate
    IntOp {
        /// Opcode
        opcode: Opcode,
        /// Immediate operand
        operand: i32,
    },
    /// Local variable load or store
    Var {
        /// Opcode
        opcode: Opcode,
        /// Slot index
        var: u16,
    },
    /// `IINC var incr`
    Iinc {
        /// Slot index
        var: u16,
        /// Increment
        incr: i16,
    },
    /// `LDC constant`
    Ldc(Constant),
    /// Conditional or unconditional jump
    Jump {
        /// Opcode
        opcode: Opcode,
        /// Target label
        target: LabelId,
    },
    /// Branch target pseudo instruction
    Label(LabelId),
    /// `TABLESWITCH`
    TableSwitch {
        /// Lowest key
        min: i32,
        /// Highest key
        max: i32,
        /// Default target
        default: LabelId,
        /// One target per key in `min..=max`
        targets: Vec<LabelId>,
    },
    /// `LOOKUPSWITCH`
    LookupSwitch {
        /// Default target
        default: LabelId,
        /// Sorted keys
        keys: Vec<i32>,
        /// One target per key
        targets: Vec<LabelId>,
    },
    /// Field access
    Field {
        /// Opcode
        opcode: Opcode,
        /// Owner internal name
        owner: String,
        /// Field name
        name: String,
        /// Field type
        desc: JvmType,
    },
    /// Method invocation
    Method {
        /// Opcode
        opcode: Opcode,
        /// Owner internal name
        owner: String,
        /// Method name
        name: String,
        /// Method descriptor
        desc: MethodDescriptor,
        /// Whether the owner is an interface
        interface: bool,
    },
    /// `INVOKEDYNAMIC`
    InvokeDynamic {
        /// Call site name
        name: String,
        /// Call site descriptor
        desc: MethodDescriptor,
        /// Bootstrap method
        bootstrap: Handle,
        /// Static bootstrap arguments
        args: Vec<BsmArg>,
    },
    /// `NEW`, `ANEWARRAY`, `CHECKCAST` or `INSTANCEOF`
    Type {
        /// Opcode
        opcode: Opcode,
        /// Internal name or array descriptor
        desc: String,
    },
}

impl Insn {
    /// Creates the instruction allocating an array of `element`, with the
    /// length on the stack.
    #[must_use]
    pub fn new_array(element: &JvmType) -> Self {
        match element.newarray_code() {
            Some(code) => Insn::IntOp {
                opcode: Opcode::NEWARRAY,
                operand: code,
            },
            None => Insn::Type {
                opcode: Opcode::ANEWARRAY,
                desc: element.internal_name().unwrap_or_else(|| element.descriptor()),
            },
        }
    }

    /// Creates a local variable access.
    #[must_use]
    pub const fn var(opcode: Opcode, var: u16) -> Self {
        Insn::Var { opcode, var }
    }

    /// Creates a method invocation; `interface` follows `INVOKEINTERFACE`.
    #[must_use]
    pub fn invoke(
        opcode: Opcode,
        owner: impl Into<String>,
        name: impl Into<String>,
        desc: MethodDescriptor,
    ) -> Self {
        Insn::Method {
            opcode,
            owner: owner.into(),
            name: name.into(),
            desc,
            interface: opcode == Opcode::INVOKEINTERFACE,
        }
    }

    /// Creates a field access.
    #[must_use]
    pub fn field(
        opcode: Opcode,
        owner: impl Into<String>,
        name: impl Into<String>,
        desc: JvmType,
    ) -> Self {
        Insn::Field {
            opcode,
            owner: owner.into(),
            name: name.into(),
            desc,
        }
    }

    /// Returns the shortest instruction that pushes `constant`.
    #[must_use]
    pub fn push(constant: &Constant) -> Self {
        match constant {
            Constant::Null => Insn::Op(Opcode::ACONST_NULL),
            Constant::Int(v) => match *v {
                -1 => Insn::Op(Opcode::ICONST_M1),
                0 => Insn::Op(Opcode::ICONST_0),
                1 => Insn::Op(Opcode::ICONST_1),
                2 => Insn::Op(Opcode::ICONST_2),
                3 => Insn::Op(Opcode::ICONST_3),
                4 => Insn::Op(Opcode::ICONST_4),
                5 => Insn::Op(Opcode::ICONST_5),
                v if i8::try_from(v).is_ok() => Insn::IntOp {
                    opcode: Opcode::BIPUSH,
                    operand: v,
                },
                v if i16::try_from(v).is_ok() => Insn::IntOp {
                    opcode: Opcode::SIPUSH,
                    operand: v,
                },
                _ => Insn::Ldc(constant.clone()),
            },
            Constant::Long(0) => Insn::Op(Opcode::LCONST_0),
            Constant::Long(1) => Insn::Op(Opcode::LCONST_1),
            Constant::Float(v) if v.to_bits() == 0.0f32.to_bits() => Insn::Op(Opcode::FCONST_0),
            Constant::Float(v) if *v == 1.0 => Insn::Op(Opcode::FCONST_1),
            Constant::Float(v) if *v == 2.0 => Insn::Op(Opcode::FCONST_2),
            Constant::Double(v) if v.to_bits() == 0.0f64.to_bits() => Insn::Op(Opcode::DCONST_0),
            Constant::Double(v) if *v == 1.0 => Insn::Op(Opcode::DCONST_1),
            other => Insn::Ldc(other.clone()),
        }
    }

    /// The opcode, or `None` for labels.
    #[must_use]
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Insn::Op(opcode)
            | Insn::IntOp { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Jump { opcode, .. }
            | Insn::Field { opcode, .. }
            | Insn::Method { opcode, .. }
            | Insn::Type { opcode, .. } => Some(*opcode),
            Insn::Iinc { .. } => Some(Opcode::IINC),
            Insn::Ldc(_) => Some(Opcode::LDC),
            Insn::TableSwitch { .. } => Some(Opcode::TABLESWITCH),
            Insn::LookupSwitch { .. } => Some(Opcode::LOOKUPSWITCH),
            Insn::InvokeDynamic { .. } => Some(Opcode::INVOKEDYNAMIC),
            Insn::Label(_) => None,
        }
    }

    /// Returns `true` if this is a label pseudo instruction.
    #[must_use]
    pub const fn is_label(&self) -> bool {
        matches!(self, Insn::Label(_))
    }

    /// The literal this instruction pushes, if it is a constant instruction.
    #[must_use]
    pub fn constant(&self) -> Option<Constant> {
        let value = match self {
            Insn::Ldc(constant) => return Some(constant.clone()),
            Insn::IntOp {
                opcode: Opcode::BIPUSH | Opcode::SIPUSH,
                operand,
            } => Constant::Int(*operand),
            Insn::Op(opcode) => match opcode {
                Opcode::ACONST_NULL => Constant::Null,
                Opcode::ICONST_M1 => Constant::Int(-1),
                Opcode::ICONST_0 => Constant::Int(0),
                Opcode::ICONST_1 => Constant::Int(1),
                Opcode::ICONST_2 => Constant::Int(2),
                Opcode::ICONST_3 => Constant::Int(3),
                Opcode::ICONST_4 => Constant::Int(4),
                Opcode::ICONST_5 => Constant::Int(5),
                Opcode::LCONST_0 => Constant::Long(0),
                Opcode::LCONST_1 => Constant::Long(1),
                Opcode::FCONST_0 => Constant::Float(0.0),
                Opcode::FCONST_1 => Constant::Float(1.0),
                Opcode::FCONST_2 => Constant::Float(2.0),
                Opcode::DCONST_0 => Constant::Double(0.0),
                Opcode::DCONST_1 => Constant::Double(1.0),
                _ => return None,
            },
            _ => return None,
        };
        Some(value)
    }

    /// How control leaves this instruction.
    #[must_use]
    pub fn flow(&self) -> FlowType {
        match self {
            Insn::Jump {
                opcode: Opcode::GOTO,
                ..
            } => FlowType::UnconditionalBranch,
            Insn::Jump { .. } => FlowType::ConditionalBranch,
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => FlowType::Switch,
            Insn::Op(Opcode::ATHROW) => FlowType::Throw,
            Insn::Op(opcode) if opcode.is_return() => FlowType::Return,
            _ => FlowType::Sequential,
        }
    }

    /// Every label this instruction may transfer control to, excluding fallthrough.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<LabelId> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::TableSwitch {
                default, targets, ..
            }
            | Insn::LookupSwitch {
                default, targets, ..
            } => {
                let mut all = Vec::with_capacity(targets.len() + 1);
                all.push(*default);
                all.extend(targets.iter().copied());
                all
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Op(opcode) => write!(f, "{opcode}"),
            Insn::IntOp { opcode, operand } => write!(f, "{opcode} {operand}"),
            Insn::Var { opcode, var } => write!(f, "{opcode} {var}"),
            Insn::Iinc { var, incr } => write!(f, "IINC {var} {incr}"),
            Insn::Ldc(constant) => write!(f, "LDC {constant}"),
            Insn::Jump { opcode, target } => write!(f, "{opcode} {target}"),
            Insn::Label(label) => write!(f, "{label}:"),
            Insn::TableSwitch {
                min,
                max,
                default,
                targets,
            } => {
                write!(f, "TABLESWITCH {min}..{max} default {default} [")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{target}")?;
                }
                f.write_str("]")
            }
            Insn::LookupSwitch {
                default,
                keys,
                targets,
            } => {
                write!(f, "LOOKUPSWITCH default {default} [")?;
                for (i, (key, target)) in keys.iter().zip(targets).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {target}")?;
                }
                f.write_str("]")
            }
            Insn::Field {
                opcode,
                owner,
                name,
                desc,
            } => write!(f, "{opcode} {owner}#{name} {desc}"),
            Insn::Method {
                opcode,
                owner,
                name,
                desc,
                ..
            } => write!(f, "{opcode} {owner}#{name} {desc}"),
            Insn::InvokeDynamic {
                name,
                desc,
                bootstrap,
                ..
            } => write!(f, "INVOKEDYNAMIC {name} {desc} [{bootstrap}]"),
            Insn::Type { opcode, desc } => write!(f, "{opcode} {desc}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_picks_shortest_form() {
        assert_eq!(Insn::push(&Constant::Int(3)), Insn::Op(Opcode::ICONST_3));
        assert_eq!(
            Insn::push(&Constant::Int(1000)),
            Insn::IntOp {
                opcode: Opcode::SIPUSH,
                operand: 1000
            }
        );
        assert_eq!(
            Insn::push(&Constant::Int(100_000)),
            Insn::Ldc(Constant::Int(100_000))
        );
        assert_eq!(Insn::push(&Constant::Long(1)), Insn::Op(Opcode::LCONST_1));
        assert_eq!(
            Insn::push(&Constant::Float(-0.0)),
            Insn::Ldc(Constant::Float(-0.0))
        );
        assert_eq!(Insn::push(&Constant::Null), Insn::Op(Opcode::ACONST_NULL));
    }

    #[test]
    fn test_new_array_by_element() {
        assert_eq!(
            Insn::new_array(&JvmType::Int),
            Insn::IntOp {
                opcode: Opcode::NEWARRAY,
                operand: 10
            }
        );
        assert_eq!(Insn::new_array(&JvmType::Int.array_of(1)).to_string(), "ANEWARRAY [I");
        assert_eq!(Insn::new_array(&JvmType::object("a/B")).to_string(), "ANEWARRAY a/B");
    }

    #[test]
    fn test_constant_roundtrip_through_push() {
        for constant in [
            Constant::Int(-1),
            Constant::Int(42),
            Constant::Long(0),
            Constant::Long(77),
            Constant::Double(1.0),
            Constant::String("s".into()),
        ] {
            assert_eq!(Insn::push(&constant).constant(), Some(constant));
        }
        assert_eq!(Insn::Op(Opcode::IADD).constant(), None);
    }

    #[test]
    fn test_flow_and_targets() {
        let jump = Insn::Jump {
            opcode: Opcode::IFEQ,
            target: LabelId(4),
        };
        assert_eq!(jump.flow(), FlowType::ConditionalBranch);
        assert_eq!(jump.branch_targets(), vec![LabelId(4)]);
        assert_eq!(Insn::Op(Opcode::LRETURN).flow(), FlowType::Return);
        assert_eq!(Insn::Op(Opcode::ATHROW).flow(), FlowType::Throw);

        let switch = Insn::TableSwitch {
            min: 0,
            max: 1,
            default: LabelId(9),
            targets: vec![LabelId(1), LabelId(2)],
        };
        assert_eq!(switch.branch_targets(), vec![LabelId(9), LabelId(1), LabelId(2)]);
    }

    #[test]
    fn test_display() {
        let call = Insn::invoke(
            Opcode::INVOKESTATIC,
            "a/B",
            "pack",
            "(III)J".parse().unwrap(),
        );
        assert_eq!(call.to_string(), "INVOKESTATIC a/B#pack (III)J");
        assert_eq!(Insn::var(Opcode::LLOAD, 2).to_string(), "LLOAD 2");
        assert_eq!(Insn::Label(LabelId(3)).to_string(), "L3:");
    }
}
