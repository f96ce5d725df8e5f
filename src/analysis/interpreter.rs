//! Stack effects of the instructions without special semantics.
//!
//! The analyzer handles locals, stack shuffles, calls, fields, comparisons and
//! returns itself. Every other instruction pops a fixed number of values and
//! pushes at most one fresh value whose type depends only on the instruction,
//! which is what [`effect`] describes.

use crate::{
    assembly::{Insn, Opcode},
    metadata::typesystem::{JvmType, OBJECT},
    Error, Result,
};

/// Generic stack effect of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Effect {
    /// Values popped
    pub pops: usize,
    /// Type of the pushed value
    pub push: Option<JvmType>,
}

impl Effect {
    const fn new(pops: usize, push: Option<JvmType>) -> Self {
        Self { pops, push }
    }
}

/// The generic effect of `insn`.
///
/// # Errors
///
/// Returns [`Error::UnsupportedInstruction`] for subroutines and the other
/// opcodes the analysis does not model, and [`crate::Error::Malformed`] for
/// instructions the analyzer should have handled itself.
pub(crate) fn effect(insn: &Insn) -> Result<Effect> {
    use Opcode::*;

    if let Some(constant) = insn.constant() {
        return Ok(Effect::new(0, Some(constant.jvm_type())));
    }

    let Some(opcode) = insn.opcode() else {
        return Ok(Effect::new(0, None));
    };

    let effect = match opcode {
        NOP | GOTO => Effect::new(0, None),

        IALOAD | BALOAD | CALOAD | SALOAD => Effect::new(2, Some(JvmType::Int)),
        LALOAD => Effect::new(2, Some(JvmType::Long)),
        FALOAD => Effect::new(2, Some(JvmType::Float)),
        DALOAD => Effect::new(2, Some(JvmType::Double)),
        AALOAD => Effect::new(2, Some(JvmType::object(OBJECT))),
        IASTORE | LASTORE | FASTORE | DASTORE | AASTORE | BASTORE | CASTORE | SASTORE => {
            Effect::new(3, None)
        }

        IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
            Effect::new(2, Some(JvmType::Int))
        }
        LADD | LSUB | LMUL | LDIV | LREM | LSHL | LSHR | LUSHR | LAND | LOR | LXOR => {
            Effect::new(2, Some(JvmType::Long))
        }
        FADD | FSUB | FMUL | FDIV | FREM => Effect::new(2, Some(JvmType::Float)),
        DADD | DSUB | DMUL | DDIV | DREM => Effect::new(2, Some(JvmType::Double)),
        INEG | L2I | F2I | D2I | I2B | I2C | I2S => Effect::new(1, Some(JvmType::Int)),
        LNEG | I2L | F2L | D2L => Effect::new(1, Some(JvmType::Long)),
        FNEG | I2F | L2F | D2F => Effect::new(1, Some(JvmType::Float)),
        DNEG | I2D | L2D | F2D => Effect::new(1, Some(JvmType::Double)),

        IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE | IFNULL | IFNONNULL => Effect::new(1, None),
        TABLESWITCH | LOOKUPSWITCH | ATHROW | MONITORENTER | MONITOREXIT => Effect::new(1, None),

        ARRAYLENGTH | INSTANCEOF => Effect::new(1, Some(JvmType::Int)),
        NEW => match insn {
            Insn::Type { desc, .. } => Effect::new(0, Some(JvmType::from_internal_name(desc)?)),
            _ => return Err(malformed_error!("NEW without a type operand")),
        },
        NEWARRAY => match insn {
            Insn::IntOp { operand, .. } => {
                Effect::new(1, Some(JvmType::Array(Box::new(primitive_array(*operand)?))))
            }
            _ => return Err(malformed_error!("NEWARRAY without an element type")),
        },
        ANEWARRAY => match insn {
            Insn::Type { desc, .. } => Effect::new(
                1,
                Some(JvmType::Array(Box::new(JvmType::from_internal_name(desc)?))),
            ),
            _ => return Err(malformed_error!("ANEWARRAY without a type operand")),
        },

        JSR | RET | MULTIANEWARRAY | WIDE => {
            return Err(Error::UnsupportedInstruction(insn.to_string()))
        }
        other => {
            return Err(malformed_error!(
                "{} has no generic stack effect",
                other
            ))
        }
    };
    Ok(effect)
}

/// Element type of a `NEWARRAY` type code (JVMS §6.5.newarray).
fn primitive_array(code: i32) -> Result<JvmType> {
    Ok(match code {
        4 => JvmType::Boolean,
        5 => JvmType::Char,
        6 => JvmType::Float,
        7 => JvmType::Double,
        8 => JvmType::Byte,
        9 => JvmType::Short,
        10 => JvmType::Int,
        11 => JvmType::Long,
        other => return Err(malformed_error!("Invalid NEWARRAY type code {}", other)),
    })
}
