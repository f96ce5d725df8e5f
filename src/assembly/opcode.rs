//! JVM opcodes (JVMS §6.5).
//!
//! Variants carry their numeric encoding as the discriminant and their
//! mnemonic as the variant name, so `Opcode::IF_ICMPEQ as u8 == 0x9F` and
//! `"IF_ICMPEQ".parse::<Opcode>()` round-trips through `strum`.
//!
//! `JSR`, `RET`, `MULTIANEWARRAY` and `WIDE` are listed for completeness; the
//! analyzer refuses methods that use them.
#![allow(missing_docs)]

use strum::{AsRefStr, Display, EnumString, FromRepr, IntoStaticStr};

#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, IntoStaticStr, FromRepr,
)]
#[repr(u8)]
pub enum Opcode {
    NOP = 0x00,
    ACONST_NULL = 0x01,
    ICONST_M1 = 0x02,
    ICONST_0 = 0x03,
    ICONST_1 = 0x04,
    ICONST_2 = 0x05,
    ICONST_3 = 0x06,
    ICONST_4 = 0x07,
    ICONST_5 = 0x08,
    LCONST_0 = 0x09,
    LCONST_1 = 0x0A,
    FCONST_0 = 0x0B,
    FCONST_1 = 0x0C,
    FCONST_2 = 0x0D,
    DCONST_0 = 0x0E,
    DCONST_1 = 0x0F,
    BIPUSH = 0x10,
    SIPUSH = 0x11,
    LDC = 0x12,
    ILOAD = 0x15,
    LLOAD = 0x16,
    FLOAD = 0x17,
    DLOAD = 0x18,
    ALOAD = 0x19,
    IALOAD = 0x2E,
    LALOAD = 0x2F,
    FALOAD = 0x30,
    DALOAD = 0x31,
    AALOAD = 0x32,
    BALOAD = 0x33,
    CALOAD = 0x34,
    SALOAD = 0x35,
    ISTORE = 0x36,
    LSTORE = 0x37,
    FSTORE = 0x38,
    DSTORE = 0x39,
    ASTORE = 0x3A,
    IASTORE = 0x4F,
    LASTORE = 0x50,
    FASTORE = 0x51,
    DASTORE = 0x52,
    AASTORE = 0x53,
    BASTORE = 0x54,
    CASTORE = 0x55,
    SASTORE = 0x56,
    POP = 0x57,
    POP2 = 0x58,
    DUP = 0x59,
    DUP_X1 = 0x5A,
    DUP_X2 = 0x5B,
    DUP2 = 0x5C,
    DUP2_X1 = 0x5D,
    DUP2_X2 = 0x5E,
    SWAP = 0x5F,
    IADD = 0x60,
    LADD = 0x61,
    FADD = 0x62,
    DADD = 0x63,
    ISUB = 0x64,
    LSUB = 0x65,
    FSUB = 0x66,
    DSUB = 0x67,
    IMUL = 0x68,
    LMUL = 0x69,
    FMUL = 0x6A,
    DMUL = 0x6B,
    IDIV = 0x6C,
    LDIV = 0x6D,
    FDIV = 0x6E,
    DDIV = 0x6F,
    IREM = 0x70,
    LREM = 0x71,
    FREM = 0x72,
    DREM = 0x73,
    INEG = 0x74,
    LNEG = 0x75,
    FNEG = 0x76,
    DNEG = 0x77,
    ISHL = 0x78,
    LSHL = 0x79,
    ISHR = 0x7A,
    LSHR = 0x7B,
    IUSHR = 0x7C,
    LUSHR = 0x7D,
    IAND = 0x7E,
    LAND = 0x7F,
    IOR = 0x80,
    LOR = 0x81,
    IXOR = 0x82,
    LXOR = 0x83,
    IINC = 0x84,
    I2L = 0x85,
    I2F = 0x86,
    I2D = 0x87,
    L2I = 0x88,
    L2F = 0x89,
    L2D = 0x8A,
    F2I = 0x8B,
    F2L = 0x8C,
    F2D = 0x8D,
    D2I = 0x8E,
    D2L = 0x8F,
    D2F = 0x90,
    I2B = 0x91,
    I2C = 0x92,
    I2S = 0x93,
    LCMP = 0x94,
    FCMPL = 0x95,
    FCMPG = 0x96,
    DCMPL = 0x97,
    DCMPG = 0x98,
    IFEQ = 0x99,
    IFNE = 0x9A,
    IFLT = 0x9B,
    IFGE = 0x9C,
    IFGT = 0x9D,
    IFLE = 0x9E,
    IF_ICMPEQ = 0x9F,
    IF_ICMPNE = 0xA0,
    IF_ICMPLT = 0xA1,
    IF_ICMPGE = 0xA2,
    IF_ICMPGT = 0xA3,
    IF_ICMPLE = 0xA4,
    IF_ACMPEQ = 0xA5,
    IF_ACMPNE = 0xA6,
    GOTO = 0xA7,
    JSR = 0xA8,
    RET = 0xA9,
    TABLESWITCH = 0xAA,
    LOOKUPSWITCH = 0xAB,
    IRETURN = 0xAC,
    LRETURN = 0xAD,
    FRETURN = 0xAE,
    DRETURN = 0xAF,
    ARETURN = 0xB0,
    RETURN = 0xB1,
    GETSTATIC = 0xB2,
    PUTSTATIC = 0xB3,
    GETFIELD = 0xB4,
    PUTFIELD = 0xB5,
    INVOKEVIRTUAL = 0xB6,
    INVOKESPECIAL = 0xB7,
    INVOKESTATIC = 0xB8,
    INVOKEINTERFACE = 0xB9,
    INVOKEDYNAMIC = 0xBA,
    NEW = 0xBB,
    NEWARRAY = 0xBC,
    ANEWARRAY = 0xBD,
    ARRAYLENGTH = 0xBE,
    ATHROW = 0xBF,
    CHECKCAST = 0xC0,
    INSTANCEOF = 0xC1,
    MONITORENTER = 0xC2,
    MONITOREXIT = 0xC3,
    WIDE = 0xC4,
    MULTIANEWARRAY = 0xC5,
    IFNULL = 0xC6,
    IFNONNULL = 0xC7,
}

impl Opcode {
    /// Returns the numeric encoding.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Returns `true` for the local-variable load family (`ILOAD`..`ALOAD`).
    #[must_use]
    pub const fn is_var_load(self) -> bool {
        matches!(
            self,
            Opcode::ILOAD | Opcode::LLOAD | Opcode::FLOAD | Opcode::DLOAD | Opcode::ALOAD
        )
    }

    /// Returns `true` for the local-variable store family (`ISTORE`..`ASTORE`).
    #[must_use]
    pub const fn is_var_store(self) -> bool {
        matches!(
            self,
            Opcode::ISTORE | Opcode::LSTORE | Opcode::FSTORE | Opcode::DSTORE | Opcode::ASTORE
        )
    }

    /// Returns `true` for the typed return instructions, including `RETURN`.
    #[must_use]
    pub const fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::IRETURN
                | Opcode::LRETURN
                | Opcode::FRETURN
                | Opcode::DRETURN
                | Opcode::ARETURN
                | Opcode::RETURN
        )
    }

    /// Returns `true` for the numeric three-way comparisons.
    #[must_use]
    pub const fn is_three_way_compare(self) -> bool {
        matches!(
            self,
            Opcode::LCMP | Opcode::FCMPL | Opcode::FCMPG | Opcode::DCMPL | Opcode::DCMPG
        )
    }

    /// Returns `true` for the two-operand equality branches.
    #[must_use]
    pub const fn is_equality_branch(self) -> bool {
        matches!(
            self,
            Opcode::IF_ICMPEQ | Opcode::IF_ICMPNE | Opcode::IF_ACMPEQ | Opcode::IF_ACMPNE
        )
    }

    /// Returns `true` for conditional branches (single and two operand forms).
    #[must_use]
    pub const fn is_conditional_branch(self) -> bool {
        let v = self as u8;
        (v >= Opcode::IFEQ as u8 && v <= Opcode::IF_ACMPNE as u8)
            || matches!(self, Opcode::IFNULL | Opcode::IFNONNULL)
    }

    /// Returns `true` for the method invocation family, excluding `INVOKEDYNAMIC`.
    #[must_use]
    pub const fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::INVOKEVIRTUAL
                | Opcode::INVOKESPECIAL
                | Opcode::INVOKESTATIC
                | Opcode::INVOKEINTERFACE
        )
    }

    /// Returns `true` for the array element loads, `IALOAD` through `SALOAD`.
    #[must_use]
    pub const fn is_array_load(self) -> bool {
        let v = self as u8;
        v >= Opcode::IALOAD as u8 && v <= Opcode::SALOAD as u8
    }

    /// Returns `true` for the array element stores, `IASTORE` through `SASTORE`.
    #[must_use]
    pub const fn is_array_store(self) -> bool {
        let v = self as u8;
        v >= Opcode::IASTORE as u8 && v <= Opcode::SASTORE as u8
    }

    /// Returns `true` for instructions that access or allocate a single
    /// dimension array.
    #[must_use]
    pub const fn is_array_op(self) -> bool {
        self.is_array_load()
            || self.is_array_store()
            || matches!(self, Opcode::ARRAYLENGTH | Opcode::NEWARRAY | Opcode::ANEWARRAY)
    }

    /// Returns `true` for opcodes that push a literal without operands from the stack.
    #[must_use]
    pub const fn is_constant(self) -> bool {
        let v = self as u8;
        v >= Opcode::ACONST_NULL as u8 && v <= Opcode::LDC as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonic_roundtrip() {
        assert_eq!(Opcode::IF_ICMPEQ.to_string(), "IF_ICMPEQ");
        assert_eq!("INVOKESTATIC".parse::<Opcode>().ok(), Some(Opcode::INVOKESTATIC));
        assert!("NOT_AN_OPCODE".parse::<Opcode>().is_err());
    }

    #[test]
    fn test_numeric_values() {
        assert_eq!(Opcode::IF_ICMPEQ.value(), 0x9F);
        assert_eq!(Opcode::from_repr(0xB8), Some(Opcode::INVOKESTATIC));
        assert_eq!(Opcode::from_repr(0x13), None);
    }

    #[test]
    fn test_families() {
        assert!(Opcode::LLOAD.is_var_load());
        assert!(Opcode::ASTORE.is_var_store());
        assert!(Opcode::IFLE.is_conditional_branch());
        assert!(Opcode::IFNONNULL.is_conditional_branch());
        assert!(!Opcode::GOTO.is_conditional_branch());
        assert!(Opcode::DCMPG.is_three_way_compare());
        assert!(Opcode::SIPUSH.is_constant());
        assert!(!Opcode::ILOAD.is_constant());
        assert!(Opcode::CALOAD.is_array_load());
        assert!(Opcode::AASTORE.is_array_store());
        assert!(Opcode::ANEWARRAY.is_array_op());
        assert!(!Opcode::MULTIANEWARRAY.is_array_op());
    }
}
