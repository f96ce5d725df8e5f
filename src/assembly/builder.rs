//! Fluent construction of method bodies.
//!
//! [`MethodBuilder`] appends instructions to a [`MethodBody`] and hands out
//! fresh labels, which keeps hand-written methods readable in tests and
//! tools.
//!
//! # Example
//!
//! ```rust
//! use typesplit::assembly::{MethodBuilder, Opcode};
//! use typesplit::metadata::method::AccessFlags;
//!
//! // static int max(int a, int b) { return a > b ? a : b; }
//! let mut asm = MethodBuilder::new(AccessFlags::STATIC, "max", "(II)I")?;
//! let other = asm.new_label();
//! asm.var(Opcode::ILOAD, 0)
//!     .var(Opcode::ILOAD, 1)
//!     .jump(Opcode::IF_ICMPLE, other)
//!     .var(Opcode::ILOAD, 0)
//!     .op(Opcode::IRETURN)
//!     .label(other)
//!     .var(Opcode::ILOAD, 1)
//!     .op(Opcode::IRETURN);
//! let method = asm.build();
//! assert_eq!(method.instructions.len(), 8);
//! assert_eq!(method.max_locals, 2);
//! # Ok::<(), typesplit::Error>(())
//! ```

use crate::{
    assembly::{Insn, LabelId, Opcode},
    metadata::{
        constant::Constant,
        method::{AccessFlags, LocalVariable, MethodBody, TryCatchBlock},
        typesystem::{JvmType, MethodDescriptor},
    },
    Result,
};

/// Appends instructions to a method under construction.
#[derive(Debug, Clone)]
pub struct MethodBuilder {
    method: MethodBody,
}

impl MethodBuilder {
    /// Starts a method with the given flags, name and descriptor string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `desc` is not a method descriptor.
    pub fn new(access: AccessFlags, name: &str, desc: &str) -> Result<Self> {
        Ok(Self::with_descriptor(access, name, desc.parse()?))
    }

    /// Starts a method with an already parsed descriptor.
    #[must_use]
    pub fn with_descriptor(access: AccessFlags, name: &str, desc: MethodDescriptor) -> Self {
        Self {
            method: MethodBody::new(access, name, desc),
        }
    }

    /// Allocates a label that is not placed yet.
    pub fn new_label(&mut self) -> LabelId {
        self.method.new_label()
    }

    /// Appends any instruction.
    pub fn insn(&mut self, insn: Insn) -> &mut Self {
        self.method.instructions.push(insn);
        self
    }

    /// Appends a sequence of instructions.
    pub fn insns(&mut self, insns: impl IntoIterator<Item = Insn>) -> &mut Self {
        self.method.instructions.extend(insns);
        self
    }

    /// Appends an operand-less instruction.
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.insn(Insn::Op(opcode))
    }

    /// Appends a local variable load or store.
    pub fn var(&mut self, opcode: Opcode, var: u16) -> &mut Self {
        self.insn(Insn::var(opcode, var))
    }

    /// Appends `IINC var incr`.
    pub fn iinc(&mut self, var: u16, incr: i16) -> &mut Self {
        self.insn(Insn::Iinc { var, incr })
    }

    /// Appends the shortest instruction pushing `constant`.
    pub fn push(&mut self, constant: Constant) -> &mut Self {
        self.insn(Insn::push(&constant))
    }

    /// Appends a jump.
    pub fn jump(&mut self, opcode: Opcode, target: LabelId) -> &mut Self {
        self.insn(Insn::Jump { opcode, target })
    }

    /// Places a label.
    pub fn label(&mut self, label: LabelId) -> &mut Self {
        self.insn(Insn::Label(label))
    }

    /// Appends a method invocation, parsing `desc`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `desc` is not a method descriptor.
    pub fn invoke(&mut self, opcode: Opcode, owner: &str, name: &str, desc: &str) -> Result<&mut Self> {
        let desc: MethodDescriptor = desc.parse()?;
        Ok(self.insn(Insn::invoke(opcode, owner, name, desc)))
    }

    /// Appends a field access, parsing `desc`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `desc` is not a field descriptor.
    pub fn field(&mut self, opcode: Opcode, owner: &str, name: &str, desc: &str) -> Result<&mut Self> {
        let desc: JvmType = desc.parse()?;
        Ok(self.insn(Insn::field(opcode, owner, name, desc)))
    }

    /// Appends `NEW`, `ANEWARRAY`, `CHECKCAST` or `INSTANCEOF`.
    pub fn type_insn(&mut self, opcode: Opcode, desc: &str) -> &mut Self {
        self.insn(Insn::Type {
            opcode,
            desc: desc.to_string(),
        })
    }

    /// Registers an exception handler.
    pub fn try_catch(
        &mut self,
        start: LabelId,
        end: LabelId,
        handler: LabelId,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.method.try_catch.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_string),
        });
        self
    }

    /// Adds a local variable debug entry.
    pub fn local_variable(
        &mut self,
        name: &str,
        desc: JvmType,
        start: LabelId,
        end: LabelId,
        index: u16,
    ) -> &mut Self {
        self.method.local_variables.push(LocalVariable {
            name: name.to_string(),
            desc,
            start,
            end,
            index,
        });
        self
    }

    /// Finishes the method, computing `max_locals`.
    #[must_use]
    pub fn build(&self) -> MethodBody {
        let mut method = self.method.clone();
        method.recompute_max_locals();
        method
    }
}
