//! Method bodies.
//!
//! A [`MethodBody`] owns the instruction list of one method together with the
//! side tables that reference it through labels (exception handlers and the
//! local variable debug table). `Clone` yields a fully independent copy, which
//! is how a transformation obtains a fresh body to rewrite while the original
//! stays available for analysis queries.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::{
    assembly::{FlowType, Insn, LabelId},
    metadata::typesystem::{JvmType, MethodDescriptor},
    Result,
};

bitflags! {
    /// Access and property flags shared by classes, fields and methods (JVMS §4.1, §4.5, §4.6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Method is synchronized
        const SYNCHRONIZED = 0x0020;
        /// Method is a compiler generated bridge
        const BRIDGE = 0x0040;
        /// Method takes variable arguments
        const VARARGS = 0x0080;
        /// Method is implemented natively
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// Method or class is abstract
        const ABSTRACT = 0x0400;
        /// Strict floating point
        const STRICT = 0x0800;
        /// Not present in source
        const SYNTHETIC = 0x1000;
    }
}

/// An exception handler range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlock {
    /// First covered instruction (inclusive)
    pub start: LabelId,
    /// End of the covered range (exclusive)
    pub end: LabelId,
    /// Handler entry
    pub handler: LabelId,
    /// Caught type, `None` for `finally`
    pub catch_type: Option<String>,
}

/// A local variable debug entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Source name
    pub name: String,
    /// Declared type
    pub desc: JvmType,
    /// Scope start (inclusive)
    pub start: LabelId,
    /// Scope end (exclusive)
    pub end: LabelId,
    /// Slot index
    pub index: u16,
}

/// One method: signature, flags and code.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Access flags
    pub access: AccessFlags,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub desc: MethodDescriptor,
    /// Instruction list, labels included
    pub instructions: Vec<Insn>,
    /// Exception handlers
    pub try_catch: Vec<TryCatchBlock>,
    /// Local variable debug table
    pub local_variables: Vec<LocalVariable>,
    /// Number of local slots
    pub max_locals: u16,
    next_label: u32,
}

impl MethodBody {
    /// Creates a method without code.
    #[must_use]
    pub fn new(access: AccessFlags, name: impl Into<String>, desc: MethodDescriptor) -> Self {
        let mut method = Self {
            access,
            name: name.into(),
            desc,
            instructions: Vec::new(),
            try_catch: Vec::new(),
            local_variables: Vec::new(),
            max_locals: 0,
            next_label: 0,
        };
        method.max_locals = method.arg_slots() as u16;
        method
    }

    /// Returns `true` if the method has no receiver.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    /// Returns `true` if the method has no code.
    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.access.contains(AccessFlags::ABSTRACT)
    }

    /// Returns `true` if the method is implemented natively.
    #[must_use]
    pub const fn is_native(&self) -> bool {
        self.access.contains(AccessFlags::NATIVE)
    }

    /// Local slots used by the parameters, receiver included.
    #[must_use]
    pub fn arg_slots(&self) -> usize {
        self.desc.arg_slots() + usize::from(!self.is_static())
    }

    /// Allocates a label id not used anywhere in this method.
    pub fn new_label(&mut self) -> LabelId {
        let used = self
            .instructions
            .iter()
            .filter_map(|insn| match insn {
                Insn::Label(l) => Some(l.0 + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        self.next_label = self.next_label.max(used);
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    /// Maps every label to the index of its pseudo instruction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a label is placed twice.
    pub fn label_positions(&self) -> Result<FxHashMap<LabelId, usize>> {
        let mut positions = FxHashMap::default();
        for (index, insn) in self.instructions.iter().enumerate() {
            if let Insn::Label(label) = insn {
                if positions.insert(*label, index).is_some() {
                    return Err(malformed_error!(
                        "Label {} placed twice in {}{}",
                        label,
                        self.name,
                        self.desc
                    ));
                }
            }
        }
        Ok(positions)
    }

    /// Instruction indices control may reach from `index`, not counting exception edges.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a branch targets an unplaced label or
    /// execution can fall off the end of the code.
    pub fn successors(
        &self,
        index: usize,
        labels: &FxHashMap<LabelId, usize>,
    ) -> Result<Vec<usize>> {
        let insn = &self.instructions[index];
        let mut successors = Vec::new();
        for target in insn.branch_targets() {
            let position = labels.get(&target).ok_or_else(|| {
                malformed_error!("Branch to unplaced label {} in {}", target, self.name)
            })?;
            successors.push(*position);
        }
        if matches!(insn.flow(), FlowType::Sequential | FlowType::ConditionalBranch) {
            if index + 1 >= self.instructions.len() {
                return Err(malformed_error!(
                    "Execution falls off the end of {}{}",
                    self.name,
                    self.desc
                ));
            }
            successors.push(index + 1);
        }
        Ok(successors)
    }

    /// Recomputes `max_locals` from the parameters and every variable access.
    pub fn recompute_max_locals(&mut self) {
        let mut max = self.arg_slots();
        for insn in &self.instructions {
            let end = match insn {
                Insn::Var { opcode, var } => {
                    let wide = matches!(
                        opcode,
                        crate::assembly::Opcode::LLOAD
                            | crate::assembly::Opcode::DLOAD
                            | crate::assembly::Opcode::LSTORE
                            | crate::assembly::Opcode::DSTORE
                    );
                    usize::from(*var) + if wide { 2 } else { 1 }
                }
                Insn::Iinc { var, .. } => usize::from(*var) + 1,
                _ => 0,
            };
            max = max.max(end);
        }
        self.max_locals = u16::try_from(max).unwrap_or(u16::MAX);
    }

    /// `name` + descriptor, as used in diagnostics.
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.desc)
    }
}
