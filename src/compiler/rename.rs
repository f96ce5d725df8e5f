//! Renaming of a duplicated class.
//!
//! A duplicate keeps every member of the source class but lives under a new
//! internal name. Every reference to the old name is moved along with it:
//! member owners, field and method descriptors, type instructions, class
//! literals, exception types, debug entries and the handles and method types
//! of lambda call sites.

use crate::{
    assembly::Insn,
    metadata::{
        class::ClassBody,
        constant::{BsmArg, Constant, Handle},
        method::MethodBody,
        typesystem::{JvmType, MethodDescriptor},
    },
};

/// Old and new internal name of a class.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Renaming<'a> {
    pub from: &'a str,
    pub to: &'a str,
}

impl Renaming<'_> {
    fn name(&self, name: &mut String) -> bool {
        if name == self.from {
            *name = self.to.to_string();
            true
        } else {
            false
        }
    }

    fn ty(&self, ty: &mut JvmType) {
        match ty {
            JvmType::Object(name) => {
                self.name(name);
            }
            JvmType::Array(component) => self.ty(component),
            _ => {}
        }
    }

    fn desc(&self, desc: &MethodDescriptor) -> MethodDescriptor {
        let mut params = desc.params().to_vec();
        params.iter_mut().for_each(|p| self.ty(p));
        let mut ret = desc.ret().clone();
        self.ty(&mut ret);
        MethodDescriptor::new(params, ret)
    }

    /// Descriptor text of a handle or an array type instruction.
    fn text(&self, text: &mut String) {
        let old = format!("L{};", self.from);
        if text.contains(&old) {
            *text = text.replace(&old, &format!("L{};", self.to));
        }
    }

    fn handle(&self, handle: &mut Handle) {
        self.name(&mut handle.owner);
        self.text(&mut handle.desc);
    }

    fn insn(&self, insn: &mut Insn) {
        match insn {
            Insn::Field { owner, desc, .. } => {
                self.name(owner);
                self.ty(desc);
            }
            Insn::Method { owner, desc, .. } => {
                self.name(owner);
                *desc = self.desc(desc);
            }
            Insn::InvokeDynamic {
                desc, bootstrap, args, ..
            } => {
                *desc = self.desc(desc);
                self.handle(bootstrap);
                for arg in args {
                    match arg {
                        BsmArg::Handle(handle) => self.handle(handle),
                        BsmArg::MethodType(ty) => *ty = self.desc(ty),
                        BsmArg::Constant(Constant::Type(ty)) => self.ty(ty),
                        BsmArg::Constant(_) => {}
                    }
                }
            }
            Insn::Type { desc, .. } => {
                if !self.name(desc) {
                    self.text(desc);
                }
            }
            Insn::Ldc(Constant::Type(ty)) => self.ty(ty),
            _ => {}
        }
    }

    fn method(&self, method: &mut MethodBody) {
        method.desc = self.desc(&method.desc);
        method.instructions.iter_mut().for_each(|insn| self.insn(insn));
        for block in &mut method.try_catch {
            if let Some(ty) = &mut block.catch_type {
                self.name(ty);
            }
        }
        for local in &mut method.local_variables {
            self.ty(&mut local.desc);
        }
    }

    /// Moves `class` and every reference to it to the new name.
    pub fn apply(&self, class: &mut ClassBody) {
        self.name(&mut class.name);
        for field in &mut class.fields {
            self.ty(&mut field.desc);
        }
        class.methods.iter_mut().for_each(|m| self.method(m));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Opcode,
        metadata::{
            class::FieldBody,
            constant::HandleKind,
            method::AccessFlags,
        },
    };

    #[test]
    fn test_references_follow_the_class() {
        let mut class = ClassBody::new("a/B", Some("java/lang/Object".to_string()));
        class
            .fields
            .push(FieldBody::new(AccessFlags::PRIVATE, "next", JvmType::object("a/B")));
        let mut method = MethodBody::new(AccessFlags::PUBLIC, "copy", "([La/B;)La/B;".parse().unwrap());
        method.instructions = vec![
            Insn::Type {
                opcode: Opcode::NEW,
                desc: "a/B".to_string(),
            },
            Insn::Type {
                opcode: Opcode::CHECKCAST,
                desc: "[La/B;".to_string(),
            },
            Insn::field(Opcode::GETFIELD, "a/B", "next", JvmType::object("a/B")),
            Insn::invoke(Opcode::INVOKESTATIC, "a/C", "wrap", "(La/B;)La/C;".parse().unwrap()),
            Insn::InvokeDynamic {
                name: "get".to_string(),
                desc: "(La/B;)Ljava/util/function/Supplier;".parse().unwrap(),
                bootstrap: Handle {
                    kind: HandleKind::InvokeStatic,
                    owner: "java/lang/invoke/LambdaMetafactory".to_string(),
                    name: "metafactory".to_string(),
                    desc: "()V".to_string(),
                    interface: false,
                },
                args: vec![BsmArg::Handle(Handle {
                    kind: HandleKind::InvokeVirtual,
                    owner: "a/B".to_string(),
                    name: "copy".to_string(),
                    desc: "()La/B;".to_string(),
                    interface: false,
                })],
            },
        ];
        class.methods.push(method);

        Renaming {
            from: "a/B",
            to: "a/B_transformed",
        }
        .apply(&mut class);

        assert_eq!(class.name, "a/B_transformed");
        assert_eq!(class.fields[0].desc, JvmType::object("a/B_transformed"));
        let method = &class.methods[0];
        assert_eq!(method.desc.to_string(), "([La/B_transformed;)La/B_transformed;");
        let code = &method.instructions;
        assert_eq!(code[0].to_string(), "NEW a/B_transformed");
        assert_eq!(code[1].to_string(), "CHECKCAST [La/B_transformed;");
        assert_eq!(
            code[2],
            Insn::field(Opcode::GETFIELD, "a/B_transformed", "next", JvmType::object("a/B_transformed"))
        );
        let Insn::Method { owner, desc, .. } = &code[3] else {
            panic!("expected a call, got {}", code[3]);
        };
        assert_eq!(owner, "a/C");
        assert_eq!(desc.to_string(), "(La/B_transformed;)La/C;");
        let Insn::InvokeDynamic { args, .. } = &code[4] else {
            panic!("expected a lambda call site, got {}", code[4]);
        };
        let BsmArg::Handle(handle) = &args[0] else {
            panic!("expected a handle");
        };
        assert_eq!(handle.owner, "a/B_transformed");
        assert_eq!(handle.desc, "()La/B_transformed;");
    }
}
