//! Backward compatibility for callers that still use the original methods.
//!
//! After the rewrite the original method stays in the class. Depending on the
//! plan it receives a prefix:
//!
//! - renamed methods (same descriptor): a dispatcher forwarding to the
//!   rewritten copy whenever the instance was built by transformed code
//! - methods whose descriptor changed, when safety is enabled: a prefix that
//!   converts the arguments with the rules' conversion methods, optionally
//!   reports the call through the warning hook, and returns the converted
//!   result of the rewritten method
//!
//! Predicate and consumer arguments cannot be unpacked; the converter wraps
//! them in a lambda of the transformed interface whose generated target
//! packs the components and calls the original instance.
//!
//! Untransformed methods that touch a retyped field get a cast after every
//! read so they keep seeing the field's original type.
//!
//! Instances meant to hold transformed field values are created through a
//! generated constructor taking a trailing magic argument; it sets the
//! safety flag once the superclass constructor has run.

use rustc_hash::FxHashMap;

use crate::{
    assembly::{Insn, LabelId, Opcode},
    compiler::{mutator::type_insn, MethodPlan},
    metadata::{
        constant::{BsmArg, Constant, Handle, HandleKind},
        identity::{FieldId, MethodId},
        method::{AccessFlags, MethodBody},
        typesystem::{JvmType, MethodDescriptor, OBJECT},
    },
    rules::{Functional, RuleRegistry, Subtype, TransformRule},
    Result,
};

/// Value the trailing argument of a generated constructor must carry.
pub const CONSTRUCTOR_MAGIC: i32 = i32::from_be_bytes([0xDE, 0xAD, 0xBE, 0xEF]);

const ILLEGAL_ARGUMENT: &str = "java/lang/IllegalArgumentException";
const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";
const METAFACTORY_DESC: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;\
Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";

/// Guard reading the safety flag: falls through into the forwarding code
/// when the flag is set, jumps to `skip` otherwise.
fn guard(owner: &str, safety: Option<&FieldId>, method: &MethodBody, skip: LabelId) -> Vec<Insn> {
    match safety {
        Some(field) if !method.is_static() => vec![
            Insn::var(Opcode::ALOAD, 0),
            Insn::field(Opcode::GETFIELD, owner, field.name.clone(), JvmType::Boolean),
            Insn::Jump {
                opcode: Opcode::IFEQ,
                target: skip,
            },
        ],
        _ => Vec::new(),
    }
}

fn invoke(owner: &str, method: &MethodBody, plan: &MethodPlan) -> Insn {
    let opcode = if method.is_static() {
        Opcode::INVOKESTATIC
    } else {
        Opcode::INVOKESPECIAL
    };
    Insn::invoke(opcode, owner, plan.name.clone(), plan.desc.clone())
}

/// Prepends a dispatcher to the rewritten copy of a renamed method.
///
/// Without a safety field every call forwards, so the original code becomes
/// unreachable and is dropped.
pub(crate) fn install_dispatcher(owner: &str, method: &mut MethodBody, plan: &MethodPlan, safety: Option<&FieldId>) {
    let skip = method.new_label();
    let mut prefix = guard(owner, safety, method, skip);
    let guarded = !prefix.is_empty();

    let mut slot = 0u16;
    if !method.is_static() {
        prefix.push(Insn::var(Opcode::ALOAD, 0));
        slot = 1;
    }
    for ty in method.desc.params() {
        prefix.push(Insn::var(ty.load_opcode(), slot));
        slot += ty.size() as u16;
    }
    prefix.push(invoke(owner, method, plan));
    prefix.push(Insn::Op(method.desc.ret().return_opcode()));

    if guarded {
        prefix.push(Insn::Label(skip));
        prefix.append(&mut method.instructions);
        method.instructions = prefix;
    } else {
        method.instructions = prefix;
        method.try_catch.clear();
        method.local_variables.clear();
    }
    method.recompute_max_locals();
}

/// Prepends conversion code forwarding to a rewritten method with a new
/// descriptor.
///
/// Predicate and consumer arguments are wrapped into the transformed
/// interface through a generated lambda transformer. Returns those
/// transformers for the caller to add to the class, or `None`, leaving the
/// method untouched, when a split parameter or return has no conversion.
pub(crate) fn install_converter(
    owner: &str,
    method: &mut MethodBody,
    plan: &MethodPlan,
    registry: &RuleRegistry,
    safety: Option<&FieldId>,
    hook: Option<&MethodId>,
) -> Option<Vec<MethodBody>> {
    let skip = method.new_label();
    let mut prefix = guard(owner, safety, method, skip);
    let guarded = !prefix.is_empty();
    let mut transformers = Vec::new();
    let skipped = |rule: &TransformRule, ty: &JvmType, reason: &str| {
        log::warn!(
            "{}.{}{}: rule '{}' has no {} {}, skipping shim",
            owner,
            method.name,
            method.desc,
            rule.id(),
            reason,
            ty
        );
    };

    if let Some(hook) = hook {
        for text in [owner.to_string(), method.name.clone(), method.desc.to_string()] {
            prefix.push(Insn::Ldc(Constant::String(text)));
        }
        prefix.push(hook.call_insn());
    }

    let receiver = usize::from(!method.is_static());
    let mut slot = 0u16;
    if receiver == 1 {
        prefix.push(Insn::var(Opcode::ALOAD, 0));
        slot = 1;
    }
    for (position, ty) in method.desc.params().iter().enumerate() {
        let load = Insn::var(ty.load_opcode(), slot);
        match plan.param_rules.get(position + receiver).copied().flatten() {
            Some(rule) => {
                let rule = registry.rule(rule);
                match rule.subtype() {
                    Subtype::Plain => {
                        let Some(conversions) = rule.from_original() else {
                            skipped(rule, ty, "conversion from");
                            return None;
                        };
                        for conversion in conversions {
                            prefix.push(load.clone());
                            prefix.push(conversion.call_insn());
                        }
                    }
                    Subtype::Predicate { base } | Subtype::Consumer { base } => {
                        let kind = match rule.subtype() {
                            Subtype::Predicate { .. } => Functional::Predicate,
                            _ => Functional::Consumer,
                        };
                        let Some((transformer, wrap)) =
                            lambda_transformer(owner, rule, registry.rule(base), kind)
                        else {
                            skipped(rule, ty, "packing method to wrap");
                            return None;
                        };
                        prefix.push(load);
                        prefix.push(wrap);
                        transformers.push(transformer);
                    }
                    Subtype::Array { .. } => {
                        skipped(rule, ty, "element-wise conversion of");
                        return None;
                    }
                }
            }
            None => prefix.push(load),
        }
        slot += ty.size() as u16;
    }
    prefix.push(invoke(owner, method, plan));

    if let Some(rule) = plan.ret_rule.filter(|_| !plan.packs_return) {
        let rule = registry.rule(rule);
        let Some(conversion) = rule.to_original() else {
            skipped(rule, method.desc.ret(), "conversion back to");
            return None;
        };
        prefix.push(conversion.call_insn());
    }
    prefix.push(Insn::Op(method.desc.ret().return_opcode()));

    if guarded {
        prefix.push(Insn::Label(skip));
    }
    prefix.append(&mut method.instructions);
    method.instructions = prefix;
    method.recompute_max_locals();
    Some(transformers)
}

/// Builds the static method turning an original predicate or consumer into
/// the transformed interface, and the call site wrapping an instance with
/// it.
///
/// The transformer takes the original instance followed by the components,
/// packs them with the rule's packing method and calls the original.
fn lambda_transformer(
    owner: &str,
    variant: &TransformRule,
    base: &TransformRule,
    kind: Functional,
) -> Option<(MethodBody, Insn)> {
    let pack = base.to_original().filter(|pack| pack.all_params().len() == base.component_count())?;
    let original = variant.source().internal_name()?;
    let transformed = variant.components().first()?.internal_name()?;

    let mut params = vec![variant.source().clone()];
    params.extend(base.components().iter().cloned());
    let desc = MethodDescriptor::new(params, kind.return_type());
    let name = format!("lambda$transform${}", variant.id().replace(' ', "$"));
    let mut transformer = MethodBody::new(
        AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::SYNTHETIC,
        name.clone(),
        desc.clone(),
    );

    let mut code = vec![Insn::var(Opcode::ALOAD, 0)];
    let mut slot = 1u16;
    for component in base.components() {
        code.push(Insn::var(component.load_opcode(), slot));
        slot += component.size() as u16;
    }
    code.push(pack.call_insn());
    code.push(Insn::invoke(
        Opcode::INVOKEINTERFACE,
        original.clone(),
        kind.method_name(),
        MethodDescriptor::new(vec![base.source().clone()], kind.return_type()),
    ));
    code.push(Insn::Op(kind.return_type().return_opcode()));
    transformer.instructions = code;
    transformer.recompute_max_locals();

    let erased = MethodDescriptor::new(base.components().to_vec(), kind.return_type());
    let wrap = Insn::InvokeDynamic {
        name: kind.method_name().to_string(),
        desc: MethodDescriptor::new(vec![JvmType::object(original)], JvmType::object(transformed)),
        bootstrap: Handle {
            kind: HandleKind::InvokeStatic,
            owner: LAMBDA_METAFACTORY.to_string(),
            name: "metafactory".to_string(),
            desc: METAFACTORY_DESC.to_string(),
            interface: false,
        },
        args: vec![
            BsmArg::MethodType(erased.clone()),
            BsmArg::Handle(Handle {
                kind: HandleKind::InvokeStatic,
                owner: owner.to_string(),
                name,
                desc: desc.to_string(),
                interface: false,
            }),
            BsmArg::MethodType(erased),
        ],
    };
    Some((transformer, wrap))
}

/// Clears the safety flag before every return of a constructor.
pub(crate) fn clear_flag_in_constructor(owner: &str, method: &mut MethodBody, safety: &FieldId) {
    let mut code = Vec::with_capacity(method.instructions.len() + 3);
    for insn in method.instructions.drain(..) {
        if insn == Insn::Op(Opcode::RETURN) {
            code.push(Insn::var(Opcode::ALOAD, 0));
            code.push(Insn::Op(Opcode::ICONST_0));
            code.push(Insn::field(Opcode::PUTFIELD, owner, safety.name.clone(), JvmType::Boolean));
        }
        code.push(insn);
    }
    method.instructions = code;
}

/// Points accesses to retyped fields at their `Object` declaration and
/// casts every read back, to the original type in untransformed code or to
/// the component type in code written for transformed instances.
///
/// Returns the number of rewritten accesses.
pub(crate) fn cast_retyped_fields(
    method: &mut MethodBody,
    retyped: &FxHashMap<FieldId, JvmType>,
    transformed: bool,
) -> usize {
    let mut rewritten = 0;
    let mut code = Vec::with_capacity(method.instructions.len());
    for insn in method.instructions.drain(..) {
        let Some((field, component)) = FieldId::from_insn(&insn).and_then(|f| retyped.get_key_value(&f)) else {
            code.push(insn);
            continue;
        };
        let Insn::Field { opcode, .. } = insn else {
            code.push(insn);
            continue;
        };
        rewritten += 1;
        code.push(Insn::field(opcode, field.owner.clone(), field.name.clone(), JvmType::object(OBJECT)));
        if matches!(opcode, Opcode::GETFIELD | Opcode::GETSTATIC) {
            let cast = if transformed { component } else { &field.desc };
            code.push(type_insn(Opcode::CHECKCAST, cast));
        }
    }
    method.instructions = code;
    rewritten
}

/// Builds the constructor for transformed instances.
///
/// The result takes the parameters of `desc` plus a trailing magic `int`.
/// Right after `code` calls the superclass (or another own) constructor, the
/// magic value is checked and the safety flag set. Locals of `code` at or
/// above the magic slot move up by one.
pub(crate) fn make_constructor(
    owner: &str,
    super_name: Option<&str>,
    desc: &MethodDescriptor,
    mut code: Vec<Insn>,
    safety: &FieldId,
) -> Result<MethodBody> {
    if *desc.ret() != JvmType::Void {
        return Err(malformed_error!("Constructor descriptor {} must return void", desc));
    }
    let magic = u16::try_from(1 + desc.arg_slots())
        .map_err(|_| malformed_error!("Constructor {} has too many parameters", desc))?;
    for insn in &mut code {
        match insn {
            Insn::Var { var, .. } | Insn::Iinc { var, .. } if *var >= magic => *var += 1,
            _ => {}
        }
    }

    let super_call = code.iter().position(|insn| match insn {
        Insn::Method {
            opcode: Opcode::INVOKESPECIAL,
            owner: target,
            name,
            ..
        } => name == "<init>" && (target == owner || super_name == Some(target.as_str())),
        _ => false,
    });
    let Some(super_call) = super_call else {
        return Err(malformed_error!("Constructor {} of {} never calls a superclass constructor", desc, owner));
    };

    let mut params = desc.params().to_vec();
    params.push(JvmType::Int);
    let mut method = MethodBody::new(
        AccessFlags::PUBLIC | AccessFlags::SYNTHETIC,
        "<init>",
        MethodDescriptor::new(params, JvmType::Void),
    );
    method.instructions = code;

    let checked = method.new_label();
    let string = JvmType::object("java/lang/String");
    let concat = Insn::invoke(
        Opcode::INVOKEVIRTUAL,
        "java/lang/String",
        "concat",
        MethodDescriptor::new(vec![string.clone()], string.clone()),
    );
    let check = [
        Insn::var(Opcode::ILOAD, magic),
        Insn::push(&Constant::Int(CONSTRUCTOR_MAGIC)),
        Insn::Jump {
            opcode: Opcode::IF_ICMPEQ,
            target: checked,
        },
        type_insn(Opcode::NEW, &JvmType::object(ILLEGAL_ARGUMENT)),
        Insn::Op(Opcode::DUP),
        Insn::Ldc(Constant::String("Wrong magic value '".to_string())),
        Insn::var(Opcode::ILOAD, magic),
        Insn::invoke(
            Opcode::INVOKESTATIC,
            "java/lang/Integer",
            "toHexString",
            MethodDescriptor::new(vec![JvmType::Int], string.clone()),
        ),
        concat.clone(),
        Insn::Ldc(Constant::String("'".to_string())),
        concat,
        Insn::invoke(
            Opcode::INVOKESPECIAL,
            ILLEGAL_ARGUMENT,
            "<init>",
            MethodDescriptor::new(vec![string], JvmType::Void),
        ),
        Insn::Op(Opcode::ATHROW),
        Insn::Label(checked),
        Insn::var(Opcode::ALOAD, 0),
        Insn::Op(Opcode::ICONST_1),
        Insn::field(Opcode::PUTFIELD, owner, safety.name.clone(), JvmType::Boolean),
    ];
    method.instructions.splice(super_call + 1..super_call + 1, check);
    method.recompute_max_locals();
    Ok(method)
}
