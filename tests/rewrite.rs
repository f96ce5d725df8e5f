//! Rewrite-stage tests: comparison chains, operand removal, templates and
//! the errors the rewrite can raise.
//!
//! Every test works on static methods of `a/B` with a `pos` rule (a `long`
//! holding three `int` coordinates) seeded through type hints.

use typesplit::{
    metadata::{constant::Constant, hierarchy::HierarchyTree},
    prelude::*,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pos_rule() -> Result<TransformRule> {
    TransformRule::new("pos", JvmType::Long, vec![JvmType::Int; 3])
}

fn registry_with(rule: TransformRule) -> Result<(RuleRegistry, RuleId)> {
    let mut tree = HierarchyTree::new();
    tree.add_node("java/lang/Object", None)?;
    tree.add_node("a/B", Some("java/lang/Object"))?;
    let mut registry = RuleRegistry::new(tree);
    let pos = registry.add_rule(rule)?;
    Ok((registry, pos))
}

fn hint(registry: &mut RuleRegistry, method: &str, slots: &[u16], rule: RuleId) -> Result<()> {
    let id: MethodId = method.parse()?;
    for slot in slots {
        registry.add_type_hint("a/B", id.clone(), *slot, rule);
    }
    Ok(())
}

fn static_method(name: &str, desc: &str) -> Result<MethodBuilder> {
    MethodBuilder::new(AccessFlags::PUBLIC | AccessFlags::STATIC, name, desc)
}

fn class_of(methods: Vec<MethodBody>) -> ClassBody {
    let mut class = ClassBody::new("a/B", Some("java/lang/Object".to_string()));
    class.methods = methods;
    class
}

fn invoke(owner: &str, name: &str, desc: &str) -> Result<Insn> {
    Ok(Insn::invoke(Opcode::INVOKESTATIC, owner, name, desc.parse()?))
}

fn jump(opcode: Opcode, target: LabelId) -> Insn {
    Insn::Jump { opcode, target }
}

fn iload(var: u16) -> Insn {
    Insn::var(Opcode::ILOAD, var)
}

/// Runs the whole pipeline and returns the methods it appended.
fn transform(class: ClassBody, registry: &RuleRegistry) -> Result<Vec<MethodBody>> {
    let original = class.methods.len();
    let mut session = TransformSession::new();
    let mut transformer = ClassTransformer::new(class, registry, TransformerConfig::default())?;
    transformer.analyze_all_methods()?;
    transformer.transform_all_methods(&mut session)?;
    Ok(transformer.into_class().methods.split_off(original))
}

/// The error underneath the method tag.
fn cause(err: Error) -> Error {
    match err {
        Error::Method { source, .. } => *source,
        other => other,
    }
}

#[test]
fn test_not_equal_becomes_component_chain() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry_with(pos_rule()?)?;
    hint(&mut registry, "s a/B#eq (JJ)Z", &[0, 2], pos)?;

    let mut eq = static_method("eq", "(JJ)Z")?;
    let differ = eq.new_label();
    eq.var(Opcode::LLOAD, 0)
        .var(Opcode::LLOAD, 2)
        .op(Opcode::LCMP)
        .jump(Opcode::IFNE, differ)
        .op(Opcode::ICONST_1)
        .op(Opcode::IRETURN)
        .label(differ)
        .op(Opcode::ICONST_0)
        .op(Opcode::IRETURN);

    let rewritten = transform(class_of(vec![eq.build()]), &registry)?;
    assert_eq!(rewritten.len(), 1);
    assert_eq!(rewritten[0].name, "eq");
    assert_eq!(rewritten[0].desc.to_string(), "(IIIIII)Z");
    assert_eq!(
        rewritten[0].instructions,
        vec![
            iload(0),
            iload(3),
            jump(Opcode::IF_ICMPNE, differ),
            iload(1),
            iload(4),
            jump(Opcode::IF_ICMPNE, differ),
            iload(2),
            iload(5),
            jump(Opcode::IF_ICMPNE, differ),
            Insn::Op(Opcode::ICONST_1),
            Insn::Op(Opcode::IRETURN),
            Insn::Label(differ),
            Insn::Op(Opcode::ICONST_0),
            Insn::Op(Opcode::IRETURN),
        ]
    );
    assert_eq!(rewritten[0].max_locals, 6);
    Ok(())
}

#[test]
fn test_equal_branch_folds_into_chain() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry_with(pos_rule()?)?;
    hint(&mut registry, "s a/B#same (JJ)Z", &[0, 2], pos)?;

    let mut same = static_method("same", "(JJ)Z")?;
    let equal = same.new_label();
    same.var(Opcode::LLOAD, 0)
        .var(Opcode::LLOAD, 2)
        .op(Opcode::LCMP)
        .jump(Opcode::IFEQ, equal)
        .op(Opcode::ICONST_0)
        .op(Opcode::IRETURN)
        .label(equal)
        .op(Opcode::ICONST_1)
        .op(Opcode::IRETURN);

    let rewritten = transform(class_of(vec![same.build()]), &registry)?;
    let code = &rewritten[0].instructions;
    let &Insn::Jump {
        opcode: Opcode::IF_ICMPNE,
        target: fail,
    } = &code[2]
    else {
        panic!("expected a mismatch exit, got {}", code[2]);
    };
    assert_ne!(fail, equal);
    assert_eq!(
        code[..],
        [
            iload(0),
            iload(3),
            jump(Opcode::IF_ICMPNE, fail),
            iload(1),
            iload(4),
            jump(Opcode::IF_ICMPNE, fail),
            iload(2),
            iload(5),
            jump(Opcode::IF_ICMPEQ, equal),
            Insn::Label(fail),
            Insn::Op(Opcode::ICONST_0),
            Insn::Op(Opcode::IRETURN),
            Insn::Label(equal),
            Insn::Op(Opcode::ICONST_1),
            Insn::Op(Opcode::IRETURN),
        ]
    );
    Ok(())
}

#[test]
fn test_reused_comparison_result_is_fatal() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry_with(pos_rule()?)?;
    hint(&mut registry, "s a/B#cmp (JJ)I", &[0, 2], pos)?;

    // int c = Long.compare(a, b); if (c != 0) return c; return 0;
    let mut cmp = static_method("cmp", "(JJ)I")?;
    let nonzero = cmp.new_label();
    cmp.var(Opcode::LLOAD, 0)
        .var(Opcode::LLOAD, 2)
        .op(Opcode::LCMP)
        .var(Opcode::ISTORE, 4)
        .var(Opcode::ILOAD, 4)
        .jump(Opcode::IFNE, nonzero)
        .op(Opcode::ICONST_0)
        .op(Opcode::IRETURN)
        .label(nonzero)
        .var(Opcode::ILOAD, 4)
        .op(Opcode::IRETURN);

    let err = transform(class_of(vec![cmp.build()]), &registry).unwrap_err();
    assert!(matches!(err, Error::Method { .. }));
    assert!(matches!(cause(err), Error::Unsupported { .. }));
    Ok(())
}

#[test]
fn test_template_with_finalizer() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry_with(pos_rule()?)?;
    // set(pos, value) logs the y coordinate, then stores through the split API.
    let replacement = Replacement::template(
        vec![vec![invoke("a/Log", "touch", "(I)V")?]],
        vec![vec![vec![1], vec![]]],
    )
    .with_finalizer(
        vec![invoke("a/FastWorld", "set", "(IIII)V")?],
        vec![vec![0, 1, 2], vec![0]],
    );
    registry.add_call_spec(CallSpec {
        method: "s a/World#set (JI)V".parse()?,
        ret: None,
        params: vec![Some(pos), None],
        minimums: None,
        replacement: Some(replacement),
    })?;

    let mut put = static_method("put", "(JI)V")?;
    put.var(Opcode::LLOAD, 0)
        .var(Opcode::ILOAD, 2)
        .invoke(Opcode::INVOKESTATIC, "a/World", "set", "(JI)V")?
        .op(Opcode::RETURN);

    let rewritten = transform(class_of(vec![put.build()]), &registry)?;
    assert_eq!(rewritten[0].desc.to_string(), "(IIII)V");
    assert_eq!(
        rewritten[0].instructions,
        vec![
            iload(1),
            invoke("a/Log", "touch", "(I)V")?,
            iload(0),
            iload(1),
            iload(2),
            iload(3),
            invoke("a/FastWorld", "set", "(IIII)V")?,
            Insn::Op(Opcode::RETURN),
        ]
    );
    Ok(())
}

#[test]
fn test_removal_spreads_to_sibling_operands() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry_with(pos_rule()?)?;
    hint(&mut registry, "s a/B#route (JJZ)V", &[0, 2], pos)?;

    // The first operand is compared on one path and passed along with a
    // fresh load on the other, so that load has to leave the stack too.
    let mut route = static_method("route", "(JJZ)V")?;
    let other = route.new_label();
    let end = route.new_label();
    route
        .var(Opcode::LLOAD, 0)
        .var(Opcode::ILOAD, 4)
        .jump(Opcode::IFEQ, other)
        .var(Opcode::LLOAD, 2)
        .op(Opcode::LCMP)
        .jump(Opcode::IFNE, end)
        .op(Opcode::RETURN)
        .label(other)
        .var(Opcode::LLOAD, 2)
        .invoke(Opcode::INVOKESTATIC, "a/Out", "pair", "(JJ)V")?
        .label(end)
        .op(Opcode::RETURN);

    let rewritten = transform(class_of(vec![route.build()]), &registry)?;
    assert_eq!(rewritten[0].desc.to_string(), "(IIIIIIZ)V");
    assert_eq!(
        rewritten[0].instructions,
        vec![
            iload(6),
            jump(Opcode::IFEQ, other),
            iload(0),
            iload(3),
            jump(Opcode::IF_ICMPNE, end),
            iload(1),
            iload(4),
            jump(Opcode::IF_ICMPNE, end),
            iload(2),
            iload(5),
            jump(Opcode::IF_ICMPNE, end),
            Insn::Op(Opcode::RETURN),
            Insn::Label(other),
            iload(0),
            iload(1),
            iload(2),
            iload(3),
            iload(4),
            iload(5),
            invoke("a/Out", "pair", "(IIIIII)V")?,
            Insn::Label(end),
            Insn::Op(Opcode::RETURN),
        ]
    );
    Ok(())
}

#[test]
fn test_joined_operand_is_parked() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry_with(pos_rule()?)?;
    hint(&mut registry, "s a/B#pick (ZJJ)Z", &[1, 3], pos)?;

    // (flag ? a : b) == a
    let mut pick = static_method("pick", "(ZJJ)Z")?;
    let second = pick.new_label();
    let join = pick.new_label();
    let differ = pick.new_label();
    pick.var(Opcode::ILOAD, 0)
        .jump(Opcode::IFEQ, second)
        .var(Opcode::LLOAD, 1)
        .jump(Opcode::GOTO, join)
        .label(second)
        .var(Opcode::LLOAD, 3)
        .label(join)
        .var(Opcode::LLOAD, 1)
        .op(Opcode::LCMP)
        .jump(Opcode::IFNE, differ)
        .op(Opcode::ICONST_1)
        .op(Opcode::IRETURN)
        .label(differ)
        .op(Opcode::ICONST_0)
        .op(Opcode::IRETURN);

    let rewritten = transform(class_of(vec![pick.build()]), &registry)?;
    let park = [
        Insn::var(Opcode::ISTORE, 9),
        Insn::var(Opcode::ISTORE, 8),
        Insn::var(Opcode::ISTORE, 7),
    ];
    let mut expected = vec![iload(0), jump(Opcode::IFEQ, second), iload(1), iload(2), iload(3)];
    expected.extend(park.iter().cloned());
    expected.extend([jump(Opcode::GOTO, join), Insn::Label(second), iload(4), iload(5), iload(6)]);
    expected.extend(park.iter().cloned());
    expected.extend([
        Insn::Label(join),
        iload(7),
        iload(1),
        jump(Opcode::IF_ICMPNE, differ),
        iload(8),
        iload(2),
        jump(Opcode::IF_ICMPNE, differ),
        iload(9),
        iload(3),
        jump(Opcode::IF_ICMPNE, differ),
        Insn::Op(Opcode::ICONST_1),
        Insn::Op(Opcode::IRETURN),
        Insn::Label(differ),
        Insn::Op(Opcode::ICONST_0),
        Insn::Op(Opcode::IRETURN),
    ]);
    assert_eq!(rewritten[0].instructions, expected);
    assert_eq!(rewritten[0].max_locals, 10);
    Ok(())
}

#[test]
fn test_partially_removed_producers_are_fatal() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry_with(pos_rule()?)?;
    hint(&mut registry, "s a/B#mixed (JJZZ)V", &[0, 2], pos)?;

    // The load of `a` reaches both a comparison and a plain call through
    // different joins.
    let mut mixed = static_method("mixed", "(JJZZ)V")?;
    let (left, right, compared, passed, end) = (
        mixed.new_label(),
        mixed.new_label(),
        mixed.new_label(),
        mixed.new_label(),
        mixed.new_label(),
    );
    mixed
        .var(Opcode::ILOAD, 5)
        .jump(Opcode::IFEQ, left)
        .var(Opcode::LLOAD, 0)
        .var(Opcode::ILOAD, 4)
        .jump(Opcode::IFEQ, compared)
        .jump(Opcode::GOTO, passed)
        .label(left)
        .var(Opcode::ILOAD, 4)
        .jump(Opcode::IFEQ, right)
        .var(Opcode::LLOAD, 2)
        .jump(Opcode::GOTO, compared)
        .label(right)
        .var(Opcode::LLOAD, 2)
        .jump(Opcode::GOTO, passed)
        .label(compared)
        .var(Opcode::LLOAD, 0)
        .op(Opcode::LCMP)
        .jump(Opcode::IFNE, end)
        .op(Opcode::RETURN)
        .label(passed)
        .invoke(Opcode::INVOKESTATIC, "a/Out", "consume", "(J)V")?
        .label(end)
        .op(Opcode::RETURN);

    let err = transform(class_of(vec![mixed.build()]), &registry).unwrap_err();
    assert!(matches!(cause(err), Error::MixedRemoval { index: 20 }));
    Ok(())
}

#[test]
fn test_local_below_split_store_breaks_layout() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry_with(pos_rule()?)?;
    hint(&mut registry, "s a/B#widen (IJ)V", &[1], pos)?;

    // Local 6 is written while 4..5 is free; storing a position there
    // afterwards moves 6 one slot up under the later read.
    let mut widen = static_method("widen", "(IJ)V")?;
    widen
        .var(Opcode::ILOAD, 0)
        .var(Opcode::ISTORE, 6)
        .var(Opcode::LLOAD, 1)
        .var(Opcode::LSTORE, 4)
        .var(Opcode::LLOAD, 4)
        .op(Opcode::POP2)
        .var(Opcode::ILOAD, 6)
        .op(Opcode::POP)
        .op(Opcode::RETURN);

    let err = transform(class_of(vec![widen.build()]), &registry).unwrap_err();
    assert!(matches!(
        cause(err),
        Error::VariableLayout { var: 6, index: 6, .. }
    ));
    Ok(())
}

fn zero_class() -> Result<ClassBody> {
    let mut sink = static_method("sink", "(J)V")?;
    sink.var(Opcode::LLOAD, 0).op(Opcode::POP2).op(Opcode::RETURN);
    let mut zero = static_method("zero", "()V")?;
    zero.op(Opcode::LCONST_0)
        .invoke(Opcode::INVOKESTATIC, "a/B", "sink", "(J)V")?
        .op(Opcode::RETURN);
    Ok(class_of(vec![sink.build(), zero.build()]))
}

#[test]
fn test_classified_constant_needs_replacement() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry_with(pos_rule()?)?;
    hint(&mut registry, "s a/B#sink (J)V", &[0], pos)?;

    let err = transform(zero_class()?, &registry).unwrap_err();
    let Error::MissingConstant { rule, constant } = cause(err) else {
        panic!("expected a missing constant");
    };
    assert_eq!(rule, "pos");
    assert!(constant.contains('0'));

    let rule = pos_rule()?.with_constant_values(Constant::Long(0), &[const { Constant::Int(0) }; 3])?;
    let (mut registry, pos) = registry_with(rule)?;
    hint(&mut registry, "s a/B#sink (J)V", &[0], pos)?;
    let rewritten = transform(zero_class()?, &registry)?;
    let zero = rewritten.iter().find(|m| m.name == "zero$$cc_transformed").unwrap();
    assert_eq!(
        zero.instructions,
        vec![
            Insn::Op(Opcode::ICONST_0),
            Insn::Op(Opcode::ICONST_0),
            Insn::Op(Opcode::ICONST_0),
            invoke("a/B", "sink", "(III)V")?,
            Insn::Op(Opcode::RETURN),
        ]
    );
    Ok(())
}
