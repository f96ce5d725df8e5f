//! Array and functional interface variants of a rule.
//!
//! `pos` packs three `int` coordinates into a `long`. Arrays of positions
//! become one `int` array per coordinate, and a `LongPredicate` over
//! positions becomes an `a/PosPredicate` taking the three coordinates.

use typesplit::{
    metadata::{constant::BsmArg, hierarchy::HierarchyTree},
    prelude::*,
};

const LONG_PREDICATE: &str = "java/util/function/LongPredicate";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pos_rule() -> Result<TransformRule> {
    Ok(TransformRule::new("pos", JvmType::Long, vec![JvmType::Int; 3])?
        .with_from_original(vec![
            "s a/Pos#getX (J)I".parse()?,
            "s a/Pos#getY (J)I".parse()?,
            "s a/Pos#getZ (J)I".parse()?,
        ])?
        .with_to_original("s a/Pos#asLong (III)J".parse()?)
        .with_predicate(JvmType::object(LONG_PREDICATE), JvmType::object("a/PosPredicate")))
}

fn registry() -> Result<(RuleRegistry, RuleId)> {
    let mut tree = HierarchyTree::new();
    tree.add_node("java/lang/Object", None)?;
    tree.add_node("a/B", Some("java/lang/Object"))?;
    let mut registry = RuleRegistry::new(tree);
    let pos = registry.add_rule(pos_rule()?)?;
    Ok((registry, pos))
}

fn hint(registry: &mut RuleRegistry, method: &str, slot: u16, rule: RuleId) -> Result<()> {
    registry.add_type_hint("a/B", method.parse()?, slot, rule);
    Ok(())
}

fn static_method(name: &str, desc: &str) -> Result<MethodBuilder> {
    MethodBuilder::new(AccessFlags::PUBLIC | AccessFlags::STATIC, name, desc)
}

fn transform(methods: Vec<MethodBody>, registry: &RuleRegistry, config: TransformerConfig) -> Result<ClassBody> {
    let mut class = ClassBody::new("a/B", Some("java/lang/Object".to_string()));
    class.methods = methods;
    let mut session = TransformSession::new();
    let mut transformer = ClassTransformer::new(class, registry, config)?;
    transformer.analyze_all_methods()?;
    transformer.transform_all_methods(&mut session)?;
    Ok(transformer.into_class())
}

fn method<'a>(class: &'a ClassBody, name: &str, desc: &str) -> &'a MethodBody {
    class
        .methods
        .iter()
        .find(|m| m.name == name && m.desc.to_string() == desc)
        .unwrap_or_else(|| panic!("no method {name}{desc}"))
}

fn count(code: &[Insn], opcode: Opcode) -> usize {
    code.iter().filter(|insn| insn.opcode() == Some(opcode)).count()
}

#[test]
fn test_element_load_from_split_array() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry()?;
    let line = registry.array_rule(pos, 1).expect("array variant");
    hint(&mut registry, "s a/B#first ([J)I", 0, line)?;

    let mut first = static_method("first", "([J)I")?;
    first
        .var(Opcode::ALOAD, 0)
        .op(Opcode::ICONST_0)
        .op(Opcode::LALOAD)
        .invoke(Opcode::INVOKESTATIC, "a/Pos", "getX", "(J)I")?
        .op(Opcode::IRETURN);

    let class = transform(vec![first.build()], &registry, TransformerConfig::default())?;
    let code = &method(&class, "first", "([I[I[I)I").instructions;
    assert_eq!(
        code[..9],
        [
            Insn::var(Opcode::ALOAD, 0),
            Insn::Op(Opcode::ICONST_0),
            Insn::Op(Opcode::IALOAD),
            Insn::var(Opcode::ALOAD, 1),
            Insn::Op(Opcode::ICONST_0),
            Insn::Op(Opcode::IALOAD),
            Insn::var(Opcode::ALOAD, 2),
            Insn::Op(Opcode::ICONST_0),
            Insn::Op(Opcode::IALOAD),
        ]
    );
    assert_eq!(count(code, Opcode::LALOAD), 0);
    assert_eq!(count(code, Opcode::INVOKESTATIC), 0);
    assert_eq!(code.last(), Some(&Insn::Op(Opcode::IRETURN)));
    Ok(())
}

#[test]
fn test_element_store_into_split_array() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry()?;
    let line = registry.array_rule(pos, 1).expect("array variant");
    hint(&mut registry, "s a/B#put ([JJ)V", 0, line)?;
    hint(&mut registry, "s a/B#put ([JJ)V", 1, pos)?;

    let mut put = static_method("put", "([JJ)V")?;
    put.var(Opcode::ALOAD, 0)
        .op(Opcode::ICONST_1)
        .var(Opcode::LLOAD, 1)
        .op(Opcode::LASTORE)
        .op(Opcode::RETURN);

    let class = transform(vec![put.build()], &registry, TransformerConfig::default())?;
    let mut expected = Vec::new();
    for component in 0..3 {
        expected.extend([
            Insn::var(Opcode::ALOAD, component),
            Insn::Op(Opcode::ICONST_1),
            Insn::var(Opcode::ILOAD, 3 + component),
            Insn::Op(Opcode::IASTORE),
        ]);
    }
    expected.push(Insn::Op(Opcode::RETURN));
    assert_eq!(method(&class, "put", "([I[I[IIII)V").instructions, expected);
    Ok(())
}

#[test]
fn test_allocation_and_length() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry()?;
    let line = registry.array_rule(pos, 1).expect("array variant");
    hint(&mut registry, "s a/B#size (I)I", 1, line)?;

    let mut size = static_method("size", "(I)I")?;
    size.var(Opcode::ILOAD, 0)
        .insn(Insn::IntOp {
            opcode: Opcode::NEWARRAY,
            operand: 11,
        })
        .var(Opcode::ASTORE, 1)
        .var(Opcode::ALOAD, 1)
        .op(Opcode::ARRAYLENGTH)
        .op(Opcode::IRETURN);

    let class = transform(vec![size.build()], &registry, TransformerConfig::default())?;
    let rewritten = class
        .methods
        .iter()
        .find(|m| m.name != "size")
        .expect("renamed copy");
    assert_eq!(rewritten.desc.to_string(), "(I)I");
    let code = &rewritten.instructions;
    let allocate = Insn::new_array(&JvmType::Int);
    assert_eq!(
        code[..6],
        [
            Insn::var(Opcode::ILOAD, 0),
            allocate.clone(),
            Insn::var(Opcode::ILOAD, 0),
            allocate.clone(),
            Insn::var(Opcode::ILOAD, 0),
            allocate,
        ]
    );
    assert_eq!(count(code, Opcode::ASTORE), 3);
    assert_eq!(
        code[code.len() - 3..],
        [
            Insn::var(Opcode::ALOAD, 1),
            Insn::Op(Opcode::ARRAYLENGTH),
            Insn::Op(Opcode::IRETURN),
        ]
    );
    assert_eq!(rewritten.max_locals, 4);
    Ok(())
}

#[test]
fn test_nested_array_access() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry()?;
    let grid = registry.array_rule(pos, 2).expect("array variant");
    hint(&mut registry, "s a/B#corner ([[J)I", 0, grid)?;

    let mut corner = static_method("corner", "([[J)I")?;
    corner
        .var(Opcode::ALOAD, 0)
        .op(Opcode::ICONST_0)
        .op(Opcode::AALOAD)
        .op(Opcode::ICONST_1)
        .op(Opcode::LALOAD)
        .invoke(Opcode::INVOKESTATIC, "a/Pos", "getY", "(J)I")?
        .op(Opcode::IRETURN);

    let class = transform(vec![corner.build()], &registry, TransformerConfig::default())?;
    let code = &method(&class, "corner", "([[I[[I[[I)I").instructions;
    assert_eq!(count(code, Opcode::AALOAD), 3);
    assert_eq!(count(code, Opcode::IALOAD), 3);
    assert_eq!(count(code, Opcode::LALOAD), 0);
    assert_eq!(count(code, Opcode::INVOKESTATIC), 0);
    Ok(())
}

#[test]
fn test_predicate_call_moves_to_transformed_interface() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry()?;
    hint(&mut registry, "s a/B#matches (Ljava/util/function/LongPredicate;J)Z", 1, pos)?;

    let mut matches = static_method("matches", "(Ljava/util/function/LongPredicate;J)Z")?;
    matches
        .var(Opcode::ALOAD, 0)
        .var(Opcode::LLOAD, 1)
        .invoke(Opcode::INVOKEINTERFACE, LONG_PREDICATE, "test", "(J)Z")?
        .op(Opcode::IRETURN);

    let class = transform(vec![matches.build()], &registry, TransformerConfig::default())?;
    assert_eq!(
        method(&class, "matches", "(La/PosPredicate;III)Z").instructions,
        vec![
            Insn::var(Opcode::ALOAD, 0),
            Insn::var(Opcode::ILOAD, 1),
            Insn::var(Opcode::ILOAD, 2),
            Insn::var(Opcode::ILOAD, 3),
            Insn::invoke(Opcode::INVOKEINTERFACE, "a/PosPredicate", "test", "(III)Z".parse()?),
            Insn::Op(Opcode::IRETURN),
        ]
    );
    Ok(())
}

#[test]
fn test_converter_wraps_predicate_with_lambda_transformer() -> Result<()> {
    init_logging();
    let (mut registry, pos) = registry()?;
    hint(&mut registry, "s a/B#matches (Ljava/util/function/LongPredicate;J)Z", 1, pos)?;

    let mut matches = static_method("matches", "(Ljava/util/function/LongPredicate;J)Z")?;
    matches
        .var(Opcode::ALOAD, 0)
        .var(Opcode::LLOAD, 1)
        .invoke(Opcode::INVOKEINTERFACE, LONG_PREDICATE, "test", "(J)Z")?
        .op(Opcode::IRETURN);

    let class = transform(vec![matches.build()], &registry, TransformerConfig::safe())?;
    let transformer = method(
        &class,
        "lambda$transform$pos$predicate",
        "(Ljava/util/function/LongPredicate;III)Z",
    );
    assert!(transformer.is_static());
    assert_eq!(
        transformer.instructions,
        vec![
            Insn::var(Opcode::ALOAD, 0),
            Insn::var(Opcode::ILOAD, 1),
            Insn::var(Opcode::ILOAD, 2),
            Insn::var(Opcode::ILOAD, 3),
            Insn::invoke(Opcode::INVOKESTATIC, "a/Pos", "asLong", "(III)J".parse()?),
            Insn::invoke(Opcode::INVOKEINTERFACE, LONG_PREDICATE, "test", "(J)Z".parse()?),
            Insn::Op(Opcode::IRETURN),
        ]
    );

    let original = method(&class, "matches", "(Ljava/util/function/LongPredicate;J)Z");
    let code = &original.instructions;
    assert_eq!(code[0], Insn::var(Opcode::ALOAD, 0));
    let Insn::InvokeDynamic { name, desc, args, .. } = &code[1] else {
        panic!("expected a lambda call site, got {}", code[1]);
    };
    assert_eq!(name, "test");
    assert_eq!(desc.to_string(), "(Ljava/util/function/LongPredicate;)La/PosPredicate;");
    let Some(BsmArg::Handle(target)) = args.get(1) else {
        panic!("expected the transformer handle");
    };
    assert_eq!(target.owner, "a/B");
    assert_eq!(target.name, "lambda$transform$pos$predicate");
    assert_eq!(
        code[8],
        Insn::invoke(Opcode::INVOKESTATIC, "a/B", "matches", "(La/PosPredicate;III)Z".parse()?)
    );
    Ok(())
}
