//! Benchmarks for the transformation pipeline.
//!
//! - Loading a JSON rule document
//! - Parsing textual instructions
//! - Analyzing and rewriting a class of packing methods

extern crate typesplit;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use typesplit::{assembly::parse_insns, metadata::hierarchy::HierarchyTree, prelude::*};

const RULES: &str = r#"{
    "hierarchy": { "java/lang/Object": { "bench/Chunk": {} } },
    "types": [ {
        "id": "pos", "original": "J", "transformed": ["I", "I", "I"],
        "from_original": ["s bench/Pos#getX (J)I", "s bench/Pos#getY (J)I", "s bench/Pos#getZ (J)I"],
        "to_original": "s bench/Pos#asLong (III)J"
    } ],
    "methods": [ { "method": "s bench/World#place (J)V", "parameters": ["pos"] } ]
}"#;

/// A class of `count` methods, each packing its arguments, unpacking one
/// coordinate and passing the position on.
fn chunk(count: usize) -> ClassBody {
    let mut class = ClassBody::new("bench/Chunk", Some("java/lang/Object".to_string()));
    for i in 0..count {
        let mut method = MethodBuilder::new(
            AccessFlags::PUBLIC | AccessFlags::STATIC,
            &format!("step{i}"),
            "(III)I",
        )
        .unwrap();
        method
            .var(Opcode::ILOAD, 0)
            .var(Opcode::ILOAD, 1)
            .var(Opcode::ILOAD, 2)
            .invoke(Opcode::INVOKESTATIC, "bench/Pos", "asLong", "(III)J")
            .unwrap()
            .var(Opcode::LSTORE, 3)
            .var(Opcode::LLOAD, 3)
            .invoke(Opcode::INVOKESTATIC, "bench/World", "place", "(J)V")
            .unwrap()
            .var(Opcode::LLOAD, 3)
            .invoke(Opcode::INVOKESTATIC, "bench/Pos", "getY", "(J)I")
            .unwrap()
            .op(Opcode::IRETURN);
        class.methods.push(method.build());
    }
    class
}

fn bench_load_rules(c: &mut Criterion) {
    c.bench_function("load_rules_json", |b| {
        b.iter(|| {
            let registry = RuleRegistry::from_json(black_box(RULES)).unwrap();
            black_box(registry)
        });
    });
}

fn bench_parse_insns(c: &mut Criterion) {
    let lines = [
        "ILOAD 0",
        "LDC 12L",
        "INVOKESTATIC bench/Pos#asLong (III)J",
        "GETFIELD bench/Chunk#origin J",
        "IINC 3 -1",
    ];

    c.bench_function("parse_insns", |b| {
        b.iter(|| {
            let code = parse_insns(black_box(&lines)).unwrap();
            black_box(code)
        });
    });
}

fn bench_transform_class(c: &mut Criterion) {
    let registry = RuleRegistry::from_json(RULES).unwrap();
    let class = chunk(64);

    c.bench_function("transform_class_64_methods", |b| {
        b.iter(|| {
            let mut session = TransformSession::new();
            let mut transformer =
                ClassTransformer::new(black_box(class.clone()), &registry, TransformerConfig::default())
                    .unwrap();
            transformer.analyze_all_methods().unwrap();
            transformer.transform_all_methods(&mut session).unwrap();
            black_box(transformer.into_class())
        });
    });
}

fn bench_analyze_only(c: &mut Criterion) {
    let mut tree = HierarchyTree::new();
    tree.add_node("java/lang/Object", None).unwrap();
    let registry = RuleRegistry::new(tree);
    let class = chunk(64);

    c.bench_function("analyze_class_without_rules", |b| {
        b.iter(|| {
            let mut transformer =
                ClassTransformer::new(black_box(class.clone()), &registry, TransformerConfig::default())
                    .unwrap();
            transformer.analyze_all_methods().unwrap();
            transformer.finalize().unwrap();
            black_box(transformer.describe())
        });
    });
}

criterion_group!(
    benches,
    bench_load_rules,
    bench_parse_insns,
    bench_transform_class,
    bench_analyze_only
);
criterion_main!(benches);
