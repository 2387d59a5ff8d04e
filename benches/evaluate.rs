use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dtree::policy::{ONCE, RECURSIVE};
use dtree::{field, Context, DTree, NodeBuilder, Runner};

fn label(i: usize) -> Runner<Context, usize> {
    Runner::action(format!("r{i}"), move |_: &Context| i)
}

/// One level of `n` branches, each comparing a unique field. Only the last
/// branch matches, so every condition is evaluated.
fn build_flat(n: usize) -> (Arc<DTree<Context, usize>>, Context) {
    let mut builder = NodeBuilder::new();
    let mut ctx = Context::new();
    for i in 0..n {
        let name = format!("f{i}");
        let threshold = if i + 1 == n { 1_i64 } else { 100 };
        builder = builder.branch(field::<Context>(&name).ge(threshold), label(i));
        ctx = ctx.set(&name, 10_i64);
    }
    let tree = DTree::build(builder.build().unwrap()).unwrap();
    (tree, ctx)
}

/// A chain of `depth` nested levels, each with one matching branch.
fn nested_builder(depth: usize) -> NodeBuilder<Context, usize> {
    let level = field::<Context>("level");
    let mut builder = NodeBuilder::new().otherwise(label(depth));
    for d in (0..depth).rev() {
        builder = NodeBuilder::new()
            .branch(level.ge(0), builder)
            .otherwise(label(d));
    }
    builder
}

/// `n` sibling sub-trees that all dead-end, then an else: worst case for
/// `recursive`, which descends into every one of them.
fn build_dead_ends(n: usize, policy: &str) -> Arc<DTree<Context, usize>> {
    let x = field::<Context>("x");
    let mut builder = NodeBuilder::new();
    for i in 0..n {
        builder = builder.branch(
            x.ge(0),
            NodeBuilder::new().branch(x.lt(0), label(i)),
        );
    }
    let node = builder.otherwise(label(n)).policy(policy).build().unwrap();
    DTree::build(node).unwrap()
}

fn bench_flat(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat");

    for &n in &[5, 20, 50] {
        let (tree, ctx) = build_flat(n);
        group.bench_function(&format!("{n}_branches"), |b| {
            b.iter(|| tree.run(black_box(&ctx)));
        });
    }

    group.finish();
}

fn bench_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested");
    let ctx = Context::new().set("level", 1_i64);

    for &depth in &[4, 16, 64] {
        let tree = DTree::build(nested_builder(depth).build().unwrap()).unwrap();
        group.bench_function(&format!("depth_{depth}"), |b| {
            b.iter(|| tree.run(black_box(&ctx)));
        });
    }

    group.finish();
}

fn bench_backtracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("backtracking");
    let ctx = Context::new().set("x", 1_i64);

    for &n in &[5, 20] {
        let tree = build_dead_ends(n, RECURSIVE);
        group.bench_function(&format!("{n}_dead_ends"), |b| {
            b.iter(|| tree.run(black_box(&ctx)));
        });
    }

    let once = build_dead_ends(20, ONCE);
    group.bench_function("once_stops_at_first", |b| {
        b.iter(|| once.evaluate(black_box(&ctx)));
    });

    group.finish();
}

fn bench_materialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize");

    for &depth in &[4, 16, 64] {
        let node = nested_builder(depth).build().unwrap();
        group.bench_function(&format!("depth_{depth}"), |b| {
            b.iter(|| black_box(DTree::build(node.clone()).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_flat,
    bench_nested,
    bench_backtracking,
    bench_materialize
);
criterion_main!(benches);
