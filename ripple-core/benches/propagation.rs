//! Propagation Benchmarks
//!
//! Measures the two hot paths: a mark fanning out to many subscribed
//! formulas, and a read pulling a change through a chain of formulas. A
//! diamond lattice checks that a fresh read stays flat as paths multiply.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ripple_core::reactive::{subscribe, Cell, Formula};

fn fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_notify");

    for width in [10usize, 100, 1000] {
        let source = Cell::new(0u64);
        let formulas: Vec<_> = (0..width)
            .map(|offset| {
                let source = source.clone();
                Formula::new(move || source.read() + offset as u64)
            })
            .collect();

        let handles: Vec<_> = formulas
            .iter()
            .map(|formula| {
                formula.get();
                subscribe(formula, || {})
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(black_box(next)).unwrap();
            });
        });

        drop(handles);
    }

    group.finish();
}

fn chain_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_recompute");

    for depth in [4usize, 32, 256] {
        let source = Cell::new(0u64);

        let first = {
            let source = source.clone();
            Formula::new(move || source.read() + 1)
        };
        let last = (1..depth).fold(first, |previous, _| Formula::new(move || previous.get() + 1));

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(next).unwrap();
                black_box(last.get())
            });
        });
    }

    group.finish();
}

fn fresh_read(c: &mut Criterion) {
    let source = Cell::new(1u64);
    let reader = source.clone();
    let formula = Formula::new(move || reader.read() * 2);
    formula.get();

    c.bench_function("fresh_read", |b| b.iter(|| black_box(formula.get())));
}

fn diamond_fresh_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("diamond_fresh_read");

    for depth in [8usize, 24, 64] {
        let source = Cell::new(1u64);
        let mut layer: Vec<Formula<u64>> = (0..2)
            .map(|_| {
                let source = source.clone();
                Formula::new(move || source.read())
            })
            .collect();

        for _ in 1..depth {
            layer = (0..2)
                .map(|_| {
                    let (left, right) = (layer[0].clone(), layer[1].clone());
                    Formula::new(move || left.get().wrapping_add(right.get()))
                })
                .collect();
        }

        let top = layer.swap_remove(0);
        top.get();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| black_box(top.get()))
        });
    }

    group.finish();
}

criterion_group!(benches, fan_out, chain_recompute, fresh_read, diamond_fresh_read);
criterion_main!(benches);
