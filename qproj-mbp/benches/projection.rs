//! Benchmark projection over growing constraint chains.

use criterion::{criterion_group, criterion_main, Criterion};
use num_bigint::BigInt;
use num_rational::BigRational;
use qproj_core::ast::{TermId, TermManager};
use qproj_core::model::{Model, Value};
use qproj_mbp::ArithProjector;
use std::hint::black_box;

fn rat(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

/// x bounded by n variables from below and n constants from above.
fn chain(n: i64) -> (TermManager, Model, TermId, Vec<TermId>) {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let mut model = Model::new();
    model.set_value(x, Value::Rational(rat(0)));

    let mut lits = Vec::new();
    for i in 0..n {
        let y = tm.mk_var(&format!("y{i}"), tm.sorts.int_sort);
        model.set_value(y, Value::Rational(rat(-i - 1)));
        lits.push(tm.mk_le(y, x));
        let bound = tm.mk_int(i + 1);
        lits.push(tm.mk_le(x, bound));
    }
    (tm, model, x, lits)
}

fn benchmark_projection(c: &mut Criterion) {
    for n in [8i64, 64] {
        c.bench_function(&format!("project_chain_{n}"), |b| {
            b.iter(|| {
                let (mut tm, mut model, x, mut lits) = chain(n);
                let mut vars = vec![x];
                let mut projector = ArithProjector::new();
                projector
                    .project(&mut tm, &mut model, &mut vars, &mut lits)
                    .unwrap();
                black_box(lits.len())
            });
        });
    }
}

criterion_group!(benches, benchmark_projection);
criterion_main!(benches);
