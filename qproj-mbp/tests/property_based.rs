//! Property-based tests for projection soundness.
//!
//! Random satisfiable linear systems are built around a fixed model:
//! every constraint compares a random linear expression against its own
//! model value, shifted by a non-negative slack, so the model satisfies
//! the system by construction.

use num_bigint::BigInt;
use num_rational::BigRational;
use proptest::prelude::*;
use qproj_core::ast::{traversal, TermId, TermManager};
use qproj_core::model::{Model, Value};
use qproj_mbp::ArithProjector;

fn rat(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

/// One random constraint: coefficients for x and y, a slack, and the
/// direction of the comparison.
#[derive(Debug, Clone)]
struct RawConstraint {
    a: i64,
    b: i64,
    slack: i64,
    is_le: bool,
}

fn constraint_strategy() -> impl Strategy<Value = RawConstraint> {
    (-3i64..=3, -3i64..=3, 0i64..=4, any::<bool>()).prop_map(|(a, b, slack, is_le)| {
        RawConstraint { a, b, slack, is_le }
    })
}

/// Build `a*x + b*y` and a literal relating it to its model value.
fn mk_literal(
    tm: &mut TermManager,
    x: TermId,
    y: TermId,
    x0: i64,
    y0: i64,
    c: &RawConstraint,
) -> TermId {
    let ca = tm.mk_int(c.a);
    let cb = tm.mk_int(c.b);
    let ax = tm.mk_mul(vec![ca, x]);
    let by = tm.mk_mul(vec![cb, y]);
    let e = tm.mk_add(vec![ax, by]);
    let v = c.a * x0 + c.b * y0;
    if c.is_le {
        let bound = tm.mk_int(v + c.slack);
        tm.mk_le(e, bound)
    } else {
        let bound = tm.mk_int(v - c.slack);
        tm.mk_ge(e, bound)
    }
}

proptest! {
    /// The residue of a successful projection never mentions the
    /// eliminated variable and is still satisfied by the model.
    #[test]
    fn projection_is_sound(
        x0 in -5i64..=5,
        y0 in -5i64..=5,
        constraints in prop::collection::vec(constraint_strategy(), 1..6),
    ) {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);

        let mut lits: Vec<TermId> = constraints
            .iter()
            .map(|c| mk_literal(&mut tm, x, y, x0, y0, c))
            .collect();

        let mut model = Model::new();
        model.set_value(x, Value::Rational(rat(x0)));
        model.set_value(y, Value::Rational(rat(y0)));

        let mut vars = vec![x];
        let mut projector = ArithProjector::new();
        let ok = projector
            .project(&mut tm, &mut model, &mut vars, &mut lits)
            .unwrap();
        prop_assert!(ok);
        prop_assert!(vars.is_empty());

        for &lit in &lits {
            prop_assert!(
                !traversal::collect_vars(&tm, lit).contains(&x),
                "residue mentions x: {}",
                tm.display(lit)
            );
            prop_assert!(
                model.is_true(&tm, lit).unwrap(),
                "model violates residue: {}",
                tm.display(lit)
            );
        }
    }

    /// With definitions and apply-projection enabled, substituting the
    /// definitions into the original formulas preserves truth.
    #[test]
    fn definitions_preserve_truth(
        x0 in -5i64..=5,
        y0 in -5i64..=5,
        constraints in prop::collection::vec(constraint_strategy(), 1..6),
    ) {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);

        let original: Vec<TermId> = constraints
            .iter()
            .map(|c| mk_literal(&mut tm, x, y, x0, y0, c))
            .collect();
        let mut lits = original.clone();

        let mut model = Model::new();
        model.set_value(x, Value::Rational(rat(x0)));
        model.set_value(y, Value::Rational(rat(y0)));

        let mut vars = vec![x];
        let mut defs = Vec::new();
        let mut projector = ArithProjector::new();
        projector.set_apply_projection(true);
        let ok = projector
            .project_with_defs(&mut tm, &mut model, &mut vars, &mut lits, &mut defs)
            .unwrap();
        prop_assert!(ok);
        prop_assert_eq!(defs.len(), 1);

        let mut subst = rustc_hash::FxHashMap::default();
        subst.insert(defs[0].var, defs[0].term);
        for &fml in &original {
            let substituted = tm.substitute(fml, &subst);
            prop_assert!(
                model.is_true(&tm, substituted).unwrap(),
                "definition falsifies: {}",
                tm.display(substituted)
            );
        }
    }

    /// Reified residue literals are linear again: feeding the residue
    /// into a second projection call linearizes every literal.
    #[test]
    fn residue_literals_stay_linear(
        x0 in -5i64..=5,
        y0 in -5i64..=5,
        constraints in prop::collection::vec(constraint_strategy(), 1..6),
    ) {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let z = tm.mk_var("z", tm.sorts.int_sort);

        let mut lits: Vec<TermId> = constraints
            .iter()
            .map(|c| mk_literal(&mut tm, x, y, x0, y0, c))
            .collect();

        let mut model = Model::new();
        model.set_value(x, Value::Rational(rat(x0)));
        model.set_value(y, Value::Rational(rat(y0)));
        model.set_value(z, Value::Rational(rat(0)));

        let mut projector = ArithProjector::new();
        let mut vars = vec![x];
        prop_assert!(projector
            .project(&mut tm, &mut model, &mut vars, &mut lits)
            .unwrap());

        // Second round: z does not occur, so projection only exercises
        // the literal linearizer over the reified residue.
        let mut vars = vec![z];
        let mut projector2 = ArithProjector::new();
        prop_assert!(projector2
            .project(&mut tm, &mut model, &mut vars, &mut lits)
            .unwrap());
        prop_assert_eq!(projector2.stats().lits_retained, 0);
    }
}
