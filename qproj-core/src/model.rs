//! Models and evaluation.
//!
//! A [`Model`] assigns exact values to uninterpreted constants and
//! evaluates arbitrary terms under that assignment. With completion
//! enabled, evaluating an unassigned constant assigns it a default value
//! (zero, false) and records the assignment, so later evaluations agree.

use std::fmt;

use num_integer::Integer;
use num_rational::BigRational;
use num_traits::Zero;
use rustc_hash::FxHashMap;

use crate::ast::{TermId, TermKind, TermManager};
use crate::error::{QprojError, Result};
use crate::sort::SortKind;

/// An exact model value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Truth value.
    Bool(bool),
    /// Rational value (integers are rationals with denominator one).
    Rational(BigRational),
}

impl Value {
    /// The truth value, if this is a Boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Rational(_) => None,
        }
    }

    /// The rational value, if this is a numeral.
    pub fn as_rational(&self) -> Option<&BigRational> {
        match self {
            Value::Bool(_) => None,
            Value::Rational(r) => Some(r),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Rational(r) => write!(f, "{r}"),
        }
    }
}

/// A (partial) assignment of values to uninterpreted constants.
#[derive(Debug, Clone, Default)]
pub struct Model {
    values: FxHashMap<TermId, Value>,
    completion: bool,
}

impl Model {
    /// Create an empty model with completion disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable model completion.
    pub fn set_completion(&mut self, on: bool) {
        self.completion = on;
    }

    /// Assign a value to an uninterpreted constant.
    pub fn set_value(&mut self, var: TermId, value: Value) {
        self.values.insert(var, value);
    }

    /// The recorded value of a constant, if any.
    pub fn value_of(&self, var: TermId) -> Option<&Value> {
        self.values.get(&var)
    }

    /// Evaluate a term.
    pub fn eval(&mut self, tm: &TermManager, t: TermId) -> Result<Value> {
        let mut cache = FxHashMap::default();
        self.eval_rec(tm, t, &mut cache)
    }

    /// Evaluate a term that must denote a numeral.
    pub fn eval_rational(&mut self, tm: &TermManager, t: TermId) -> Result<BigRational> {
        match self.eval(tm, t)? {
            Value::Rational(r) => Ok(r),
            Value::Bool(_) => Err(QprojError::Evaluation {
                expected: "numeral",
                term: tm.display(t).to_string(),
            }),
        }
    }

    /// Evaluate a term that must denote a truth value.
    pub fn eval_bool(&mut self, tm: &TermManager, t: TermId) -> Result<bool> {
        match self.eval(tm, t)? {
            Value::Bool(b) => Ok(b),
            Value::Rational(_) => Err(QprojError::Evaluation {
                expected: "truth",
                term: tm.display(t).to_string(),
            }),
        }
    }

    /// Whether the term evaluates to `true`.
    pub fn is_true(&mut self, tm: &TermManager, t: TermId) -> Result<bool> {
        Ok(self.eval(tm, t)? == Value::Bool(true))
    }

    fn eval_rec(
        &mut self,
        tm: &TermManager,
        t: TermId,
        cache: &mut FxHashMap<TermId, Value>,
    ) -> Result<Value> {
        if let Some(v) = cache.get(&t) {
            return Ok(v.clone());
        }
        let value = self.eval_uncached(tm, t, cache)?;
        cache.insert(t, value.clone());
        Ok(value)
    }

    fn eval_uncached(
        &mut self,
        tm: &TermManager,
        t: TermId,
        cache: &mut FxHashMap<TermId, Value>,
    ) -> Result<Value> {
        let kind = tm.kind(t).clone();
        match kind {
            TermKind::True => Ok(Value::Bool(true)),
            TermKind::False => Ok(Value::Bool(false)),
            TermKind::IntConst(i) => Ok(Value::Rational(BigRational::from_integer(i))),
            TermKind::RealConst(r) => Ok(Value::Rational(r)),
            TermKind::Var(_, sort) => {
                if let Some(v) = self.values.get(&t) {
                    return Ok(v.clone());
                }
                if !self.completion {
                    return Err(QprojError::Evaluation {
                        expected: "assigned",
                        term: tm.display(t).to_string(),
                    });
                }
                let default = match tm.sorts.kind(sort) {
                    SortKind::Bool => Value::Bool(false),
                    SortKind::Int | SortKind::Real => Value::Rational(BigRational::zero()),
                };
                self.values.insert(t, default.clone());
                Ok(default)
            }
            TermKind::Add(args) => {
                let mut sum = BigRational::zero();
                for a in args {
                    sum += self.num_rec(tm, a, cache)?;
                }
                Ok(Value::Rational(sum))
            }
            TermKind::Mul(args) => {
                let mut prod = BigRational::from_integer(1.into());
                for a in args {
                    prod *= self.num_rec(tm, a, cache)?;
                }
                Ok(Value::Rational(prod))
            }
            TermKind::Sub(a, b) => {
                let va = self.num_rec(tm, a, cache)?;
                let vb = self.num_rec(tm, b, cache)?;
                Ok(Value::Rational(va - vb))
            }
            TermKind::Neg(a) => Ok(Value::Rational(-self.num_rec(tm, a, cache)?)),
            TermKind::Div(a, b) => {
                let va = self.num_rec(tm, a, cache)?;
                let vb = self.num_rec(tm, b, cache)?;
                if vb.is_zero() {
                    return Err(QprojError::Evaluation {
                        expected: "nonzero divisor",
                        term: tm.display(t).to_string(),
                    });
                }
                Ok(Value::Rational(va / vb))
            }
            TermKind::IntDiv(a, b) => {
                let (ia, ib) = self.int_operands(tm, t, a, b, cache)?;
                Ok(Value::Rational(BigRational::from_integer(
                    ia.div_floor(&ib),
                )))
            }
            TermKind::Mod(a, b) => {
                let (ia, ib) = self.int_operands(tm, t, a, b, cache)?;
                Ok(Value::Rational(BigRational::from_integer(
                    ia.mod_floor(&ib),
                )))
            }
            TermKind::Le(a, b) => self.cmp_rec(tm, a, b, cache, |o| o.is_le()),
            TermKind::Lt(a, b) => self.cmp_rec(tm, a, b, cache, |o| o.is_lt()),
            TermKind::Ge(a, b) => self.cmp_rec(tm, a, b, cache, |o| o.is_ge()),
            TermKind::Gt(a, b) => self.cmp_rec(tm, a, b, cache, |o| o.is_gt()),
            TermKind::Eq(a, b) => {
                let va = self.eval_rec(tm, a, cache)?;
                let vb = self.eval_rec(tm, b, cache)?;
                Ok(Value::Bool(va == vb))
            }
            TermKind::Distinct(args) => {
                let mut vals = Vec::with_capacity(args.len());
                for a in args {
                    vals.push(self.eval_rec(tm, a, cache)?);
                }
                let mut distinct = true;
                for i in 0..vals.len() {
                    for j in i + 1..vals.len() {
                        if vals[i] == vals[j] {
                            distinct = false;
                        }
                    }
                }
                Ok(Value::Bool(distinct))
            }
            TermKind::Not(a) => {
                let v = self.bool_rec(tm, a, cache)?;
                Ok(Value::Bool(!v))
            }
            TermKind::And(args) => {
                let mut result = true;
                for a in args {
                    result &= self.bool_rec(tm, a, cache)?;
                }
                Ok(Value::Bool(result))
            }
            TermKind::Or(args) => {
                let mut result = false;
                for a in args {
                    result |= self.bool_rec(tm, a, cache)?;
                }
                Ok(Value::Bool(result))
            }
            TermKind::Implies(a, b) => {
                let va = self.bool_rec(tm, a, cache)?;
                let vb = self.bool_rec(tm, b, cache)?;
                Ok(Value::Bool(!va || vb))
            }
            TermKind::Ite(c, then_br, else_br) => {
                if self.bool_rec(tm, c, cache)? {
                    self.eval_rec(tm, then_br, cache)
                } else {
                    self.eval_rec(tm, else_br, cache)
                }
            }
        }
    }

    fn num_rec(
        &mut self,
        tm: &TermManager,
        t: TermId,
        cache: &mut FxHashMap<TermId, Value>,
    ) -> Result<BigRational> {
        match self.eval_rec(tm, t, cache)? {
            Value::Rational(r) => Ok(r),
            Value::Bool(_) => Err(QprojError::Evaluation {
                expected: "numeral",
                term: tm.display(t).to_string(),
            }),
        }
    }

    fn bool_rec(
        &mut self,
        tm: &TermManager,
        t: TermId,
        cache: &mut FxHashMap<TermId, Value>,
    ) -> Result<bool> {
        match self.eval_rec(tm, t, cache)? {
            Value::Bool(b) => Ok(b),
            Value::Rational(_) => Err(QprojError::Evaluation {
                expected: "truth",
                term: tm.display(t).to_string(),
            }),
        }
    }

    fn cmp_rec(
        &mut self,
        tm: &TermManager,
        a: TermId,
        b: TermId,
        cache: &mut FxHashMap<TermId, Value>,
        test: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<Value> {
        let va = self.num_rec(tm, a, cache)?;
        let vb = self.num_rec(tm, b, cache)?;
        Ok(Value::Bool(test(va.cmp(&vb))))
    }

    fn int_operands(
        &mut self,
        tm: &TermManager,
        t: TermId,
        a: TermId,
        b: TermId,
        cache: &mut FxHashMap<TermId, Value>,
    ) -> Result<(num_bigint::BigInt, num_bigint::BigInt)> {
        let va = self.num_rec(tm, a, cache)?;
        let vb = self.num_rec(tm, b, cache)?;
        if !va.is_integer() || !vb.is_integer() || vb.is_zero() {
            return Err(QprojError::Evaluation {
                expected: "integer",
                term: tm.display(t).to_string(),
            });
        }
        Ok((va.to_integer(), vb.to_integer()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn rat(n: i64) -> Value {
        Value::Rational(BigRational::from_integer(BigInt::from(n)))
    }

    #[test]
    fn evaluates_linear_terms() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let two = tm.mk_int(2);
        let two_x = tm.mk_mul(vec![two, x]);
        let sum = tm.mk_add(vec![two_x, y]);

        let mut model = Model::new();
        model.set_value(x, rat(3));
        model.set_value(y, rat(-1));
        assert_eq!(model.eval(&tm, sum).unwrap(), rat(5));
    }

    #[test]
    fn floor_semantics_for_div_and_mod() {
        let mut tm = TermManager::new();
        let a = tm.mk_int(-7);
        let b = tm.mk_int(2);
        let d = tm.mk_idiv(a, b);
        let m = tm.mk_mod(a, b);

        let mut model = Model::new();
        assert_eq!(model.eval(&tm, d).unwrap(), rat(-4));
        assert_eq!(model.eval(&tm, m).unwrap(), rat(1));
    }

    #[test]
    fn completion_assigns_defaults_once() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);

        let mut model = Model::new();
        assert!(model.eval(&tm, x).is_err());

        model.set_completion(true);
        assert_eq!(model.eval(&tm, x).unwrap(), rat(0));
        assert_eq!(model.value_of(x), Some(&rat(0)));
    }

    #[test]
    fn ite_follows_the_guard() {
        let mut tm = TermManager::new();
        let b = tm.mk_var("b", tm.sorts.bool_sort);
        let one = tm.mk_int(1);
        let two = tm.mk_int(2);
        let ite = tm.mk_ite(b, one, two);

        let mut model = Model::new();
        model.set_value(b, Value::Bool(true));
        assert_eq!(model.eval(&tm, ite).unwrap(), rat(1));
        model.set_value(b, Value::Bool(false));
        assert_eq!(model.eval(&tm, ite).unwrap(), rat(2));
    }

    #[test]
    fn distinct_checks_pairwise() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let z = tm.mk_var("z", tm.sorts.int_sort);
        let distinct = tm.mk_distinct(vec![x, y, z]);

        let mut model = Model::new();
        model.set_value(x, rat(0));
        model.set_value(y, rat(1));
        model.set_value(z, rat(2));
        assert_eq!(model.eval(&tm, distinct).unwrap(), Value::Bool(true));

        model.set_value(z, rat(1));
        assert_eq!(model.eval(&tm, distinct).unwrap(), Value::Bool(false));
    }
}
