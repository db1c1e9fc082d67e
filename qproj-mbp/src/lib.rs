//! qproj-mbp - Model-Based Projection for Linear Arithmetic
//!
//! Given a conjunction of literals, a model satisfying them, and a set of
//! variables to eliminate, projection produces a residue that no longer
//! mentions the eliminated variables and is still satisfied by the same
//! model. Optionally it also produces, per eliminated variable, a ground
//! definition whose substitution into the residue preserves truth under
//! the model.
//!
//! # Example
//!
//! ```
//! use num_bigint::BigInt;
//! use num_rational::BigRational;
//! use qproj_core::ast::TermManager;
//! use qproj_core::model::{Model, Value};
//! use qproj_mbp::ArithProjector;
//!
//! let mut tm = TermManager::new();
//! let x = tm.mk_var("x", tm.sorts.int_sort);
//! let y = tm.mk_var("y", tm.sorts.int_sort);
//! let three = tm.mk_int(3);
//! let one = tm.mk_int(1);
//!
//! // x <= 3, x >= 1, y <= x
//! let mut lits = vec![tm.mk_le(x, three), tm.mk_ge(x, one), tm.mk_le(y, x)];
//!
//! let mut model = Model::new();
//! let val = |n: i64| Value::Rational(BigRational::from_integer(BigInt::from(n)));
//! model.set_value(x, val(2));
//! model.set_value(y, val(0));
//!
//! let mut vars = vec![x];
//! let mut projector = ArithProjector::new();
//! assert!(projector.project(&mut tm, &mut model, &mut vars, &mut lits).unwrap());
//! assert!(vars.is_empty());
//! // The residue implies y <= 3 and still holds under the model.
//! for &lit in &lits {
//!     assert!(model.is_true(&tm, lit).unwrap());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod arith;

pub use arith::{ArithMbpConfig, ArithMbpStats, ArithProjector, Definition};
