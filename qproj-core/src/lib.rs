//! qproj-core - Terms, Sorts and Models for the qproj Projection Engine
//!
//! This crate provides the foundational types for model-based projection:
//! - Hash-consed arithmetic/Boolean terms with efficient [`TermId`] references
//! - A minimal sort system (`Bool`, `Int`, `Real`)
//! - Models with exact rational values and completion-aware evaluation
//! - Shared error and cancellation types
//!
//! # Examples
//!
//! ## Creating terms
//!
//! ```
//! use qproj_core::ast::TermManager;
//! use num_bigint::BigInt;
//!
//! let mut tm = TermManager::new();
//!
//! // Integer terms
//! let x = tm.mk_var("x", tm.sorts.int_sort);
//! let five = tm.mk_int(BigInt::from(5));
//! let ge = tm.mk_ge(x, five);
//!
//! // Boolean structure
//! let not_ge = tm.mk_not(ge);
//! ```
//!
//! ## Evaluating under a model
//!
//! ```
//! use qproj_core::ast::TermManager;
//! use qproj_core::model::{Model, Value};
//! use num_rational::BigRational;
//! use num_bigint::BigInt;
//!
//! let mut tm = TermManager::new();
//! let x = tm.mk_var("x", tm.sorts.int_sort);
//! let two = tm.mk_int(BigInt::from(2));
//! let le = tm.mk_le(x, two);
//!
//! let mut model = Model::new();
//! model.set_value(x, Value::Rational(BigRational::from_integer(BigInt::from(1))));
//! assert!(model.is_true(&tm, le).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
pub mod error;
pub mod model;
pub mod resource;
pub mod sort;

pub use ast::{Term, TermId, TermKind, TermManager};
pub use error::{QprojError, Result};
pub use model::{Model, Value};
pub use resource::CancelFlag;
pub use sort::{SortId, SortKind, Sorts};
