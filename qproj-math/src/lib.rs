//! qproj-math - Exact Linear Arithmetic Kernels for qproj
//!
//! The centerpiece is the model-based optimization (MBO) kernel
//! ([`mbo::ModelBasedOpt`]): a matrix of signed linear rows over exact
//! rationals, each variable carrying a model value and an integrality
//! flag. The kernel supports model-guided variable elimination
//! (Fourier-Motzkin / Loos-Weispfenning style) with symbolic definitions,
//! and objective maximization with infinitesimal-aware optima.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod inf_eps;
pub mod mbo;

pub use inf_eps::InfEps;
pub use mbo::{Def, IneqType, MboStats, ModelBasedOpt, Row, RowVar, VarId};
