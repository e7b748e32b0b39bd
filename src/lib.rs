//! # mpt-engine
//!
//! $$
//! \min_{\mathbf{w}\ge 0,\ \mathbf{1}^\top\mathbf{w}=1}\ \mathbf{w}^\top\Sigma\mathbf{w}
//! $$
//!
//! Modern portfolio theory engine: covariance estimation and regularization,
//! long-only optimizers on top of a pluggable quadratic-program backend, the
//! efficient frontier and risk-adjusted performance metrics.

pub mod linalg;
pub mod portfolio;
