//! # Quadratic Program Adapter
//!
//! $$
//! \min_{\mathbf w}\ \tfrac12\mathbf w^\top Q\mathbf w + \mathbf c^\top\mathbf w
//! \quad\text{s.t.}\quad \mathbf a_i^\top\mathbf w = b_i,\ \mathbf w\ge 0
//! $$
//!
//! Translates the domain problem (row-major `Vec` matrices, named equality
//! rows, a long-only flag) into the solver layout (`D`, `d`, constraint
//! columns `A`, `b₀`, `meq`) and interprets the solver's status. Backends only
//! ever see [`SolverLayout`]; optimizers only ever see [`QpOutcome`].

pub mod interior_point;

use anyhow::bail;
use anyhow::Result;
use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;

pub use interior_point::ClarabelBackend;

use crate::linalg::ensure_rectangular;
use crate::linalg::is_positive_definite;
use crate::linalg::shape;
use crate::linalg::to_dmatrix;
use crate::linalg::Matrix;

pub const STATUS_OPTIMAL: &str = "optimal";
pub const STATUS_NOT_POSITIVE_DEFINITE: &str =
  "matrix D in quadratic function is not positive definite";

/// Problem in the solver convention:
/// minimize `-dᵀx + ½xᵀDx` subject to `Aᵀx ≥ b₀`, where constraints are the
/// columns of `A` and the first `meq` of them hold with equality.
#[derive(Clone, Debug)]
pub struct SolverLayout {
  pub dmat: DMatrix<f64>,
  pub dvec: DVector<f64>,
  pub amat: DMatrix<f64>,
  pub bvec: DVector<f64>,
  pub meq: usize,
}

/// Raw result of a backend run.
#[derive(Clone, Debug)]
pub struct SolverReport {
  pub solution: DVector<f64>,
  /// Objective value in the solver convention.
  pub value: f64,
  /// Backend status message; `None` or empty means success.
  pub status: Option<String>,
  pub iterations: usize,
}

/// A convex QP solver operating on [`SolverLayout`].
pub trait QpBackend {
  fn solve(&self, layout: &SolverLayout) -> SolverReport;
}

impl<B: QpBackend + ?Sized> QpBackend for &B {
  fn solve(&self, layout: &SolverLayout) -> SolverReport {
    (**self).solve(layout)
  }
}

/// `aᵀw = rhs`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearEquality {
  pub coefficients: Vec<f64>,
  pub rhs: f64,
}

/// Domain-side QP over portfolio weights.
#[derive(Clone, Debug, PartialEq)]
pub struct QpProblem {
  /// Symmetric positive-definite `Q` (usually a covariance matrix).
  pub quadratic: Matrix,
  /// Linear term `c`.
  pub linear: Vec<f64>,
  pub equalities: Vec<LinearEquality>,
  /// Adds `w ≥ 0` for every coordinate.
  pub long_only: bool,
}

impl QpProblem {
  /// `min ½wᵀQw` with no constraints yet.
  pub fn new(quadratic: Matrix) -> Self {
    let n = quadratic.len();
    Self {
      quadratic,
      linear: vec![0.0; n],
      equalities: Vec::new(),
      long_only: false,
    }
  }

  pub fn with_linear(mut self, linear: Vec<f64>) -> Self {
    self.linear = linear;
    self
  }

  pub fn with_equality(mut self, coefficients: Vec<f64>, rhs: f64) -> Self {
    self.equalities.push(LinearEquality { coefficients, rhs });
    self
  }

  /// Adds the budget constraint `Σw = 1`.
  pub fn fully_invested(self) -> Self {
    let n = self.quadratic.len();
    self.with_equality(vec![1.0; n], 1.0)
  }

  pub fn long_only(mut self) -> Self {
    self.long_only = true;
    self
  }

  pub fn dim(&self) -> usize {
    self.quadratic.len()
  }
}

/// Interpreted solver result.
#[derive(Clone, Debug, PartialEq)]
pub enum QpOutcome {
  Solved(Vec<f64>),
  /// The quadratic term failed the backend's positive-definiteness check.
  NotPositiveDefinite,
  Infeasible(String),
}

impl QpOutcome {
  pub fn is_solved(&self) -> bool {
    matches!(self, QpOutcome::Solved(_))
  }

  pub fn into_solution(self) -> Option<Vec<f64>> {
    match self {
      QpOutcome::Solved(w) => Some(w),
      _ => None,
    }
  }
}

/// Whether a backend status means success: an explicit `"optimal"` or an
/// empty/absent status string.
///
/// The empty-status convention comes from quadprog-style solvers that only
/// set a message on failure. A new backend must be checked against this rule
/// before it is plugged in.
pub fn solver_succeeded(status: Option<&str>) -> bool {
  match status.map(str::trim) {
    None | Some("") => true,
    Some(s) => s.eq_ignore_ascii_case("optimal"),
  }
}

/// Build the solver layout for `problem`, validating every shape.
pub fn to_solver_layout(problem: &QpProblem) -> Result<SolverLayout> {
  ensure_rectangular(&problem.quadratic, "qp quadratic term")?;
  let (rows, cols) = shape(&problem.quadratic);
  if rows != cols {
    bail!("qp quadratic term must be square, got {rows}x{cols}");
  }
  let n = rows;
  if problem.linear.len() != n {
    bail!(
      "qp linear term has length {}, quadratic term is {n}x{n}",
      problem.linear.len()
    );
  }
  for (i, eq) in problem.equalities.iter().enumerate() {
    if eq.coefficients.len() != n {
      bail!(
        "qp equality {i} has {} coefficients, quadratic term is {n}x{n}",
        eq.coefficients.len()
      );
    }
  }
  let meq = problem.equalities.len();
  if meq > n {
    bail!("qp has {meq} equalities but only {n} variables");
  }

  let bounds = if problem.long_only { n } else { 0 };
  let q = meq + bounds;

  let mut amat = DMatrix::zeros(n, q);
  let mut bvec = DVector::zeros(q);
  for (k, eq) in problem.equalities.iter().enumerate() {
    for i in 0..n {
      amat[(i, k)] = eq.coefficients[i];
    }
    bvec[k] = eq.rhs;
  }
  for i in 0..bounds {
    amat[(i, meq + i)] = 1.0;
  }

  Ok(SolverLayout {
    dmat: to_dmatrix(&problem.quadratic)?,
    dvec: DVector::from_iterator(n, problem.linear.iter().map(|c| -c)),
    amat,
    bvec,
    meq,
  })
}

/// Solve `problem` with `backend`.
///
/// Shape errors are returned as `Err`; solver failures are reported through
/// [`QpOutcome`] so that callers choose their own degradation policy. A
/// quadratic term that fails the Cholesky check never reaches the backend.
pub fn solve_qp<B: QpBackend + ?Sized>(backend: &B, problem: &QpProblem) -> Result<QpOutcome> {
  let layout = to_solver_layout(problem)?;
  if !is_positive_definite(&problem.quadratic) {
    debug!(dim = problem.dim(), "quadratic term is not positive definite, skipping solve");
    return Ok(QpOutcome::NotPositiveDefinite);
  }
  let report = backend.solve(&layout);

  if solver_succeeded(report.status.as_deref()) {
    let solution: Vec<f64> = report.solution.iter().copied().collect();
    if solution.len() != problem.dim() || solution.iter().any(|w| !w.is_finite()) {
      return Ok(QpOutcome::Infeasible(
        "backend returned a malformed solution".to_string(),
      ));
    }
    return Ok(QpOutcome::Solved(solution));
  }

  let status = report.status.unwrap_or_default();
  debug!(status = %status, iterations = report.iterations, "qp solve failed");
  if status.to_lowercase().contains("positive definite") {
    Ok(QpOutcome::NotPositiveDefinite)
  } else {
    Ok(QpOutcome::Infeasible(status))
  }
}
