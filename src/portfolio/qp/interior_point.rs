//! # Interior-Point Backend
//!
//! $$
//! \min_{\mathbf x}\ \tfrac12\mathbf x^\top P\mathbf x + \mathbf q^\top\mathbf x
//! \quad\text{s.t.}\quad A\mathbf x + \mathbf s = \mathbf b,\quad
//! \mathbf s\in\{0\}^{m_{eq}}\times\mathbb R_+^{m-m_{eq}}
//! $$
//!
//! Solves a [`SolverLayout`] with Clarabel. Equality columns go to the zero
//! cone; an inequality column `aᵀx ≥ b₀` becomes the row `-aᵀx + s = -b₀` of
//! the nonnegative cone.

use clarabel::algebra::CscMatrix;
use clarabel::solver::DefaultSettingsBuilder;
use clarabel::solver::DefaultSolver;
use clarabel::solver::IPSolver;
use clarabel::solver::SolverStatus;
use clarabel::solver::SupportedConeT;
use nalgebra::DVector;
use tracing::debug;

use super::QpBackend;
use super::SolverLayout;
use super::SolverReport;
use super::STATUS_OPTIMAL;

/// Clarabel interior-point backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClarabelBackend {
  pub max_iter: u32,
  /// Absolute/relative gap and feasibility tolerance.
  pub tolerance: f64,
}

impl Default for ClarabelBackend {
  fn default() -> Self {
    Self {
      max_iter: 200,
      tolerance: 1e-9,
    }
  }
}

/// Column-compressed copy of a dense `rows × cols` matrix, zeros dropped.
fn to_csc(rows: usize, cols: usize, entry: impl Fn(usize, usize) -> f64) -> CscMatrix<f64> {
  let mut colptr = Vec::with_capacity(cols + 1);
  let mut rowval = Vec::new();
  let mut nzval = Vec::new();
  colptr.push(0);
  for j in 0..cols {
    for i in 0..rows {
      let v = entry(i, j);
      if v != 0.0 {
        rowval.push(i);
        nzval.push(v);
      }
    }
    colptr.push(rowval.len());
  }
  CscMatrix::new(rows, cols, colptr, rowval, nzval)
}

fn failed(n: usize, status: String) -> SolverReport {
  SolverReport {
    solution: DVector::zeros(n),
    value: f64::NAN,
    status: Some(status),
    iterations: 0,
  }
}

impl QpBackend for ClarabelBackend {
  fn solve(&self, layout: &SolverLayout) -> SolverReport {
    let n = layout.dmat.nrows();
    let m = layout.amat.ncols();
    let meq = layout.meq;
    let sign = |k: usize| if k < meq { 1.0 } else { -1.0 };

    // Clarabel reads the upper triangle of P.
    let p = to_csc(n, n, |i, j| {
      if i <= j {
        0.5 * (layout.dmat[(i, j)] + layout.dmat[(j, i)])
      } else {
        0.0
      }
    });
    let q: Vec<f64> = layout.dvec.iter().map(|d| -d).collect();
    let a = to_csc(m, n, |k, i| sign(k) * layout.amat[(i, k)]);
    let b: Vec<f64> = (0..m).map(|k| sign(k) * layout.bvec[k]).collect();

    let mut cones = Vec::with_capacity(2);
    if meq > 0 {
      cones.push(SupportedConeT::ZeroConeT(meq));
    }
    if m > meq {
      cones.push(SupportedConeT::NonnegativeConeT(m - meq));
    }

    let settings = match DefaultSettingsBuilder::default()
      .max_iter(self.max_iter)
      .tol_gap_abs(self.tolerance)
      .tol_gap_rel(self.tolerance)
      .tol_feas(self.tolerance)
      .verbose(false)
      .build()
    {
      Ok(settings) => settings,
      Err(e) => return failed(n, format!("invalid clarabel settings: {e}")),
    };
    let mut solver = match DefaultSolver::new(&p, &q, &a, &b, &cones, settings) {
      Ok(solver) => solver,
      Err(e) => return failed(n, format!("clarabel setup failed: {e:?}")),
    };
    solver.solve();

    let solution = &solver.solution;
    debug!(status = ?solution.status, iterations = solution.iterations, "clarabel finished");
    let status = match &solution.status {
      SolverStatus::Solved | SolverStatus::AlmostSolved => STATUS_OPTIMAL.to_string(),
      other => format!("clarabel: {other:?}"),
    };

    SolverReport {
      solution: DVector::from_vec(solution.x.clone()),
      value: solution.obj_val,
      status: Some(status),
      iterations: solution.iterations as usize,
    }
  }
}
