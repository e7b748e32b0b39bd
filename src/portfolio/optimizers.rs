//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}\in\Delta}\ \tfrac12\mathbf{w}^\top\Sigma\mathbf{w},\qquad
//! \min_{\mathbf{y}\ge 0,\ \mathbf{y}^\top(\mu-r_f)=1}\ \tfrac12\mathbf{y}^\top\Sigma\mathbf{y}
//! $$
//!
//! Long-only single-portfolio optimizers. QP failures degrade to equal
//! weights; only malformed inputs are errors.

use anyhow::bail;
use anyhow::Result;
use rand::Rng;
use tracing::warn;

use super::qp::solve_qp;
use super::qp::QpBackend;
use super::qp::QpOutcome;
use super::qp::QpProblem;
use super::sortino::optimize_max_sortino;
use super::sortino::SortinoConfig;
use super::types::equal_weights;
use super::types::pct_to_decimal;
use super::types::OptimizationObjective;

/// Clip numerical noise below zero and rescale to a unit sum.
///
/// Falls back to equal weights when nothing positive is left.
pub fn clip_and_renormalize(mut w: Vec<f64>) -> Vec<f64> {
  for x in &mut w {
    if !x.is_finite() || *x < 0.0 {
      *x = 0.0;
    }
  }
  let sum: f64 = w.iter().sum();
  if sum <= 1e-15 {
    return equal_weights(w.len());
  }
  for x in &mut w {
    *x /= sum;
  }
  w
}

fn ensure_square_cov(cov: &[Vec<f64>], n: usize, op: &str) -> Result<()> {
  if cov.len() != n || cov.iter().any(|row| row.len() != n) {
    let cols = cov.first().map(|r| r.len()).unwrap_or(0);
    bail!(
      "{op}: covariance is {}x{cols}, expected {n}x{n}",
      cov.len()
    );
  }
  Ok(())
}

/// Global minimum-variance portfolio on the long-only simplex.
pub fn optimize_min_variance<B: QpBackend + ?Sized>(
  cov: &[Vec<f64>],
  backend: &B,
) -> Result<Vec<f64>> {
  let n = cov.len();
  if n == 0 {
    return Ok(Vec::new());
  }
  ensure_square_cov(cov, n, "min variance")?;

  let problem = QpProblem::new(cov.to_vec()).fully_invested().long_only();
  match solve_qp(backend, &problem)? {
    QpOutcome::Solved(w) => Ok(clip_and_renormalize(w)),
    outcome => {
      warn!(?outcome, "min variance solve failed, falling back to equal weights");
      Ok(equal_weights(n))
    }
  }
}

/// Maximum Sharpe (tangency) portfolio.
///
/// Solves `min ½yᵀΣy` subject to `yᵀ(μ - rf) = 1`, `y ≥ 0` and rescales `y`
/// to a unit sum, which leaves the Sharpe ratio unchanged. `risk_free_pct` is
/// an annual percentage.
pub fn optimize_max_sharpe<B: QpBackend + ?Sized>(
  mu: &[f64],
  cov: &[Vec<f64>],
  risk_free_pct: f64,
  backend: &B,
) -> Result<Vec<f64>> {
  let n = mu.len();
  if n == 0 {
    return Ok(Vec::new());
  }
  ensure_square_cov(cov, n, "max sharpe")?;

  let rf = pct_to_decimal(risk_free_pct);
  let excess: Vec<f64> = mu.iter().map(|m| m - rf).collect();
  if excess.iter().all(|&e| e <= 0.0) {
    warn!(rf, "no asset beats the risk-free rate, falling back to equal weights");
    return Ok(equal_weights(n));
  }

  let problem = QpProblem::new(cov.to_vec())
    .with_equality(excess, 1.0)
    .long_only();
  match solve_qp(backend, &problem)? {
    QpOutcome::Solved(y) => Ok(clip_and_renormalize(y)),
    outcome => {
      warn!(?outcome, "max sharpe solve failed, falling back to equal weights");
      Ok(equal_weights(n))
    }
  }
}

/// All capital in the asset with the highest expected return (first on ties).
pub fn optimize_max_return(mu: &[f64]) -> Vec<f64> {
  let mut w = vec![0.0; mu.len()];
  let best = mu
    .iter()
    .enumerate()
    .fold(None, |best: Option<(usize, f64)>, (i, &m)| match best {
      Some((_, b)) if m <= b => best,
      _ => Some((i, m)),
    });
  if let Some((i, _)) = best {
    w[i] = 1.0;
  }
  w
}

/// Dispatch to the optimizer selected by `objective`.
///
/// `returns` are the aligned daily return rows used by the Sortino search;
/// `rng` seeds its multi-start.
#[allow(clippy::too_many_arguments)]
pub fn optimize_with_objective<B: QpBackend + ?Sized, R: Rng>(
  objective: OptimizationObjective,
  mu: &[f64],
  cov: &[Vec<f64>],
  returns: &[Vec<f64>],
  risk_free_pct: f64,
  sortino: &SortinoConfig,
  backend: &B,
  rng: &mut R,
) -> Result<Vec<f64>> {
  match objective {
    OptimizationObjective::MinVariance => optimize_min_variance(cov, backend),
    OptimizationObjective::MaxSharpe => optimize_max_sharpe(mu, cov, risk_free_pct, backend),
    OptimizationObjective::MaxSortino => {
      optimize_max_sortino(mu, returns, pct_to_decimal(risk_free_pct), sortino, rng)
    }
    OptimizationObjective::MaxReturn => Ok(optimize_max_return(mu)),
  }
}
