//! # Efficient Frontier
//!
//! $$
//! \min_{\mathbf{w}\ge 0}\ \tfrac12\mathbf{w}^\top\Sigma\mathbf{w}
//! \quad\text{s.t.}\quad \mathbf{w}^\top\mu=\mu^\*,\ \mathbf{1}^\top\mathbf{w}=1
//! $$
//!
//! Samples the long-only frontier at evenly spaced target returns. Points the
//! solver cannot produce are dropped; an empty frontier is a valid result.

use anyhow::ensure;
use anyhow::Result;
use tracing::debug;

use super::data::with_ridge;
use super::optimizers::clip_and_renormalize;
use super::qp::solve_qp;
use super::qp::QpBackend;
use super::qp::QpOutcome;
use super::qp::QpProblem;
use super::types::EfficientFrontierPoint;
use super::types::PortfolioWeights;
use crate::linalg::dot;
use crate::linalg::is_positive_definite;
use crate::linalg::quadratic_form;
use crate::linalg::Matrix;

/// Slack on the `[min μ, max μ]` feasibility pre-check.
const TARGET_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrontierConfig {
  /// Number of target returns.
  pub points: usize,
  /// Ridge of the first retry; each further retry multiplies it by 10.
  pub base_ridge: f64,
  /// Retries after a non-positive-definite report.
  pub max_retries: usize,
  /// Drop the inefficient branch below the minimum-volatility point.
  pub efficient_only: bool,
}

impl Default for FrontierConfig {
  fn default() -> Self {
    Self {
      points: 20,
      base_ridge: 1e-8,
      max_retries: 2,
      efficient_only: true,
    }
  }
}

/// Solve progress for one target return.
#[derive(Debug)]
enum PointState {
  Attempt { retry: usize, quadratic: Matrix },
  Escalate(usize),
  Success(Vec<f64>),
  GiveUp,
}

/// `points` targets evenly spaced over `[min μ, max μ]`, both ends included.
pub fn frontier_targets(mu: &[f64], points: usize) -> Vec<f64> {
  if mu.is_empty() || points == 0 {
    return Vec::new();
  }
  let lo = mu.iter().copied().fold(f64::INFINITY, f64::min);
  let hi = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  if points == 1 {
    return vec![lo];
  }

  let step = (hi - lo) / (points - 1) as f64;
  (0..points)
    .map(|i| if i == points - 1 { hi } else { lo + step * i as f64 })
    .collect()
}

/// Minimum-variance weights for one target return, or `None` when the point
/// cannot be solved.
///
/// A non-positive-definite report is retried with a growing diagonal ridge,
/// checked with Cholesky before use. Infeasibility gives up at once.
pub fn solve_frontier_point<B: QpBackend + ?Sized>(
  mu: &[f64],
  cov: &[Vec<f64>],
  target: f64,
  config: &FrontierConfig,
  backend: &B,
) -> Result<Option<Vec<f64>>> {
  let mut state = PointState::Attempt {
    retry: 0,
    quadratic: cov.to_vec(),
  };

  loop {
    state = match state {
      PointState::Attempt { retry, quadratic } => {
        let problem = QpProblem::new(quadratic)
          .with_equality(mu.to_vec(), target)
          .fully_invested()
          .long_only();
        match solve_qp(backend, &problem)? {
          QpOutcome::Solved(w) => PointState::Success(w),
          QpOutcome::NotPositiveDefinite => PointState::Escalate(retry + 1),
          QpOutcome::Infeasible(status) => {
            debug!(target_return = target, %status, "frontier point infeasible");
            PointState::GiveUp
          }
        }
      }
      PointState::Escalate(retry) if retry > config.max_retries => PointState::GiveUp,
      PointState::Escalate(retry) => {
        let ridge = config.base_ridge * 10f64.powi(retry as i32 - 1);
        let quadratic = with_ridge(cov, ridge);
        debug!(target_return = target, retry, ridge, "retrying frontier point with ridge");
        if is_positive_definite(&quadratic) {
          PointState::Attempt { retry, quadratic }
        } else {
          PointState::Escalate(retry + 1)
        }
      }
      PointState::Success(w) => return Ok(Some(clip_and_renormalize(w))),
      PointState::GiveUp => return Ok(None),
    };
  }
}

/// Sampled long-only efficient frontier, sorted by expected return.
///
/// Fewer than two assets give an empty frontier.
pub fn efficient_frontier<B: QpBackend + ?Sized>(
  symbols: &[String],
  mu: &[f64],
  cov: &[Vec<f64>],
  config: &FrontierConfig,
  backend: &B,
) -> Result<Vec<EfficientFrontierPoint>> {
  ensure!(
    symbols.len() == mu.len(),
    "efficient frontier: {} symbols but {} expected returns",
    symbols.len(),
    mu.len()
  );
  let n = mu.len();
  if n < 2 {
    debug!(assets = n, "frontier needs at least two assets");
    return Ok(Vec::new());
  }

  let lo = mu.iter().copied().fold(f64::INFINITY, f64::min);
  let hi = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);

  let mut points = Vec::new();
  for target in frontier_targets(mu, config.points) {
    if target < lo - TARGET_TOLERANCE || target > hi + TARGET_TOLERANCE {
      debug!(target_return = target, lo, hi, "frontier target outside attainable range");
      continue;
    }
    let Some(w) = solve_frontier_point(mu, cov, target, config, backend)? else {
      continue;
    };
    let expected_return = dot(&w, mu)?;
    let volatility = quadratic_form(cov, &w)?.max(0.0).sqrt();
    points.push(EfficientFrontierPoint {
      expected_return,
      volatility,
      weights: PortfolioWeights::new(symbols.to_vec(), w)?,
    });
  }

  points.sort_by(|a, b| a.expected_return.total_cmp(&b.expected_return));

  if config.efficient_only {
    let min_vol = points
      .iter()
      .enumerate()
      .min_by(|(_, a), (_, b)| a.volatility.total_cmp(&b.volatility))
      .map(|(i, _)| i);
    if let Some(i) = min_vol {
      points.drain(..i);
    }
  }

  debug!(points = points.len(), requested = config.points, "efficient frontier built");
  Ok(points)
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use super::*;
  use crate::portfolio::qp::ClarabelBackend;
  use crate::portfolio::qp::SolverLayout;
  use crate::portfolio::qp::SolverReport;
  use crate::portfolio::qp::STATUS_NOT_POSITIVE_DEFINITE;

  fn symbols(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("A{i}")).collect()
  }

  fn sample() -> (Vec<f64>, Vec<Vec<f64>>) {
    (
      vec![0.08, 0.12, 0.20],
      vec![
        vec![0.04, 0.006, 0.0],
        vec![0.006, 0.09, 0.018],
        vec![0.0, 0.018, 0.16],
      ],
    )
  }

  #[test]
  fn targets_are_evenly_spaced_and_inclusive() {
    let t = frontier_targets(&[0.2, 0.1, 0.3], 5);
    assert_eq!(t.len(), 5);
    assert_eq!(t[0], 0.1);
    assert_eq!(t[4], 0.3);
    assert!((t[2] - 0.2).abs() < 1e-12);
    assert_eq!(frontier_targets(&[0.2, 0.1], 1), vec![0.1]);
    assert!(frontier_targets(&[0.2], 0).is_empty());
  }

  #[test]
  fn frontier_is_sorted_and_monotone_in_volatility() {
    let (mu, cov) = sample();
    let config = FrontierConfig::default();
    let points = efficient_frontier(&symbols(3), &mu, &cov, &config, &ClarabelBackend::default()).unwrap();

    assert!(!points.is_empty());
    assert!(points.len() <= config.points);
    for p in &points {
      assert!(p.weights.is_valid(), "{:?}", p.weights);
    }
    for pair in points.windows(2) {
      assert!(pair[1].expected_return >= pair[0].expected_return);
      assert!(pair[1].volatility >= pair[0].volatility - 1e-7);
    }
    let last = points.last().unwrap();
    assert!((last.expected_return - 0.20).abs() < 1e-4);
    assert!((last.volatility - 0.4).abs() < 1e-3);
  }

  #[test]
  fn full_frontier_keeps_the_inefficient_branch() {
    let (mu, cov) = sample();
    let full = FrontierConfig {
      points: 5,
      efficient_only: false,
      ..FrontierConfig::default()
    };
    let points = efficient_frontier(&symbols(3), &mu, &cov, &full, &ClarabelBackend::default()).unwrap();
    assert_eq!(points.len(), 5);
    // The lowest-return corner is riskier than the next target.
    assert!(points[0].volatility > points[1].volatility);
    assert!((points[0].weights.get("A0").unwrap() - 1.0).abs() < 1e-4);
    assert!((points[1].volatility - 0.164).abs() < 1e-3);

    let efficient = FrontierConfig { points: 5, ..FrontierConfig::default() };
    let trimmed = efficient_frontier(&symbols(3), &mu, &cov, &efficient, &ClarabelBackend::default()).unwrap();
    assert_eq!(trimmed.len(), 4);
    assert_eq!(trimmed[0], points[1]);
  }

  #[test]
  fn single_asset_frontier_is_empty() {
    let points = efficient_frontier(
      &symbols(1),
      &[0.1],
      &[vec![0.04]],
      &FrontierConfig::default(),
      &ClarabelBackend::default(),
    )
    .unwrap();
    assert!(points.is_empty());
    let mismatched = efficient_frontier(
      &symbols(2),
      &[0.1],
      &[vec![0.04]],
      &FrontierConfig::default(),
      &ClarabelBackend::default(),
    );
    assert!(mismatched.is_err());
  }

  #[test]
  fn singular_covariance_is_retried_with_ridge() {
    // Perfectly correlated, equal-variance assets.
    let mu = vec![0.05, 0.10];
    let cov = vec![vec![0.25, 0.25], vec![0.25, 0.25]];
    let config = FrontierConfig {
      points: 3,
      efficient_only: false,
      base_ridge: 1e-6,
      ..FrontierConfig::default()
    };
    let w = solve_frontier_point(&mu, &cov, 0.075, &config, &ClarabelBackend::default())
      .unwrap()
      .unwrap();
    assert!((w[0] - 0.5).abs() < 1e-6);
    assert!((w[1] - 0.5).abs() < 1e-6);
  }

  #[derive(Default)]
  struct AlwaysNotPd {
    diagonals: RefCell<Vec<f64>>,
  }

  impl QpBackend for AlwaysNotPd {
    fn solve(&self, layout: &SolverLayout) -> SolverReport {
      self.diagonals.borrow_mut().push(layout.dmat[(0, 0)]);
      SolverReport {
        solution: layout.dvec.clone(),
        value: 0.0,
        status: Some(STATUS_NOT_POSITIVE_DEFINITE.into()),
        iterations: 0,
      }
    }
  }

  #[test]
  fn retries_grow_the_ridge_and_stop() {
    let (mu, cov) = sample();
    let config = FrontierConfig::default();
    let backend = AlwaysNotPd::default();
    let w = solve_frontier_point(&mu, &cov, 0.12, &config, &backend).unwrap();
    assert!(w.is_none());

    let diagonals = backend.diagonals.borrow();
    assert_eq!(diagonals.len(), 1 + config.max_retries);
    assert_eq!(diagonals[0], cov[0][0]);
    assert!((diagonals[1] - (cov[0][0] + 1e-8)).abs() < 1e-15, "{diagonals:?}");
    assert!((diagonals[2] - (cov[0][0] + 1e-7)).abs() < 1e-15, "{diagonals:?}");
  }

  #[test]
  fn frontier_of_unsolvable_points_is_empty() {
    let (mu, cov) = sample();
    let config = FrontierConfig { points: 4, ..FrontierConfig::default() };
    let backend = AlwaysNotPd::default();
    let points = efficient_frontier(&symbols(3), &mu, &cov, &config, &backend).unwrap();
    assert!(points.is_empty());
    assert_eq!(backend.diagonals.borrow().len(), 4 * (1 + config.max_retries));
  }
}
