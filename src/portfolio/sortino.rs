//! # Maximum Sortino
//!
//! $$
//! \max_{\mathbf{w}\in\Delta}\ \frac{\mathbf{w}^\top\mu - r_f}{\mathrm{DD}(R\mathbf{w})}
//! $$
//!
//! Multi-start projected gradient descent on the negative Sortino ratio.
//! Best-effort local search: the objective is non-convex.

use anyhow::bail;
use anyhow::Result;
use argmin::core::CostFunction;
use argmin::core::Gradient;
use rand::Rng;
use tracing::debug;
use tracing::warn;

use super::metrics::downside_deviation;
use super::metrics::portfolio_daily_returns;
use super::types::equal_weights;

/// Downside deviations below this make the ratio undefined.
const MIN_DOWNSIDE: f64 = 1e-10;

/// Learning rates below this end a start.
const MIN_LEARNING_RATE: f64 = 1e-12;

/// Search settings for [`optimize_max_sortino`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SortinoConfig {
  /// Number of random starting points.
  pub starts: usize,
  /// Iteration cap per start.
  pub max_iters: usize,
  /// Initial step size.
  pub learning_rate: f64,
  /// Stop once an accepted step moves the weights less than this (L2).
  pub tolerance: f64,
  /// Forward-difference step.
  pub epsilon: f64,
  /// Extra descents restarted from the best start, until one stops improving.
  pub polish_rounds: usize,
}

impl Default for SortinoConfig {
  fn default() -> Self {
    Self {
      starts: 20,
      max_iters: 2000,
      learning_rate: 0.05,
      tolerance: 1e-10,
      epsilon: 1e-6,
      polish_rounds: 5,
    }
  }
}

/// Negative Sortino ratio of a long-only allocation.
///
/// `returns[asset][t]` are daily simple returns, `mu` annual expected returns
/// and `risk_free` an annual decimal rate.
pub struct SortinoCost<'a> {
  pub mu: &'a [f64],
  pub returns: &'a [Vec<f64>],
  pub risk_free: f64,
  pub epsilon: f64,
}

impl SortinoCost<'_> {
  fn evaluate(&self, w: &[f64]) -> f64 {
    let daily = portfolio_daily_returns(w, self.returns);
    let downside = downside_deviation(&daily, self.risk_free);
    if downside.is_nan() || downside < MIN_DOWNSIDE {
      return f64::INFINITY;
    }
    let ret: f64 = w.iter().zip(self.mu).map(|(wi, mi)| wi * mi).sum();
    -(ret - self.risk_free) / downside
  }
}

impl CostFunction for SortinoCost<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(self.evaluate(x))
  }
}

impl Gradient for SortinoCost<'_> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  /// Forward differences; each perturbed point is rescaled back onto the
  /// budget hyperplane before evaluation.
  fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    let f0 = self.evaluate(x);
    let mut grad = vec![0.0; x.len()];
    if !f0.is_finite() {
      return Ok(grad);
    }

    for i in 0..x.len() {
      let mut bumped = x.clone();
      bumped[i] += self.epsilon;
      let total: f64 = bumped.iter().sum();
      if total.abs() > f64::EPSILON {
        for b in &mut bumped {
          *b /= total;
        }
      }
      let g = (self.evaluate(&bumped) - f0) / self.epsilon;
      grad[i] = if g.is_finite() { g } else { 0.0 };
    }

    Ok(grad)
  }
}

/// Euclidean projection onto the probability simplex (Duchi et al., 2008).
///
/// Non-finite inputs are treated as zero.
pub fn project_simplex(v: &[f64]) -> Vec<f64> {
  if v.is_empty() {
    return Vec::new();
  }
  let v: Vec<f64> = v
    .iter()
    .map(|&x| if x.is_finite() { x } else { 0.0 })
    .collect();

  let mut u = v.clone();
  u.sort_by(|a, b| b.total_cmp(a));

  let mut cssv = 0.0;
  let mut rho = 0;
  let mut theta = 0.0;
  for (i, &ui) in u.iter().enumerate() {
    cssv += ui;
    let t = (cssv - 1.0) / (i + 1) as f64;
    if ui - t > 0.0 {
      rho = i + 1;
      theta = t;
    }
  }
  if rho == 0 {
    return equal_weights(v.len());
  }

  v.iter().map(|&x| (x - theta).max(0.0)).collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
  a.iter()
    .zip(b)
    .map(|(x, y)| (x - y).powi(2))
    .sum::<f64>()
    .sqrt()
}

/// One projected-gradient descent run from `start`.
fn descend(
  cost: &SortinoCost<'_>,
  start: Vec<f64>,
  config: &SortinoConfig,
) -> Result<(Vec<f64>, f64)> {
  let n = start.len() as f64;
  let mut w = project_simplex(&start);
  let mut f = cost.cost(&w)?;
  let mut lr = config.learning_rate;

  for _ in 0..config.max_iters {
    if lr < MIN_LEARNING_RATE {
      break;
    }
    let grad = cost.gradient(&w)?;
    // Remove the component along 1 so the step stays on sum(w) = 1.
    let mean = grad.iter().sum::<f64>() / n;
    let candidate: Vec<f64> = w
      .iter()
      .zip(&grad)
      .map(|(wi, gi)| wi - lr * (gi - mean))
      .collect();
    let next = project_simplex(&candidate);
    let f_next = cost.cost(&next)?;

    if f_next < f {
      let step = distance(&next, &w);
      w = next;
      f = f_next;
      lr *= 1.05;
      if step < config.tolerance {
        break;
      }
    } else {
      lr *= 0.8;
    }
  }

  Ok((w, f))
}

/// Long-only weights maximizing the Sortino ratio.
///
/// `returns[asset][t]` must have one row per entry of `mu`, all of the same
/// length. `risk_free` is an annual decimal rate. When no start reaches a
/// finite objective (no downside anywhere) equal weights are returned.
pub fn optimize_max_sortino<R: Rng>(
  mu: &[f64],
  returns: &[Vec<f64>],
  risk_free: f64,
  config: &SortinoConfig,
  rng: &mut R,
) -> Result<Vec<f64>> {
  let n = mu.len();
  if returns.len() != n {
    bail!(
      "max sortino: {} expected returns but {} return rows",
      n,
      returns.len()
    );
  }
  if let Some(first) = returns.first() {
    if let Some((i, row)) = returns.iter().enumerate().find(|(_, r)| r.len() != first.len()) {
      bail!(
        "max sortino: return row {i} has {} observations, row 0 has {}",
        row.len(),
        first.len()
      );
    }
  }
  match n {
    0 => return Ok(Vec::new()),
    1 => return Ok(vec![1.0]),
    _ => {}
  }

  let cost = SortinoCost {
    mu,
    returns,
    risk_free,
    epsilon: config.epsilon,
  };

  let mut best: Option<(Vec<f64>, f64)> = None;
  for start in 0..config.starts.max(1) {
    let x0: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    let (w, f) = descend(&cost, x0, config)?;
    debug!(start, objective = f, "sortino start finished");
    if f.is_finite() && best.as_ref().map_or(true, |(_, bf)| f < *bf) {
      best = Some((w, f));
    }
  }

  if let Some((w, f)) = best.as_mut() {
    for round in 0..config.polish_rounds {
      let (pw, pf) = descend(&cost, w.clone(), config)?;
      if !pf.is_finite() || pf >= *f {
        break;
      }
      debug!(round, objective = pf, "sortino polish improved");
      *w = pw;
      *f = pf;
    }
  }

  match best {
    Some((w, f)) => {
      debug!(sortino = -f, "max sortino converged");
      Ok(w)
    }
    None => {
      warn!("sortino objective is not finite at any start, falling back to equal weights");
      Ok(equal_weights(n))
    }
  }
}

#[cfg(test)]
mod tests {
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;
  use tracing_test::traced_test;

  use super::*;

  fn alternating(up: f64, down: f64, len: usize) -> Vec<f64> {
    (0..len).map(|t| if t % 2 == 0 { up } else { down }).collect()
  }

  fn annual_mean(r: &[f64]) -> f64 {
    r.iter().sum::<f64>() / r.len() as f64 * 250.0
  }

  #[test]
  fn projection_onto_simplex() {
    let p = project_simplex(&[0.2, 0.3, 0.5]);
    for (a, b) in p.iter().zip([0.2, 0.3, 0.5]) {
      assert!((a - b).abs() < 1e-12);
    }

    assert_eq!(project_simplex(&[2.0, 0.0]), vec![1.0, 0.0]);

    let p = project_simplex(&[0.5, 0.5, 0.5]);
    assert!(p.iter().all(|&x| (x - 1.0 / 3.0).abs() < 1e-12));

    let p = project_simplex(&[-1.0, 0.4, 0.9]);
    assert_eq!(p[0], 0.0);
    assert!((p[1] - 0.25).abs() < 1e-12);
    assert!((p[2] - 0.75).abs() < 1e-12);

    let p = project_simplex(&[f64::NAN, 1.0]);
    assert_eq!(p, vec![0.0, 1.0]);
  }

  #[test]
  fn cost_is_infinite_without_downside() {
    let returns = vec![vec![0.01, 0.02, 0.01], vec![0.0, 0.01, 0.03]];
    let mu = vec![annual_mean(&returns[0]), annual_mean(&returns[1])];
    let cost = SortinoCost {
      mu: &mu,
      returns: &returns,
      risk_free: 0.0,
      epsilon: 1e-6,
    };
    assert_eq!(cost.cost(&vec![0.5, 0.5]).unwrap(), f64::INFINITY);
    assert_eq!(cost.gradient(&vec![0.5, 0.5]).unwrap(), vec![0.0, 0.0]);
  }

  #[test]
  fn cost_matches_negative_sortino() {
    let returns = vec![alternating(0.02, -0.01, 10)];
    let mu = vec![annual_mean(&returns[0])];
    let cost = SortinoCost {
      mu: &mu,
      returns: &returns,
      risk_free: 0.0,
      epsilon: 1e-6,
    };
    // Half the days lose 1%: downside deviation is 0.01 * sqrt(250).
    let expected = -(mu[0] / (0.01 * 250f64.sqrt()));
    assert!((cost.cost(&vec![1.0]).unwrap() - expected).abs() < 1e-9);
  }

  #[test]
  fn dominant_asset_takes_the_allocation() {
    let returns = vec![alternating(0.02, -0.01, 200), alternating(0.01, -0.02, 200)];
    let mu: Vec<f64> = returns.iter().map(|r| annual_mean(r)).collect();
    let mut rng = StdRng::seed_from_u64(11);
    let w = optimize_max_sortino(&mu, &returns, 0.0, &SortinoConfig::default(), &mut rng).unwrap();

    assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    assert!(w.iter().all(|&x| x >= -1e-9));
    assert!(w[0] > 0.99, "{w:?}");
  }

  #[test]
  fn seeded_runs_are_reproducible() {
    let returns = vec![
      alternating(0.015, -0.012, 60),
      alternating(-0.004, 0.011, 60),
      alternating(0.007, -0.003, 60),
    ];
    let mu: Vec<f64> = returns.iter().map(|r| annual_mean(r)).collect();
    let config = SortinoConfig {
      starts: 5,
      ..SortinoConfig::default()
    };

    let a = optimize_max_sortino(&mu, &returns, 0.02, &config, &mut StdRng::seed_from_u64(3)).unwrap();
    let b = optimize_max_sortino(&mu, &returns, 0.02, &config, &mut StdRng::seed_from_u64(3)).unwrap();
    assert_eq!(a, b);
    assert!((a.iter().sum::<f64>() - 1.0).abs() < 1e-6);
  }

  fn noisy_returns(seed: u64) -> (Vec<f64>, Vec<Vec<f64>>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let returns: Vec<Vec<f64>> = [(0.0008, 0.010), (0.0005, 0.012), (0.0010, 0.020), (0.0003, 0.006)]
      .iter()
      .map(|&(m, s)| {
        let normal = Normal::new(m, s).unwrap();
        (0..252).map(|_| normal.sample(&mut rng)).collect()
      })
      .collect();
    let mu = returns.iter().map(|r| annual_mean(r)).collect();
    (mu, returns)
  }

  fn objective(mu: &[f64], returns: &[Vec<f64>], w: &[f64]) -> f64 {
    let cost = SortinoCost {
      mu,
      returns,
      risk_free: 0.05,
      epsilon: 1e-6,
    };
    cost.cost(&w.to_vec()).unwrap()
  }

  #[test]
  fn polishing_never_loses_to_the_plain_multi_start() {
    for seed in 0..4 {
      let (mu, returns) = noisy_returns(seed);
      let plain = SortinoConfig {
        polish_rounds: 0,
        ..SortinoConfig::default()
      };
      let a = optimize_max_sortino(&mu, &returns, 0.05, &plain, &mut StdRng::seed_from_u64(seed)).unwrap();
      let b = optimize_max_sortino(&mu, &returns, 0.05, &SortinoConfig::default(), &mut StdRng::seed_from_u64(seed))
        .unwrap();
      assert!(objective(&mu, &returns, &b) <= objective(&mu, &returns, &a), "seed {seed}");
    }
  }

  #[test]
  fn search_is_competitive_with_random_sampling() {
    let (mu, returns) = noisy_returns(21);
    let w = optimize_max_sortino(&mu, &returns, 0.05, &SortinoConfig::default(), &mut StdRng::seed_from_u64(5)).unwrap();
    let found = -objective(&mu, &returns, &w);

    let mut rng = StdRng::seed_from_u64(99);
    let sampled = (0..2000)
      .map(|_| {
        let raw: Vec<f64> = (0..mu.len()).map(|_| -(1.0 - rng.gen::<f64>()).ln()).collect();
        let total: f64 = raw.iter().sum();
        let candidate: Vec<f64> = raw.iter().map(|x| x / total).collect();
        -objective(&mu, &returns, &candidate)
      })
      .fold(f64::NEG_INFINITY, f64::max);
    assert!(found >= sampled - 1e-2 * sampled.abs(), "found {found}, sampled {sampled}");
  }

  #[test]
  #[traced_test]
  fn no_downside_falls_back_to_equal_weights() {
    let returns = vec![vec![0.01; 30], vec![0.02; 30]];
    let mu: Vec<f64> = returns.iter().map(|r| annual_mean(r)).collect();
    let config = SortinoConfig {
      starts: 3,
      ..SortinoConfig::default()
    };
    let w = optimize_max_sortino(&mu, &returns, 0.0, &config, &mut StdRng::seed_from_u64(1)).unwrap();
    assert_eq!(w, vec![0.5, 0.5]);
    assert!(logs_contain("falling back to equal weights"));
  }

  #[test]
  fn ragged_returns_are_rejected() {
    let returns = vec![vec![0.01, -0.01], vec![0.02]];
    let mut rng = StdRng::seed_from_u64(0);
    let err = optimize_max_sortino(&[0.1, 0.2], &returns, 0.0, &SortinoConfig::default(), &mut rng)
      .unwrap_err()
      .to_string();
    assert!(err.contains("row 1 has 1"), "{err}");
    assert!(optimize_max_sortino(&[0.1], &returns, 0.0, &SortinoConfig::default(), &mut rng).is_err());
  }
}
