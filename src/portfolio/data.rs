//! # Portfolio Data Utilities
//!
//! $$
//! \hat\Sigma = (1-\delta)\,\tfrac12(S+S^\top) + \delta\,\bar\sigma^2 I + \lambda I
//! $$
//!
//! Return preprocessing, annualized moment estimation and covariance
//! regularization.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use anyhow::bail;
use anyhow::ensure;
use anyhow::Result;
use chrono::NaiveDate;
use statrs::statistics::Statistics;
use tracing::debug;
use tracing::warn;

use super::types::PriceSeries;
use super::types::ReturnsMatrix;
use super::types::TRADING_DAYS_PER_YEAR;
use crate::linalg::ensure_rectangular;
use crate::linalg::is_positive_definite;
use crate::linalg::shape;
use crate::linalg::Matrix;

/// Fixed intensity of the shrinkage toward the average-variance diagonal.
pub const SHRINKAGE_INTENSITY: f64 = 0.1;

/// Ridge as a fraction of the average variance.
const RELATIVE_RIDGE: f64 = 0.01;

/// Number of times the ridge is doubled before falling back to diagonal dominance.
const MAX_RIDGE_DOUBLINGS: usize = 10;

/// Keeps an all-zero covariance strictly positive definite.
const RIDGE_FLOOR: f64 = 1e-10;

fn sample_mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.mean()
  }
}

/// Convert close prices to simple returns `P_t / P_{t-1} - 1`.
///
/// A non-positive previous price yields a zero return for that step.
pub fn daily_returns(prices: &[f64]) -> Vec<f64> {
  prices
    .windows(2)
    .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
    .collect()
}

/// Align multiple return series to common tail length.
pub fn align_return_series(all_returns: &[Vec<f64>]) -> Vec<Vec<f64>> {
  let min_len = Iterator::min(all_returns.iter().map(|r| r.len())).unwrap_or(0);
  all_returns
    .iter()
    .map(|r| r[r.len().saturating_sub(min_len)..].to_vec())
    .collect()
}

/// Build a [`ReturnsMatrix`] on the dates shared by every series.
pub fn align_price_series(series: &[PriceSeries]) -> Result<ReturnsMatrix> {
  ensure!(!series.is_empty(), "no price series supplied");

  let by_date: Vec<BTreeMap<NaiveDate, f64>> = series
    .iter()
    .map(|s| s.points.iter().copied().collect())
    .collect();

  let mut common: BTreeSet<NaiveDate> = by_date[0].keys().copied().collect();
  for closes in &by_date[1..] {
    common.retain(|d| closes.contains_key(d));
  }

  if common.len() < 2 {
    bail!(
      "need at least 2 common dates across {} series, found {}",
      series.len(),
      common.len()
    );
  }

  let dates: Vec<NaiveDate> = common.iter().copied().collect();
  let returns = by_date
    .iter()
    .map(|closes| {
      let aligned: Vec<f64> = dates.iter().map(|d| closes[d]).collect();
      daily_returns(&aligned)
    })
    .collect();

  debug!(
    assets = series.len(),
    periods = dates.len() - 1,
    "aligned price series"
  );

  Ok(ReturnsMatrix {
    symbols: series.iter().map(|s| s.symbol.clone()).collect(),
    dates: dates[1..].to_vec(),
    returns,
  })
}

/// Geometric annualization of the mean daily return: `(1 + r̄)^250 - 1`.
pub fn mean_annual_return(returns: &[f64]) -> f64 {
  (1.0 + sample_mean(returns)).powf(TRADING_DAYS_PER_YEAR) - 1.0
}

/// Annualized expected return of every asset row.
pub fn expected_returns(returns: &[Vec<f64>]) -> Vec<f64> {
  returns.iter().map(|r| mean_annual_return(r)).collect()
}

/// Annualized sample covariance (`n - 1` denominator, × 250) of aligned rows.
pub fn covariance_matrix(returns: &[Vec<f64>]) -> Result<Matrix> {
  ensure_rectangular(returns, "covariance_matrix")?;
  let (n, periods) = shape(returns);
  if n > 0 && periods < 2 {
    bail!("covariance_matrix: need at least 2 observations per asset, got {n}x{periods}");
  }

  let mut cov = vec![vec![0.0; n]; n];
  for i in 0..n {
    for j in i..n {
      let c = returns[i].iter().covariance(returns[j].iter()) * TRADING_DAYS_PER_YEAR;
      cov[i][j] = c;
      cov[j][i] = c;
    }
  }

  Ok(cov)
}

/// Copy of `base` with `ridge` added to the diagonal.
pub fn with_ridge(base: &[Vec<f64>], ridge: f64) -> Matrix {
  let mut out = base.to_vec();
  for (i, row) in out.iter_mut().enumerate() {
    row[i] += ridge;
  }
  out
}

/// Make a covariance estimate symmetric and numerically positive definite.
///
/// Steps: symmetrize, shrink toward `avg_var · I` with intensity
/// [`SHRINKAGE_INTENSITY`], add a ridge of `max(lambda, 0.01 · avg_var)`,
/// double the ridge while the Cholesky check fails (at most 10 times) and
/// finally enforce strict diagonal dominance.
pub fn regularize_covariance(cov: &[Vec<f64>], lambda: f64) -> Result<Matrix> {
  ensure_rectangular(cov, "regularize_covariance")?;
  let (n, cols) = shape(cov);
  if n != cols {
    bail!("regularize_covariance: expected a square matrix, got {n}x{cols}");
  }
  if n == 0 {
    return Ok(Vec::new());
  }
  ensure!(
    cov.iter().flatten().all(|x| x.is_finite()),
    "regularize_covariance: matrix contains non-finite entries"
  );

  let avg_var = ((0..n).map(|i| cov[i][i]).sum::<f64>() / n as f64).max(0.0);

  let mut shrunk = vec![vec![0.0; n]; n];
  for i in 0..n {
    for j in 0..n {
      let sym = 0.5 * (cov[i][j] + cov[j][i]);
      let target = if i == j { avg_var } else { 0.0 };
      shrunk[i][j] = (1.0 - SHRINKAGE_INTENSITY) * sym + SHRINKAGE_INTENSITY * target;
    }
  }

  let mut ridge = lambda.max(avg_var * RELATIVE_RIDGE).max(RIDGE_FLOOR);
  for doubling in 0..=MAX_RIDGE_DOUBLINGS {
    let candidate = with_ridge(&shrunk, ridge);
    if is_positive_definite(&candidate) {
      return Ok(candidate);
    }
    debug!(doubling, ridge, "covariance not positive definite, doubling ridge");
    ridge *= 2.0;
  }

  warn!(ridge, "ridge escalation exhausted, enforcing diagonal dominance");
  let mut out = with_ridge(&shrunk, ridge);
  for i in 0..n {
    let off: f64 = (0..n).filter(|&j| j != i).map(|j| out[i][j].abs()).sum();
    out[i][i] = out[i][i].max(off + ridge);
  }
  Ok(out)
}

/// Correlation matrix implied by a covariance matrix.
pub fn correlation_from_covariance(cov: &[Vec<f64>]) -> Matrix {
  let n = cov.len();
  let mut corr = vec![vec![0.0; n]; n];

  for i in 0..n {
    let vi = cov
      .get(i)
      .and_then(|row| row.get(i))
      .copied()
      .unwrap_or(0.0)
      .max(0.0);
    let si = vi.sqrt();

    for j in 0..n {
      let vj = cov
        .get(j)
        .and_then(|row| row.get(j))
        .copied()
        .unwrap_or(0.0)
        .max(0.0);
      let sj = vj.sqrt();
      let cij = cov
        .get(i)
        .and_then(|row| row.get(j))
        .copied()
        .unwrap_or(0.0);

      let denom = si * sj;
      corr[i][j] = if i == j {
        1.0
      } else if denom > 1e-15 {
        (cij / denom).clamp(-1.0, 1.0)
      } else {
        0.0
      };
    }
  }

  corr
}
