//! # Portfolio Metrics
//!
//! $$
//! S=\frac{R_p-r_f}{\sigma_p},\qquad
//! \mathrm{So}=\frac{R_p-r_f}{\mathrm{DD}},\qquad
//! \beta=\frac{\operatorname{Cov}(r_p,r_b)}{\operatorname{Var}(r_b)}
//! $$
//!
//! Risk-adjusted ratios, downside deviation, time-weighted returns and beta.
//! Degenerate denominators give a signed infinity or zero, never NaN.

use std::collections::BTreeMap;

use anyhow::ensure;
use anyhow::Result;
use chrono::NaiveDate;
use statrs::statistics::Statistics;

use super::data::daily_returns;
use super::types::DailyPortfolioData;
use super::types::PortfolioMetrics;
use super::types::PortfolioReturnPoint;
use super::types::PortfolioWeights;
use super::types::PriceSeries;
use super::types::TRADING_DAYS_PER_YEAR;
use crate::linalg::dot;
use crate::linalg::quadratic_form;

/// Minimum number of overlapping dates for a meaningful beta.
pub const MIN_BETA_OBSERVATIONS: usize = 20;

fn excess_ratio(excess: f64, denominator: f64) -> f64 {
  if denominator.is_infinite() {
    0.0
  } else if denominator > 0.0 {
    excess / denominator
  } else if excess > 0.0 {
    f64::INFINITY
  } else if excess < 0.0 {
    f64::NEG_INFINITY
  } else {
    0.0
  }
}

/// `(ret - rf) / vol`, all annualized decimals.
pub fn sharpe_ratio(ret: f64, risk_free: f64, volatility: f64) -> f64 {
  excess_ratio(ret - risk_free, volatility)
}

/// `(ret - rf) / downside`, all annualized decimals.
pub fn sortino_ratio(ret: f64, risk_free: f64, downside: f64) -> f64 {
  excess_ratio(ret - risk_free, downside)
}

/// Annualized downside deviation of daily returns below `rf / 250`.
///
/// Only strictly negative excess returns count, averaged over their own
/// number. Without any the result is exactly `0.0`.
pub fn downside_deviation(daily: &[f64], risk_free: f64) -> f64 {
  let threshold = risk_free / TRADING_DAYS_PER_YEAR;
  let (sum_sq, count) = daily
    .iter()
    .map(|r| r - threshold)
    .filter(|&x| x < 0.0)
    .fold((0.0, 0usize), |(s, c), x| (s + x * x, c + 1));

  if count == 0 {
    return 0.0;
  }
  (sum_sq / count as f64).sqrt() * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Daily returns of a fixed-weight portfolio, `Σᵢ wᵢ rᵢₜ`.
pub fn portfolio_daily_returns(weights: &[f64], returns: &[Vec<f64>]) -> Vec<f64> {
  let periods = returns.first().map(|r| r.len()).unwrap_or(0);
  (0..periods)
    .map(|t| {
      weights
        .iter()
        .zip(returns)
        .map(|(w, row)| w * row.get(t).copied().unwrap_or(0.0))
        .sum()
    })
    .collect()
}

/// Flow-neutral daily returns: `end / (start + flow) - 1`.
///
/// Each day's flow is assumed to arrive at the start of that day. A
/// non-positive base yields `0.0`. `data` must be in date order.
pub fn time_weighted_returns(data: &[DailyPortfolioData]) -> Vec<PortfolioReturnPoint> {
  data
    .windows(2)
    .map(|pair| {
      let base = pair[0].value + pair[1].net_flow;
      let r = if base > 0.0 {
        pair[1].value / base - 1.0
      } else {
        0.0
      };
      PortfolioReturnPoint::new(pair[1].date, r)
    })
    .collect()
}

/// Chain-linked return `Π(1 + r) - 1`.
pub fn cumulative_time_weighted_return(points: &[PortfolioReturnPoint]) -> f64 {
  points
    .iter()
    .fold(1.0, |acc, p| acc * (1.0 + p.time_weighted_return))
    - 1.0
}

/// Dated daily returns of a benchmark price series.
pub fn benchmark_returns(series: &PriceSeries) -> Vec<(NaiveDate, f64)> {
  let dates = series.dates();
  dates
    .into_iter()
    .skip(1)
    .zip(daily_returns(&series.closes()))
    .collect()
}

/// Beta of `portfolio` against `benchmark` over their common dates.
///
/// `None` with fewer than [`MIN_BETA_OBSERVATIONS`] overlapping dates or a
/// flat benchmark.
pub fn beta(portfolio: &[(NaiveDate, f64)], benchmark: &[(NaiveDate, f64)]) -> Option<f64> {
  let bench: BTreeMap<NaiveDate, f64> = benchmark.iter().copied().collect();
  let (p, b): (Vec<f64>, Vec<f64>) = portfolio
    .iter()
    .filter_map(|(d, r)| bench.get(d).map(|br| (*r, *br)))
    .unzip();

  if p.len() < MIN_BETA_OBSERVATIONS {
    return None;
  }

  let var = b.iter().variance();
  if !(var.is_finite() && var > 0.0) {
    return None;
  }
  let beta = p.iter().covariance(b.iter()) / var;
  beta.is_finite().then_some(beta)
}

/// Snapshot of an allocation: return, volatility, Sharpe and Sortino.
///
/// `returns[asset][t]` are the daily rows the weights apply to; `risk_free`
/// is an annual decimal rate.
pub fn portfolio_metrics(
  weights: &PortfolioWeights,
  mu: &[f64],
  cov: &[Vec<f64>],
  returns: &[Vec<f64>],
  risk_free: f64,
) -> Result<PortfolioMetrics> {
  let w = weights.as_slice();
  ensure!(
    returns.len() == w.len(),
    "portfolio metrics: {} weights but {} return rows",
    w.len(),
    returns.len()
  );

  let expected_return = dot(w, mu)?;
  let volatility = quadratic_form(cov, w)?.max(0.0).sqrt();
  let downside = downside_deviation(&portfolio_daily_returns(w, returns), risk_free);

  Ok(PortfolioMetrics {
    expected_return,
    volatility,
    sharpe_ratio: sharpe_ratio(expected_return, risk_free, volatility),
    sortino_ratio: sortino_ratio(expected_return, risk_free, downside),
    weights: weights.clone(),
  })
}
