//! # Portfolio Types
//!
//! $$
//! \mathbf{w}\in\Delta^{n-1}=\{\mathbf{w}\ge 0,\ \mathbf{1}^\top\mathbf{w}=1\}
//! $$
//!
//! Shared enums, input series and result containers for portfolio optimization.

use std::collections::BTreeMap;
use std::fmt::Display;

use anyhow::ensure;
use anyhow::Result;
use chrono::NaiveDate;
use impl_new_derive::ImplNew;

/// Trading days used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 250.0;

/// Tolerance on `sum(w) = 1` for a valid long-only allocation.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Supported single-portfolio objectives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptimizationObjective {
  /// Global minimum variance on the long-only simplex.
  #[default]
  MinVariance,
  /// Tangency portfolio (maximum Sharpe ratio).
  MaxSharpe,
  /// Maximum Sortino ratio via multi-start projected gradient descent.
  MaxSortino,
  /// All capital in the asset with the highest expected return.
  MaxReturn,
}

impl OptimizationObjective {
  /// Parse a string into an [`OptimizationObjective`].
  pub fn from_str(s: &str) -> Self {
    match s.to_lowercase().as_str() {
      "sharpe" | "max-sharpe" | "maxsharpe" | "tangency" => Self::MaxSharpe,
      "sortino" | "max-sortino" | "maxsortino" => Self::MaxSortino,
      "return" | "max-return" | "maxreturn" => Self::MaxReturn,
      _ => Self::MinVariance,
    }
  }

  /// All objectives, in reporting order.
  pub fn all() -> [Self; 4] {
    [
      Self::MinVariance,
      Self::MaxSharpe,
      Self::MaxSortino,
      Self::MaxReturn,
    ]
  }
}

impl Display for OptimizationObjective {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      OptimizationObjective::MinVariance => write!(f, "Minimum variance"),
      OptimizationObjective::MaxSharpe => write!(f, "Maximum Sharpe"),
      OptimizationObjective::MaxSortino => write!(f, "Maximum Sortino"),
      OptimizationObjective::MaxReturn => write!(f, "Maximum return"),
    }
  }
}

/// Chronologically ordered closing prices of one asset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceSeries {
  /// Asset symbol.
  pub symbol: String,
  /// `(date, close)` pairs in ascending date order.
  pub points: Vec<(NaiveDate, f64)>,
}

impl PriceSeries {
  pub fn new(symbol: impl Into<String>, points: Vec<(NaiveDate, f64)>) -> Self {
    Self {
      symbol: symbol.into(),
      points,
    }
  }

  pub fn closes(&self) -> Vec<f64> {
    self.points.iter().map(|&(_, close)| close).collect()
  }

  pub fn dates(&self) -> Vec<NaiveDate> {
    self.points.iter().map(|&(date, _)| date).collect()
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }
}

/// Daily simple returns, one row per asset, all rows on the same calendar.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReturnsMatrix {
  /// Asset symbols in row order.
  pub symbols: Vec<String>,
  /// Date of each return column (the later date of each price pair).
  /// Empty when the rows were aligned by length only.
  pub dates: Vec<NaiveDate>,
  /// `returns[asset][t]`.
  pub returns: Vec<Vec<f64>>,
}

impl ReturnsMatrix {
  pub fn n_assets(&self) -> usize {
    self.returns.len()
  }

  pub fn n_periods(&self) -> usize {
    self.returns.first().map(|r| r.len()).unwrap_or(0)
  }
}

/// Long-only allocation keyed by asset symbol.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioWeights {
  symbols: Vec<String>,
  weights: Vec<f64>,
}

impl PortfolioWeights {
  /// Pair symbols with weights; both slices must have the same length.
  pub fn new(symbols: Vec<String>, weights: Vec<f64>) -> Result<Self> {
    ensure!(
      symbols.len() == weights.len(),
      "portfolio weights: {} symbols but {} weights",
      symbols.len(),
      weights.len()
    );
    Ok(Self { symbols, weights })
  }

  /// Weight of `symbol`, if present.
  pub fn get(&self, symbol: &str) -> Option<f64> {
    self
      .symbols
      .iter()
      .position(|s| s == symbol)
      .map(|i| self.weights[i])
  }

  /// `(symbol, weight)` pairs in asset order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .symbols
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn as_slice(&self) -> &[f64] {
    &self.weights
  }

  pub fn len(&self) -> usize {
    self.weights.len()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  pub fn sum(&self) -> f64 {
    self.weights.iter().sum()
  }

  /// Whether the weights are long-only and sum to one.
  pub fn is_valid(&self) -> bool {
    !self.weights.is_empty()
      && (self.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
      && self.weights.iter().all(|&w| w >= -1e-9)
  }

  pub fn to_map(&self) -> BTreeMap<String, f64> {
    self
      .symbols
      .iter()
      .cloned()
      .zip(self.weights.iter().copied())
      .collect()
  }
}

/// Derived snapshot of one optimized portfolio.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioMetrics {
  /// Annualized expected return `wᵀμ`.
  pub expected_return: f64,
  /// Annualized volatility `sqrt(wᵀΣw)`.
  pub volatility: f64,
  pub sharpe_ratio: f64,
  pub sortino_ratio: f64,
  pub weights: PortfolioWeights,
}

/// One sampled point of the efficient frontier.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EfficientFrontierPoint {
  pub expected_return: f64,
  pub volatility: f64,
  pub weights: PortfolioWeights,
}

/// End-of-day portfolio valuation with the net external flow of that day.
#[derive(Clone, Copy, Debug, PartialEq, ImplNew)]
pub struct DailyPortfolioData {
  pub date: NaiveDate,
  /// Market value at the close.
  pub value: f64,
  /// Deposits minus withdrawals, assumed to arrive at the start of the day.
  pub net_flow: f64,
}

/// Flow-neutral return of one period, dated at the period end.
#[derive(Clone, Copy, Debug, PartialEq, ImplNew)]
pub struct PortfolioReturnPoint {
  pub date: NaiveDate,
  pub time_weighted_return: f64,
}

/// Convert an annual percentage (e.g. `5.0`) to a decimal rate (`0.05`).
pub fn pct_to_decimal(pct: f64) -> f64 {
  pct / 100.0
}

/// Equal allocation `1/n`.
pub fn equal_weights(n: usize) -> Vec<f64> {
  if n == 0 {
    Vec::new()
  } else {
    vec![1.0 / n as f64; n]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn objective_parsing_is_case_insensitive() {
    assert_eq!(
      OptimizationObjective::from_str("Max-Sharpe"),
      OptimizationObjective::MaxSharpe
    );
    assert_eq!(
      OptimizationObjective::from_str("SORTINO"),
      OptimizationObjective::MaxSortino
    );
    assert_eq!(
      OptimizationObjective::from_str("max-return"),
      OptimizationObjective::MaxReturn
    );
    assert_eq!(
      OptimizationObjective::from_str("anything"),
      OptimizationObjective::MinVariance
    );
  }

  #[test]
  fn weights_lookup_and_validity() {
    let w = PortfolioWeights::new(vec!["A".into(), "B".into()], vec![0.25, 0.75]).unwrap();
    assert_eq!(w.get("B"), Some(0.75));
    assert_eq!(w.get("C"), None);
    assert!(w.is_valid());
    assert_eq!(w.to_map().len(), 2);

    let bad = PortfolioWeights::new(vec!["A".into()], vec![0.5]).unwrap();
    assert!(!bad.is_valid());
    assert!(PortfolioWeights::new(vec!["A".into()], vec![]).is_err());
  }

  #[test]
  fn risk_free_percentage_conversion() {
    assert!((pct_to_decimal(5.0) - 0.05).abs() < 1e-15);
    assert_eq!(equal_weights(4), vec![0.25; 4]);
    assert!(equal_weights(0).is_empty());
  }
}
