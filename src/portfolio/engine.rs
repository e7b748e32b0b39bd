//! # Portfolio Engine
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Optimize}(\hat\mu, \hat\Sigma_{\text{reg}}, r_f)
//! $$
//!
//! High-level API: estimate market inputs from price series, run an
//! objective, sample the efficient frontier.

use anyhow::ensure;
use anyhow::Result;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use super::data::align_price_series;
use super::data::align_return_series;
use super::data::correlation_from_covariance;
use super::data::covariance_matrix;
use super::data::daily_returns;
use super::data::expected_returns;
use super::data::regularize_covariance;
use super::frontier::efficient_frontier;
use super::frontier::FrontierConfig;
use super::metrics::benchmark_returns;
use super::metrics::beta;
use super::metrics::portfolio_daily_returns;
use super::metrics::portfolio_metrics;
use super::optimizers::optimize_with_objective;
use super::qp::ClarabelBackend;
use super::qp::QpBackend;
use super::sortino::SortinoConfig;
use super::types::pct_to_decimal;
use super::types::EfficientFrontierPoint;
use super::types::OptimizationObjective;
use super::types::PortfolioMetrics;
use super::types::PortfolioWeights;
use super::types::PriceSeries;
use super::types::ReturnsMatrix;
use crate::linalg::Matrix;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug)]
pub struct PortfolioEngineConfig {
  /// Objective used by [`PortfolioEngine::optimize`].
  pub objective: OptimizationObjective,
  /// Annual risk-free rate in percent (`5.0` means 5%).
  pub risk_free_pct: f64,
  /// Minimum diagonal ridge added during covariance regularization.
  pub ridge_lambda: f64,
  pub frontier: FrontierConfig,
  pub sortino: SortinoConfig,
  /// Seed of the Sortino multi-start; `None` draws from entropy.
  pub seed: Option<u64>,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      objective: OptimizationObjective::MinVariance,
      risk_free_pct: 0.0,
      ridge_lambda: 0.0,
      frontier: FrontierConfig::default(),
      sortino: SortinoConfig::default(),
      seed: None,
    }
  }
}

/// Estimated optimizer inputs on one aligned calendar.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketEstimate {
  pub symbols: Vec<String>,
  /// Return dates; empty when built from undated closes.
  pub dates: Vec<NaiveDate>,
  /// `returns[asset][t]` daily simple returns.
  pub returns: Vec<Vec<f64>>,
  /// Annualized expected returns.
  pub expected_returns: Vec<f64>,
  /// Regularized annualized covariance.
  pub covariance: Matrix,
  pub correlation: Matrix,
}

/// Single entry-point engine for portfolio optimization.
#[derive(Clone, Debug)]
pub struct PortfolioEngine<B: QpBackend = ClarabelBackend> {
  config: PortfolioEngineConfig,
  backend: B,
}

impl PortfolioEngine {
  /// Construct an engine with the Clarabel QP backend.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self::with_backend(config, ClarabelBackend::default())
  }
}

impl<B: QpBackend> PortfolioEngine<B> {
  /// Construct an engine with an explicit QP backend.
  pub fn with_backend(config: PortfolioEngineConfig, backend: B) -> Self {
    Self { config, backend }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  /// Align `series` on their common dates and estimate μ and Σ.
  pub fn estimate(&self, series: &[PriceSeries]) -> Result<MarketEstimate> {
    self.estimate_returns(align_price_series(series)?)
  }

  /// Estimate from bare close arrays, aligned on their most recent
  /// observations.
  pub fn estimate_from_closes(&self, symbols: &[String], closes: &[Vec<f64>]) -> Result<MarketEstimate> {
    ensure!(
      symbols.len() == closes.len(),
      "estimate: {} symbols but {} close series",
      symbols.len(),
      closes.len()
    );
    let returns: Vec<Vec<f64>> = closes.iter().map(|c| daily_returns(c)).collect();
    self.estimate_returns(ReturnsMatrix {
      symbols: symbols.to_vec(),
      dates: Vec::new(),
      returns: align_return_series(&returns),
    })
  }

  fn estimate_returns(&self, matrix: ReturnsMatrix) -> Result<MarketEstimate> {
    ensure!(matrix.n_assets() > 0, "estimate: no assets supplied");
    let raw = covariance_matrix(&matrix.returns)?;
    let covariance = regularize_covariance(&raw, self.config.ridge_lambda)?;
    let correlation = correlation_from_covariance(&covariance);
    let mu = expected_returns(&matrix.returns);

    debug!(
      assets = matrix.n_assets(),
      periods = matrix.n_periods(),
      "market estimate ready"
    );

    Ok(MarketEstimate {
      symbols: matrix.symbols,
      dates: matrix.dates,
      returns: matrix.returns,
      expected_returns: mu,
      covariance,
      correlation,
    })
  }

  /// Optimize `series` with the configured objective.
  pub fn optimize(&self, series: &[PriceSeries]) -> Result<PortfolioMetrics> {
    let estimate = self.estimate(series)?;
    self.optimize_objective(self.config.objective, &estimate)
  }

  /// Run `objective` on a prepared estimate and report its metrics.
  pub fn optimize_objective(
    &self,
    objective: OptimizationObjective,
    estimate: &MarketEstimate,
  ) -> Result<PortfolioMetrics> {
    let mut rng = self.rng();
    let w = optimize_with_objective(
      objective,
      &estimate.expected_returns,
      &estimate.covariance,
      &estimate.returns,
      self.config.risk_free_pct,
      &self.config.sortino,
      &self.backend,
      &mut rng,
    )?;
    let weights = PortfolioWeights::new(estimate.symbols.clone(), w)?;

    let metrics = portfolio_metrics(
      &weights,
      &estimate.expected_returns,
      &estimate.covariance,
      &estimate.returns,
      pct_to_decimal(self.config.risk_free_pct),
    )?;
    debug!(
      %objective,
      expected_return = metrics.expected_return,
      volatility = metrics.volatility,
      sharpe = metrics.sharpe_ratio,
      "portfolio optimized"
    );
    Ok(metrics)
  }

  /// Every objective on the same estimate, in reporting order.
  pub fn optimize_all(
    &self,
    estimate: &MarketEstimate,
  ) -> Result<Vec<(OptimizationObjective, PortfolioMetrics)>> {
    OptimizationObjective::all()
      .into_iter()
      .map(|objective| Ok((objective, self.optimize_objective(objective, estimate)?)))
      .collect()
  }

  /// Sampled efficient frontier of `series`.
  pub fn efficient_frontier(&self, series: &[PriceSeries]) -> Result<Vec<EfficientFrontierPoint>> {
    let estimate = self.estimate(series)?;
    self.frontier_from_estimate(&estimate)
  }

  pub fn frontier_from_estimate(&self, estimate: &MarketEstimate) -> Result<Vec<EfficientFrontierPoint>> {
    efficient_frontier(
      &estimate.symbols,
      &estimate.expected_returns,
      &estimate.covariance,
      &self.config.frontier,
      &self.backend,
    )
  }

  /// Beta of a fixed allocation against `benchmark` over the estimate dates.
  pub fn beta(
    &self,
    estimate: &MarketEstimate,
    weights: &PortfolioWeights,
    benchmark: &PriceSeries,
  ) -> Option<f64> {
    let daily = portfolio_daily_returns(weights.as_slice(), &estimate.returns);
    let dated: Vec<(NaiveDate, f64)> = estimate.dates.iter().copied().zip(daily).collect();
    beta(&dated, &benchmark_returns(benchmark))
  }

  fn rng(&self) -> StdRng {
    match self.config.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    }
  }
}
