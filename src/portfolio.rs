//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Long-only mean-variance optimization: input estimation, QP-backed
//! optimizers, Sortino search, efficient frontier and performance metrics.

pub mod data;
pub mod engine;
pub mod frontier;
pub mod metrics;
pub mod optimizers;
pub mod qp;
pub mod sortino;
pub mod types;

pub use data::align_price_series;
pub use data::align_return_series;
pub use data::correlation_from_covariance;
pub use data::covariance_matrix;
pub use data::daily_returns;
pub use data::expected_returns;
pub use data::regularize_covariance;
pub use engine::MarketEstimate;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use frontier::efficient_frontier;
pub use frontier::FrontierConfig;
pub use metrics::beta;
pub use metrics::cumulative_time_weighted_return;
pub use metrics::downside_deviation;
pub use metrics::portfolio_metrics;
pub use metrics::sharpe_ratio;
pub use metrics::sortino_ratio;
pub use metrics::time_weighted_returns;
pub use optimizers::optimize_max_return;
pub use optimizers::optimize_max_sharpe;
pub use optimizers::optimize_min_variance;
pub use optimizers::optimize_with_objective;
pub use qp::ClarabelBackend;
pub use qp::QpBackend;
pub use qp::QpOutcome;
pub use qp::QpProblem;
pub use sortino::optimize_max_sortino;
pub use sortino::project_simplex;
pub use sortino::SortinoConfig;
pub use types::DailyPortfolioData;
pub use types::EfficientFrontierPoint;
pub use types::OptimizationObjective;
pub use types::PortfolioMetrics;
pub use types::PortfolioReturnPoint;
pub use types::PortfolioWeights;
pub use types::PriceSeries;
pub use types::ReturnsMatrix;
