//! # nanofolio
//!
//! Mean-variance portfolio construction: from price histories to a
//! whole-share order for a fixed cash budget.
//!
//! ## Features
//!
//! - **Estimation**: annualized expected returns and sample covariance, with
//!   an explicit sampling [`Frequency`]
//! - **Optimization**: long-only max-Sharpe and min-volatility portfolios
//!   through a pluggable [`Solver`]
//! - **Cleaning**: drop negligible weights and renormalize
//! - **Discrete allocation**: greedy integer-share allocation that leaves less
//!   cash than the price of any wanted share
//! - **Metrics**: per-symbol return, volatility, drawdown and Sharpe ratio
//!
//! ## Quick Start
//!
//! ```
//! use nanofolio::{
//!     Frequency, PortfolioRequest, PriceSeries, StaticPrices, Symbol, build_portfolio,
//! };
//!
//! let prices = StaticPrices::new()
//!     .with_series(PriceSeries::from_closes(
//!         Symbol::new("AAA"),
//!         &[100.0, 102.0, 101.0, 105.0, 107.0, 106.0],
//!     ).unwrap())
//!     .with_series(PriceSeries::from_closes(
//!         Symbol::new("BBB"),
//!         &[50.0, 49.5, 50.5, 51.0, 50.8, 51.5],
//!     ).unwrap());
//!
//! let request = PortfolioRequest::new(
//!     vec![Symbol::new("AAA"), Symbol::new("BBB")],
//!     Frequency::Daily,
//!     10_000.0,
//! );
//! let report = build_portfolio(&request, &prices).unwrap();
//!
//! assert!((report.weights.sum() - 1.0).abs() < 1e-6);
//! let alloc = &report.allocation;
//! assert!((alloc.invested() + alloc.leftover - 10_000.0).abs() < 1e-6);
//! ```
//!
//! ## Step by Step
//!
//! Each stage is usable on its own:
//!
//! ```
//! use nanofolio::{
//!     AllocatorConfig, EfficientFrontier, Estimate, OptimizerConfig, Symbol,
//!     allocate, clean_weights,
//! };
//!
//! let est = Estimate::new(
//!     vec![Symbol::new("A"), Symbol::new("B")],
//!     vec![0.10, 0.06],
//!     vec![vec![0.04, 0.002], vec![0.002, 0.01]],
//! );
//! let ef = EfficientFrontier::new(&est, OptimizerConfig::default()).unwrap();
//! let weights = clean_weights(&ef.max_sharpe().unwrap(), 1e-4).unwrap();
//!
//! let prices = vec![(Symbol::new("A"), 100.0), (Symbol::new("B"), 30.0)];
//! let alloc = allocate(&weights, &prices, 1_000.0, &AllocatorConfig::default()).unwrap();
//! assert!(alloc.leftover < 30.0);
//! ```
//!
//! ## Allocation Example
//!
//! | Symbol | Weight | Price | Shares |
//! |--------|--------|-------|--------|
//! | A      | 0.6    | 100   | 6      |
//! | B      | 0.4    | 30    | 13     |
//!
//! With a budget of 1000 the leftover is 10, which buys neither symbol.

pub mod allocation;
pub mod clean;
mod error;
pub mod estimate;
pub mod history;
pub mod optimize;
pub mod performance;
pub mod pipeline;
pub mod solver;
mod types;

// Re-export public API
pub use allocation::{Allocation, AllocatorConfig, Holding, allocate};
pub use clean::{DEFAULT_THRESHOLD, clean_weights};
pub use error::{PortfolioError, Result, Stage};
pub use estimate::{DataPolicy, Estimate, EstimatorConfig, ReturnMethod, estimate, pct_change};
pub use history::{PriceMatrix, PriceProvider, PriceSeries, ProviderError, StaticPrices};
pub use optimize::{EfficientFrontier, OptimizerConfig, PortfolioPerformance};
pub use performance::{PerformanceRecord, moving_average, performance_metrics, performance_table};
pub use pipeline::{PortfolioReport, PortfolioRequest, Target, build_portfolio, build_portfolios};
pub use solver::{
    ActiveSet, Constraints, LinearConstraint, Objective, ProjectedGradient, QuadraticProgram,
    SolveError, SolveOutcome, Solver,
};
pub use types::{DateRange, Frequency, Symbol, Timestamp, Weights};
