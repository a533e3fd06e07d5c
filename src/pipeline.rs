//! End-to-end portfolio construction for one request.
//!
//! history → estimate → optimize → clean → allocate, with optional
//! per-symbol performance metrics. Each request reads one fresh snapshot
//! from the [`PriceProvider`]; nothing is cached between calls.

use log::{info, warn};
use rustc_hash::FxHashSet;

use crate::allocation::{Allocation, AllocatorConfig, allocate};
use crate::clean::{DEFAULT_THRESHOLD, clean_weights};
use crate::error::{PortfolioError, Result, Stage};
use crate::estimate::{DataPolicy, Estimate, EstimatorConfig, estimate};
use crate::history::{PriceMatrix, PriceProvider, PriceSeries};
use crate::optimize::{EfficientFrontier, OptimizerConfig, PortfolioPerformance};
use crate::performance::{PerformanceRecord, performance_table};
use crate::types::{DateRange, Frequency, Symbol, Weights};

/// Which efficient portfolio to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Target {
    #[default]
    MaxSharpe,
    MinVolatility,
}

/// Everything needed to build one portfolio.
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioRequest {
    pub symbols: Vec<Symbol>,
    pub range: DateRange,
    pub budget: f64,
    /// Weights below this are dropped before allocation.
    pub threshold: f64,
    pub target: Target,
    pub estimator: EstimatorConfig,
    pub optimizer: OptimizerConfig,
    pub allocator: AllocatorConfig,
    /// Also compute a [`PerformanceRecord`] per symbol.
    pub include_metrics: bool,
}

impl PortfolioRequest {
    /// Request with default optimizer and allocator settings over all
    /// available history.
    pub fn new(symbols: Vec<Symbol>, frequency: Frequency, budget: f64) -> Self {
        Self {
            symbols,
            range: DateRange::all(),
            budget,
            threshold: DEFAULT_THRESHOLD,
            target: Target::default(),
            estimator: EstimatorConfig::new(frequency),
            optimizer: OptimizerConfig::default(),
            allocator: AllocatorConfig::default(),
            include_metrics: false,
        }
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.optimizer.risk_free_rate = rate;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_policy(mut self, policy: DataPolicy) -> Self {
        self.estimator.policy = policy;
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_metrics(mut self, include: bool) -> Self {
        self.include_metrics = include;
        self
    }
}

/// Result of a successful request.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortfolioReport {
    /// `mu`, `S` and the symbols dropped for lack of data.
    pub estimate: Estimate,
    /// Optimizer output before cleaning.
    pub raw_weights: Weights,
    pub weights: Weights,
    /// Expected performance of the cleaned weights.
    pub performance: PortfolioPerformance,
    pub allocation: Allocation,
    pub metrics: Option<Vec<PerformanceRecord>>,
}

impl PortfolioReport {
    #[inline]
    pub fn excluded(&self) -> &[Symbol] {
        &self.estimate.excluded
    }

    #[inline]
    pub fn leftover(&self) -> f64 {
        self.allocation.leftover
    }
}

#[cfg(feature = "json")]
impl PortfolioReport {
    /// Pretty-printed JSON of the whole report.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Build one portfolio.
pub fn build_portfolio(request: &PortfolioRequest, provider: &dyn PriceProvider) -> Result<PortfolioReport> {
    let series = fetch_history(request, provider)?;
    let (series, missing) = order_series(request, series)?;

    if !missing.is_empty() {
        match request.estimator.policy {
            DataPolicy::Strict => {
                return Err(PortfolioError::InsufficientData {
                    stage: Stage::History,
                    symbols: missing,
                    reason: "no price history returned".into(),
                });
            }
            DataPolicy::BestEffort => {
                warn!("no price history for {} symbol(s), excluding", missing.len());
            }
        }
    }

    let matrix = PriceMatrix::align(&series)?;
    let mut est = estimate(&matrix, &request.estimator)?;
    // Keep `excluded` in basket order.
    est.excluded.extend(missing);
    est.excluded
        .sort_by_key(|s| request.symbols.iter().position(|r| r == s));

    let ef = EfficientFrontier::new(&est, request.optimizer)?;
    let raw_weights = match request.target {
        Target::MaxSharpe => ef.max_sharpe()?,
        Target::MinVolatility => ef.min_volatility()?,
    };
    let weights = clean_weights(&raw_weights, request.threshold)?;
    let performance = ef.portfolio_performance(&weights)?;

    let prices = latest_prices(&weights, provider)?;
    let allocation = allocate(&weights, &prices, request.budget, &request.allocator)?;

    let metrics = if request.include_metrics {
        let kept: Vec<PriceSeries> = series
            .into_iter()
            .filter(|s| est.symbols.contains(s.symbol()))
            .collect();
        Some(performance_table(
            &kept,
            request.estimator.frequency.periods_per_year(),
        )?)
    } else {
        None
    };

    info!(
        "built portfolio of {} symbol(s): return {:.2}%, volatility {:.2}%, leftover {:.2}",
        weights.values().iter().filter(|w| **w > 0.0).count(),
        performance.expected_return * 100.0,
        performance.volatility * 100.0,
        allocation.leftover
    );

    Ok(PortfolioReport {
        estimate: est,
        raw_weights,
        weights,
        performance,
        allocation,
        metrics,
    })
}

/// Build several independent portfolios, in parallel with the `parallel`
/// feature. Results are in request order.
#[cfg(feature = "parallel")]
pub fn build_portfolios<P>(requests: &[PortfolioRequest], provider: &P) -> Vec<Result<PortfolioReport>>
where
    P: PriceProvider + Sync,
{
    use rayon::prelude::*;

    requests
        .par_iter()
        .map(|r| build_portfolio(r, provider))
        .collect()
}

/// Build several independent portfolios. Results are in request order.
#[cfg(not(feature = "parallel"))]
pub fn build_portfolios<P>(requests: &[PortfolioRequest], provider: &P) -> Vec<Result<PortfolioReport>>
where
    P: PriceProvider + Sync,
{
    requests.iter().map(|r| build_portfolio(r, provider)).collect()
}

fn fetch_history(request: &PortfolioRequest, provider: &dyn PriceProvider) -> Result<Vec<PriceSeries>> {
    if request.symbols.is_empty() {
        return Err(PortfolioError::invalid(Stage::History, "empty basket"));
    }
    let mut seen = FxHashSet::default();
    for s in &request.symbols {
        if !seen.insert(s) {
            return Err(PortfolioError::invalid(
                Stage::History,
                format!("{s} appears more than once in the basket"),
            ));
        }
    }
    if request.range.start > request.range.end {
        return Err(PortfolioError::invalid(
            Stage::History,
            format!(
                "date range starts after it ends ({} > {})",
                request.range.start, request.range.end
            ),
        ));
    }

    provider
        .history(&request.symbols, request.range)
        .map_err(|e| PortfolioError::Provider {
            stage: Stage::History,
            message: e.message,
        })
}

/// Put the provider's series in basket order and list requested symbols it
/// did not return. A series for an unrequested symbol is an error.
fn order_series(
    request: &PortfolioRequest,
    series: Vec<PriceSeries>,
) -> Result<(Vec<PriceSeries>, Vec<Symbol>)> {
    let mut slots: Vec<Option<PriceSeries>> = vec![None; request.symbols.len()];
    for s in series {
        let Some(idx) = request.symbols.iter().position(|r| r == s.symbol()) else {
            return Err(PortfolioError::invalid(
                Stage::History,
                format!("provider returned unrequested symbol {}", s.symbol()),
            ));
        };
        if slots[idx].is_some() {
            return Err(PortfolioError::invalid(
                Stage::History,
                format!("provider returned {} twice", s.symbol()),
            ));
        }
        slots[idx] = Some(s);
    }

    let mut ordered = Vec::with_capacity(slots.len());
    let mut missing = Vec::new();
    for (slot, sym) in slots.into_iter().zip(&request.symbols) {
        match slot {
            Some(s) => ordered.push(s),
            None => missing.push(sym.clone()),
        }
    }
    Ok((ordered, missing))
}

/// Latest prices of every symbol with a positive weight.
fn latest_prices(weights: &Weights, provider: &dyn PriceProvider) -> Result<Vec<(Symbol, f64)>> {
    weights
        .iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(s, _)| {
            provider
                .latest_price(s)
                .map(|p| (s.clone(), p))
                .map_err(|e| PortfolioError::Provider {
                    stage: Stage::Allocation,
                    message: e.message,
                })
        })
        .collect()
}
