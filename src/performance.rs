//! Per-symbol historical performance metrics.
//!
//! These describe each instrument's own price history and are independent
//! of the optimizer. All returns are simple (not log) returns; annualization
//! uses the caller's `periods_per_year`.

use std::fmt;

use crate::error::{PortfolioError, Result, Stage};
use crate::estimate::pct_change;
use crate::history::PriceSeries;
use crate::types::Symbol;

/// Performance of one price series.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerformanceRecord {
    pub symbol: Symbol,
    /// Final cumulative return (e.g. 0.15 = 15%)
    pub total_return: f64,
    /// Annualized sample standard deviation of period returns
    pub volatility: f64,
    /// Worst drawdown, ≤ 0 (e.g. -0.20 = 20% below the running peak)
    pub max_drawdown: f64,
    /// Mean of the cumulative return series × periods per year
    pub average_annual_return: f64,
    /// `average_annual_return / volatility`; `None` when volatility is 0
    pub sharpe: Option<f64>,
    /// Period returns
    pub returns: Vec<f64>,
    /// `Π(1 + r) − 1` after each period
    pub cumulative: Vec<f64>,
    /// `(cumulative − running max) / (1 + running max)` after each period
    pub drawdown: Vec<f64>,
}

impl PerformanceRecord {
    #[inline]
    pub fn num_periods(&self) -> usize {
        self.returns.len()
    }
}

impl fmt::Display for PerformanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Performance: {}", self.symbol)?;
        writeln!(f, "  Total return:    {:>8.2}%", self.total_return * 100.0)?;
        writeln!(f, "  Avg annual:      {:>8.2}%", self.average_annual_return * 100.0)?;
        writeln!(f, "  Volatility:      {:>8.2}%", self.volatility * 100.0)?;
        match self.sharpe {
            Some(s) => writeln!(f, "  Sharpe:          {s:>8.2}")?,
            None => writeln!(f, "  Sharpe:               n/a")?,
        }
        writeln!(f, "  Max drawdown:    {:>8.2}%", self.max_drawdown * 100.0)?;
        writeln!(f, "  Periods:         {:>8}", self.num_periods())
    }
}

/// Compute the performance record of one series.
///
/// Fails with `InsufficientData` for fewer than two prices and with
/// `InvalidInput` for a non-positive `periods_per_year`.
pub fn performance_metrics(series: &PriceSeries, periods_per_year: f64) -> Result<PerformanceRecord> {
    if !periods_per_year.is_finite() || periods_per_year <= 0.0 {
        return Err(PortfolioError::invalid(
            Stage::Performance,
            format!("periods per year must be positive, got {periods_per_year}"),
        ));
    }
    if series.len() < 2 {
        return Err(PortfolioError::InsufficientData {
            stage: Stage::Performance,
            symbols: vec![series.symbol().clone()],
            reason: format!("{} price point(s), at least 2 required", series.len()),
        });
    }

    let returns = pct_change(&series.closes());
    let n = returns.len();

    let mean = returns.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        returns.iter().map(|&r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    let volatility = variance.sqrt() * periods_per_year.sqrt();

    let cumulative: Vec<f64> = returns
        .iter()
        .scan(1.0_f64, |growth, &r| {
            *growth *= 1.0 + r;
            Some(*growth - 1.0)
        })
        .collect();

    let drawdown: Vec<f64> = cumulative
        .iter()
        .scan(f64::NEG_INFINITY, |peak, &c| {
            *peak = peak.max(c);
            Some((c - *peak) / (1.0 + *peak))
        })
        .collect();

    let total_return = cumulative.last().copied().unwrap_or(0.0);
    let max_drawdown = drawdown.iter().copied().fold(0.0_f64, f64::min);
    let average_annual_return = cumulative.iter().sum::<f64>() / n as f64 * periods_per_year;
    let sharpe = (volatility > 0.0).then(|| average_annual_return / volatility);

    Ok(PerformanceRecord {
        symbol: series.symbol().clone(),
        total_return,
        volatility,
        max_drawdown,
        average_annual_return,
        sharpe,
        returns,
        cumulative,
        drawdown,
    })
}

/// One record per series, in input order.
pub fn performance_table(series: &[PriceSeries], periods_per_year: f64) -> Result<Vec<PerformanceRecord>> {
    series
        .iter()
        .map(|s| performance_metrics(s, periods_per_year))
        .collect()
}

/// Simple moving average over `window` prices.
///
/// The first `window - 1` entries are NaN. A zero window or one longer than
/// the input yields all NaN.
pub fn moving_average(prices: &[f64], window: usize) -> Vec<f64> {
    let n = prices.len();
    let mut out = vec![f64::NAN; n];
    if n < window || window == 0 {
        return out;
    }

    let mut window_sum: f64 = prices[..window].iter().sum();
    out[window - 1] = window_sum / window as f64;

    for i in window..n {
        window_sum += prices[i] - prices[i - window];
        out[i] = window_sum / window as f64;
    }
    out
}
