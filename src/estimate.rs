//! Expected returns and sample covariance from historical prices.
//!
//! Returns are simple percentage changes between consecutive observations.
//! Both the mean vector and the covariance matrix are annualized with the
//! caller-supplied [`Frequency`]; there is no implicit daily assumption.

use log::{debug, warn};

use crate::error::{PortfolioError, Result, Stage};
use crate::history::PriceMatrix;
use crate::types::{Frequency, Symbol};

/// How the expected-return vector is derived from per-period returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ReturnMethod {
    /// Arithmetic mean of period returns × periods per year.
    #[default]
    Arithmetic,
    /// Geometric growth rate `(last / first)^(periods_per_year / n) - 1`.
    Compounded,
}

/// What to do with symbols that have fewer than two observations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DataPolicy {
    /// Abort the whole basket, naming every short symbol.
    #[default]
    Strict,
    /// Drop short symbols and list them in [`Estimate::excluded`].
    BestEffort,
}

/// Estimator parameters. The frequency has no default.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EstimatorConfig {
    pub frequency: Frequency,
    #[cfg_attr(feature = "serde", serde(default))]
    pub method: ReturnMethod,
    #[cfg_attr(feature = "serde", serde(default))]
    pub policy: DataPolicy,
}

impl EstimatorConfig {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            method: ReturnMethod::default(),
            policy: DataPolicy::default(),
        }
    }

    pub fn with_method(mut self, method: ReturnMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_policy(mut self, policy: DataPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Annualized expected returns (`mu`) and covariance (`S`).
///
/// `mu[i]` and `cov[i][*]` refer to `symbols[i]`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Estimate {
    pub symbols: Vec<Symbol>,
    pub mu: Vec<f64>,
    pub cov: Vec<Vec<f64>>,
    /// Symbols dropped under [`DataPolicy::BestEffort`].
    pub excluded: Vec<Symbol>,
}

impl Estimate {
    /// Wrap externally computed inputs (no validation; the optimizer checks).
    pub fn new(symbols: Vec<Symbol>, mu: Vec<f64>, cov: Vec<Vec<f64>>) -> Self {
        Self {
            symbols,
            mu,
            cov,
            excluded: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// `(symbol, mu)` pairs in basket order.
    pub fn expected_returns(&self) -> Vec<(Symbol, f64)> {
        self.symbols.iter().cloned().zip(self.mu.iter().copied()).collect()
    }

    /// Correlation matrix derived from the covariance.
    ///
    /// Entries involving a zero-variance symbol are `NaN` (off-diagonal)
    /// and the diagonal is always 1.
    pub fn correlation(&self) -> Vec<Vec<f64>> {
        let n = self.cov.len();
        let std: Vec<f64> = (0..n).map(|i| self.cov[i][i].max(0.0).sqrt()).collect();
        let mut corr = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                corr[i][j] = if i == j {
                    1.0
                } else if std[i] > 0.0 && std[j] > 0.0 {
                    (self.cov[i][j] / (std[i] * std[j])).clamp(-1.0, 1.0)
                } else {
                    f64::NAN
                };
            }
        }
        corr
    }
}

/// Simple percentage changes between consecutive prices.
///
/// The output has one element fewer than the input.
pub fn pct_change(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Estimate annualized `mu` and `S` from a price matrix.
///
/// Columns may be missing observations at their leading or trailing edges
/// but not in between. Covariances use the periods where both symbols have a
/// return.
pub fn estimate(prices: &PriceMatrix, config: &EstimatorConfig) -> Result<Estimate> {
    let periods_per_year = config.frequency.periods_per_year();
    if !periods_per_year.is_finite() || periods_per_year <= 0.0 {
        return Err(PortfolioError::invalid(
            Stage::Estimation,
            format!("periods per year must be positive, got {periods_per_year}"),
        ));
    }

    let mut short = Vec::new();
    let mut kept: Vec<(Symbol, Vec<Option<f64>>, f64, f64)> = Vec::new();

    for (col, sym) in prices.symbols().iter().enumerate() {
        let column = prices.column(col);
        check_edges_only(sym, &column)?;

        if prices.observations(col) < 2 {
            short.push(sym.clone());
            continue;
        }

        let first = column.iter().find_map(|p| *p).unwrap_or(f64::NAN);
        let last = column.iter().rev().find_map(|p| *p).unwrap_or(f64::NAN);
        kept.push((sym.clone(), period_returns(&column), first, last));
    }

    if !short.is_empty() {
        match config.policy {
            DataPolicy::Strict => {
                return Err(PortfolioError::InsufficientData {
                    stage: Stage::Estimation,
                    symbols: short,
                    reason: "fewer than 2 price observations".into(),
                });
            }
            DataPolicy::BestEffort => {
                warn!(
                    "excluding {} symbol(s) with fewer than 2 observations: {:?}",
                    short.len(),
                    short.iter().map(Symbol::as_str).collect::<Vec<_>>()
                );
            }
        }
    }

    if kept.len() < 2 {
        let mut symbols: Vec<Symbol> = kept.iter().map(|k| k.0.clone()).collect();
        symbols.extend(short.iter().cloned());
        return Err(PortfolioError::InsufficientData {
            stage: Stage::Estimation,
            symbols,
            reason: format!(
                "{} symbol(s) with enough data, at least 2 required",
                kept.len()
            ),
        });
    }

    let mu: Vec<f64> = kept
        .iter()
        .map(|(_, rets, first, last)| match config.method {
            ReturnMethod::Arithmetic => mean(rets.iter().flatten().copied()) * periods_per_year,
            ReturnMethod::Compounded => {
                let n = rets.iter().flatten().count() as f64;
                (last / first).powf(periods_per_year / n) - 1.0
            }
        })
        .collect();

    let n = kept.len();
    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let pairs: Vec<(f64, f64)> = kept[i]
                .1
                .iter()
                .zip(&kept[j].1)
                .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                .collect();
            if pairs.is_empty() {
                return Err(PortfolioError::InsufficientData {
                    stage: Stage::Estimation,
                    symbols: vec![kept[i].0.clone(), kept[j].0.clone()],
                    reason: "no overlapping return periods".into(),
                });
            }
            let v = sample_covariance(&pairs) * periods_per_year;
            cov[i][j] = v;
            cov[j][i] = v;
        }
    }

    debug!(
        "estimated {} symbols over {} dates (factor {periods_per_year})",
        n,
        prices.num_dates()
    );

    Ok(Estimate {
        symbols: kept.into_iter().map(|k| k.0).collect(),
        mu,
        cov,
        excluded: short,
    })
}

/// Reject interior gaps: once a column starts it must continue until it ends.
fn check_edges_only(symbol: &Symbol, column: &[Option<f64>]) -> Result<()> {
    let Some(first) = column.iter().position(Option::is_some) else {
        return Ok(());
    };
    let last = column.iter().rposition(Option::is_some).unwrap_or(first);
    if column[first..=last].iter().any(Option::is_none) {
        return Err(PortfolioError::invalid(
            Stage::Estimation,
            format!("{symbol}: missing observation inside its price history"),
        ));
    }
    Ok(())
}

/// Date-aligned returns: element `t` is the return from date `t` to `t + 1`.
fn period_returns(column: &[Option<f64>]) -> Vec<Option<f64>> {
    column
        .windows(2)
        .map(|w| match (w[0], w[1]) {
            (Some(prev), Some(cur)) => Some(cur / prev - 1.0),
            _ => None,
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

fn sample_covariance(pairs: &[(f64, f64)]) -> f64 {
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let sum: f64 = pairs
        .iter()
        .map(|(a, b)| (a - mean_a) * (b - mean_b))
        .sum();
    sum / (n - 1.0).max(1.0)
}
