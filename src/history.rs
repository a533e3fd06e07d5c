//! Price history: per-symbol series, the aligned price matrix, and the
//! provider seam through which the pipeline obtains data.
//!
//! Fetching prices (HTTP APIs, files, databases) is not this crate's job.
//! Anything that implements [`PriceProvider`] can feed the pipeline;
//! [`StaticPrices`] is an in-memory provider for tests and for callers that
//! already hold materialized data.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{PortfolioError, Result, Stage};
use crate::types::{DateRange, Symbol, Timestamp};

/// Closing prices of one symbol, ordered by strictly increasing timestamp.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriceSeries {
    symbol: Symbol,
    points: Vec<(Timestamp, f64)>,
}

impl PriceSeries {
    /// Build a series, validating ordering and prices.
    ///
    /// Timestamps must be strictly increasing and every price finite and
    /// positive.
    pub fn new(symbol: Symbol, points: Vec<(Timestamp, f64)>) -> Result<Self> {
        for pair in points.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(PortfolioError::invalid(
                    Stage::History,
                    format!(
                        "{symbol}: timestamps not strictly increasing ({} then {})",
                        pair[0].0, pair[1].0
                    ),
                ));
            }
        }
        if let Some(&(ts, price)) = points.iter().find(|(_, p)| !p.is_finite() || *p <= 0.0) {
            return Err(PortfolioError::invalid(
                Stage::History,
                format!("{symbol}: price {price} at {ts} is not a positive number"),
            ));
        }
        Ok(Self { symbol, points })
    }

    /// Convenience constructor for evenly spaced data (timestamps 0, 1, 2, ...).
    pub fn from_closes(symbol: Symbol, closes: &[f64]) -> Result<Self> {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &p)| (i as Timestamp, p))
            .collect();
        Self::new(symbol, points)
    }

    #[inline]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[inline]
    pub fn points(&self) -> &[(Timestamp, f64)] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Prices without timestamps.
    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|&(_, p)| p).collect()
    }

    /// Most recent price, if any.
    pub fn last_price(&self) -> Option<f64> {
        self.points.last().map(|&(_, p)| p)
    }

    /// Points falling inside `range`.
    pub fn within(&self, range: DateRange) -> PriceSeries {
        PriceSeries {
            symbol: self.symbol.clone(),
            points: self
                .points
                .iter()
                .copied()
                .filter(|&(ts, _)| range.contains(ts))
                .collect(),
        }
    }
}

/// Dates × symbols matrix of closing prices aligned on timestamp.
///
/// Column order is the order of the input series. A cell is `None` when the
/// symbol has no observation at that date.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceMatrix {
    symbols: Vec<Symbol>,
    dates: Vec<Timestamp>,
    rows: Vec<Vec<Option<f64>>>,
}

impl PriceMatrix {
    /// Align series on the union of their timestamps.
    pub fn align(series: &[PriceSeries]) -> Result<Self> {
        let mut seen: FxHashSet<&Symbol> = FxHashSet::default();
        for s in series {
            if !seen.insert(s.symbol()) {
                return Err(PortfolioError::invalid(
                    Stage::History,
                    format!("duplicate symbol {} in basket", s.symbol()),
                ));
            }
        }

        let mut dates: Vec<Timestamp> = series
            .iter()
            .flat_map(|s| s.points().iter().map(|&(ts, _)| ts))
            .collect();
        dates.sort_unstable();
        dates.dedup();

        let index: FxHashMap<Timestamp, usize> =
            dates.iter().enumerate().map(|(i, &ts)| (ts, i)).collect();

        let mut rows = vec![vec![None; series.len()]; dates.len()];
        for (col, s) in series.iter().enumerate() {
            for &(ts, price) in s.points() {
                rows[index[&ts]][col] = Some(price);
            }
        }

        Ok(Self {
            symbols: series.iter().map(|s| s.symbol().clone()).collect(),
            dates,
            rows,
        })
    }

    /// Build directly from rows (`rows[date][symbol]`), mainly for tests.
    pub fn from_rows(
        symbols: Vec<Symbol>,
        dates: Vec<Timestamp>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if dates.len() != rows.len() {
            return Err(PortfolioError::invalid(
                Stage::History,
                format!("{} dates but {} rows", dates.len(), rows.len()),
            ));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != symbols.len()) {
            return Err(PortfolioError::invalid(
                Stage::History,
                format!("row has {} cells, expected {}", row.len(), symbols.len()),
            ));
        }
        if dates.windows(2).any(|d| d[1] <= d[0]) {
            return Err(PortfolioError::invalid(
                Stage::History,
                "dates not strictly increasing",
            ));
        }
        Ok(Self {
            symbols,
            dates,
            rows,
        })
    }

    #[inline]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    #[inline]
    pub fn dates(&self) -> &[Timestamp] {
        &self.dates
    }

    #[inline]
    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }

    /// Column `col` as a date-indexed vector of optional prices.
    pub fn column(&self, col: usize) -> Vec<Option<f64>> {
        self.rows.iter().map(|row| row[col]).collect()
    }

    /// Number of observed prices for column `col`.
    pub fn observations(&self, col: usize) -> usize {
        self.rows.iter().filter(|row| row[col].is_some()).count()
    }

    /// Last observed price of each symbol (forward-filled to the final date).
    pub fn latest_prices(&self) -> Vec<(Symbol, Option<f64>)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(col, sym)| {
                let last = self.rows.iter().rev().find_map(|row| row[col]);
                (sym.clone(), last)
            })
            .collect()
    }
}

/// Error reported by a [`PriceProvider`] implementation.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Source of historical and latest prices.
///
/// Implementations may return fewer series than requested (partial data);
/// they must never return a series for a symbol that was not requested.
pub trait PriceProvider {
    /// Closing-price history for each symbol over `range`.
    fn history(
        &self,
        symbols: &[Symbol],
        range: DateRange,
    ) -> std::result::Result<Vec<PriceSeries>, ProviderError>;

    /// A single current price usable for allocation.
    fn latest_price(&self, symbol: &Symbol) -> std::result::Result<f64, ProviderError>;
}

/// In-memory provider holding fully materialized series.
///
/// The latest price of a symbol is the explicit override when one was set,
/// otherwise the last close of its full (unfiltered) series.
#[derive(Clone, Debug, Default)]
pub struct StaticPrices {
    series: FxHashMap<Symbol, PriceSeries>,
    latest: FxHashMap<Symbol, f64>,
}

impl StaticPrices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a symbol's series.
    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.symbol().clone(), series);
    }

    /// Override the latest price of a symbol.
    pub fn set_latest(&mut self, symbol: Symbol, price: f64) {
        self.latest.insert(symbol, price);
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.insert(series);
        self
    }
}

impl PriceProvider for StaticPrices {
    fn history(
        &self,
        symbols: &[Symbol],
        range: DateRange,
    ) -> std::result::Result<Vec<PriceSeries>, ProviderError> {
        Ok(symbols
            .iter()
            .filter_map(|sym| self.series.get(sym))
            .map(|s| s.within(range))
            .collect())
    }

    fn latest_price(&self, symbol: &Symbol) -> std::result::Result<f64, ProviderError> {
        if let Some(&p) = self.latest.get(symbol) {
            return Ok(p);
        }
        self.series
            .get(symbol)
            .and_then(PriceSeries::last_price)
            .ok_or_else(|| ProviderError::new(format!("no price for {symbol}")))
    }
}
