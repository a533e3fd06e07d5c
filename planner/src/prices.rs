//! JSON price file loading.
//!
//! The file maps each symbol to its daily closes, plus an optional `latest`
//! map overriding the price used for allocation:
//!
//! ```json
//! {
//!   "AAPL": [{ "date": "2024-01-02", "close": 185.64 }, ...],
//!   "MSFT": [{ "date": "2024-01-02", "close": 370.87 }, ...],
//!   "latest": { "AAPL": 190.10 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use log::debug;
use serde::Deserialize;

use nanofolio::{
    DateRange, PriceProvider, PriceSeries, ProviderError, StaticPrices, Symbol, Timestamp,
};

use crate::error::{Error, Result};

/// One daily close.
#[derive(Debug, Clone, Deserialize)]
pub struct Bar {
    pub date: String,
    pub close: f64,
}

/// Raw contents of a price file.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceFile {
    #[serde(default)]
    pub latest: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub series: BTreeMap<String, Vec<Bar>>,
}

impl PriceFile {
    /// Load and validate a price file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::PricesRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let file: PriceFile = serde_json::from_str(json)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        if self.series.is_empty() {
            return Err(Error::Prices("no price series in file".into()));
        }
        if let Some(sym) = self.series.keys().find(|s| s.trim().is_empty()) {
            return Err(Error::Prices(format!("invalid symbol '{sym}'")));
        }
        for sym in self.latest.keys() {
            if !self.series.contains_key(sym) {
                return Err(Error::Prices(format!(
                    "latest price given for {sym}, which has no series"
                )));
            }
        }
        Ok(())
    }

    /// Symbols in the file, sorted.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.series.keys().map(|s| Symbol::new(s)).collect()
    }

    /// Convert into a provider, parsing dates and validating each series.
    pub fn into_provider(self) -> Result<FilePrices> {
        let symbols = self.symbols();
        let mut inner = StaticPrices::new();

        for (sym, bars) in self.series {
            let symbol = Symbol::new(&sym);
            let mut points = Vec::with_capacity(bars.len());
            for bar in &bars {
                points.push((parse_date(&bar.date)?, bar.close));
            }
            points.sort_by_key(|&(ts, _)| ts);
            debug!("{symbol}: {} closes", points.len());
            inner.insert(PriceSeries::new(symbol, points)?);
        }
        for (sym, price) in self.latest {
            if !price.is_finite() || price <= 0.0 {
                return Err(Error::Prices(format!(
                    "latest price for {sym} must be positive, got {price}"
                )));
            }
            inner.set_latest(Symbol::new(&sym), price);
        }

        Ok(FilePrices { symbols, inner })
    }
}

/// Price provider backed by a loaded price file.
#[derive(Debug, Clone)]
pub struct FilePrices {
    symbols: Vec<Symbol>,
    inner: StaticPrices,
}

impl FilePrices {
    pub fn load(path: &Path) -> Result<Self> {
        PriceFile::load(path)?.into_provider()
    }

    /// Every symbol in the file, sorted.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Series for `symbols` over `range`, in the order given.
    pub fn series(&self, symbols: &[Symbol], range: DateRange) -> Result<Vec<PriceSeries>> {
        self.inner
            .history(symbols, range)
            .map_err(|e| Error::Prices(e.message))
    }
}

impl PriceProvider for FilePrices {
    fn history(
        &self,
        symbols: &[Symbol],
        range: DateRange,
    ) -> std::result::Result<Vec<PriceSeries>, ProviderError> {
        self.inner.history(symbols, range)
    }

    fn latest_price(&self, symbol: &Symbol) -> std::result::Result<f64, ProviderError> {
        self.inner.latest_price(symbol)
    }
}

/// Parse `YYYY-MM-DD` into milliseconds since the epoch (UTC midnight).
pub fn parse_date(value: &str) -> Result<Timestamp> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| Error::Date {
        value: value.to_string(),
        source: e,
    })?;
    Ok(date_to_millis(date))
}

/// UTC midnight of `date` in milliseconds since the epoch.
pub fn date_to_millis(date: NaiveDate) -> Timestamp {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Inverse of [`date_to_millis`], for display.
pub fn millis_to_date(ts: Timestamp) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp_millis(ts).map(|dt| dt.date_naive())
}
