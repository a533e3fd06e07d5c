//! Core types: Symbol, Timestamp, DateRange, Frequency, Weights

use std::fmt;

/// Opaque identifier of a tradable instrument (e.g. `"AAPL"`).
///
/// Symbols are compared by their exact text. Baskets keep symbols in
/// insertion order; every output vector is indexed in that same order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Symbol(Box<str>);

impl Symbol {
    pub fn new(s: &str) -> Self {
        Symbol(s.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Inclusive range of timestamps requested from a price provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DateRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl DateRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Range covering every representable timestamp.
    pub fn all() -> Self {
        Self {
            start: Timestamp::MIN,
            end: Timestamp::MAX,
        }
    }

    #[inline]
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Sampling frequency of a price series, used to annualize statistics.
///
/// There is deliberately no `Default`: callers must state how often the
/// data was sampled.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Frequency {
    /// 252 trading days per year
    Daily,
    /// 52 periods per year
    Weekly,
    /// 12 periods per year
    Monthly,
    /// Explicit periods-per-year factor
    Custom(f64),
}

impl Frequency {
    pub fn periods_per_year(self) -> f64 {
        match self {
            Frequency::Daily => 252.0,
            Frequency::Weekly => 52.0,
            Frequency::Monthly => 12.0,
            Frequency::Custom(p) => p,
        }
    }
}

/// Fractional portfolio weights in basket order.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weights {
    symbols: Vec<Symbol>,
    values: Vec<f64>,
}

impl Weights {
    /// Pair symbols with weights. Panics in debug builds on length mismatch.
    pub fn new(symbols: Vec<Symbol>, values: Vec<f64>) -> Self {
        debug_assert_eq!(symbols.len(), values.len(), "symbols/weights length mismatch");
        Self { symbols, values }
    }

    /// Equal weighting of `symbols`.
    pub fn equal(symbols: Vec<Symbol>) -> Self {
        let n = symbols.len();
        let values = vec![1.0 / n as f64; n];
        Self { symbols, values }
    }

    #[inline]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Weight of `symbol`, if it is in the basket.
    pub fn get(&self, symbol: &Symbol) -> Option<f64> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| self.values[i])
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// `(symbol, weight)` pairs in basket order.
    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, f64)> {
        self.symbols.iter().zip(self.values.iter().copied())
    }
}
