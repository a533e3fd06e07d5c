//! Discrete allocation: turn fractional weights into whole-share orders.
//!
//! The allocator is greedy, not an exact integer program:
//!
//! 1. Every weighted symbol gets `floor(weight × budget / price)` shares.
//! 2. Largest-remainder pass: while cash remains, buy one extra share of the
//!    affordable symbol with the largest fractional remainder. Each symbol
//!    receives at most one extra share here.
//! 3. Residual sweep (optional, on by default): keep buying one share of the
//!    affordable symbol that is furthest below its target value until no
//!    weighted symbol fits in the leftover cash.
//!
//! Ties go to the cheaper symbol, then to basket order.

use std::fmt;

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::error::{PortfolioError, Result, Stage};
use crate::types::{Symbol, Weights};

/// Allocator options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AllocatorConfig {
    /// Spend remaining cash after the largest-remainder pass.
    pub residual_sweep: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            residual_sweep: true,
        }
    }
}

/// Share count of one symbol at the price it was bought at.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Holding {
    pub symbol: Symbol,
    pub shares: u64,
    pub price: f64,
}

impl Holding {
    #[inline]
    pub fn value(&self) -> f64 {
        self.shares as f64 * self.price
    }
}

/// Integer-share order plus unspent cash.
///
/// `invested() + leftover == budget` up to floating-point rounding.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Allocation {
    /// One entry per basket symbol, in basket order (zero-weight symbols
    /// appear with 0 shares).
    pub holdings: Vec<Holding>,
    pub leftover: f64,
    pub budget: f64,
    /// Set to `BudgetTooSmall` when not even one share was affordable.
    #[cfg_attr(feature = "serde", serde(default))]
    pub warning: Option<PortfolioError>,
}

impl Allocation {
    /// Shares held of `symbol` (0 when absent).
    pub fn shares(&self, symbol: &Symbol) -> u64 {
        self.holdings
            .iter()
            .find(|h| &h.symbol == symbol)
            .map_or(0, |h| h.shares)
    }

    /// Cash spent on shares.
    pub fn invested(&self) -> f64 {
        self.holdings.iter().map(Holding::value).sum()
    }

    /// Holdings with at least one share.
    pub fn positions(&self) -> impl Iterator<Item = &Holding> {
        self.holdings.iter().filter(|h| h.shares > 0)
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} {:>8} {:>12} {:>14}", "Symbol", "Shares", "Price", "Value")?;
        for h in self.positions() {
            writeln!(
                f,
                "{:<10} {:>8} {:>12.2} {:>14.2}",
                h.symbol.as_str(),
                h.shares,
                h.price,
                h.value()
            )?;
        }
        writeln!(f, "Invested: {:>12.2}", self.invested())?;
        writeln!(f, "Leftover: {:>12.2}", self.leftover)?;
        if let Some(w) = &self.warning {
            writeln!(f, "Warning:  {w}")?;
        }
        Ok(())
    }
}

struct Slot {
    index: usize,
    weight: f64,
    price: f64,
    shares: u64,
    remainder: f64,
}

/// Allocate `budget` across `weights` at `prices`.
///
/// `prices` must contain a positive price for every symbol with a positive
/// weight; prices for other symbols are ignored.
pub fn allocate(
    weights: &Weights,
    prices: &[(Symbol, f64)],
    budget: f64,
    config: &AllocatorConfig,
) -> Result<Allocation> {
    if !budget.is_finite() || budget <= 0.0 {
        return Err(PortfolioError::invalid(
            Stage::Allocation,
            format!("budget must be positive, got {budget}"),
        ));
    }

    let price_map: FxHashMap<&Symbol, f64> = prices.iter().map(|(s, p)| (s, *p)).collect();

    let mut slots = Vec::new();
    for (index, (symbol, weight)) in weights.iter().enumerate() {
        if !weight.is_finite() || weight < 0.0 {
            return Err(PortfolioError::invalid(
                Stage::Allocation,
                format!("{symbol}: weight must be finite and non-negative, got {weight}"),
            ));
        }
        if weight == 0.0 {
            continue;
        }
        let price = match price_map.get(symbol) {
            Some(&p) if p.is_finite() && p > 0.0 => p,
            Some(&p) => {
                return Err(PortfolioError::invalid(
                    Stage::Allocation,
                    format!("{symbol}: latest price must be positive, got {p}"),
                ));
            }
            None => {
                return Err(PortfolioError::invalid(
                    Stage::Allocation,
                    format!("{symbol}: no latest price"),
                ));
            }
        };
        slots.push(Slot {
            index,
            weight,
            price,
            shares: 0,
            remainder: 0.0,
        });
    }

    if slots.is_empty() {
        return Err(PortfolioError::invalid(
            Stage::Allocation,
            "no symbol has a positive weight",
        ));
    }

    let holdings = |slots: &[Slot]| -> Vec<Holding> {
        let mut out: Vec<Holding> = weights
            .symbols()
            .iter()
            .map(|s| Holding {
                symbol: s.clone(),
                shares: 0,
                price: price_map.get(s).copied().unwrap_or(0.0),
            })
            .collect();
        for slot in slots {
            out[slot.index].shares = slot.shares;
        }
        out
    };

    let cheapest = slots
        .iter()
        .min_by(|a, b| a.price.total_cmp(&b.price).then(a.index.cmp(&b.index)))
        .map(|s| (s.index, s.price));
    if let Some((index, price)) = cheapest.filter(|&(_, price)| budget < price) {
        let err = PortfolioError::BudgetTooSmall {
            budget,
            cheapest: weights.symbols()[index].clone(),
            price,
        };
        warn!("{err}");
        return Ok(Allocation {
            holdings: holdings(&slots),
            leftover: budget,
            budget,
            warning: Some(err),
        });
    }

    // Floors, never past the symbol's target value or the cash left.
    let mut leftover = budget;
    for slot in &mut slots {
        let target = slot.weight * budget;
        let whole = affordable(target, slot.price).min(affordable(leftover, slot.price));
        slot.shares = whole as u64;
        slot.remainder = (target / slot.price - whole).max(0.0);
        leftover -= whole * slot.price;
    }

    // Largest remainder, one extra share per symbol at most.
    let mut extra = 0usize;
    while let Some(k) = pick(&slots, leftover, |s| (s.remainder > 0.0).then_some(s.remainder)) {
        let slot = &mut slots[k];
        slot.shares += 1;
        slot.remainder = 0.0;
        leftover -= slot.price;
        extra += 1;
    }

    // Residual sweep by dollar deficit.
    let mut swept = 0usize;
    if config.residual_sweep {
        while let Some(k) = pick(&slots, leftover, |s| {
            Some(s.weight * budget - s.shares as f64 * s.price)
        }) {
            slots[k].shares += 1;
            leftover -= slots[k].price;
            swept += 1;
        }
    }

    debug!(
        "allocated {budget:.2}: {extra} remainder share(s), {swept} swept share(s), leftover {leftover:.2}"
    );

    Ok(Allocation {
        holdings: holdings(&slots),
        leftover,
        budget,
        warning: None,
    })
}

/// Largest whole count `k` with `k × price ≤ amount`.
///
/// The quotient alone can round across an integer in either direction, so
/// the product is checked both ways.
fn affordable(amount: f64, price: f64) -> f64 {
    let mut k = (amount / price).floor().max(0.0);
    if k > 0.0 && k * price > amount {
        k -= 1.0;
    } else if (k + 1.0) * price <= amount {
        k += 1.0;
    }
    k
}

/// Affordable slot with the highest score; ties to the lowest price, then
/// the earliest basket position.
fn pick(slots: &[Slot], leftover: f64, score: impl Fn(&Slot) -> Option<f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (k, slot) in slots.iter().enumerate() {
        if slot.price > leftover {
            continue;
        }
        let Some(s) = score(slot) else { continue };
        let better = match best {
            None => true,
            Some((b, bs)) => {
                s > bs || (s == bs && slot.price < slots[b].price)
            }
        };
        if better {
            best = Some((k, s));
        }
    }
    best.map(|(k, _)| k)
}
