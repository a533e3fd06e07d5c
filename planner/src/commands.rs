//! Subcommand implementations.

use std::path::Path;

use anyhow::Context;
use log::info;
use rustc_hash::FxHashSet;

use nanofolio::{
    PortfolioReport, PriceMatrix, Symbol, build_portfolio, estimate, performance_table,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::prices::FilePrices;
use crate::report;

/// Options for the `run` subcommand.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides `[allocation].budget`.
    pub budget: Option<f64>,
    /// Print the report as JSON instead of tables.
    pub json: bool,
    /// Basket to use; every symbol in the file when empty.
    pub symbols: Vec<String>,
}

/// Build the portfolio for a price file without printing anything.
pub fn plan(config: &Config, prices: &FilePrices, opts: &RunOptions) -> Result<PortfolioReport> {
    let symbols = basket(prices, &opts.symbols)?;
    info!(
        "planning {} symbol(s), frequency {:?}",
        symbols.len(),
        config.estimation.frequency
    );
    let request = config.request(symbols, opts.budget);
    Ok(build_portfolio(&request, prices)?)
}

/// `run`: build and print the portfolio.
pub fn run(config: &Config, prices_path: &Path, opts: &RunOptions) -> Result<()> {
    let prices = FilePrices::load(prices_path)?;
    let portfolio = plan(config, &prices, opts)?;

    if opts.json {
        println!("{}", portfolio.to_json().map_err(Error::Report)?);
    } else {
        print!("{}", report::format_report(&portfolio));
    }
    Ok(())
}

/// `metrics`: per-symbol performance and moving averages.
pub fn show_metrics(config: &Config, prices_path: &Path, symbols: &[String]) -> anyhow::Result<()> {
    let prices = FilePrices::load(prices_path)
        .with_context(|| format!("loading {}", prices_path.display()))?;
    let symbols = basket(&prices, symbols)?;
    let series = prices.series(&symbols, config.date_range())?;

    let ppy = config.estimation.frequency.periods_per_year();
    let records = performance_table(&series, ppy).context("computing performance metrics")?;

    print!("{}", report::format_metrics_table(&records));
    println!();
    print!(
        "{}",
        report::format_moving_averages(&series, config.metrics.moving_average_window)
    );
    Ok(())
}

/// `correlation`: correlation matrix of period returns.
pub fn show_correlation(config: &Config, prices_path: &Path, symbols: &[String]) -> anyhow::Result<()> {
    let prices = FilePrices::load(prices_path)
        .with_context(|| format!("loading {}", prices_path.display()))?;
    let symbols = basket(&prices, symbols)?;
    let series = prices.series(&symbols, config.date_range())?;

    let matrix = PriceMatrix::align(&series)?;
    let est = estimate(&matrix, &config.estimator()).context("estimating covariance")?;

    print!("{}", report::format_correlation(&est.symbols, &est.correlation()));
    Ok(())
}

/// Requested symbols, or every symbol in the file. Unknown symbols are
/// rejected up front.
fn basket(prices: &FilePrices, requested: &[String]) -> Result<Vec<Symbol>> {
    if requested.is_empty() {
        return Ok(prices.symbols().to_vec());
    }
    let known: FxHashSet<&Symbol> = prices.symbols().iter().collect();
    let symbols: Vec<Symbol> = requested.iter().map(|s| Symbol::new(s.trim())).collect();
    if let Some(unknown) = symbols.iter().find(|s| !known.contains(s)) {
        return Err(Error::Prices(format!("{unknown} is not in the price file")));
    }
    Ok(symbols)
}
