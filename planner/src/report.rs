//! Plain-text report formatting.

use std::fmt::{self, Write};

use nanofolio::{PerformanceRecord, PortfolioReport, PriceSeries, Symbol, moving_average};

/// Weights, expected performance and the share order.
pub fn format_report(report: &PortfolioReport) -> String {
    let mut out = String::new();
    let _ = write_report(&mut out, report);
    out
}

/// One row per symbol: total return, average annual return, volatility,
/// Sharpe and max drawdown.
pub fn format_metrics_table(records: &[PerformanceRecord]) -> String {
    let mut out = String::new();
    let _ = write_metrics_table(&mut out, records);
    out
}

/// Last close against its moving average for each series.
pub fn format_moving_averages(series: &[PriceSeries], window: usize) -> String {
    let mut out = String::new();
    let _ = write_moving_averages(&mut out, series, window);
    out
}

/// Correlation matrix with symbol headers.
pub fn format_correlation(symbols: &[Symbol], corr: &[Vec<f64>]) -> String {
    let mut out = String::new();
    let _ = write_correlation(&mut out, symbols, corr);
    out
}

fn write_report(out: &mut String, report: &PortfolioReport) -> fmt::Result {
    let est = &report.estimate;

    writeln!(out, "TARGET PORTFOLIO:")?;
    writeln!(
        out,
        "  {:8} {:>9} {:>9} {:>9} {:>8} {:>10} {:>12}",
        "Symbol", "Exp.Ret", "Raw", "Weight", "Shares", "Price", "Value"
    )?;
    for (i, sym) in est.symbols.iter().enumerate() {
        let holding = report.allocation.holdings.iter().find(|h| &h.symbol == sym);
        let (shares, price, value) = holding.map_or((0, 0.0, 0.0), |h| (h.shares, h.price, h.value()));
        writeln!(
            out,
            "  {:8} {:>8.2}% {:>8.2}% {:>8.2}% {:>8} {:>10.2} {:>12.2}",
            sym.as_str(),
            est.mu[i] * 100.0,
            report.raw_weights.values()[i] * 100.0,
            report.weights.values()[i] * 100.0,
            shares,
            price,
            value,
        )?;
    }

    writeln!(out)?;
    write!(out, "{}", report.performance)?;

    let alloc = &report.allocation;
    writeln!(out)?;
    writeln!(out, "Budget:   {:>12.2}", alloc.budget)?;
    writeln!(out, "Invested: {:>12.2}", alloc.invested())?;
    writeln!(out, "Leftover: {:>12.2}", alloc.leftover)?;

    if !est.excluded.is_empty() {
        let names: Vec<&str> = est.excluded.iter().map(Symbol::as_str).collect();
        writeln!(out, "\nExcluded (insufficient data): {}", names.join(", "))?;
    }
    if let Some(w) = &alloc.warning {
        writeln!(out, "\nWarning: {w}")?;
    }
    if let Some(metrics) = &report.metrics {
        writeln!(out)?;
        write_metrics_table(out, metrics)?;
    }
    Ok(())
}

fn write_metrics_table(out: &mut String, records: &[PerformanceRecord]) -> fmt::Result {
    writeln!(out, "PERFORMANCE:")?;
    writeln!(
        out,
        "  {:8} {:>10} {:>10} {:>10} {:>8} {:>10}",
        "Symbol", "Total", "Avg.Ann", "Vol", "Sharpe", "MaxDD"
    )?;
    for r in records {
        let sharpe = r.sharpe.map_or_else(|| "n/a".to_string(), |s| format!("{s:.2}"));
        writeln!(
            out,
            "  {:8} {:>9.2}% {:>9.2}% {:>9.2}% {:>8} {:>9.2}%",
            r.symbol.as_str(),
            r.total_return * 100.0,
            r.average_annual_return * 100.0,
            r.volatility * 100.0,
            sharpe,
            r.max_drawdown * 100.0,
        )?;
    }
    Ok(())
}

fn write_moving_averages(out: &mut String, series: &[PriceSeries], window: usize) -> fmt::Result {
    writeln!(out, "MOVING AVERAGE ({window}):")?;
    for s in series {
        let closes = s.closes();
        let sma = moving_average(&closes, window);
        match (closes.last(), sma.last().filter(|v| v.is_finite())) {
            (Some(last), Some(avg)) => {
                writeln!(
                    out,
                    "  {:8} {:>10.2} vs {:>10.2} ({:+.2}%)",
                    s.symbol().as_str(),
                    last,
                    avg,
                    (last / avg - 1.0) * 100.0
                )?;
            }
            _ => {
                writeln!(out, "  {:8} not enough data", s.symbol().as_str())?;
            }
        }
    }
    Ok(())
}

fn write_correlation(out: &mut String, symbols: &[Symbol], corr: &[Vec<f64>]) -> fmt::Result {
    write!(out, "{:8}", "")?;
    for s in symbols {
        write!(out, " {:>8}", s.as_str())?;
    }
    writeln!(out)?;
    for (s, row) in symbols.iter().zip(corr) {
        write!(out, "{:8}", s.as_str())?;
        for v in row {
            if v.is_finite() {
                write!(out, " {v:>8.3}")?;
            } else {
                write!(out, " {:>8}", "n/a")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}
