//! Integration tests for the planner: config + price file → report.

use std::io::Write;

use chrono::{Days, NaiveDate};
use tempfile::NamedTempFile;

use nanofolio::{PortfolioError, Symbol};
use nanofolio_planner::commands::{self, RunOptions};
use nanofolio_planner::config::Config;
use nanofolio_planner::error::Error;
use nanofolio_planner::prices::FilePrices;
use nanofolio_planner::report;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

/// Deterministic daily closes: a linear drift plus a spike every `period`
/// days, so no two symbols move in lockstep.
fn closes(start: f64, drift: f64, spike: f64, period: usize, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let bump = if i % period == 0 { spike } else { 0.0 };
            start * (1.0 + drift * i as f64) + bump
        })
        .collect()
}

fn series_json(symbol: &str, values: &[f64]) -> String {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let bars: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let date = base.checked_add_days(Days::new(i as u64)).unwrap();
            format!(r#"{{"date": "{date}", "close": {c}}}"#)
        })
        .collect();
    format!(r#""{symbol}": [{}]"#, bars.join(", "))
}

fn price_file() -> NamedTempFile {
    let body = [
        series_json("AAA", &closes(100.0, 0.004, 1.5, 3, 60)),
        series_json("BBB", &closes(40.0, 0.002, 0.8, 5, 60)),
        series_json("CCC", &closes(15.0, 0.001, 0.3, 7, 60)),
    ]
    .join(",\n");
    write_temp(&format!("{{\n{body}\n}}"))
}

fn config_file(extra: &str) -> NamedTempFile {
    write_temp(&format!(
        "[estimation]\nfrequency = \"daily\"\n\n[allocation]\nbudget = 10000.0\n{extra}"
    ))
}

#[test]
fn plan_from_files() {
    let config = Config::load(config_file("").path()).unwrap();
    let prices = FilePrices::load(price_file().path()).unwrap();

    let report = commands::plan(&config, &prices, &RunOptions::default()).unwrap();
    assert_eq!(report.estimate.symbols.len(), 3);
    assert!((report.weights.sum() - 1.0).abs() < 1e-6);

    let alloc = &report.allocation;
    assert!((alloc.invested() + alloc.leftover - 10_000.0).abs() < 1e-6);
    for h in alloc.positions() {
        assert!(alloc.leftover < h.price);
    }

    let text = report::format_report(&report);
    assert!(text.contains("TARGET PORTFOLIO"));
    assert!(text.contains("Leftover"));
}

#[test]
fn budget_override_and_basket_selection() {
    let config = Config::load(config_file("").path()).unwrap();
    let prices = FilePrices::load(price_file().path()).unwrap();
    let opts = RunOptions {
        budget: Some(2_500.0),
        symbols: vec!["CCC".into(), "AAA".into()],
        ..RunOptions::default()
    };
    let report = commands::plan(&config, &prices, &opts).unwrap();
    assert_eq!(report.allocation.budget, 2_500.0);
    assert_eq!(
        report.weights.symbols(),
        &[Symbol::new("CCC"), Symbol::new("AAA")]
    );
}

#[test]
fn unknown_symbol_rejected() {
    let config = Config::load(config_file("").path()).unwrap();
    let prices = FilePrices::load(price_file().path()).unwrap();
    let opts = RunOptions {
        symbols: vec!["AAA".into(), "NOPE".into()],
        ..RunOptions::default()
    };
    let err = commands::plan(&config, &prices, &opts).unwrap_err();
    assert!(matches!(err, Error::Prices(_)));
    assert!(!err.is_pipeline_failure());
}

#[test]
fn single_symbol_is_a_pipeline_failure() {
    let config = Config::load(config_file("").path()).unwrap();
    let prices = FilePrices::load(price_file().path()).unwrap();
    let opts = RunOptions {
        symbols: vec!["AAA".into()],
        ..RunOptions::default()
    };
    let err = commands::plan(&config, &prices, &opts).unwrap_err();
    assert!(matches!(
        err,
        Error::Pipeline(PortfolioError::InsufficientData { .. })
    ));
    assert!(err.is_pipeline_failure());
}

#[test]
fn tiny_budget_is_annotated_not_fatal() {
    let config = Config::load(config_file("").path()).unwrap();
    let prices = FilePrices::load(price_file().path()).unwrap();
    let opts = RunOptions {
        budget: Some(1.0),
        ..RunOptions::default()
    };
    let report = commands::plan(&config, &prices, &opts).unwrap();
    assert_eq!(report.allocation.invested(), 0.0);
    assert!(matches!(
        report.allocation.warning,
        Some(PortfolioError::BudgetTooSmall { .. })
    ));
    assert!(report::format_report(&report).contains("Warning"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    let warning = &json["allocation"]["warning"]["BudgetTooSmall"];
    assert_eq!(warning["budget"], 1.0);
    assert!(warning["cheapest"].is_string());
}

#[test]
fn metrics_section_enabled_by_config() {
    let config = Config::load(config_file("\n[metrics]\nenabled = true\n").path()).unwrap();
    let prices = FilePrices::load(price_file().path()).unwrap();
    let report = commands::plan(&config, &prices, &RunOptions::default()).unwrap();
    let metrics = report.metrics.as_ref().unwrap();
    assert_eq!(metrics.len(), 3);
    assert!(report::format_report(&report).contains("PERFORMANCE"));
}

#[test]
fn json_report_round_trips_key_fields() {
    let config = Config::load(config_file("").path()).unwrap();
    let prices = FilePrices::load(price_file().path()).unwrap();
    let report = commands::plan(&config, &prices, &RunOptions::default()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert!(json["allocation"]["leftover"].is_number());
    assert_eq!(json["weights"]["symbols"][0], "AAA");
}

#[test]
fn missing_config_file() {
    let err = Config::load(std::path::Path::new("/nonexistent/planner.toml")).unwrap_err();
    assert!(matches!(err, Error::ConfigRead { .. }));
}

#[test]
fn config_without_frequency_is_rejected() {
    let f = write_temp("[allocation]\nbudget = 100.0\n");
    assert!(matches!(Config::load(f.path()), Err(Error::ConfigParse(_))));
}

#[test]
fn example_config_parses() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("planner.example.toml");
    let config = Config::load(&path).unwrap();
    assert_eq!(config.optimizer.risk_free_rate, 0.02);
    assert!(config.allocation.residual_sweep);
}
