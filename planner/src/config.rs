//! TOML configuration loading and validation.

use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use nanofolio::{
    AllocatorConfig, DataPolicy, DateRange, EstimatorConfig, Frequency, OptimizerConfig,
    PortfolioRequest, ReturnMethod, Symbol, Target,
};

use crate::error::{Error, Result};
use crate::prices::date_to_millis;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub optimizer: OptimizerSection,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimationConfig {
    /// Sampling frequency of the price file. Required.
    pub frequency: Frequency,
    #[serde(default)]
    pub method: ReturnMethod,
    #[serde(default)]
    pub policy: DataPolicy,
    /// First date to use (inclusive).
    #[serde(default)]
    pub start: Option<NaiveDate>,
    /// Last date to use (inclusive).
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerSection {
    #[serde(default)]
    pub target: Target,
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for OptimizerSection {
    fn default() -> Self {
        Self {
            target: Target::default(),
            risk_free_rate: 0.0,
            max_weight: default_max_weight(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

fn default_max_weight() -> f64 {
    1.0
}
fn default_max_iterations() -> usize {
    10_000
}
fn default_tolerance() -> f64 {
    1e-9
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationConfig {
    #[serde(default = "default_budget")]
    pub budget: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_true")]
    pub residual_sweep: bool,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            threshold: default_threshold(),
            residual_sweep: true,
        }
    }
}

fn default_budget() -> f64 {
    10_000.0
}
fn default_threshold() -> f64 {
    nanofolio::DEFAULT_THRESHOLD
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Include per-symbol metrics in `run` output.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_window")]
    pub moving_average_window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            moving_average_window: default_window(),
        }
    }
}

fn default_window() -> usize {
    20
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        let ppy = self.estimation.frequency.periods_per_year();
        if !ppy.is_finite() || ppy <= 0.0 {
            return Err(Error::Config(format!(
                "custom frequency must be positive, got {ppy}"
            )));
        }
        if let (Some(start), Some(end)) = (self.estimation.start, self.estimation.end) {
            if start > end {
                return Err(Error::Config(format!(
                    "estimation.start ({start}) is after estimation.end ({end})"
                )));
            }
        }
        if self.optimizer.max_weight <= 0.0 || self.optimizer.max_weight > 1.0 {
            return Err(Error::Config("max_weight must be in (0.0, 1.0]".into()));
        }
        if !self.optimizer.risk_free_rate.is_finite() {
            return Err(Error::Config("risk_free_rate must be finite".into()));
        }
        if self.optimizer.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be > 0".into()));
        }
        if self.optimizer.tolerance <= 0.0 {
            return Err(Error::Config("tolerance must be > 0".into()));
        }
        if self.allocation.budget <= 0.0 {
            return Err(Error::Config("budget must be > 0".into()));
        }
        if self.allocation.threshold < 0.0 || self.allocation.threshold >= 1.0 {
            return Err(Error::Config("threshold must be in [0.0, 1.0)".into()));
        }
        if self.metrics.moving_average_window == 0 {
            return Err(Error::Config("moving_average_window must be > 0".into()));
        }
        Ok(())
    }

    /// Inclusive timestamp range covered by `start`/`end`.
    pub fn date_range(&self) -> DateRange {
        let start = self
            .estimation
            .start
            .map_or(i64::MIN, date_to_millis);
        let end = self.estimation.end.map_or(i64::MAX, date_to_millis);
        DateRange::new(start, end)
    }

    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig::new(self.estimation.frequency)
            .with_method(self.estimation.method)
            .with_policy(self.estimation.policy)
    }

    pub fn optimizer(&self) -> OptimizerConfig {
        OptimizerConfig {
            risk_free_rate: self.optimizer.risk_free_rate,
            max_weight: self.optimizer.max_weight,
            max_iterations: self.optimizer.max_iterations,
            tolerance: self.optimizer.tolerance,
        }
    }

    /// Pipeline request for `symbols`. `budget` overrides the configured one.
    pub fn request(&self, symbols: Vec<Symbol>, budget: Option<f64>) -> PortfolioRequest {
        let mut req = PortfolioRequest::new(
            symbols,
            self.estimation.frequency,
            budget.unwrap_or(self.allocation.budget),
        )
        .with_range(self.date_range())
        .with_threshold(self.allocation.threshold)
        .with_target(self.optimizer.target)
        .with_metrics(self.metrics.enabled);
        req.estimator = self.estimator();
        req.optimizer = self.optimizer();
        req.allocator = AllocatorConfig {
            residual_sweep: self.allocation.residual_sweep,
        };
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[estimation]
frequency = "daily"
method = "arithmetic"
policy = "best_effort"
start = "2024-01-02"
end = "2024-12-31"

[optimizer]
target = "max_sharpe"
risk_free_rate = 0.02
max_weight = 0.5

[allocation]
budget = 25000.0
threshold = 0.001
residual_sweep = false

[metrics]
enabled = true
moving_average_window = 50
"#
    }

    #[test]
    fn parse_example_config() {
        let config: Config = toml::from_str(example_toml()).unwrap();
        assert_eq!(config.estimation.frequency, Frequency::Daily);
        assert_eq!(config.estimation.policy, DataPolicy::BestEffort);
        assert_eq!(config.optimizer.risk_free_rate, 0.02);
        assert_eq!(config.optimizer.max_weight, 0.5);
        assert_eq!(config.allocation.budget, 25_000.0);
        assert!(!config.allocation.residual_sweep);
        assert_eq!(config.metrics.moving_average_window, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str("[estimation]\nfrequency = \"weekly\"\n").unwrap();
        assert_eq!(config.estimation.frequency, Frequency::Weekly);
        assert_eq!(config.estimation.method, ReturnMethod::Arithmetic);
        assert_eq!(config.estimation.policy, DataPolicy::Strict);
        assert_eq!(config.optimizer.target, Target::MaxSharpe);
        assert_eq!(config.optimizer.max_iterations, 10_000);
        assert_eq!(config.allocation.budget, 10_000.0);
        assert_eq!(config.allocation.threshold, 1e-4);
        assert!(config.allocation.residual_sweep);
        assert!(!config.metrics.enabled);
        assert_eq!(config.date_range(), DateRange::all());
    }

    #[test]
    fn frequency_is_required() {
        assert!(toml::from_str::<Config>("[estimation]\n").is_err());
        assert!(toml::from_str::<Config>("[allocation]\nbudget = 1.0\n").is_err());
    }

    #[test]
    fn custom_frequency() {
        let config: Config =
            toml::from_str("[estimation]\nfrequency = { custom = 365.0 }\n").unwrap();
        assert_eq!(config.estimation.frequency, Frequency::Custom(365.0));
        assert!(config.validate().is_ok());

        let config: Config =
            toml::from_str("[estimation]\nfrequency = { custom = 0.0 }\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_values() {
        let base: Config = toml::from_str(example_toml()).unwrap();

        let mut c = base.clone();
        c.optimizer.max_weight = 1.5;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.allocation.budget = 0.0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.allocation.threshold = 1.0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.estimation.start = NaiveDate::from_ymd_opt(2025, 1, 1);
        assert!(c.validate().is_err());

        let mut c = base;
        c.metrics.moving_average_window = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn request_carries_settings() {
        let config: Config = toml::from_str(example_toml()).unwrap();
        let req = config.request(vec![Symbol::new("AAA")], Some(500.0));
        assert_eq!(req.budget, 500.0);
        assert_eq!(req.threshold, 0.001);
        assert_eq!(req.optimizer.max_weight, 0.5);
        assert_eq!(req.estimator.policy, DataPolicy::BestEffort);
        assert!(!req.allocator.residual_sweep);
        assert!(req.include_metrics);
        assert!(req.range.start < req.range.end);

        let req = config.request(vec![Symbol::new("AAA")], None);
        assert_eq!(req.budget, 25_000.0);
    }
}
