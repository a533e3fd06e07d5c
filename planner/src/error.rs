//! Error types for the planner.

use std::path::PathBuf;

use nanofolio::{PortfolioError, Stage};

/// All errors that can occur while planning a portfolio.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("price file error: {0}")]
    Prices(String),

    #[error("failed to read price file {path}: {source}")]
    PricesRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse price JSON: {0}")]
    PricesParse(#[from] serde_json::Error),

    #[error("invalid date '{value}': {source}")]
    Date {
        value: String,
        source: chrono::ParseError,
    },

    #[error("failed to write JSON report: {0}")]
    Report(serde_json::Error),

    #[error(transparent)]
    Pipeline(#[from] PortfolioError),
}

impl Error {
    /// True when the pipeline itself rejected the data (as opposed to a bad
    /// file or flag). The CLI exits with status 2 for these.
    pub fn is_pipeline_failure(&self) -> bool {
        match self {
            Error::Pipeline(e) => matches!(
                e,
                PortfolioError::InsufficientData { .. }
                    | PortfolioError::DegenerateInput { .. }
                    | PortfolioError::NonConvergence { .. }
            ) || matches!(e.stage(), Stage::Estimation | Stage::Optimization),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_failures_are_classified() {
        let e = Error::from(PortfolioError::NonConvergence {
            stage: Stage::Optimization,
            iterations: 10,
            residual: 1e-3,
        });
        assert!(e.is_pipeline_failure());

        let e = Error::from(PortfolioError::InvalidInput {
            stage: Stage::Allocation,
            reason: "budget must be positive".into(),
        });
        assert!(!e.is_pipeline_failure());

        assert!(!Error::Config("bad".into()).is_pipeline_failure());
    }

    #[test]
    fn pipeline_error_is_transparent() {
        let inner = PortfolioError::InvalidInput {
            stage: Stage::History,
            reason: "empty basket".into(),
        };
        let msg = Error::from(inner.clone()).to_string();
        assert_eq!(msg, inner.to_string());
    }
}
