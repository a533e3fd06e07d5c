//! Errors produced by the portfolio construction pipeline.

use std::fmt;

use crate::types::Symbol;

/// Pipeline stage that produced an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    History,
    Estimation,
    Optimization,
    Cleaning,
    Allocation,
    Performance,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::History => "history",
            Stage::Estimation => "estimation",
            Stage::Optimization => "optimization",
            Stage::Cleaning => "cleaning",
            Stage::Allocation => "allocation",
            Stage::Performance => "performance",
        };
        f.write_str(name)
    }
}

/// All errors that can occur while building a portfolio.
///
/// Estimation and optimization errors abort a request. `BudgetTooSmall`
/// is also attached to an otherwise valid [`Allocation`](crate::Allocation)
/// as an annotation rather than returned as a failure.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PortfolioError {
    #[error("{stage}: insufficient data for [{}]: {reason}", join(.symbols))]
    InsufficientData {
        stage: Stage,
        symbols: Vec<Symbol>,
        reason: String,
    },

    #[error("{stage}: degenerate input for [{}]: {reason}", join(.symbols))]
    DegenerateInput {
        stage: Stage,
        symbols: Vec<Symbol>,
        reason: String,
    },

    #[error("{stage}: solver did not converge after {iterations} iterations (residual {residual:e})")]
    NonConvergence {
        stage: Stage,
        iterations: usize,
        residual: f64,
    },

    #[error("budget {budget:.2} cannot buy one share of {cheapest} at {price:.2}")]
    BudgetTooSmall {
        budget: f64,
        cheapest: Symbol,
        price: f64,
    },

    #[error("{stage}: invalid input: {reason}")]
    InvalidInput { stage: Stage, reason: String },

    #[error("{stage}: price provider failed: {message}")]
    Provider { stage: Stage, message: String },
}

impl PortfolioError {
    /// Stage the error originated from.
    pub fn stage(&self) -> Stage {
        match self {
            PortfolioError::InsufficientData { stage, .. }
            | PortfolioError::DegenerateInput { stage, .. }
            | PortfolioError::NonConvergence { stage, .. }
            | PortfolioError::InvalidInput { stage, .. }
            | PortfolioError::Provider { stage, .. } => *stage,
            PortfolioError::BudgetTooSmall { .. } => Stage::Allocation,
        }
    }

    pub(crate) fn invalid(stage: Stage, reason: impl Into<String>) -> Self {
        PortfolioError::InvalidInput {
            stage,
            reason: reason.into(),
        }
    }
}

fn join(symbols: &[Symbol]) -> String {
    symbols
        .iter()
        .map(Symbol::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, PortfolioError>;
