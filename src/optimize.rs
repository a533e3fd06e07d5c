//! Long-only mean-variance optimization on the unit simplex.
//!
//! [`EfficientFrontier`] validates `mu` and `S`, then delegates the
//! constrained maximization to a [`Solver`]:
//!
//! - [`EfficientFrontier::max_sharpe`] maximizes `(wᵀμ − r_f) / √(wᵀSw)`,
//! - [`EfficientFrontier::min_volatility`] minimizes `wᵀSw`,
//!
//! both subject to `Σw = 1`, `0 ≤ w ≤ max_weight`.
//!
//! Both problems are handed to the solver as convex quadratic programs. The
//! Sharpe ratio is scale-invariant, so its maximum is found as the
//! minimum-variance point `y` with `(μ − r_f)ᵀy = 1`, `y ≥ 0` (and
//! `y_i ≤ max_weight·Σy`), then rescaled to `w = y / Σy`.
//!
//! # Example
//!
//! ```
//! use nanofolio::{Estimate, EfficientFrontier, OptimizerConfig, Symbol};
//!
//! let est = Estimate::new(
//!     vec![Symbol::new("A"), Symbol::new("B")],
//!     vec![0.10, 0.05],
//!     vec![vec![0.04, 0.0], vec![0.0, 0.01]],
//! );
//! let ef = EfficientFrontier::new(&est, OptimizerConfig::default()).unwrap();
//! let w = ef.max_sharpe().unwrap();
//! assert!((w.sum() - 1.0).abs() < 1e-9);
//! assert!(w.values().iter().all(|x| *x >= 0.0));
//! ```

use std::fmt;

use log::{debug, info};

use crate::error::{PortfolioError, Result, Stage};
use crate::estimate::Estimate;
use crate::solver::{
    ActiveSet, Constraints, LinearConstraint, Objective, QuadraticProgram, SolveError, Solver, dot,
    mat_vec_mul,
};
use crate::types::{Symbol, Weights};

/// Relative pivot tolerance for the positive-definiteness test.
const PD_TOLERANCE: f64 = 1e-12;
/// Relative tolerance for covariance symmetry.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Optimizer parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OptimizerConfig {
    /// Annual risk-free rate, same units as `mu`.
    pub risk_free_rate: f64,
    /// Upper bound on any single weight.
    pub max_weight: f64,
    /// Iteration budget for the default solver.
    pub max_iterations: usize,
    /// Optimality tolerance for the default solver.
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            max_weight: 1.0,
            max_iterations: 10_000,
            tolerance: 1e-9,
        }
    }
}

/// Expected return, volatility and Sharpe ratio of a weight vector.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortfolioPerformance {
    pub expected_return: f64,
    pub volatility: f64,
    /// `None` when volatility is zero.
    pub sharpe: Option<f64>,
}

impl fmt::Display for PortfolioPerformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Portfolio Performance")?;
        writeln!(f, "  Expected annual return: {:>8.2}%", self.expected_return * 100.0)?;
        writeln!(f, "  Annual volatility:      {:>8.2}%", self.volatility * 100.0)?;
        match self.sharpe {
            Some(s) => writeln!(f, "  Sharpe ratio:           {s:>8.2}"),
            None => writeln!(f, "  Sharpe ratio:                n/a"),
        }
    }
}

/// Mean-variance optimizer over a validated `(mu, S)` pair.
pub struct EfficientFrontier {
    symbols: Vec<Symbol>,
    mu: Vec<f64>,
    cov: Vec<Vec<f64>>,
    config: OptimizerConfig,
    solver: Box<dyn Solver + Send + Sync>,
}

impl fmt::Debug for EfficientFrontier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EfficientFrontier")
            .field("symbols", &self.symbols)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EfficientFrontier {
    /// Validate the estimate and build an optimizer using the default
    /// [`ActiveSet`] solver.
    ///
    /// Fails with `InsufficientData` for fewer than two assets and with
    /// `DegenerateInput` when shapes disagree, values are not finite, or the
    /// covariance is not symmetric positive-definite.
    pub fn new(estimate: &Estimate, config: OptimizerConfig) -> Result<Self> {
        validate(estimate)?;
        if !(config.max_weight > 0.0) || !config.risk_free_rate.is_finite() {
            return Err(PortfolioError::invalid(
                Stage::Optimization,
                format!(
                    "max_weight must be positive and risk_free_rate finite (got {}, {})",
                    config.max_weight, config.risk_free_rate
                ),
            ));
        }
        let solver = ActiveSet {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        };
        Ok(Self {
            symbols: estimate.symbols.clone(),
            mu: estimate.mu.clone(),
            cov: estimate.cov.clone(),
            config,
            solver: Box::new(solver),
        })
    }

    /// Replace the solver strategy.
    pub fn with_solver(mut self, solver: impl Solver + Send + Sync + 'static) -> Self {
        self.solver = Box::new(solver);
        self
    }

    #[inline]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    #[inline]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Long-only weights with the highest Sharpe ratio.
    ///
    /// Requires a feasible portfolio whose expected return exceeds the
    /// risk-free rate; otherwise the problem has no meaningful maximum and
    /// `DegenerateInput` is returned.
    pub fn max_sharpe(&self) -> Result<Weights> {
        let rf = self.config.risk_free_rate;
        let excess: Vec<f64> = self.mu.iter().map(|m| m - rf).collect();
        let constraints = self.constraints();
        if constraints.is_feasible(excess.len()) {
            let best = best_linear(&excess, constraints.max_weight.min(1.0));
            if dot(&best, &excess) <= 0.0 {
                return Err(PortfolioError::DegenerateInput {
                    stage: Stage::Optimization,
                    symbols: self.symbols.clone(),
                    reason: format!(
                        "no feasible portfolio has an expected return above the risk-free rate {rf}"
                    ),
                });
            }
        }

        let objective = SharpeObjective {
            excess,
            cov: &self.cov,
        };
        let weights = self.run(&objective)?;
        info!("max-sharpe weights: {}", describe(&weights));
        Ok(weights)
    }

    /// Long-only weights with the lowest variance.
    pub fn min_volatility(&self) -> Result<Weights> {
        let objective = NegVariance { cov: &self.cov };
        let weights = self.run(&objective)?;
        info!("min-volatility weights: {}", describe(&weights));
        Ok(weights)
    }

    /// Expected return `wᵀμ`, volatility `√(wᵀSw)` and Sharpe ratio.
    pub fn portfolio_performance(&self, weights: &Weights) -> Result<PortfolioPerformance> {
        if weights.symbols() != self.symbols.as_slice() {
            return Err(PortfolioError::invalid(
                Stage::Optimization,
                "weights do not match the optimizer's symbols",
            ));
        }
        Ok(performance(
            weights.values(),
            &self.mu,
            &self.cov,
            self.config.risk_free_rate,
        ))
    }

    fn constraints(&self) -> Constraints {
        Constraints {
            max_weight: self.config.max_weight,
        }
    }

    fn run(&self, objective: &dyn Objective) -> Result<Weights> {
        match self.solver.solve(objective, &self.constraints()) {
            Ok(outcome) => {
                debug!(
                    "solver finished after {} iterations, objective {:.8}",
                    outcome.iterations, outcome.objective
                );
                Ok(Weights::new(self.symbols.clone(), outcome.weights))
            }
            Err(
                SolveError::IterationLimit {
                    iterations,
                    residual,
                }
                | SolveError::Stalled {
                    iterations,
                    residual,
                },
            ) => Err(PortfolioError::NonConvergence {
                stage: Stage::Optimization,
                iterations,
                residual,
            }),
            Err(e @ SolveError::Infeasible(_)) => Err(PortfolioError::invalid(
                Stage::Optimization,
                format!("{e} (max_weight {})", self.config.max_weight),
            )),
            Err(e @ (SolveError::NonFinite | SolveError::Singular)) => Err(PortfolioError::DegenerateInput {
                stage: Stage::Optimization,
                symbols: self.symbols.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Performance of raw weight values against `mu` and `S`.
pub fn performance(w: &[f64], mu: &[f64], cov: &[Vec<f64>], risk_free: f64) -> PortfolioPerformance {
    let expected_return = dot(w, mu);
    let variance = dot(w, &mat_vec_mul(cov, w)).max(0.0);
    let volatility = variance.sqrt();
    let sharpe = if volatility > 0.0 {
        Some((expected_return - risk_free) / volatility)
    } else {
        None
    };
    PortfolioPerformance {
        expected_return,
        volatility,
        sharpe,
    }
}

struct SharpeObjective<'a> {
    excess: Vec<f64>,
    cov: &'a [Vec<f64>],
}

impl Objective for SharpeObjective<'_> {
    fn dimension(&self) -> usize {
        self.excess.len()
    }

    fn value(&self, w: &[f64]) -> f64 {
        let var = dot(w, &mat_vec_mul(self.cov, w));
        if var <= 0.0 {
            return f64::NAN;
        }
        dot(w, &self.excess) / var.sqrt()
    }

    fn gradient(&self, w: &[f64], grad: &mut [f64]) {
        let sigma_w = mat_vec_mul(self.cov, w);
        let var = dot(w, &sigma_w).max(1e-300);
        let vol = var.sqrt();
        let num = dot(w, &self.excess);
        for ((g, a), sw) in grad.iter_mut().zip(&self.excess).zip(&sigma_w) {
            *g = a / vol - num * sw / (var * vol);
        }
    }

    fn quadratic(&self, constraints: &Constraints) -> Option<QuadraticProgram> {
        let n = self.excess.len();
        let best = best_linear(&self.excess, constraints.max_weight.min(1.0));
        let scale = dot(&best, &self.excess);
        if !(scale > 0.0) {
            return None;
        }
        Some(QuadraticProgram {
            q: self.cov.to_vec(),
            c: vec![0.0; n],
            equalities: vec![LinearConstraint::new(self.excess.clone(), 1.0)],
            inequalities: constraints.scaled_rows(n),
            start: best.iter().map(|w| w / scale).collect(),
        })
    }
}

/// `-wᵀSw`, so that maximizing it minimizes variance.
struct NegVariance<'a> {
    cov: &'a [Vec<f64>],
}

impl Objective for NegVariance<'_> {
    fn dimension(&self) -> usize {
        self.cov.len()
    }

    fn value(&self, w: &[f64]) -> f64 {
        -dot(w, &mat_vec_mul(self.cov, w))
    }

    fn gradient(&self, w: &[f64], grad: &mut [f64]) {
        for (g, sw) in grad.iter_mut().zip(mat_vec_mul(self.cov, w)) {
            *g = -2.0 * sw;
        }
    }

    fn quadratic(&self, constraints: &Constraints) -> Option<QuadraticProgram> {
        let n = self.cov.len();
        Some(QuadraticProgram {
            q: self.cov.to_vec(),
            c: vec![0.0; n],
            equalities: vec![LinearConstraint::new(vec![1.0; n], 1.0)],
            inequalities: constraints.weight_rows(n),
            start: constraints.starting_point(n),
        })
    }
}

/// Weights maximizing `aᵀw` on the capped simplex: fill the largest `a`
/// first, ties by position.
fn best_linear(a: &[f64], cap: f64) -> Vec<f64> {
    let mut order: Vec<usize> = (0..a.len()).collect();
    order.sort_by(|&i, &j| a[j].total_cmp(&a[i]).then(i.cmp(&j)));

    let mut w = vec![0.0; a.len()];
    let mut remaining = 1.0;
    for i in order {
        if remaining <= 0.0 {
            break;
        }
        let take = cap.min(remaining);
        w[i] = take;
        remaining -= take;
    }
    w
}

fn validate(estimate: &Estimate) -> Result<()> {
    let n = estimate.symbols.len();
    let degenerate = |reason: String| PortfolioError::DegenerateInput {
        stage: Stage::Optimization,
        symbols: estimate.symbols.clone(),
        reason,
    };

    if n < 2 {
        return Err(PortfolioError::InsufficientData {
            stage: Stage::Optimization,
            symbols: estimate.symbols.clone(),
            reason: "at least 2 assets are required".into(),
        });
    }
    if estimate.mu.len() != n || estimate.cov.len() != n || estimate.cov.iter().any(|r| r.len() != n)
    {
        return Err(degenerate(format!(
            "dimension mismatch: {n} symbols, {} returns, {} covariance rows",
            estimate.mu.len(),
            estimate.cov.len()
        )));
    }
    if estimate.mu.iter().any(|x| !x.is_finite())
        || estimate.cov.iter().flatten().any(|x| !x.is_finite())
    {
        return Err(degenerate("non-finite expected return or covariance".into()));
    }

    let scale = estimate
        .cov
        .iter()
        .flatten()
        .fold(0.0_f64, |m, x| m.max(x.abs()));
    for i in 0..n {
        for j in (i + 1)..n {
            if (estimate.cov[i][j] - estimate.cov[j][i]).abs() > SYMMETRY_TOLERANCE * scale.max(1.0)
            {
                return Err(degenerate(format!(
                    "covariance not symmetric at ({}, {})",
                    estimate.symbols[i], estimate.symbols[j]
                )));
            }
        }
    }

    if let Some(k) = cholesky_failure(&estimate.cov) {
        return Err(degenerate(format!(
            "covariance is not positive definite (pivot at {}); \
             check for collinear or constant price series",
            estimate.symbols[k]
        )));
    }
    Ok(())
}

/// Index of the first non-positive Cholesky pivot, if any.
///
/// Pivots are compared against the largest diagonal entry, so perfectly
/// collinear or zero-variance assets are caught despite round-off.
fn cholesky_failure(cov: &[Vec<f64>]) -> Option<usize> {
    let n = cov.len();
    let max_diag = (0..n).map(|i| cov[i][i]).fold(0.0_f64, f64::max);
    if max_diag <= 0.0 {
        return Some(0);
    }
    let threshold = PD_TOLERANCE * max_diag;

    let mut l = vec![vec![0.0; n]; n];
    for j in 0..n {
        let mut d = cov[j][j];
        for k in 0..j {
            d -= l[j][k] * l[j][k];
        }
        if d <= threshold {
            return Some(j);
        }
        let d_sqrt = d.sqrt();
        l[j][j] = d_sqrt;
        for i in (j + 1)..n {
            let mut s = cov[i][j];
            for k in 0..j {
                s -= l[i][k] * l[j][k];
            }
            l[i][j] = s / d_sqrt;
        }
    }
    None
}

fn describe(w: &Weights) -> String {
    w.iter()
        .map(|(s, v)| format!("{s}={v:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(n: usize) -> Vec<Symbol> {
        (0..n).map(|i| Symbol::new(&format!("S{i}"))).collect()
    }

    fn sample_estimate() -> Estimate {
        Estimate::new(
            syms(4),
            vec![0.12, 0.10, 0.07, 0.03],
            vec![
                vec![0.0400, 0.0060, 0.0020, 0.0000],
                vec![0.0060, 0.0225, 0.0030, 0.0010],
                vec![0.0020, 0.0030, 0.0100, 0.0005],
                vec![0.0000, 0.0010, 0.0005, 0.0025],
            ],
        )
    }

    fn assert_valid_weights(w: &Weights, n: usize) {
        assert_eq!(w.len(), n);
        assert!(w.values().iter().all(|x| x.is_finite() && *x >= 0.0));
        assert!((w.sum() - 1.0).abs() < 1e-6, "sum={}", w.sum());
    }

    #[test]
    fn max_sharpe_weights_are_valid() {
        let ef = EfficientFrontier::new(&sample_estimate(), OptimizerConfig::default()).unwrap();
        let w = ef.max_sharpe().unwrap();
        assert_valid_weights(&w, 4);
        assert_eq!(w.symbols(), ef.symbols());
    }

    #[test]
    fn max_sharpe_beats_equal_weight() {
        let est = sample_estimate();
        let ef = EfficientFrontier::new(&est, OptimizerConfig::default()).unwrap();
        let w = ef.max_sharpe().unwrap();
        let best = ef.portfolio_performance(&w).unwrap().sharpe.unwrap();
        let eq = ef
            .portfolio_performance(&Weights::equal(est.symbols.clone()))
            .unwrap()
            .sharpe
            .unwrap();
        assert!(best >= eq - 1e-12, "best={best} eq={eq}");
    }

    #[test]
    fn max_sharpe_matches_closed_form_when_unconstrained() {
        // Uncorrelated assets: tangency weights ∝ μ_i / σ_i², all positive.
        let est = Estimate::new(
            syms(3),
            vec![0.10, 0.08, 0.05],
            vec![
                vec![0.04, 0.0, 0.0],
                vec![0.0, 0.02, 0.0],
                vec![0.0, 0.0, 0.01],
            ],
        );
        let ef = EfficientFrontier::new(&est, OptimizerConfig::default()).unwrap();
        let w = ef.max_sharpe().unwrap();

        let raw = [0.10 / 0.04, 0.08 / 0.02, 0.05 / 0.01];
        let total: f64 = raw.iter().sum();
        for (got, r) in w.values().iter().zip(raw) {
            assert!((got - r / total).abs() < 1e-5, "got={got} want={}", r / total);
        }
    }

    #[test]
    fn max_sharpe_drops_dominated_asset() {
        // Same risk, no correlation, negative expected return: weight 0.
        let est = Estimate::new(
            syms(2),
            vec![0.10, -0.05],
            vec![vec![0.04, 0.0], vec![0.0, 0.04]],
        );
        let ef = EfficientFrontier::new(&est, OptimizerConfig::default()).unwrap();
        let w = ef.max_sharpe().unwrap();
        assert!((w.values()[0] - 1.0).abs() < 1e-9);
        assert!(w.values()[1].abs() < 1e-9);
    }

    #[test]
    fn min_volatility_uncorrelated_is_inverse_variance() {
        let est = Estimate::new(
            syms(2),
            vec![0.1, 0.1],
            vec![vec![0.04, 0.0], vec![0.0, 0.01]],
        );
        let ef = EfficientFrontier::new(&est, OptimizerConfig::default()).unwrap();
        let w = ef.min_volatility().unwrap();
        assert!((w.values()[0] - 0.2).abs() < 1e-6);
        assert!((w.values()[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn weight_cap_is_respected() {
        let cfg = OptimizerConfig {
            max_weight: 0.4,
            ..OptimizerConfig::default()
        };
        let ef = EfficientFrontier::new(&sample_estimate(), cfg).unwrap();
        let w = ef.max_sharpe().unwrap();
        assert_valid_weights(&w, 4);
        assert!(w.values().iter().all(|x| *x <= 0.4 + 1e-9));
    }

    #[test]
    fn deterministic_across_runs() {
        let est = sample_estimate();
        let a = EfficientFrontier::new(&est, OptimizerConfig::default())
            .unwrap()
            .max_sharpe()
            .unwrap();
        let b = EfficientFrontier::new(&est, OptimizerConfig::default())
            .unwrap()
            .max_sharpe()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn collinear_covariance_is_degenerate() {
        // Second asset is exactly twice the first: rank-1 covariance.
        let est = Estimate::new(
            syms(2),
            vec![0.1, 0.2],
            vec![vec![0.01, 0.02], vec![0.02, 0.04]],
        );
        assert!(matches!(
            EfficientFrontier::new(&est, OptimizerConfig::default()),
            Err(PortfolioError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn zero_variance_asset_is_degenerate() {
        let est = Estimate::new(
            syms(2),
            vec![0.1, 0.0],
            vec![vec![0.01, 0.0], vec![0.0, 0.0]],
        );
        assert!(matches!(
            EfficientFrontier::new(&est, OptimizerConfig::default()),
            Err(PortfolioError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn asymmetric_covariance_is_degenerate() {
        let est = Estimate::new(
            syms(2),
            vec![0.1, 0.1],
            vec![vec![0.04, 0.01], vec![0.0, 0.04]],
        );
        assert!(matches!(
            EfficientFrontier::new(&est, OptimizerConfig::default()),
            Err(PortfolioError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn shape_mismatch_and_single_asset() {
        let est = Estimate::new(syms(2), vec![0.1], vec![vec![0.04, 0.0], vec![0.0, 0.04]]);
        assert!(matches!(
            EfficientFrontier::new(&est, OptimizerConfig::default()),
            Err(PortfolioError::DegenerateInput { .. })
        ));

        let est = Estimate::new(syms(1), vec![0.1], vec![vec![0.04]]);
        assert!(matches!(
            EfficientFrontier::new(&est, OptimizerConfig::default()),
            Err(PortfolioError::InsufficientData { .. })
        ));
    }

    #[test]
    fn no_positive_excess_return_is_degenerate() {
        let cfg = OptimizerConfig {
            risk_free_rate: 0.2,
            ..OptimizerConfig::default()
        };
        let ef = EfficientFrontier::new(&sample_estimate(), cfg).unwrap();
        assert!(matches!(
            ef.max_sharpe(),
            Err(PortfolioError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn exhausted_budget_is_non_convergence() {
        let cfg = OptimizerConfig {
            max_iterations: 1,
            tolerance: 0.0,
            ..OptimizerConfig::default()
        };
        let ef = EfficientFrontier::new(&sample_estimate(), cfg).unwrap();
        assert!(matches!(
            ef.max_sharpe(),
            Err(PortfolioError::NonConvergence { iterations: 1, .. })
        ));
    }

    #[test]
    fn performance_of_single_asset_portfolio() {
        let ef = EfficientFrontier::new(&sample_estimate(), OptimizerConfig::default()).unwrap();
        let w = Weights::new(syms(4), vec![1.0, 0.0, 0.0, 0.0]);
        let p = ef.portfolio_performance(&w).unwrap();
        assert!((p.expected_return - 0.12).abs() < 1e-12);
        assert!((p.volatility - 0.2).abs() < 1e-12);
        assert!((p.sharpe.unwrap() - 0.6).abs() < 1e-12);
        assert!(format!("{p}").contains("Sharpe ratio"));
    }

    #[test]
    fn performance_rejects_foreign_weights() {
        let ef = EfficientFrontier::new(&sample_estimate(), OptimizerConfig::default()).unwrap();
        let w = Weights::equal(syms(3));
        assert!(ef.portfolio_performance(&w).is_err());
    }

    /// Sharpe ratio cannot be raised by moving a little weight between any
    /// two assets.
    fn assert_sharpe_optimal(ef: &EfficientFrontier, w: &Weights) {
        let cap = ef.config().max_weight;
        let base = ef.portfolio_performance(w).unwrap().sharpe.unwrap();
        let n = w.len();
        for i in 0..n {
            for j in 0..n {
                let mut v = w.values().to_vec();
                let delta = 1e-4_f64.min(v[j]).min(cap - v[i]);
                if i == j || delta <= 0.0 {
                    continue;
                }
                v[i] += delta;
                v[j] -= delta;
                let moved = ef
                    .portfolio_performance(&Weights::new(w.symbols().to_vec(), v))
                    .unwrap()
                    .sharpe
                    .unwrap();
                assert!(moved <= base + 1e-10, "moving {j}->{i}: {moved} > {base}");
            }
        }
    }

    /// One-factor covariance with idiosyncratic noise, from a xorshift32 seed.
    fn factor_estimate(seed: u32, n: usize) -> Estimate {
        let mut state = seed.max(1);
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            f64::from(state % 10_000) / 10_000.0
        };
        let market_vol = 0.16;
        let beta: Vec<f64> = (0..n).map(|_| 0.6 + 0.8 * next()).collect();
        let idio: Vec<f64> = (0..n).map(|_| 0.08 + 0.22 * next()).collect();
        let mu: Vec<f64> = (0..n).map(|_| -0.02 + 0.18 * next()).collect();
        let cov = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let common = beta[i] * beta[j] * market_vol * market_vol;
                        if i == j { common + idio[i] * idio[i] } else { common }
                    })
                    .collect()
            })
            .collect();
        Estimate::new(syms(n), mu, cov)
    }

    #[test]
    fn max_sharpe_converges_on_highly_correlated_assets() {
        let vols = [0.18, 0.21, 0.24, 0.27, 0.30];
        let cov = (0..5)
            .map(|i| {
                (0..5)
                    .map(|j| {
                        let rho = if i == j { 1.0 } else { 0.95 };
                        rho * vols[i] * vols[j]
                    })
                    .collect()
            })
            .collect();
        let est = Estimate::new(syms(5), vec![0.07, 0.08, 0.095, 0.11, 0.12], cov);
        let ef = EfficientFrontier::new(&est, OptimizerConfig::default()).unwrap();

        let w = ef.max_sharpe().unwrap();
        assert_valid_weights(&w, 5);
        assert_sharpe_optimal(&ef, &w);

        let v = ef.min_volatility().unwrap();
        assert_valid_weights(&v, 5);
    }

    #[test]
    fn ten_asset_factor_baskets_converge() {
        for seed in 1..=40 {
            let est = factor_estimate(seed, 10);
            for max_weight in [1.0, 0.25] {
                let cfg = OptimizerConfig {
                    max_weight,
                    ..OptimizerConfig::default()
                };
                let ef = EfficientFrontier::new(&est, cfg).unwrap();
                let w = ef
                    .max_sharpe()
                    .unwrap_or_else(|e| panic!("seed {seed} cap {max_weight}: {e}"));
                assert_valid_weights(&w, 10);
                assert!(w.values().iter().all(|x| *x <= max_weight + 1e-9));
                assert_sharpe_optimal(&ef, &w);

                let v = ef
                    .min_volatility()
                    .unwrap_or_else(|e| panic!("seed {seed} cap {max_weight}: {e}"));
                assert_valid_weights(&v, 10);
                let eq = ef
                    .portfolio_performance(&Weights::equal(est.symbols.clone()))
                    .unwrap();
                assert!(ef.portfolio_performance(&v).unwrap().volatility <= eq.volatility + 1e-12);
            }
        }
    }

    #[test]
    fn min_volatility_respects_cap() {
        let est = Estimate::new(
            syms(3),
            vec![0.1, 0.1, 0.1],
            vec![
                vec![0.01, 0.0, 0.0],
                vec![0.0, 0.04, 0.0],
                vec![0.0, 0.0, 0.09],
            ],
        );
        let cfg = OptimizerConfig {
            max_weight: 0.5,
            ..OptimizerConfig::default()
        };
        let w = EfficientFrontier::new(&est, cfg)
            .unwrap()
            .min_volatility()
            .unwrap();
        assert_valid_weights(&w, 3);
        assert!((w.values()[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn capped_basket_without_positive_excess_is_degenerate() {
        // The only asset above the risk-free rate may hold at most half.
        let est = Estimate::new(
            syms(2),
            vec![0.10, -0.20],
            vec![vec![0.04, 0.0], vec![0.0, 0.04]],
        );
        let cfg = OptimizerConfig {
            max_weight: 0.5,
            ..OptimizerConfig::default()
        };
        let ef = EfficientFrontier::new(&est, cfg).unwrap();
        assert!(matches!(
            ef.max_sharpe(),
            Err(PortfolioError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn best_linear_fills_largest_first() {
        assert_eq!(best_linear(&[0.1, 0.3, 0.2], 1.0), vec![0.0, 1.0, 0.0]);
        assert_eq!(best_linear(&[0.1, 0.3, 0.2], 0.5), vec![0.0, 0.5, 0.5]);
        assert_eq!(best_linear(&[0.2, 0.2], 1.0), vec![1.0, 0.0]);
    }

    struct StalledSolver;

    impl Solver for StalledSolver {
        fn solve(
            &self,
            _objective: &dyn Objective,
            _constraints: &Constraints,
        ) -> std::result::Result<crate::solver::SolveOutcome, SolveError> {
            Err(SolveError::Stalled {
                iterations: 7,
                residual: 0.5,
            })
        }
    }

    #[test]
    fn stalled_solver_is_non_convergence() {
        let ef = EfficientFrontier::new(&sample_estimate(), OptimizerConfig::default())
            .unwrap()
            .with_solver(StalledSolver);
        assert!(matches!(
            ef.min_volatility(),
            Err(PortfolioError::NonConvergence { iterations: 7, .. })
        ));
    }

    #[test]
    fn projected_gradient_agrees_with_active_set() {
        let est = sample_estimate();
        let exact = EfficientFrontier::new(&est, OptimizerConfig::default())
            .unwrap()
            .max_sharpe()
            .unwrap();
        let iterative = EfficientFrontier::new(&est, OptimizerConfig::default())
            .unwrap()
            .with_solver(crate::solver::ProjectedGradient::default())
            .max_sharpe()
            .unwrap();
        for (a, b) in exact.values().iter().zip(iterative.values()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    struct EqualWeightSolver;

    impl Solver for EqualWeightSolver {
        fn solve(
            &self,
            objective: &dyn Objective,
            _constraints: &Constraints,
        ) -> std::result::Result<crate::solver::SolveOutcome, SolveError> {
            let n = objective.dimension();
            let w = vec![1.0 / n as f64; n];
            Ok(crate::solver::SolveOutcome {
                objective: objective.value(&w),
                weights: w,
                iterations: 0,
            })
        }
    }

    #[test]
    fn solver_is_swappable() {
        let ef = EfficientFrontier::new(&sample_estimate(), OptimizerConfig::default())
            .unwrap()
            .with_solver(EqualWeightSolver);
        let w = ef.max_sharpe().unwrap();
        assert!(w.values().iter().all(|x| (*x - 0.25).abs() < 1e-15));
    }
}
