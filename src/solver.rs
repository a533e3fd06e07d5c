//! Constrained solver abstraction for long-only, fully-invested problems.
//!
//! The optimizer describes *what* to maximize through [`Objective`] and the
//! feasible set through [`Constraints`]; a [`Solver`] decides *how*.
//!
//! - [`ActiveSet`] is the default. It solves the convex quadratic program an
//!   objective exposes through [`Objective::quadratic`] exactly, with a
//!   primal active-set method on the KKT system.
//! - [`ProjectedGradient`] works on any smooth objective: gradient ascent
//!   with Barzilai–Borwein step lengths and Armijo backtracking, projecting
//!   every trial point back onto the (capped) simplex
//!   `{ w : Σw = 1, 0 ≤ w ≤ max_weight }`.

use log::debug;

/// A smooth function of the weight vector to be maximized.
pub trait Objective {
    /// Number of decision variables.
    fn dimension(&self) -> usize;

    /// Objective value at `w`.
    fn value(&self, w: &[f64]) -> f64;

    /// Gradient at `w`, written into `grad` (length `dimension()`).
    fn gradient(&self, w: &[f64], grad: &mut [f64]);

    /// An equivalent convex quadratic program over `constraints`, if the
    /// objective has one.
    fn quadratic(&self, _constraints: &Constraints) -> Option<QuadraticProgram> {
        None
    }
}

/// `coefficients · x ≤ bound` (or `=` for equalities).
#[derive(Clone, Debug, PartialEq)]
pub struct LinearConstraint {
    pub coefficients: Vec<f64>,
    pub bound: f64,
}

impl LinearConstraint {
    pub fn new(coefficients: Vec<f64>, bound: f64) -> Self {
        Self {
            coefficients,
            bound,
        }
    }
}

/// `min ½ xᵀQx + cᵀx` subject to `Ax = b` and `Gx ≤ h`, with `Q` positive
/// definite.
///
/// Weights are recovered as `x / Σx`, so a program may solve for any
/// positive multiple of the weight vector.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadraticProgram {
    pub q: Vec<Vec<f64>>,
    pub c: Vec<f64>,
    pub equalities: Vec<LinearConstraint>,
    pub inequalities: Vec<LinearConstraint>,
    /// A feasible starting point.
    pub start: Vec<f64>,
}

/// Feasible set: weights sum to one, each in `[0, max_weight]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Constraints {
    pub max_weight: f64,
}

impl Constraints {
    /// Plain long-only simplex.
    pub fn long_only() -> Self {
        Self { max_weight: 1.0 }
    }

    /// True when the set is non-empty for `n` assets.
    pub fn is_feasible(&self, n: usize) -> bool {
        n > 0 && self.max_weight > 0.0 && self.max_weight * n as f64 >= 1.0 - 1e-12
    }

    /// Euclidean projection of `v` onto the feasible set.
    pub fn project(&self, v: &[f64]) -> Vec<f64> {
        if self.max_weight >= 1.0 {
            project_simplex(v)
        } else {
            project_capped_simplex(v, self.max_weight)
        }
    }

    /// The feasible point closest to equal weighting (equal weights always fit).
    pub fn starting_point(&self, n: usize) -> Vec<f64> {
        vec![1.0 / n as f64; n]
    }

    /// Bounds on the weights themselves: `-w_i ≤ 0`, and `w_i ≤ max_weight`
    /// when the cap binds.
    pub fn weight_rows(&self, n: usize) -> Vec<LinearConstraint> {
        let mut rows: Vec<LinearConstraint> = (0..n)
            .map(|i| LinearConstraint::new(unit(n, i, -1.0), 0.0))
            .collect();
        if self.max_weight < 1.0 {
            rows.extend((0..n).map(|i| LinearConstraint::new(unit(n, i, 1.0), self.max_weight)));
        }
        rows
    }

    /// The same bounds on a positive multiple `y = t·w`: `-y_i ≤ 0`, and
    /// `y_i - max_weight·Σy ≤ 0` when the cap binds.
    pub fn scaled_rows(&self, n: usize) -> Vec<LinearConstraint> {
        let mut rows: Vec<LinearConstraint> = (0..n)
            .map(|i| LinearConstraint::new(unit(n, i, -1.0), 0.0))
            .collect();
        if self.max_weight < 1.0 {
            rows.extend((0..n).map(|i| {
                let mut coefficients = vec![-self.max_weight; n];
                coefficients[i] += 1.0;
                LinearConstraint::new(coefficients, 0.0)
            }));
        }
        rows
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Self::long_only()
    }
}

fn unit(n: usize, i: usize, value: f64) -> Vec<f64> {
    let mut v = vec![0.0; n];
    v[i] = value;
    v
}

/// Successful solver result.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveOutcome {
    pub weights: Vec<f64>,
    pub iterations: usize,
    pub objective: f64,
}

/// Solver failure.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SolveError {
    #[error("constraint set is empty for {0} assets")]
    Infeasible(usize),
    #[error("objective is not finite at the starting point")]
    NonFinite,
    #[error("KKT system is singular")]
    Singular,
    #[error("iteration budget of {iterations} exhausted (step residual {residual:e})")]
    IterationLimit { iterations: usize, residual: f64 },
    #[error("line search stalled after {iterations} iterations (step residual {residual:e})")]
    Stalled { iterations: usize, residual: f64 },
}

/// A strategy that maximizes an objective over the constraint set.
pub trait Solver {
    fn solve(
        &self,
        objective: &dyn Objective,
        constraints: &Constraints,
    ) -> Result<SolveOutcome, SolveError>;
}

/// Primal active-set method for the objective's quadratic program.
///
/// Each iteration solves the equality-constrained subproblem on the current
/// working set through its KKT system, then either steps to the nearest
/// blocking constraint or, at a subproblem optimum, releases the constraint
/// with the most negative multiplier. The result is optimal once every
/// multiplier is non-negative. Both tests are relative: the step against
/// `max(1, ‖x‖∞)`, the multipliers against `max(1, ‖∇‖∞)`.
///
/// Objectives without a quadratic form are handed to [`ProjectedGradient`]
/// with the same budget and tolerance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveSet {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ActiveSet {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-9,
        }
    }
}

impl Solver for ActiveSet {
    fn solve(
        &self,
        objective: &dyn Objective,
        constraints: &Constraints,
    ) -> Result<SolveOutcome, SolveError> {
        let n = objective.dimension();
        if !constraints.is_feasible(n) {
            return Err(SolveError::Infeasible(n));
        }

        let Some(program) = objective.quadratic(constraints) else {
            debug!("objective has no quadratic form, falling back to projected gradient");
            let fallback = ProjectedGradient {
                max_iterations: self.max_iterations,
                tolerance: self.tolerance,
                ..ProjectedGradient::default()
            };
            return fallback.solve(objective, constraints);
        };

        let (x, iterations) = solve_qp(&program, self.max_iterations, self.tolerance)?;
        let weights = clean_simplex(x);
        let value = objective.value(&weights);
        if !value.is_finite() {
            return Err(SolveError::NonFinite);
        }
        debug!("active set converged in {iterations} iterations (f={value:.6})");
        Ok(SolveOutcome {
            weights,
            iterations,
            objective: value,
        })
    }
}

fn solve_qp(
    program: &QuadraticProgram,
    max_iterations: usize,
    tolerance: f64,
) -> Result<(Vec<f64>, usize), SolveError> {
    let mut x = program.start.clone();
    let mut working: Vec<usize> = Vec::new();
    let mut residual = f64::INFINITY;

    for iter in 0..max_iterations {
        let grad: Vec<f64> = mat_vec_mul(&program.q, &x)
            .iter()
            .zip(&program.c)
            .map(|(qx, c)| qx + c)
            .collect();
        let rows: Vec<&[f64]> = program
            .equalities
            .iter()
            .chain(working.iter().map(|&i| &program.inequalities[i]))
            .map(|r| r.coefficients.as_slice())
            .collect();
        let (step, multipliers) = kkt_step(&program.q, &rows, &grad).ok_or(SolveError::Singular)?;

        residual = max_abs(&step);
        if residual <= tolerance * max_abs(&x).max(1.0) {
            let floor = -tolerance * max_abs(&grad).max(1.0);
            let release = multipliers[program.equalities.len()..]
                .iter()
                .enumerate()
                .filter(|(_, m)| **m < floor)
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(k, _)| k);
            match release {
                Some(k) => {
                    working.remove(k);
                    continue;
                }
                None => return Ok((x, iter)),
            }
        }

        // Longest step along `step` that keeps every inequality satisfied.
        let mut alpha = 1.0;
        let mut blocking = None;
        for (i, row) in program.inequalities.iter().enumerate() {
            if working.contains(&i) {
                continue;
            }
            let rate = dot(&row.coefficients, &step);
            if rate <= 1e-12 * max_abs(&row.coefficients) * residual {
                continue;
            }
            let slack = (row.bound - dot(&row.coefficients, &x)).max(0.0);
            if slack / rate < alpha {
                alpha = slack / rate;
                blocking = Some(i);
            }
        }

        for (xi, si) in x.iter_mut().zip(&step) {
            *xi += alpha * si;
        }
        if let Some(i) = blocking {
            working.push(i);
        }
    }

    Err(SolveError::IterationLimit {
        iterations: max_iterations,
        residual,
    })
}

/// Solve `[Q Rᵀ; R 0] [p; ν] = [-g; 0]` for the step `p` and multipliers `ν`.
fn kkt_step(q: &[Vec<f64>], rows: &[&[f64]], grad: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = q.len();
    let size = n + rows.len();
    let mut a = vec![vec![0.0; size]; size];
    let mut b = vec![0.0; size];
    for i in 0..n {
        a[i][..n].copy_from_slice(&q[i]);
        b[i] = -grad[i];
    }
    for (k, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            a[n + k][j] = v;
            a[j][n + k] = v;
        }
    }
    let mut solution = solve_linear(a, b)?;
    let multipliers = solution.split_off(n);
    Some((solution, multipliers))
}

/// Gaussian elimination with partial pivoting. `None` when singular.
fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let scale = a.iter().flatten().fold(0.0_f64, |m, x| m.max(x.abs()));
    if scale == 0.0 {
        return None;
    }

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() <= 1e-14 * scale {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        let pivot_row = a[col].clone();
        for r in (col + 1)..n {
            let factor = a[r][col] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            for (x, p) in a[r][col..].iter_mut().zip(&pivot_row[col..]) {
                *x -= factor * p;
            }
            b[r] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for r in (0..n).rev() {
        let s: f64 = ((r + 1)..n).map(|c| a[r][c] * x[c]).sum();
        x[r] = (b[r] - s) / a[r][r];
    }
    Some(x)
}

/// Projected-gradient ascent with Barzilai–Borwein steps and Armijo
/// backtracking.
///
/// Each iteration projects `w + α·∇f(w)` onto the feasible set, with `α`
/// the Barzilai–Borwein estimate of the inverse curvature, and searches
/// along the resulting feasible direction. The solver stops when the
/// projected step at the fixed length `step` is shorter than `tolerance`
/// (infinity norm), which is the first-order optimality condition on the
/// simplex. Accepted steps never decrease the objective, so the result is at
/// least as good as the equal-weight starting point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectedGradient {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub step: f64,
}

impl Default for ProjectedGradient {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-9,
            step: 1.0,
        }
    }
}

/// Sufficient-increase constant for the Armijo test.
const ARMIJO: f64 = 1e-4;
/// Backtracking halvings before the line search gives up.
const MAX_HALVINGS: usize = 60;
/// Bounds on the Barzilai–Borwein step length.
const MIN_STEP: f64 = 1e-10;
const MAX_STEP: f64 = 1e10;
/// A stalled line search counts as converged within this multiple of the
/// tolerance.
const STALL_SLACK: f64 = 1e3;

impl Solver for ProjectedGradient {
    fn solve(
        &self,
        objective: &dyn Objective,
        constraints: &Constraints,
    ) -> Result<SolveOutcome, SolveError> {
        let n = objective.dimension();
        if !constraints.is_feasible(n) {
            return Err(SolveError::Infeasible(n));
        }

        let mut w = constraints.starting_point(n);
        let mut f = objective.value(&w);
        if !f.is_finite() {
            return Err(SolveError::NonFinite);
        }

        let mut grad = vec![0.0; n];
        objective.gradient(&w, &mut grad);
        let mut step = self.step;
        let mut residual = f64::INFINITY;

        for iter in 0..self.max_iterations {
            let stationary = constraints.project(&shifted(&w, &grad, self.step));
            residual = max_abs_diff(&stationary, &w);
            if residual <= self.tolerance {
                debug!("projected gradient converged in {iter} iterations (f={f:.6})");
                return Ok(SolveOutcome {
                    weights: clean_simplex(w),
                    iterations: iter,
                    objective: f,
                });
            }

            let target = constraints.project(&shifted(&w, &grad, step));
            let direction: Vec<f64> = target.iter().zip(&w).map(|(t, wi)| t - wi).collect();
            let slope = dot(&grad, &direction);

            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_HALVINGS {
                let trial = shifted(&w, &direction, alpha);
                let f_trial = objective.value(&trial);
                if f_trial.is_finite() && f_trial >= f + ARMIJO * alpha * slope {
                    accepted = Some((trial, f_trial));
                    break;
                }
                alpha *= 0.5;
            }

            let Some((trial, f_trial)) = accepted else {
                if residual <= STALL_SLACK * self.tolerance {
                    debug!("line search stalled at iteration {iter} (residual {residual:e})");
                    return Ok(SolveOutcome {
                        weights: clean_simplex(w),
                        iterations: iter,
                        objective: f,
                    });
                }
                return Err(SolveError::Stalled {
                    iterations: iter,
                    residual,
                });
            };

            let mut next_grad = vec![0.0; n];
            objective.gradient(&trial, &mut next_grad);
            let s: Vec<f64> = trial.iter().zip(&w).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = next_grad.iter().zip(&grad).map(|(a, b)| a - b).collect();
            // Ascent: curvature along s is -sᵀy.
            let curvature = -dot(&s, &y);
            step = if curvature > 0.0 {
                (dot(&s, &s) / curvature).clamp(MIN_STEP, MAX_STEP)
            } else {
                self.step
            };

            w = trial;
            f = f_trial;
            grad = next_grad;
        }

        Err(SolveError::IterationLimit {
            iterations: self.max_iterations,
            residual,
        })
    }
}

fn shifted(w: &[f64], d: &[f64], alpha: f64) -> Vec<f64> {
    w.iter().zip(d).map(|(wi, di)| wi + alpha * di).collect()
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |m, x| m.max(x.abs()))
}

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).fold(0.0_f64, |m, (x, y)| m.max((x - y).abs()))
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn mat_vec_mul(matrix: &[Vec<f64>], vec: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(vec).map(|(a, b)| a * b).sum::<f64>())
        .collect()
}

/// Clamp round-off negatives to zero and renormalize to sum 1.
fn clean_simplex(mut w: Vec<f64>) -> Vec<f64> {
    for x in &mut w {
        if !x.is_finite() || *x < 0.0 {
            *x = 0.0;
        }
    }
    let sum: f64 = w.iter().sum();
    if sum > 0.0 {
        for x in &mut w {
            *x /= sum;
        }
    }
    w
}

/// Projection onto `{ w : Σw = 1, w ≥ 0 }` (sort-based, Duchi et al.).
fn project_simplex(v: &[f64]) -> Vec<f64> {
    if v.is_empty() {
        return Vec::new();
    }

    let mut u = v.to_vec();
    u.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut cssv = 0.0;
    let mut rho = 0_usize;
    let mut theta = 0.0;
    for (i, ui) in u.iter().enumerate() {
        cssv += *ui;
        let t = (cssv - 1.0) / (i as f64 + 1.0);
        if *ui - t > 0.0 {
            rho = i + 1;
            theta = t;
        }
    }

    if rho == 0 {
        return vec![1.0 / v.len() as f64; v.len()];
    }

    v.iter().map(|x| (x - theta).max(0.0)).collect()
}

/// Projection onto `{ w : Σw = 1, 0 ≤ w ≤ cap }` by bisection on the shift.
fn project_capped_simplex(v: &[f64], cap: f64) -> Vec<f64> {
    let clipped_sum = |theta: f64| -> f64 { v.iter().map(|x| (x - theta).clamp(0.0, cap)).sum() };

    let max = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = v.iter().copied().fold(f64::INFINITY, f64::min);
    // At lo every coordinate is at the cap (sum ≥ 1), at hi every one is 0.
    let mut lo = min - cap;
    let mut hi = max;

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if clipped_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-15 * (1.0 + hi.abs()) {
            break;
        }
    }

    let theta = 0.5 * (lo + hi);
    v.iter().map(|x| (x - theta).clamp(0.0, cap)).collect()
}
