//! Augmented Lagrangian solver for the relaxed assignment problem.
//!
//! The equality constraints are moved into the objective,
//!
//! ```text
//! L(z; λ, μ) = f(z) + λᵀ c(z) + μ/2 |c(z)|²,    c(z) = A z - b,
//! ```
//!
//! and `L` is minimized over the box `0 <= z <= ub` by projected gradient
//! descent with Barzilai-Borwein steps and Armijo backtracking. After each
//! inner solve the multipliers are updated, `λ += μ c(z)`, and the penalty
//! `μ` grows whenever the constraint violation did not shrink enough.
//! Only sparse products with the quadratic terms and the constraint
//! matrix are needed.

use std::time::{Duration, Instant};

use nalgebra::DVector;
use serde::Serialize;
use tracing::{debug, trace};

use super::objective::RelaxedAssignment;

/// Sufficient decrease constant for Armijo backtracking.
const ARMIJO_C1: f64 = 1e-4;

/// Violation must fall below this fraction of the previous one to keep `μ`.
const VIOLATION_DECREASE: f64 = 0.25;

/// Solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NlpConfig {
    /// Maximum absolute constraint residual accepted as feasible.
    pub constraint_tolerance: f64,

    /// Inner solves stop once the projected gradient step is below this.
    pub inner_tolerance: f64,

    /// Maximum projected gradient step accepted at the final iterate.
    pub optimality_tolerance: f64,

    /// Maximum multiplier updates.
    pub max_outer_iterations: usize,

    /// Maximum projected gradient steps per inner solve.
    pub max_inner_iterations: usize,

    /// Starting penalty `μ`.
    pub initial_penalty: f64,

    /// Factor applied to `μ` when the violation stalls.
    pub penalty_growth: f64,

    /// Cap on `μ`.
    pub max_penalty: f64,

    /// Wall-clock budget for one solve.
    #[serde(with = "duration_secs")]
    pub max_time: Duration,
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            constraint_tolerance: 1e-6,
            inner_tolerance: 1e-6,
            optimality_tolerance: 1e-3,
            max_outer_iterations: 50,
            max_inner_iterations: 2000,
            initial_penalty: 100.0,
            penalty_growth: 10.0,
            max_penalty: 1e12,
            max_time: Duration::from_secs(1000),
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// How a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NlpStatus {
    /// Feasible and stationary within tolerance.
    Success,
    /// Outer iteration budget exhausted.
    MaxIterations,
    /// Wall-clock budget exhausted.
    Timeout,
    /// No point satisfies the constraints.
    Infeasible,
}

impl NlpStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, NlpStatus::Success)
    }
}

/// Result of [`AugmentedLagrangian::solve`].
#[derive(Debug, Clone)]
pub struct NlpResult {
    pub status: NlpStatus,
    /// Last iterate (the starting point if the problem is infeasible).
    pub solution: DVector<f64>,
    pub objective: f64,
    /// Maximum absolute constraint residual at `solution`.
    pub constraint_violation: f64,
    /// Projected gradient step of the Lagrangian at `solution`.
    pub stationarity: f64,
    pub outer_iterations: usize,
    pub inner_iterations: usize,
}

/// Box-constrained augmented Lagrangian method.
#[derive(Debug, Clone, Default)]
pub struct AugmentedLagrangian {
    config: NlpConfig,
}

struct Lagrangian<'a> {
    problem: &'a RelaxedAssignment,
    multipliers: DVector<f64>,
    penalty: f64,
}

impl Lagrangian<'_> {
    fn value(&self, z: &DVector<f64>) -> f64 {
        let c = self.problem.constraint_residual(z);
        self.problem.objective(z) + self.multipliers.dot(&c) + 0.5 * self.penalty * c.norm_squared()
    }

    fn gradient(&self, z: &DVector<f64>) -> DVector<f64> {
        let c = self.problem.constraint_residual(z);
        let y = &self.multipliers + c * self.penalty;
        self.problem.gradient(z) + self.problem.constraint_transpose(&y)
    }
}

fn project(z: &DVector<f64>, upper: &DVector<f64>) -> DVector<f64> {
    z.zip_map(upper, |v, ub| v.clamp(0.0, ub))
}

/// `|P(z - g) - z|∞`, zero exactly at box-constrained stationary points.
fn projected_gradient_norm(z: &DVector<f64>, g: &DVector<f64>, upper: &DVector<f64>) -> f64 {
    (project(&(z - g), upper) - z).amax()
}

impl AugmentedLagrangian {
    pub fn new(config: NlpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NlpConfig {
        &self.config
    }

    /// Minimize the relaxed assignment objective.
    pub fn solve(&self, problem: &RelaxedAssignment) -> NlpResult {
        let cfg = &self.config;
        let start = Instant::now();

        let Some(mut z) = problem.initial_point() else {
            return NlpResult {
                status: NlpStatus::Infeasible,
                solution: DVector::zeros(problem.num_variables()),
                objective: 0.0,
                constraint_violation: f64::INFINITY,
                stationarity: f64::INFINITY,
                outer_iterations: 0,
                inner_iterations: 0,
            };
        };

        let upper = problem.upper_bounds();
        let base_step = 1.0 / (problem.source_len() + problem.target_len()) as f64;
        let mut lagrangian = Lagrangian {
            problem,
            multipliers: DVector::zeros(problem.num_constraints()),
            penalty: cfg.initial_penalty,
        };

        let mut status = NlpStatus::MaxIterations;
        let mut previous_violation = f64::INFINITY;
        let mut violation = f64::INFINITY;
        let mut stationarity = f64::INFINITY;
        let mut outer_iterations = 0;
        let mut inner_iterations = 0;

        while outer_iterations < cfg.max_outer_iterations {
            if start.elapsed() > cfg.max_time {
                status = NlpStatus::Timeout;
                break;
            }
            outer_iterations += 1;

            let (next, steps, pg) =
                self.minimize_on_box(&lagrangian, z, &upper, base_step / lagrangian.penalty);
            z = next;
            inner_iterations += steps;
            stationarity = pg;

            let residual = problem.constraint_residual(&z);
            violation = residual.amax();
            trace!(
                outer_iterations,
                steps,
                violation,
                stationarity,
                penalty = lagrangian.penalty,
                "augmented Lagrangian iteration"
            );

            lagrangian.multipliers += residual * lagrangian.penalty;

            if violation <= cfg.constraint_tolerance && stationarity <= cfg.optimality_tolerance {
                status = NlpStatus::Success;
                break;
            }
            if violation > VIOLATION_DECREASE * previous_violation {
                lagrangian.penalty = (lagrangian.penalty * cfg.penalty_growth).min(cfg.max_penalty);
            }
            previous_violation = violation;
        }

        let objective = problem.objective(&z);
        debug!(
            ?status,
            objective, violation, outer_iterations, inner_iterations, "relaxed assignment solved"
        );
        NlpResult {
            status,
            solution: z,
            objective,
            constraint_violation: violation,
            stationarity,
            outer_iterations,
            inner_iterations,
        }
    }

    /// Projected gradient descent on `L` over the box.
    ///
    /// # Returns
    /// Final iterate, number of steps taken, and its projected gradient norm.
    fn minimize_on_box(
        &self,
        lagrangian: &Lagrangian<'_>,
        mut z: DVector<f64>,
        upper: &DVector<f64>,
        fallback_step: f64,
    ) -> (DVector<f64>, usize, f64) {
        let mut value = lagrangian.value(&z);
        let mut grad = lagrangian.gradient(&z);
        let mut step = fallback_step;
        let mut pg = projected_gradient_norm(&z, &grad, upper);

        let mut steps = 0;
        while steps < self.config.max_inner_iterations && pg > self.config.inner_tolerance {
            steps += 1;

            let mut trial_step = step;
            let (candidate, direction, candidate_value) = loop {
                let candidate = project(&(&z - &grad * trial_step), upper);
                let direction = &candidate - &z;
                let candidate_value = lagrangian.value(&candidate);
                if candidate_value <= value + ARMIJO_C1 * grad.dot(&direction)
                    || trial_step < 1e-16
                {
                    break (candidate, direction, candidate_value);
                }
                trial_step *= 0.5;
            };
            if direction.amax() == 0.0 {
                break;
            }

            let next_grad = lagrangian.gradient(&candidate);
            let sy = direction.dot(&(&next_grad - &grad));
            let ss = direction.norm_squared();
            step = if sy > 1e-16 { ss / sy } else { fallback_step };
            step = step.clamp(1e-12, 1e6);

            z = candidate;
            grad = next_grad;
            value = candidate_value;
            pg = projected_gradient_norm(&z, &grad, upper);
        }

        (z, steps, pg)
    }
}
