//! Box-constrained L-BFGS through a log-barrier reformulation.
//!
//! The constrained objective is replaced by `f(x) - w * sum ln(distance to
//! each finite bound)`, which is `+inf` outside the open box, and minimized
//! with the unconstrained [`Lbfgs`] on central-difference gradients. The
//! minimizer of the penalized objective is biased by the barrier, so the
//! weight is shrunk between warm-started rounds and the reported value is the
//! unpenalized objective at the final point.

use ndarray::Array1;

use crate::bounds::BoxSpec;
use crate::finite_diff::{DEFAULT_STEP, with_numerical_gradient};
use crate::lbfgs::Lbfgs;
use crate::solution::{Minimum, MinimizeError};

/// Factor applied to the barrier weight after each round.
const BARRIER_DECAY: f64 = 1e-2;

/// L-BFGS honoring box constraints.
pub struct BoundedLbfgs<ObjFn> {
    x0: Array1<f64>,
    obj_fn: ObjFn,
    bounds: BoxSpec,
    tolerance: f64,
    max_iterations: usize,
    history_size: usize,
    barrier_weight: f64,
    barrier_rounds: usize,
    gradient_step: f64,
}

impl<ObjFn> BoundedLbfgs<ObjFn>
where
    ObjFn: FnMut(&Array1<f64>) -> f64,
{
    /// Creates a bounded solver for a value-only objective.
    pub fn new(x0: Array1<f64>, obj_fn: ObjFn, bounds: BoxSpec) -> Self {
        Self {
            x0,
            obj_fn,
            bounds,
            tolerance: 1e-10,
            max_iterations: 1000,
            history_size: 10,
            barrier_weight: 1e-6,
            barrier_rounds: 3,
            gradient_step: DEFAULT_STEP,
        }
    }

    /// Gradient-norm tolerance of each round (default: 1e-10).
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Iteration limit of each round (default: 1000).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Curvature pairs kept by the inner L-BFGS (default: 10).
    pub fn with_history_size(mut self, history_size: usize) -> Self {
        self.history_size = history_size.max(1);
        self
    }

    /// Initial barrier weight (default: 1e-6).
    pub fn with_barrier_weight(mut self, weight: f64) -> Self {
        self.barrier_weight = weight;
        self
    }

    /// Number of warm-started rounds, each shrinking the weight 100x (default: 3).
    pub fn with_barrier_rounds(mut self, rounds: usize) -> Self {
        self.barrier_rounds = rounds.max(1);
        self
    }

    /// Step of the central-difference gradient (default: 1e-8).
    pub fn with_gradient_step(mut self, step: f64) -> Self {
        self.gradient_step = step;
        self
    }

    pub fn run(&mut self) -> Result<Minimum, MinimizeError> {
        let mut x = if self.bounds.contains_strictly(&self.x0) {
            self.x0.clone()
        } else {
            self.bounds.project(&self.x0)
        };
        let mut iterations = 0;
        let mut func_evals = 0;
        let mut pending: Option<MinimizeError> = None;

        for round in 0..self.barrier_rounds {
            let weight = self.barrier_weight * BARRIER_DECAY.powi(round as i32);
            let bounds = &self.bounds;
            let obj_fn = &mut self.obj_fn;
            let penalized = |p: &Array1<f64>| {
                let barrier = bounds.barrier(p, weight);
                if barrier.is_finite() {
                    obj_fn(p) + barrier
                } else {
                    f64::INFINITY
                }
            };
            let gradient = with_numerical_gradient(penalized, self.gradient_step);
            let outcome = Lbfgs::new(x.clone(), gradient)
                .with_tolerance(self.tolerance)
                .with_max_iterations(self.max_iterations)
                .with_history_size(self.history_size)
                .run();

            match outcome {
                Ok(min) => {
                    iterations += min.iterations;
                    func_evals += min.func_evals;
                    x = min.final_point;
                    pending = None;
                }
                Err(err) => match err.last_solution() {
                    Some(min) => {
                        iterations += min.iterations;
                        func_evals += min.func_evals;
                        x = min.final_point.clone();
                        log::debug!(
                            "[L-BFGS-B] Round {round} (w = {weight:.1e}) ended early: {err}"
                        );
                        pending = Some(err);
                    }
                    None if round == 0 => return Err(err),
                    None => {
                        log::debug!(
                            "[L-BFGS-B] Round {round} failed: {err}; keeping previous round"
                        );
                        break;
                    }
                },
            }
        }

        let final_value = (self.obj_fn)(&x);
        func_evals += 1;
        let minimum = Minimum {
            final_point: x,
            final_value,
            iterations,
            func_evals,
        };
        match pending {
            None => Ok(minimum),
            Some(MinimizeError::LineSearchFailed { max_attempts, .. }) => {
                Err(MinimizeError::LineSearchFailed {
                    last_solution: Box::new(minimum),
                    max_attempts,
                })
            }
            Some(MinimizeError::GradientIsNaN { .. }) => Err(MinimizeError::GradientIsNaN {
                last_solution: Box::new(minimum),
            }),
            Some(_) => Err(MinimizeError::MaxIterationsReached {
                last_solution: Box::new(minimum),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use spectral::prelude::*;

    #[test]
    fn interior_minimum_is_found_without_bias() {
        let f = |x: &Array1<f64>| (x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2);
        let min = BoundedLbfgs::new(array![1.0, 0.0], f, BoxSpec::positive_scale(2))
            .with_tolerance(1e-8)
            .run()
            .unwrap();
        assert_that!(&min.final_point[0]).is_close_to(3.0, 1e-6);
        assert_that!(&min.final_point[1]).is_close_to(-1.0, 1e-6);
        assert_that!(&min.final_value).is_close_to(0.0, 1e-10);
        // Each warm-started round only needs a handful of steps.
        assert_that!(&min.iterations).is_less_than(100);
    }

    #[test]
    fn minimum_beyond_the_bound_stays_feasible() {
        // Unconstrained minimum at x = -2 lies outside x > 0.
        let f = |x: &Array1<f64>| (x[0] + 2.0).powi(2);
        let result = BoundedLbfgs::new(array![1.0], f, BoxSpec::positive_scale(1))
            .with_max_iterations(200)
            .run();
        let min = match result {
            Ok(min) => min,
            Err(err) => err.into_last_solution().expect("a feasible point"),
        };
        assert_that!(&min.final_point[0]).is_greater_than(0.0);
        assert_that!(&min.final_point[0]).is_less_than(1e-3);
    }

    #[test]
    fn infeasible_start_is_projected_inside() {
        let f = |x: &Array1<f64>| (x[0] - 0.5).powi(2);
        let min = BoundedLbfgs::new(array![-4.0], f, BoxSpec::positive_scale(1))
            .with_tolerance(1e-8)
            .run()
            .unwrap();
        assert_that!(&min.final_point[0]).is_close_to(0.5, 1e-5);
        assert_that!(&min.iterations).is_less_than(100);
    }
}
