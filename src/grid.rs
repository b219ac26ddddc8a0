//! Grid search over the scale factor, with closed-form segment totals.
//!
//! A fully fixed signature leaves `x` as the only unknown. Its linear/rooted
//! optimum has a closed form ([`analytic_fdr_x`]), which seeds a coarse then
//! fine grid over `x` on the true objective, so any domain or comparison
//! model is honored. With exactly one free segment the solver alternates a
//! closed-form segment total for the current `x` with a line search over `x`.
//! More free segments have no closed form and fall back to [`BoundedLbfgs`].

use ndarray::{Array1, array};

use crate::barrier::BoundedLbfgs;
use crate::bounds::BoxSpec;
use crate::error_model::{ComparisonModel, Domain};
use crate::powell::golden_section;
use crate::problem::Problem;
use crate::solution::{Minimum, MinimizeError};

/// The coarse grid spans `[center / 10, center * 10]`.
const GRID_SPAN: f64 = 10.0;

/// Closed-form `x` minimizing the linear/rooted error of a fully fixed chord.
///
/// With `u = 1/x` every residual `1 + D_i u - f_i` is linear in `u`, so the
/// least-squares optimum is `u = sum D_i (f_i - 1) / sum D_i^2`. `ratios`
/// excludes the root and pairs up with `cumulative_deltas`. Returns `None`
/// when the optimum is not a positive finite `x`.
pub fn analytic_fdr_x(ratios: &[f64], cumulative_deltas: &[f64]) -> Option<f64> {
    let (num, den) = ratios
        .iter()
        .zip(cumulative_deltas)
        .fold((0.0, 0.0), |(num, den), (f, d)| (num + d * (f - 1.0), den + d * d));
    let u = num / den;
    let x = 1.0 / u;
    (u > 0.0 && x.is_finite()).then_some(x)
}

/// Closed-form total of the single free segment at a given `x`, minimizing
/// the linear/rooted error.
///
/// Every cumulative delta is `A_i + c_i y` with `c_i` the share of the
/// segment lying below note `i`, so the residuals are linear in `y` and
/// `y = -x * sum a_i c_i / sum c_i^2` with `a_i = 1 + A_i/x - f_i`.
pub fn closed_form_segment_total(problem: &Problem, x: f64) -> Option<f64> {
    if problem.layout().free_count() != 1 || !(x > 0.0 && x.is_finite()) {
        return None;
    }
    let fixed = problem.cumulative_deltas(&array![x, 0.0]);
    let unit = problem.cumulative_deltas(&array![x, 1.0]);
    let observed = &problem.observed()[1..];

    let (mut num, mut den) = (0.0, 0.0);
    for ((a_cum, u_cum), f) in fixed.iter().zip(&unit).zip(observed) {
        let c = u_cum - a_cum;
        let a = 1.0 + a_cum / x - f;
        num += a * c;
        den += c * c;
    }
    let y = -x * num / den;
    (den > 0.0 && y.is_finite()).then_some(y)
}

/// Grid / closed-form solver over a [`Problem`].
pub struct GridSearch<'a> {
    problem: &'a Problem,
    x0: Array1<f64>,
    tolerance: f64,
    max_iterations: usize,
    points: usize,
    history_size: usize,
    barrier_weight: f64,
    barrier_rounds: usize,
}

impl<'a> GridSearch<'a> {
    /// `x0` supplies the fallback grid center and the starting segment totals.
    pub fn new(problem: &'a Problem, x0: Array1<f64>) -> Self {
        Self {
            problem,
            x0,
            tolerance: 1e-10,
            max_iterations: 1000,
            points: 1000,
            history_size: 10,
            barrier_weight: 1e-6,
            barrier_rounds: 3,
        }
    }

    /// Relative tolerance of the polishing line searches and of the
    /// per-round objective decrease that ends the alternation (default: 1e-10).
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Alternation rounds for a single free segment (default: 1000).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Points of each grid stage (default: 1000).
    pub fn with_points(mut self, points: usize) -> Self {
        self.points = points.max(3);
        self
    }

    /// Curvature pairs of the multi-segment fallback (default: 10).
    pub fn with_history_size(mut self, history_size: usize) -> Self {
        self.history_size = history_size;
        self
    }

    /// Barrier weight of the multi-segment fallback (default: 1e-6).
    pub fn with_barrier_weight(mut self, weight: f64) -> Self {
        self.barrier_weight = weight;
        self
    }

    /// Barrier rounds of the multi-segment fallback (default: 3).
    pub fn with_barrier_rounds(mut self, rounds: usize) -> Self {
        self.barrier_rounds = rounds;
        self
    }

    pub fn run(&mut self) -> Result<Minimum, MinimizeError> {
        match self.problem.layout().free_count() {
            0 => self.run_fixed(),
            1 => self.run_single_segment(),
            _ => {
                let problem = self.problem;
                BoundedLbfgs::new(
                    self.x0.clone(),
                    |p: &Array1<f64>| problem.evaluate(p),
                    BoxSpec::positive_scale(problem.dimension()),
                )
                .with_tolerance(self.tolerance)
                .with_max_iterations(self.max_iterations)
                .with_history_size(self.history_size)
                .with_barrier_weight(self.barrier_weight)
                .with_barrier_rounds(self.barrier_rounds)
                .run()
            }
        }
    }

    fn start_x(&self) -> f64 {
        let x = self.x0.first().copied().unwrap_or(1.0);
        if x > 0.0 && x.is_finite() { x } else { 1.0 }
    }

    fn run_fixed(&self) -> Result<Minimum, MinimizeError> {
        let problem = self.problem;
        let cumulative = problem.cumulative_deltas(&array![1.0]);
        let center = analytic_fdr_x(&problem.layout().ratios, &cumulative)
            .unwrap_or_else(|| self.start_x());
        let mut f = |x: f64| problem.evaluate(&array![x]);
        let (x, value, func_evals) = self.grid_minimize(&mut f, center);
        if !value.is_finite() {
            return Err(MinimizeError::NonFiniteStart { value });
        }
        Ok(Minimum {
            final_point: array![x],
            final_value: value,
            iterations: 1,
            func_evals,
        })
    }

    fn run_single_segment(&self) -> Result<Minimum, MinimizeError> {
        let problem = self.problem;
        let linear_rooted =
            problem.domain() == Domain::Linear && problem.model() == ComparisonModel::Rooted;
        let mut x = self.start_x();
        let mut y = self.x0.get(1).copied().filter(|y| y.is_finite()).unwrap_or(0.0);
        let mut value = problem.evaluate(&array![x, y]);
        let mut func_evals = 1;

        for iter in 0..self.max_iterations {
            let previous = value;

            // Segment total for the current x.
            if let Some(y_star) = closed_form_segment_total(problem, x) {
                let (y_new, f_new) = if linear_rooted {
                    func_evals += 1;
                    (y_star, problem.evaluate(&array![x, y_star]))
                } else {
                    let half_width = 0.5 * y_star.abs().max(1.0);
                    let (lo, hi) = (y_star.min(y) - half_width, y_star.max(y) + half_width);
                    let (y_new, f_new, evals) = golden_section(
                        |t| problem.evaluate(&array![x, t]),
                        lo,
                        hi,
                        self.tolerance * (hi - lo),
                    );
                    func_evals += evals;
                    (y_new, f_new)
                };
                if f_new <= value {
                    y = y_new;
                    value = f_new;
                }
            }

            // Scale factor for the current segment total.
            let mut line = |t: f64| problem.evaluate(&array![t, y]);
            let (x_new, f_new, evals) = if iter == 0 {
                self.grid_minimize(&mut line, x)
            } else {
                golden_section(&mut line, 0.5 * x, 2.0 * x, self.tolerance * x)
            };
            func_evals += evals;
            if f_new <= value {
                x = x_new;
                value = f_new;
            }

            if !value.is_finite() {
                return Err(MinimizeError::NonFiniteStart { value });
            }
            if previous - value <= self.tolerance * previous.abs() {
                return Ok(Minimum {
                    final_point: array![x, y],
                    final_value: value,
                    iterations: iter + 1,
                    func_evals,
                });
            }
        }

        log::debug!(
            "[Grid] Alternation limit {} reached at f = {value:.3e}",
            self.max_iterations
        );
        Err(MinimizeError::MaxIterationsReached {
            last_solution: Box::new(Minimum {
                final_point: array![x, y],
                final_value: value,
                iterations: self.max_iterations,
                func_evals,
            }),
        })
    }

    /// Two-stage grid over `x` around `center`, polished by golden section.
    /// Returns `(x, f(x), evaluations)`.
    fn grid_minimize<F>(&self, f: &mut F, center: f64) -> (f64, f64, usize)
    where
        F: FnMut(f64) -> f64,
    {
        let (lo, hi) = (center / GRID_SPAN, center * GRID_SPAN);
        let (coarse, coarse_value, step) = scan(f, lo, hi, self.points);
        let (fine_lo, fine_hi) = ((coarse - step).max(lo), coarse + step);
        let (fine, fine_value, fine_step) = scan(f, fine_lo, fine_hi, self.points);
        let mut evals = 2 * self.points;

        let (mut best, mut best_value) = if fine_value <= coarse_value {
            (fine, fine_value)
        } else {
            (coarse, coarse_value)
        };
        let (polished, polished_value, polish_evals) = golden_section(
            &mut *f,
            (best - fine_step).max(fine_lo),
            best + fine_step,
            self.tolerance * best,
        );
        evals += polish_evals;
        if polished_value < best_value {
            best = polished;
            best_value = polished_value;
        }
        (best, best_value, evals)
    }
}

/// Evaluates `points` equally spaced values on `[lo, hi]`.
/// Returns `(argmin, min, spacing)`.
fn scan<F>(f: &mut F, lo: f64, hi: f64, points: usize) -> (f64, f64, f64)
where
    F: FnMut(f64) -> f64,
{
    let step = (hi - lo) / (points - 1) as f64;
    let mut best = (lo, f64::INFINITY);
    for k in 0..points {
        let x = lo + k as f64 * step;
        let value = f(x);
        if value < best.1 {
            best = (x, value);
        }
    }
    (best.0, best.1, step)
}
