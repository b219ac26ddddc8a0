//! Limited-memory BFGS with a backtracking Armijo line search.
//!
//! The inverse-Hessian approximation is never formed: directions come from
//! the two-loop recursion over the most recent `(s, y)` curvature pairs,
//! which live in a fixed-capacity [`RingBuffer`]. A pair is admitted only
//! when `s·y` clears a small positive threshold, so the implicit matrix stays
//! positive definite.
//!
//! # Example
//!
//! ```
//! use dr_optimizer::lbfgs::Lbfgs;
//! use ndarray::{Array1, array};
//!
//! let bowl = |x: &Array1<f64>| (x.dot(x), 2.0 * x);
//! let min = Lbfgs::new(array![3.0, -4.0], bowl)
//!     .with_tolerance(1e-10)
//!     .run()
//!     .expect("converges on a quadratic");
//! assert!(min.final_value < 1e-12);
//! ```

use ndarray::Array1;

use crate::ring::RingBuffer;
use crate::solution::{Minimum, MinimizeError};

/// Armijo sufficient-decrease constant.
const C1: f64 = 1e-4;
/// Maximum number of step halvings per line search.
const MAX_HALVINGS: usize = 20;
/// Curvature pairs with `s·y` at or below this are rejected.
const CURVATURE_THRESHOLD: f64 = 1e-10;
// Changes in f below this many machine epsilons count as roundoff.
const TAU_F: f64 = 10.0;

#[inline]
fn eps_f(fk: f64) -> f64 {
    TAU_F * f64::EPSILON * (1.0 + fk.abs())
}

#[derive(Debug, Clone)]
struct CurvaturePair {
    s: Array1<f64>,
    y: Array1<f64>,
    rho: f64,
}

/// Core configuration for the L-BFGS solver.
#[derive(Debug, Clone)]
struct LbfgsCore {
    x0: Array1<f64>,
    tolerance: f64,
    max_iterations: usize,
    history_size: usize,
}

/// A configurable L-BFGS solver over a `(value, gradient)` objective.
///
/// Use [`crate::finite_diff::with_numerical_gradient`] to drive it with an
/// objective that only returns values.
pub struct Lbfgs<ObjFn> {
    core: LbfgsCore,
    obj_fn: ObjFn,
}

impl<ObjFn> Lbfgs<ObjFn>
where
    ObjFn: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    /// Creates a new L-BFGS solver.
    ///
    /// # Arguments
    /// * `x0` - The initial guess for the minimum.
    /// * `obj_fn` - The objective function which returns a tuple `(value, gradient)`.
    pub fn new(x0: Array1<f64>, obj_fn: ObjFn) -> Self {
        Self {
            core: LbfgsCore {
                x0,
                tolerance: 1e-10,
                max_iterations: 1000,
                history_size: 10,
            },
            obj_fn,
        }
    }

    /// Sets the gradient-norm convergence tolerance (default: 1e-10).
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.core.tolerance = tolerance;
        self
    }

    /// Sets the maximum number of iterations (default: 1000).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.core.max_iterations = max_iterations;
        self
    }

    /// Sets how many curvature pairs are remembered (default: 10).
    pub fn with_history_size(mut self, history_size: usize) -> Self {
        self.core.history_size = history_size.max(1);
        self
    }

    /// Executes the L-BFGS iteration.
    pub fn run(&mut self) -> Result<Minimum, MinimizeError> {
        self.core.run(&mut self.obj_fn)
    }
}

impl LbfgsCore {
    fn run<ObjFn>(&self, obj_fn: &mut ObjFn) -> Result<Minimum, MinimizeError>
    where
        ObjFn: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
    {
        let mut x_k = self.x0.clone();
        let (mut f_k, mut g_k) = obj_fn(&x_k);
        let mut func_evals = 1;
        if !f_k.is_finite() {
            return Err(MinimizeError::NonFiniteStart { value: f_k });
        }

        let mut history: RingBuffer<CurvaturePair> = RingBuffer::new(self.history_size);

        for k in 0..self.max_iterations {
            let g_norm = g_k.dot(&g_k).sqrt();
            if !g_norm.is_finite() {
                log::warn!("[L-BFGS] Non-finite gradient at iter {k}, f = {f_k:.3e}");
                return Err(MinimizeError::GradientIsNaN {
                    last_solution: Box::new(Minimum {
                        final_point: x_k,
                        final_value: f_k,
                        iterations: k,
                        func_evals,
                    }),
                });
            }
            if g_norm < self.tolerance {
                return Ok(Minimum {
                    final_point: x_k,
                    final_value: f_k,
                    iterations: k,
                    func_evals,
                });
            }

            let mut d_k = two_loop_direction(&g_k, &history);
            if history.is_empty() && g_norm > 1.0 {
                d_k /= g_norm;
            }
            if g_k.dot(&d_k) >= 0.0 {
                log::warn!(
                    "[L-BFGS] Non-descent direction at iter {k} (gᵀd = {:.2e}); resetting.",
                    g_k.dot(&d_k)
                );
                history.clear();
                d_k = -&g_k / g_norm.max(1.0);
            }

            match backtracking_line_search(obj_fn, &x_k, &d_k, f_k, &g_k, &mut func_evals) {
                LineSearch::Accepted(x_new, f_new, g_new) => {
                    let s = &x_new - &x_k;
                    let y = &g_new - &g_k;
                    let sy = s.dot(&y);
                    if sy > CURVATURE_THRESHOLD {
                        history.push(CurvaturePair { s, y, rho: 1.0 / sy });
                    }
                    x_k = x_new;
                    f_k = f_new;
                    g_k = g_new;
                }
                LineSearch::Flat | LineSearch::Failed if !history.is_empty() => {
                    log::debug!(
                        "[L-BFGS] Line search failed at iter {k}; retrying with steepest descent."
                    );
                    history.clear();
                }
                LineSearch::Flat => {
                    // Steepest descent cannot move f beyond roundoff.
                    log::debug!(
                        "[L-BFGS] Objective flat to roundoff at iter {k} (|g| = {g_norm:.2e})."
                    );
                    return Ok(Minimum {
                        final_point: x_k,
                        final_value: f_k,
                        iterations: k,
                        func_evals,
                    });
                }
                LineSearch::Failed => {
                    return Err(MinimizeError::LineSearchFailed {
                        last_solution: Box::new(Minimum {
                            final_point: x_k,
                            final_value: f_k,
                            iterations: k,
                            func_evals,
                        }),
                        max_attempts: MAX_HALVINGS,
                    });
                }
            }
        }

        Err(MinimizeError::MaxIterationsReached {
            last_solution: Box::new(Minimum {
                final_point: x_k,
                final_value: f_k,
                iterations: self.max_iterations,
                func_evals,
            }),
        })
    }
}

/// Two-loop recursion: returns `-H g` for the implicit inverse Hessian `H`
/// built from `history`, scaled initially by `γ = s·y / y·y` of the newest
/// pair (`γ = 1` without history).
fn two_loop_direction(g: &Array1<f64>, history: &RingBuffer<CurvaturePair>) -> Array1<f64> {
    let mut q = g.clone();
    let mut alphas = Vec::with_capacity(history.len());
    for pair in history.iter().rev() {
        let a = pair.rho * pair.s.dot(&q);
        q.scaled_add(-a, &pair.y);
        alphas.push(a);
    }

    let gamma = history
        .newest()
        .map(|p| {
            let yy = p.y.dot(&p.y);
            if yy > 0.0 { p.s.dot(&p.y) / yy } else { 1.0 }
        })
        .unwrap_or(1.0);
    let mut r = q * gamma;

    // alphas were pushed newest first.
    for (pair, a) in history.iter().zip(alphas.iter().rev()) {
        let b = pair.rho * pair.y.dot(&r);
        r.scaled_add(a - b, &pair.s);
    }
    -r
}

enum LineSearch {
    Accepted(Array1<f64>, f64, Array1<f64>),
    /// No trial decreased `f`, and none moved it by more than roundoff.
    Flat,
    Failed,
}

/// Backtracking from a unit step, halving until the Armijo condition holds.
///
/// A step is accepted only if it strictly lowers `f`. When every trial is
/// rejected and none rose above `f_k` by more than roundoff, the search
/// reports [`LineSearch::Flat`].
fn backtracking_line_search<ObjFn>(
    obj_fn: &mut ObjFn,
    x_k: &Array1<f64>,
    d_k: &Array1<f64>,
    f_k: f64,
    g_k: &Array1<f64>,
    func_evals: &mut usize,
) -> LineSearch
where
    ObjFn: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    let slope = g_k.dot(d_k);
    let mut alpha = 1.0;
    let mut flat = true;
    for _ in 0..=MAX_HALVINGS {
        let x_new = x_k + &(d_k * alpha);
        let (f_new, g_new) = obj_fn(&x_new);
        *func_evals += 1;
        if f_new.is_finite() && f_new < f_k && f_new <= f_k + C1 * alpha * slope {
            return LineSearch::Accepted(x_new, f_new, g_new);
        }
        if !f_new.is_finite() || f_new - f_k > eps_f(f_k) {
            flat = false;
        }
        alpha *= 0.5;
    }
    if flat {
        LineSearch::Flat
    } else {
        LineSearch::Failed
    }
}
