//! Powell's conjugate-direction method with golden-section line searches.
//!
//! The direction set starts as the coordinate axes. After each sweep the
//! normalized net displacement of the sweep replaces the *oldest* direction
//! (a ring-buffer eviction, not the classical largest-decrease rule), so the
//! set is not guaranteed to stay conjugate. A displacement that lies almost
//! in the span of the directions that would remain is not pushed, which keeps
//! the set from collapsing onto a line. A sweep that barely moves is followed
//! by one sweep along the coordinate axes; only when that also stays put is
//! the run declared converged.
//!
//! Each line search brackets the step in `[-scale, scale]` with tolerance
//! `1e-5 * scale`, instead of a fixed `[-1, 1]` bracket with tolerance `1e-5`.
//! `scale` starts at 1 and follows the largest step of the previous sweep, so
//! the search refines as the iterate settles and widens again when a step
//! hits the bracket edge.

use ndarray::Array1;

use crate::bounds::BoxSpec;
use crate::ring::RingBuffer;
use crate::solution::{Minimum, MinimizeError};

/// Inverse golden ratio, `(sqrt 5 - 1) / 2`.
const INV_PHI: f64 = 0.618_033_988_749_894_9;
/// Golden-section tolerance relative to the bracket half-width.
const LINE_TOLERANCE: f64 = 1e-5;
const MIN_BRACKET_SCALE: f64 = 1e-12;
const MAX_GOLDEN_STEPS: usize = 200;
/// Smallest component of a new direction outside the span of the kept ones.
const MIN_INDEPENDENCE: f64 = 0.05;

/// Minimizes a unimodal `f` on `[lo, hi]` by golden-section search.
///
/// Returns `(argmin, min, evaluations)`. The endpoints themselves are never
/// evaluated.
pub fn golden_section<F>(mut f: F, lo: f64, hi: f64, tol: f64) -> (f64, f64, usize)
where
    F: FnMut(f64) -> f64,
{
    let (mut a, mut b) = (lo, hi);
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);
    let mut evals = 2;
    while (b - a).abs() > tol && evals < MAX_GOLDEN_STEPS {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d);
        }
        evals += 1;
    }
    if fc < fd {
        (c, fc, evals)
    } else {
        (d, fd, evals)
    }
}

/// A configurable Powell solver over a value-only objective.
pub struct Powell<ObjFn> {
    x0: Array1<f64>,
    obj_fn: ObjFn,
    bounds: Option<BoxSpec>,
    tolerance: f64,
    max_iterations: usize,
}

impl<ObjFn> Powell<ObjFn>
where
    ObjFn: FnMut(&Array1<f64>) -> f64,
{
    pub fn new(x0: Array1<f64>, obj_fn: ObjFn) -> Self {
        Self {
            x0,
            obj_fn,
            bounds: None,
            tolerance: 1e-10,
            max_iterations: 1000,
        }
    }

    /// Stops once a sweep moves the iterate by less than this (default: 1e-10).
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the maximum number of sweeps (default: 1000).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Every move is projected into `bounds`.
    pub fn with_bounds(mut self, bounds: BoxSpec) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn run(&mut self) -> Result<Minimum, MinimizeError> {
        let n = self.x0.len();
        let bounds = self.bounds.as_ref();
        let project = |v: Array1<f64>| match bounds {
            Some(b) => b.project(&v),
            None => v,
        };
        let obj_fn = &mut self.obj_fn;

        let mut x = project(self.x0.clone());
        let mut f = obj_fn(&x);
        let mut func_evals = 1;
        if !f.is_finite() {
            return Err(MinimizeError::NonFiniteStart { value: f });
        }

        let mut directions = coordinate_axes(n);
        let mut scale: f64 = 1.0;
        let mut confirming = false;

        for iter in 0..self.max_iterations {
            let x_start = x.clone();
            let mut largest_step: f64 = 0.0;

            for k in 0..directions.len() {
                let Some(d) = directions.get(k) else { continue };
                let (alpha, f_alpha, evals) = golden_section(
                    |a| obj_fn(&project(&x + &(d * a))),
                    -scale,
                    scale,
                    LINE_TOLERANCE * scale,
                );
                func_evals += evals;
                if f_alpha < f {
                    x = project(&x + &(d * alpha));
                    f = f_alpha;
                    largest_step = largest_step.max(alpha.abs());
                }
            }

            let displacement = &x - &x_start;
            let norm = displacement.dot(&displacement).sqrt();
            if norm < self.tolerance {
                if confirming {
                    return Ok(Minimum {
                        final_point: x,
                        final_value: f,
                        iterations: iter + 1,
                        func_evals,
                    });
                }
                log::debug!("[Powell] Sweep {iter} stalled; checking the coordinate axes.");
                directions = coordinate_axes(n);
                scale = 1.0;
                confirming = true;
                continue;
            }
            confirming = false;

            let candidate = displacement / norm;
            if independent_of_kept(&directions, &candidate) {
                directions.push(candidate);
            }
            scale = (2.0 * largest_step).clamp(MIN_BRACKET_SCALE, 1.0);
        }

        log::debug!(
            "[Powell] Sweep limit {} reached at f = {f:.3e}",
            self.max_iterations
        );
        Err(MinimizeError::MaxIterationsReached {
            last_solution: Box::new(Minimum {
                final_point: x,
                final_value: f,
                iterations: self.max_iterations,
                func_evals,
            }),
        })
    }
}

fn coordinate_axes(n: usize) -> RingBuffer<Array1<f64>> {
    let mut directions = RingBuffer::new(n);
    for i in 0..n {
        let mut axis = Array1::zeros(n);
        axis[i] = 1.0;
        directions.push(axis);
    }
    directions
}

/// Whether `candidate` (unit length) keeps a component of at least
/// [`MIN_INDEPENDENCE`] outside the span of the directions that survive
/// evicting the oldest one.
fn independent_of_kept(directions: &RingBuffer<Array1<f64>>, candidate: &Array1<f64>) -> bool {
    let skip = usize::from(directions.len() == directions.capacity());
    let mut basis: Vec<Array1<f64>> = Vec::with_capacity(directions.len());
    for d in directions.iter().skip(skip) {
        let mut v = d.clone();
        for b in &basis {
            let proj = b.dot(&v);
            v.scaled_add(-proj, b);
        }
        let len = v.dot(&v).sqrt();
        if len > 1e-12 {
            basis.push(v / len);
        }
    }
    let mut residual = candidate.clone();
    for b in &basis {
        let proj = b.dot(&residual);
        residual.scaled_add(-proj, b);
    }
    residual.dot(&residual).sqrt() >= MIN_INDEPENDENCE
}
