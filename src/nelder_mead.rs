//! Nelder-Mead downhill simplex with optional box projection.
//!
//! A run converges when the best and worst vertex values agree to within the
//! tolerance *and* the simplex has collapsed to a small diameter. Values alone
//! can agree on vertices that straddle the minimum symmetrically.

use ndarray::Array1;

use crate::bounds::BoxSpec;
use crate::solution::{Minimum, MinimizeError};

/// Relative perturbation used to seed the initial simplex.
const SIMPLEX_SCALE: f64 = 0.05;
/// Absolute perturbation for coordinates that are (nearly) zero.
const ZERO_COORD_STEP: f64 = 0.00025;
/// Largest vertex distance from the best vertex at convergence, relative to
/// `1 + |best|`.
const DIAMETER_TOLERANCE: f64 = 1e-8;

/// A configurable Nelder-Mead solver over a value-only objective.
pub struct NelderMead<ObjFn> {
    x0: Array1<f64>,
    obj_fn: ObjFn,
    bounds: Option<BoxSpec>,
    tolerance: f64,
    max_iterations: usize,
    alpha: f64, // reflection
    gamma: f64, // expansion
    rho: f64,   // contraction
    sigma: f64, // shrink
}

impl<ObjFn> NelderMead<ObjFn>
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
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
        }
    }

    /// Stops once best and worst vertex values differ by less than this (default: 1e-10).
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the maximum number of iterations (default: 1000).
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Every trial vertex is projected into `bounds`.
    pub fn with_bounds(mut self, bounds: BoxSpec) -> Self {
        self.bounds = Some(bounds);
        self
    }

    fn project(&self, v: Array1<f64>) -> Array1<f64> {
        match &self.bounds {
            Some(b) => b.project(&v),
            None => v,
        }
    }

    fn initial_simplex(&self) -> Vec<Array1<f64>> {
        let n = self.x0.len();
        let mut simplex = Vec::with_capacity(n + 1);
        simplex.push(self.project(self.x0.clone()));
        for i in 0..n {
            let mut v = self.x0.clone();
            v[i] += if v[i].abs() > 1e-8 {
                SIMPLEX_SCALE * v[i]
            } else {
                ZERO_COORD_STEP
            };
            simplex.push(self.project(v));
        }
        simplex
    }

    pub fn run(&mut self) -> Result<Minimum, MinimizeError> {
        let n = self.x0.len();
        let mut simplex = self.initial_simplex();
        let mut values: Vec<f64> = simplex.iter().map(|v| (self.obj_fn)(v)).collect();
        let mut func_evals = values.len();
        if !values[0].is_finite() {
            return Err(MinimizeError::NonFiniteStart { value: values[0] });
        }
        if n == 0 {
            return Ok(Minimum {
                final_point: simplex.swap_remove(0),
                final_value: values[0],
                iterations: 0,
                func_evals,
            });
        }

        for iter in 0..self.max_iterations {
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            if (values[n] - values[0]).abs() < self.tolerance && collapsed(&simplex) {
                return Ok(Minimum {
                    final_point: simplex.swap_remove(0),
                    final_value: values[0],
                    iterations: iter,
                    func_evals,
                });
            }

            let mut centroid = Array1::<f64>::zeros(n);
            for v in &simplex[..n] {
                centroid += v;
            }
            centroid /= n as f64;

            let worst = &simplex[n];
            let reflected = self.project(&centroid + &((&centroid - worst) * self.alpha));
            let f_reflected = (self.obj_fn)(&reflected);
            func_evals += 1;

            if f_reflected < values[0] {
                let expanded = self.project(&centroid + &((&reflected - &centroid) * self.gamma));
                let f_expanded = (self.obj_fn)(&expanded);
                func_evals += 1;
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
            } else if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
            } else {
                let contracted = self.project(&centroid + &((&simplex[n] - &centroid) * self.rho));
                let f_contracted = (self.obj_fn)(&contracted);
                func_evals += 1;
                if f_contracted < values[n] {
                    simplex[n] = contracted;
                    values[n] = f_contracted;
                } else {
                    let best = simplex[0].clone();
                    for i in 1..=n {
                        let shrunk = self.project(&best + &((&simplex[i] - &best) * self.sigma));
                        values[i] = (self.obj_fn)(&shrunk);
                        simplex[i] = shrunk;
                    }
                    func_evals += n;
                }
            }
        }

        let best = (0..=n)
            .min_by(|&a, &b| values[a].total_cmp(&values[b]))
            .unwrap_or(0);
        Err(MinimizeError::MaxIterationsReached {
            last_solution: Box::new(Minimum {
                final_point: simplex.swap_remove(best),
                final_value: values[best],
                iterations: self.max_iterations,
                func_evals,
            }),
        })
    }
}

/// Whether every vertex lies within [`DIAMETER_TOLERANCE`] of the first.
fn collapsed(simplex: &[Array1<f64>]) -> bool {
    let best = &simplex[0];
    let reach = DIAMETER_TOLERANCE * (1.0 + best.iter().fold(0.0, |m: f64, v| m.max(v.abs())));
    simplex[1..].iter().all(|v| {
        v.iter()
            .zip(best.iter())
            .all(|(a, b)| (a - b).abs() <= reach)
    })
}
