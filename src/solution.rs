//! Result and error types shared by every minimizer.

use ndarray::Array1;

/// A summary of a minimizer run.
///
/// Note that for non-convex objectives this is a local minimum at best.
#[derive(Debug, Clone)]
pub struct Minimum {
    /// The point at which the minimum value was found.
    pub final_point: Array1<f64>,
    /// The objective value at `final_point`.
    pub final_value: f64,
    /// The number of outer iterations performed.
    pub iterations: usize,
    /// The total number of objective evaluations.
    pub func_evals: usize,
}

/// An error type for clear diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum MinimizeError {
    #[error(
        "Maximum number of iterations reached without converging. The best solution found is returned."
    )]
    MaxIterationsReached {
        /// The best solution found before the iteration limit was reached.
        last_solution: Box<Minimum>,
    },
    #[error(
        "The line search failed to find a suitable step after {max_attempts} attempts. The best solution found is returned."
    )]
    LineSearchFailed {
        /// The best solution found before the line search failed.
        last_solution: Box<Minimum>,
        /// The number of step halvings tried.
        max_attempts: usize,
    },
    #[error("The objective is not finite at the starting point (value {value}).")]
    NonFiniteStart { value: f64 },
    #[error(
        "The gradient norm was NaN or infinity, indicating numerical instability. The last finite point is returned."
    )]
    GradientIsNaN {
        /// The last point with a finite objective value.
        last_solution: Box<Minimum>,
    },
}

impl MinimizeError {
    /// The usable point carried by a non-converged run, if any.
    pub fn last_solution(&self) -> Option<&Minimum> {
        match self {
            MinimizeError::MaxIterationsReached { last_solution }
            | MinimizeError::LineSearchFailed { last_solution, .. }
            | MinimizeError::GradientIsNaN { last_solution } => Some(last_solution),
            MinimizeError::NonFiniteStart { .. } => None,
        }
    }

    /// Consumes the error, returning its usable point, if any.
    pub fn into_last_solution(self) -> Option<Minimum> {
        match self {
            MinimizeError::MaxIterationsReached { last_solution }
            | MinimizeError::LineSearchFailed { last_solution, .. }
            | MinimizeError::GradientIsNaN { last_solution } => Some(*last_solution),
            MinimizeError::NonFiniteStart { .. } => None,
        }
    }
}
