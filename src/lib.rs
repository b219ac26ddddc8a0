//! Least-squares fitting of delta-rational chord models.
//!
//! A delta-rational chord is one whose successive frequency *differences*
//! follow a target pattern. Given observed ratios from a root and a delta
//! signature (fixed deltas and free markers), [`solve`] finds the scale
//! factor `x` and free segment totals so that the model chord
//! `[1, 1 + D_1/x, 1 + D_2/x, ...]` best matches the observation.
//!
//! # Features
//! - Three comparison models (rooted, pairwise, all-steps) in the linear or
//!   logarithmic domain; log errors are reported in cents.
//! - Leading and trailing free deltas are trimmed and the chord rebased onto
//!   the new effective root; consecutive free deltas share one variable.
//! - Four strategies behind [`Method`]: L-BFGS with a log barrier keeping
//!   `x > 0`, Nelder-Mead, Powell and a grid search with closed-form segment
//!   totals.
//! - Multi-start driver keeping the best result, including runs that hit the
//!   iteration limit.
//!
//! ## Defaults (key settings)
//! - `num_starts = 5`, `max_iterations = 1000`, `tolerance = 1e-10`.
//! - L-BFGS: `history_size = 10`, Armijo `c1 = 1e-4`, 20 halvings,
//!   central-difference gradients with step `1e-8`.
//! - Barrier: weight `1e-6`, shrunk 100x over 3 warm-started rounds.
//!
//! # Example
//!
//! ```
//! use dr_optimizer::{DeltaEntry, Method, SolveOptions, cents_to_ratio, solve};
//!
//! // A chord whose middle delta is unknown: +1, ?, +1.
//! let signature = [DeltaEntry::Fixed(1.0), DeltaEntry::free(), DeltaEntry::Fixed(1.0)];
//! let observed: Vec<f64> = [498.0, 952.1, 1255.7].iter().map(|&c| cents_to_ratio(c)).collect();
//!
//! let options = SolveOptions::default().with_method(Method::NelderMead);
//! let outcome = solve(&signature, &observed, &options).unwrap();
//!
//! assert!((outcome.x - 3.0).abs() < 0.05);
//! assert!(outcome.error < 0.01);
//! ```

pub mod barrier;
pub mod bounds;
pub mod error_model;
pub mod finite_diff;
pub mod grid;
pub mod lbfgs;
pub mod nelder_mead;
pub mod powell;
pub mod problem;
pub mod ring;
pub mod segments;
pub mod solution;
pub mod solver;
pub mod starts;

pub use error_model::{
    CENTS_PER_NEPER, ComparisonModel, Domain, cents_to_ratio, ratio_to_cents, sum_squared_error,
};
pub use grid::analytic_fdr_x;
pub use problem::Problem;
pub use segments::{DeltaEntry, FreeSegment, SegmentLayout};
pub use solution::{Minimum, MinimizeError};
pub use solver::{Method, SolveError, SolveOptions, SolveOutcome, solve};
