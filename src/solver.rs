//! The public entry point: validation, method dispatch and the multi-start
//! driver.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::barrier::BoundedLbfgs;
use crate::bounds::BoxSpec;
use crate::error_model::{ComparisonModel, Domain, reported_error};
use crate::grid::GridSearch;
use crate::nelder_mead::NelderMead;
use crate::powell::Powell;
use crate::problem::Problem;
use crate::segments::{DeltaEntry, SegmentLayout};
use crate::solution::{Minimum, MinimizeError};
use crate::starts::starting_points;

/// Optimization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// L-BFGS with a log barrier keeping the scale factor positive.
    #[default]
    Lbfgs,
    NelderMead,
    Powell,
    /// Grid search over `x` with closed-form segment totals; bounded L-BFGS
    /// beyond one free segment.
    Grid,
}

impl Method {
    /// Minimizes `problem` from `x0` inside `bounds`.
    pub fn minimize(
        self,
        problem: &Problem,
        x0: Array1<f64>,
        bounds: &BoxSpec,
        options: &SolveOptions,
    ) -> Result<Minimum, MinimizeError> {
        let objective = |p: &Array1<f64>| problem.evaluate(p);
        match self {
            Method::Lbfgs => BoundedLbfgs::new(x0, objective, bounds.clone())
                .with_tolerance(options.tolerance)
                .with_max_iterations(options.max_iterations)
                .with_history_size(options.history_size)
                .with_barrier_weight(options.barrier_weight)
                .with_barrier_rounds(options.barrier_rounds)
                .run(),
            Method::NelderMead => NelderMead::new(x0, objective)
                .with_tolerance(options.tolerance)
                .with_max_iterations(options.max_iterations)
                .with_bounds(bounds.clone())
                .run(),
            Method::Powell => Powell::new(x0, objective)
                .with_tolerance(options.tolerance)
                .with_max_iterations(options.max_iterations)
                .with_bounds(bounds.clone())
                .run(),
            Method::Grid => GridSearch::new(problem, x0)
                .with_tolerance(options.tolerance)
                .with_max_iterations(options.max_iterations)
                .with_history_size(options.history_size)
                .with_barrier_weight(options.barrier_weight)
                .with_barrier_rounds(options.barrier_rounds)
                .run(),
        }
    }
}

/// Configuration of a [`solve`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SolveOptions {
    pub method: Method,
    pub domain: Domain,
    pub model: ComparisonModel,
    /// Starting points tried; the best result wins.
    pub num_starts: usize,
    /// Iteration limit of each solver run.
    pub max_iterations: usize,
    pub tolerance: f64,
    /// L-BFGS curvature pairs.
    pub history_size: usize,
    /// Initial log-barrier weight of the bounded L-BFGS.
    pub barrier_weight: f64,
    /// Barrier continuation rounds, each shrinking the weight 100x.
    pub barrier_rounds: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            method: Method::Lbfgs,
            domain: Domain::Linear,
            model: ComparisonModel::Rooted,
            num_starts: 5,
            max_iterations: 1000,
            tolerance: 1e-10,
            history_size: 10,
            barrier_weight: 1e-6,
            barrier_rounds: 3,
        }
    }
}

impl SolveOptions {
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_model(mut self, model: ComparisonModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_num_starts(mut self, num_starts: usize) -> Self {
        self.num_starts = num_starts;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_history_size(mut self, history_size: usize) -> Self {
        self.history_size = history_size;
        self
    }

    pub fn with_barrier_weight(mut self, barrier_weight: f64) -> Self {
        self.barrier_weight = barrier_weight;
        self
    }

    pub fn with_barrier_rounds(mut self, barrier_rounds: usize) -> Self {
        self.barrier_rounds = barrier_rounds;
        self
    }

    /// Rejects settings no solver can run with.
    pub fn validate(&self) -> Result<(), SolveError> {
        let invalid = |name: &'static str, value: String, reason: &'static str| {
            Err(SolveError::InvalidOption {
                name,
                value,
                reason,
            })
        };
        if self.num_starts == 0 {
            return invalid("num_starts", "0".into(), "at least one start is required");
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations", "0".into(), "must be positive");
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return invalid(
                "tolerance",
                self.tolerance.to_string(),
                "must be positive and finite",
            );
        }
        if self.history_size == 0 {
            return invalid("history_size", "0".into(), "must be positive");
        }
        if !(self.barrier_weight > 0.0 && self.barrier_weight.is_finite()) {
            return invalid(
                "barrier_weight",
                self.barrier_weight.to_string(),
                "must be positive and finite",
            );
        }
        if self.barrier_rounds == 0 {
            return invalid("barrier_rounds", "0".into(), "must be positive");
        }
        Ok(())
    }
}

/// The fitted chord.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SolveOutcome {
    /// Whether the reported point met the solver's convergence criterion.
    pub success: bool,
    /// Scale factor relative to the effective root.
    pub x: f64,
    /// One value per free entry of the signature, in order: the resolved
    /// delta for interior entries, the caller's placeholder for trimmed ones.
    pub free_values: Vec<Option<f64>>,
    /// Fitted total of each interior free segment.
    pub segment_totals: Vec<f64>,
    /// Root of the summed squared residuals; cents in the log domain.
    pub error: f64,
    /// Iterations of the winning run.
    pub iterations: usize,
    /// Signature index of the first delta above the effective root.
    pub root_offset: usize,
    pub method: Method,
}

impl SolveOutcome {
    /// The outcome for a signature without any fixed delta.
    fn unconstrained(signature: &[DeltaEntry], method: Method) -> Self {
        Self {
            success: true,
            x: 1.0,
            free_values: signature
                .iter()
                .filter(|e| e.is_free())
                .map(DeltaEntry::placeholder)
                .collect(),
            segment_totals: Vec::new(),
            error: 0.0,
            iterations: 0,
            root_offset: 0,
            method,
        }
    }

    fn fitted(
        signature: &[DeltaEntry],
        problem: &Problem,
        minimum: &Minimum,
        success: bool,
        method: Method,
    ) -> Self {
        let layout = problem.layout();
        let params = &minimum.final_point;
        let included = layout.offset..layout.offset + layout.len();
        let free_values = signature
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_free())
            .map(|(i, entry)| {
                let segment = included
                    .contains(&i)
                    .then(|| layout.segment_of(i - layout.offset))
                    .flatten();
                match segment {
                    Some(s) => Some(params[1 + s] / layout.free_segments[s].len() as f64),
                    None => entry.placeholder(),
                }
            })
            .collect();

        Self {
            success,
            x: params[0],
            free_values,
            segment_totals: params.iter().skip(1).copied().collect(),
            error: reported_error(minimum.final_value, problem.domain()),
            iterations: minimum.iterations,
            root_offset: layout.offset,
            method,
        }
    }
}

/// Errors surfaced by [`solve`].
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    #[error("The delta signature is empty.")]
    EmptySignature,
    #[error("The signature has {signature} entries but {ratios} observed ratios were given.")]
    LengthMismatch { signature: usize, ratios: usize },
    #[error("Observed ratio {index} is {value}; ratios must be positive and finite.")]
    InvalidRatio { index: usize, value: f64 },
    #[error("Fixed delta {index} is {value}; fixed deltas must be positive and finite.")]
    InvalidDelta { index: usize, value: f64 },
    #[error("Option `{name}` = {value} is invalid: {reason}.")]
    InvalidOption {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("Every one of the {attempts} starting points produced a non-finite objective.")]
    AllStartsFailed { attempts: usize },
}

fn validate_inputs(signature: &[DeltaEntry], observed_ratios: &[f64]) -> Result<(), SolveError> {
    if signature.is_empty() {
        return Err(SolveError::EmptySignature);
    }
    if signature.len() != observed_ratios.len() {
        return Err(SolveError::LengthMismatch {
            signature: signature.len(),
            ratios: observed_ratios.len(),
        });
    }
    if let Some((index, &value)) = observed_ratios
        .iter()
        .enumerate()
        .find(|(_, r)| !(**r > 0.0 && r.is_finite()))
    {
        return Err(SolveError::InvalidRatio { index, value });
    }
    for (index, entry) in signature.iter().enumerate() {
        if let Some(value) = entry.fixed_value() {
            if !(value > 0.0 && value.is_finite()) {
                return Err(SolveError::InvalidDelta { index, value });
            }
        }
    }
    Ok(())
}

/// Minimizes from one start. Returns the end point with its true objective
/// and whether the run converged, or `None` when it yields nothing finite.
fn run_start(
    problem: &Problem,
    method: Method,
    x0: Array1<f64>,
    bounds: &BoxSpec,
    options: &SolveOptions,
    k: usize,
) -> Option<(Minimum, bool)> {
    let start_value = problem.evaluate(&x0);
    if !start_value.is_finite() {
        log::debug!("[Solve] Start {k} skipped: objective is {start_value} at {x0}");
        return None;
    }
    let (minimum, converged) = match method.minimize(problem, x0, bounds, options) {
        Ok(minimum) => (minimum, true),
        Err(err) => match err.into_last_solution() {
            Some(minimum) => {
                log::warn!("[Solve] Start {k} ({method:?}) ended without converging.");
                (minimum, false)
            }
            None => {
                log::debug!("[Solve] Start {k} ({method:?}) failed.");
                return None;
            }
        },
    };

    let value = problem.evaluate(&minimum.final_point);
    if !value.is_finite() {
        log::debug!("[Solve] Start {k} finished at an infeasible point.");
        return None;
    }
    log::debug!(
        "[Solve] Start {k} ({method:?}): f = {value:.6e} after {} iterations",
        minimum.iterations
    );
    Some((
        Minimum {
            final_value: value,
            ..minimum
        },
        converged,
    ))
}

/// Fits the delta-rational model described by `signature` to
/// `observed_ratios` (ratios from the root, root excluded).
///
/// Every starting point is minimized with `options.method`; the lowest true
/// objective wins. Models with at most one free segment also run a
/// [`GridSearch`] from the first start as one more candidate. Runs that stop
/// without converging still compete and report `success = false`. Only when
/// no start yields a finite objective is [`SolveError::AllStartsFailed`]
/// returned.
///
/// # Example
/// ```
/// use dr_optimizer::{DeltaEntry, SolveOptions, solve};
///
/// // 4:5:6 is exactly 1 + [1, 2]/4.
/// let signature = [DeltaEntry::Fixed(1.0), DeltaEntry::Fixed(1.0)];
/// let outcome = solve(&signature, &[1.25, 1.5], &SolveOptions::default()).unwrap();
/// assert!((outcome.x - 4.0).abs() < 1e-4);
/// assert!(outcome.error < 1e-6);
/// ```
pub fn solve(
    signature: &[DeltaEntry],
    observed_ratios: &[f64],
    options: &SolveOptions,
) -> Result<SolveOutcome, SolveError> {
    validate_inputs(signature, observed_ratios)?;
    options.validate()?;

    let Some(layout) = SegmentLayout::from_signature(observed_ratios, signature) else {
        log::debug!("[Solve] No fixed delta; the chord is unconstrained.");
        return Ok(SolveOutcome::unconstrained(signature, options.method));
    };
    let problem = Problem::new(layout, options.domain, options.model);
    let bounds = BoxSpec::positive_scale(problem.dimension());
    let starts = starting_points(&problem, options.num_starts);
    let attempts = starts.len();

    // Fully fixed and single-segment models also get a grid candidate.
    let grid_eligible = problem.layout().free_segments.len() <= 1;
    let grid_seed = match options.method {
        Method::Grid => None,
        _ if grid_eligible => starts.first().cloned(),
        _ => None,
    };

    let mut best: Option<(Minimum, bool)> = None;
    let runs = starts
        .into_iter()
        .map(|x0| (options.method, x0))
        .chain(grid_seed.map(|x0| (Method::Grid, x0)));
    for (k, (method, x0)) in runs.enumerate() {
        let Some((minimum, converged)) = run_start(&problem, method, x0, &bounds, options, k)
        else {
            continue;
        };
        let improves = best
            .as_ref()
            .is_none_or(|(b, _)| minimum.final_value < b.final_value);
        if improves {
            if method != options.method {
                log::debug!("[Solve] {method:?} candidate improves on {:?}.", options.method);
            }
            best = Some((minimum, converged));
        }
    }

    let Some((minimum, converged)) = best else {
        return Err(SolveError::AllStartsFailed { attempts });
    };
    let outcome = SolveOutcome::fitted(signature, &problem, &minimum, converged, options.method);
    log::info!(
        "[Solve] {:?}: x = {:.6}, error = {:.6e} (converged: {converged})",
        options.method,
        outcome.x,
        outcome.error
    );
    Ok(outcome)
}
