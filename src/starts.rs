//! Initial parameter vectors for the multi-start driver.

use ndarray::Array1;

use crate::problem::Problem;
use crate::segments::DeltaEntry;

/// Smallest initial segment total.
const MIN_SEGMENT_TOTAL: f64 = 0.1;
/// Spread applied to `x` when estimates are reused.
const CYCLE_FACTORS: [f64; 6] = [0.5, 2.0, 0.75, 1.5, 0.25, 4.0];

/// Candidate scale factors, best guess first: the algebraic back-substitution
/// `x = D / (f - 1)` of the first fixed delta, then `1`, the first ratio, the
/// mean ratio and the midpoint of the extreme ratios. Only positive finite
/// values are kept, without duplicates.
pub fn scale_candidates(problem: &Problem) -> Vec<f64> {
    let ratios = &problem.layout().ratios;
    let mut raw = Vec::with_capacity(5);

    if let (Some(DeltaEntry::Fixed(d)), Some(f)) =
        (problem.layout().signature.first(), ratios.first())
    {
        raw.push(d / (f - 1.0));
    }
    raw.push(1.0);
    if let Some(&first) = ratios.first() {
        raw.push(first);
        raw.push(ratios.iter().sum::<f64>() / ratios.len() as f64);
        let lo = ratios.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = ratios.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        raw.push(0.5 * (lo + hi));
    }

    let mut candidates: Vec<f64> = Vec::with_capacity(raw.len());
    for x in raw {
        push_distinct(&mut candidates, x);
    }
    candidates
}

/// Appends `x` when it is a positive finite value not already present.
fn push_distinct(xs: &mut Vec<f64>, x: f64) {
    let duplicate = xs
        .iter()
        .any(|&c| (c - x).abs() <= 1e-12 * c.abs().max(1.0));
    if x > 0.0 && x.is_finite() && !duplicate {
        xs.push(x);
    }
}

/// Segment totals for a given `x`: the note spacing bracketing each segment,
/// converted to delta units and floored at 0.1.
pub fn segment_estimates(problem: &Problem, x: f64) -> Vec<f64> {
    let observed = problem.observed();
    problem
        .layout()
        .free_segments
        .iter()
        .map(|seg| {
            let spacing = observed[seg.end + 1] - observed[seg.start];
            let y = x * spacing;
            if y.is_finite() {
                y.max(MIN_SEGMENT_TOTAL)
            } else {
                MIN_SEGMENT_TOTAL
            }
        })
        .collect()
}

/// Exactly `num_starts` parameter vectors `[x, y_1, ..., y_k]`.
///
/// When there are fewer distinct estimates than requested, they are reused
/// with `x` spread by a fixed factor per round. A scaled `x` that repeats an
/// earlier one is skipped, so every vector differs.
pub fn starting_points(problem: &Problem, num_starts: usize) -> Vec<Array1<f64>> {
    let mut candidates = scale_candidates(problem);
    if candidates.is_empty() {
        candidates.push(1.0);
    }
    let per_round = candidates.len();

    let mut xs: Vec<f64> = Vec::with_capacity(num_starts);
    let mut k = 0;
    // Powers of the cycle factors overflow long before this many rounds.
    let max_attempts = per_round * CYCLE_FACTORS.len() * 1024;
    while xs.len() < num_starts && k < max_attempts {
        let round = k / per_round;
        let base = candidates[k % per_round];
        let x = if round == 0 {
            base
        } else {
            let r = round - 1;
            let factor = CYCLE_FACTORS[r % CYCLE_FACTORS.len()];
            base * factor.powi(1 + (r / CYCLE_FACTORS.len()) as i32)
        };
        push_distinct(&mut xs, x);
        k += 1;
    }

    xs.into_iter()
        .map(|x| {
            std::iter::once(x)
                .chain(segment_estimates(problem, x))
                .collect()
        })
        .collect()
}
