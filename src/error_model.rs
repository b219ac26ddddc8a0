//! Residual metrics comparing a model chord against an observed chord.
//!
//! Both chords are given as ratios from the root *including* the root itself,
//! so `target[0] == actual[0] == 1`. The three comparison models differ only in
//! which note pairs contribute a squared residual:
//!
//! - [`ComparisonModel::Rooted`]: every note against the root.
//! - [`ComparisonModel::Pairwise`]: every unordered pair of notes.
//! - [`ComparisonModel::AllSteps`]: successive notes only.
//!
//! In the [`Domain::Log`] domain every residual is a difference of natural
//! logarithms (nepers). Callers convert the final root-sum-square to cents
//! with [`CENTS_PER_NEPER`].

use serde::{Deserialize, Serialize};

/// Cents per neper, `1200 / ln 2`.
pub const CENTS_PER_NEPER: f64 = 1200.0 / std::f64::consts::LN_2;

/// Space in which ratio residuals are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    #[default]
    Linear,
    Log,
}

/// Which note pairs are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonModel {
    #[default]
    Rooted,
    Pairwise,
    AllSteps,
}

/// Converts an interval in cents to a frequency ratio.
pub fn cents_to_ratio(cents: f64) -> f64 {
    (cents / 1200.0).exp2()
}

/// Converts a frequency ratio to an interval in cents.
pub fn ratio_to_cents(ratio: f64) -> f64 {
    1200.0 * ratio.log2()
}

#[inline]
fn residual(target: f64, actual: f64, domain: Domain) -> f64 {
    match domain {
        Domain::Linear => target - actual,
        Domain::Log => target.ln() - actual.ln(),
    }
}

/// Sum of squared residuals between `target` and `actual` under `model`.
///
/// Returns `f64::INFINITY` when any target ratio is non-positive or
/// non-finite, so that optimizers treat such candidates as merely bad.
/// Both slices must have the same length and start with the root (1.0).
pub fn sum_squared_error(
    target: &[f64],
    actual: &[f64],
    domain: Domain,
    model: ComparisonModel,
) -> f64 {
    debug_assert_eq!(target.len(), actual.len());
    if target.iter().any(|&t| !t.is_finite() || t <= 0.0) {
        return f64::INFINITY;
    }
    let n = target.len().min(actual.len());
    let mut sse = 0.0;
    match model {
        ComparisonModel::Rooted => {
            for i in 1..n {
                let r = residual(target[i], actual[i], domain);
                sse += r * r;
            }
        }
        ComparisonModel::Pairwise => {
            for i in 0..n {
                for j in (i + 1)..n {
                    let r = residual(target[j] / target[i], actual[j] / actual[i], domain);
                    sse += r * r;
                }
            }
        }
        ComparisonModel::AllSteps => {
            for i in 1..n {
                let r = residual(target[i] / target[i - 1], actual[i] / actual[i - 1], domain);
                sse += r * r;
            }
        }
    }
    if sse.is_nan() { f64::INFINITY } else { sse }
}

/// Converts a sum of squared residuals into the reported error: its root,
/// expressed in cents for the log domain.
pub fn reported_error(sse: f64, domain: Domain) -> f64 {
    let root = sse.max(0.0).sqrt();
    match domain {
        Domain::Linear => root,
        Domain::Log => root * CENTS_PER_NEPER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    const CHORD_456: [f64; 3] = [1.0, 1.25, 1.5];

    #[test]
    fn identical_chords_have_zero_error_in_every_model() {
        for model in [
            ComparisonModel::Rooted,
            ComparisonModel::Pairwise,
            ComparisonModel::AllSteps,
        ] {
            for domain in [Domain::Linear, Domain::Log] {
                let sse = sum_squared_error(&CHORD_456, &CHORD_456, domain, model);
                assert_that!(&sse).is_close_to(0.0, 1e-15);
            }
        }
    }

    #[test]
    fn rooted_linear_sums_differences_from_root() {
        let target = [1.0, 1.3, 1.5];
        let sse = sum_squared_error(&target, &CHORD_456, Domain::Linear, ComparisonModel::Rooted);
        assert_that!(&sse).is_close_to(0.05 * 0.05, 1e-12);
    }

    #[test]
    fn pairwise_includes_every_pair() {
        let target = [1.0, 1.3, 1.5];
        let expected = (1.3f64 - 1.25).powi(2)
            + (1.5f64 - 1.5).powi(2)
            + (1.5 / 1.3 - 1.5 / 1.25f64).powi(2);
        let sse = sum_squared_error(&target, &CHORD_456, Domain::Linear, ComparisonModel::Pairwise);
        assert_that!(&sse).is_close_to(expected, 1e-12);
    }

    #[test]
    fn all_steps_compares_successive_intervals() {
        let target = [1.0, 1.3, 1.5];
        let expected = (1.3f64 - 1.25).powi(2) + (1.5 / 1.3 - 1.5 / 1.25f64).powi(2);
        let sse = sum_squared_error(&target, &CHORD_456, Domain::Linear, ComparisonModel::AllSteps);
        assert_that!(&sse).is_close_to(expected, 1e-12);
    }

    #[test]
    fn log_domain_measures_nepers() {
        let target = [1.0, 2.0];
        let actual = [1.0, 1.0];
        let sse = sum_squared_error(&target, &actual, Domain::Log, ComparisonModel::Rooted);
        assert_that!(&sse).is_close_to(std::f64::consts::LN_2.powi(2), 1e-12);
        assert_that!(&reported_error(sse, Domain::Log)).is_close_to(1200.0, 1e-9);
    }

    #[test]
    fn infeasible_targets_are_infinite() {
        let actual = [1.0, 1.25];
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let sse =
                sum_squared_error(&[1.0, bad], &actual, Domain::Linear, ComparisonModel::Rooted);
            assert!(sse.is_infinite() && sse > 0.0);
        }
    }

    #[test]
    fn cents_round_trip_through_ratio() {
        assert_that!(&cents_to_ratio(1200.0)).is_close_to(2.0, 1e-12);
        assert_that!(&ratio_to_cents(1.5)).is_close_to(701.955, 1e-3);
    }
}
