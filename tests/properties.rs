use dr_optimizer::{
    CENTS_PER_NEPER, ComparisonModel, DeltaEntry, Domain, Method, SolveError, SolveOptions,
    cents_to_ratio, solve,
};
use spectral::prelude::*;

const OPTIMIZERS: [Method; 3] = [Method::Lbfgs, Method::NelderMead, Method::Powell];

/// Ratios of the chord `1 + cumsum(deltas) / x`, root excluded.
fn synthetic_ratios(x: f64, deltas: &[f64]) -> Vec<f64> {
    let mut cumulative = 0.0;
    deltas
        .iter()
        .map(|d| {
            cumulative += d;
            1.0 + cumulative / x
        })
        .collect()
}

fn signature(entries: &[Option<f64>]) -> Vec<DeltaEntry> {
    entries.iter().map(|&e| DeltaEntry::from(e)).collect()
}

fn relative_error(actual: f64, expected: f64) -> f64 {
    (actual - expected).abs() / expected.abs()
}

fn tight(method: Method) -> SolveOptions {
    SolveOptions::default()
        .with_method(method)
        .with_tolerance(1e-15)
        .with_max_iterations(5000)
}

// --- 1. Exact recovery ---

#[test]
fn exact_chord_with_one_free_delta_is_recovered_by_every_optimizer() {
    let ratios = synthetic_ratios(3.0, &[1.0, 1.2, 1.0]);
    let sig = signature(&[Some(1.0), None, Some(1.0)]);
    for method in OPTIMIZERS {
        let outcome = solve(&sig, &ratios, &tight(method)).unwrap();
        assert_that!(relative_error(outcome.x, 3.0)).is_less_than(1e-3);
        let free = outcome.free_values[0].unwrap();
        assert_that!(relative_error(free, 1.2)).is_less_than(1e-3);
        assert_that!(outcome.error).is_less_than(1e-6);
    }
}

#[test]
fn exact_chord_with_a_coalesced_run_and_two_segments_is_recovered() {
    // Deltas [1, 0.4, 0.4, 1, 0.75, 1]: a two-entry run and a single entry.
    let ratios = synthetic_ratios(4.0, &[1.0, 0.4, 0.4, 1.0, 0.75, 1.0]);
    let sig = signature(&[Some(1.0), None, None, Some(1.0), None, Some(1.0)]);
    for method in OPTIMIZERS {
        let outcome = solve(&sig, &ratios, &tight(method)).unwrap();
        assert_that!(relative_error(outcome.x, 4.0)).is_less_than(1e-3);
        assert_eq!(outcome.segment_totals.len(), 2);
        assert_that!(relative_error(outcome.segment_totals[0], 0.8)).is_less_than(1e-3);
        assert_that!(relative_error(outcome.segment_totals[1], 0.75)).is_less_than(1e-3);
        for value in &outcome.free_values[..2] {
            assert_that!(relative_error(value.unwrap(), 0.4)).is_less_than(1e-3);
        }
        assert_that!(outcome.error).is_less_than(1e-6);
    }
}

#[test]
fn exact_fixed_chord_is_recovered_by_the_grid() {
    let ratios = synthetic_ratios(4.0, &[1.0, 1.0]);
    let sig = signature(&[Some(1.0), Some(1.0)]);
    let outcome = solve(&sig, &ratios, &tight(Method::Grid)).unwrap();
    assert_that!(relative_error(outcome.x, 4.0)).is_less_than(1e-6);
    assert_that!(outcome.error).is_less_than(1e-6);
}

// --- 2. Cross-method agreement ---

#[test]
fn optimizers_agree_on_a_perturbed_chord() {
    let ratios: Vec<f64> = [498.0, 952.1, 1255.7]
        .iter()
        .map(|&c| cents_to_ratio(c))
        .collect();
    let sig = signature(&[Some(1.0), None, Some(1.0)]);
    let errors: Vec<f64> = [Method::Lbfgs, Method::NelderMead, Method::Powell, Method::Grid]
        .into_iter()
        .map(|method| solve(&sig, &ratios, &tight(method)).unwrap().error)
        .collect();
    let lo = errors.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = errors.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert_that!(hi - lo).is_less_than(1e-3);
}

#[test]
fn optimizers_agree_in_log_pairwise_mode() {
    let ratios: Vec<f64> = [276.9, 738.5, 923.1]
        .iter()
        .map(|&c| cents_to_ratio(c))
        .collect();
    let sig = signature(&[Some(1.0), Some(2.0), Some(1.0)]);
    let errors: Vec<f64> = [Method::Lbfgs, Method::NelderMead, Method::Powell, Method::Grid]
        .into_iter()
        .map(|method| {
            let options = tight(method)
                .with_domain(Domain::Log)
                .with_model(ComparisonModel::Pairwise);
            solve(&sig, &ratios, &options).unwrap().error
        })
        .collect();
    let lo = errors.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = errors.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // Cents.
    assert_that!(hi - lo).is_less_than(1e-3);
}

// --- 3. Domain consistency ---

#[test]
fn log_error_is_the_neper_error_in_cents() {
    let ratios: Vec<f64> = [498.0, 952.1, 1255.7]
        .iter()
        .map(|&c| cents_to_ratio(c))
        .collect();
    let sig = signature(&[Some(1.0), None, Some(1.0)]);
    let options = tight(Method::Lbfgs).with_domain(Domain::Log);
    let outcome = solve(&sig, &ratios, &options).unwrap();

    let (x, y) = (outcome.x, outcome.segment_totals[0]);
    let target = [1.0 + 1.0 / x, 1.0 + (1.0 + y) / x, 1.0 + (2.0 + y) / x];
    let nepers = target
        .iter()
        .zip(&ratios)
        .map(|(t, r)| (t.ln() - r.ln()).powi(2))
        .sum::<f64>()
        .sqrt();
    assert_that!(outcome.error / CENTS_PER_NEPER).is_close_to(nepers, 1e-12);
}

#[test]
fn small_intervals_make_log_and_linear_errors_agree() {
    // With every ratio close to 1, ln(t) - ln(f) ~ t - f.
    let mut ratios = synthetic_ratios(100.0, &[1.0, 1.0, 1.0]);
    ratios[1] += 1e-4;
    let sig = signature(&[Some(1.0), Some(1.0), Some(1.0)]);
    let linear = solve(&sig, &ratios, &tight(Method::Grid)).unwrap();
    let log = solve(&sig, &ratios, &tight(Method::Grid).with_domain(Domain::Log)).unwrap();
    let log_nepers = log.error / CENTS_PER_NEPER;
    assert_that!(relative_error(log_nepers, linear.error)).is_less_than(0.05);
}

// --- 4. Degenerate and failing inputs ---

#[test]
fn fully_free_signature_is_a_zero_error_result() {
    let sig = [DeltaEntry::Free(Some(2.0)), DeltaEntry::free(), DeltaEntry::Free(Some(0.5))];
    let outcome = solve(&sig, &[1.2, 1.5, 1.9], &SolveOptions::default()).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.x, 1.0);
    assert_eq!(outcome.error, 0.0);
    assert_eq!(outcome.free_values, vec![Some(2.0), None, Some(0.5)]);
    assert!(outcome.segment_totals.is_empty());
}

#[test]
fn overflowing_residuals_at_every_start_fail_explicitly() {
    let sig = signature(&[Some(1.0), Some(1.0)]);
    match solve(&sig, &[1e300, 1.5], &SolveOptions::default()) {
        Err(SolveError::AllStartsFailed { attempts }) => assert_eq!(attempts, 5),
        other => panic!("Expected AllStartsFailed, got {other:?}"),
    }
}

#[test]
fn iteration_limit_still_returns_the_best_point() {
    // Two free segments, so no grid candidate can step in.
    let ratios = synthetic_ratios(4.0, &[1.0, 0.4, 0.4, 1.0, 0.75, 1.0]);
    let sig = signature(&[Some(1.0), None, None, Some(1.0), None, Some(1.0)]);
    let options = SolveOptions::default()
        .with_method(Method::NelderMead)
        .with_max_iterations(3)
        .with_num_starts(1);
    let outcome = solve(&sig, &ratios, &options).unwrap();
    assert!(!outcome.success);
    assert!(outcome.x > 0.0);
    assert!(outcome.error.is_finite());
}

#[test]
fn fixed_chords_are_settled_by_the_grid_whatever_the_method() {
    let ratios: Vec<f64> = [400.0, 720.0].iter().map(|&c| cents_to_ratio(c)).collect();
    let expected = dr_optimizer::analytic_fdr_x(&ratios, &[1.0, 2.0]).unwrap();
    let sig = signature(&[Some(1.0), Some(1.0)]);
    for method in OPTIMIZERS {
        // One iteration cannot converge on its own.
        let options = SolveOptions::default()
            .with_method(method)
            .with_max_iterations(1)
            .with_num_starts(1);
        let outcome = solve(&sig, &ratios, &options).unwrap();
        assert!(outcome.success, "{method:?} did not pick up the grid result");
        assert_eq!(outcome.method, method);
        assert_that!(relative_error(outcome.x, expected)).is_less_than(1e-6);
    }
}

#[test]
fn single_segment_result_is_never_worse_than_the_grid_alone() {
    let ratios: Vec<f64> = [498.0, 952.1, 1255.7]
        .iter()
        .map(|&c| cents_to_ratio(c))
        .collect();
    let sig = signature(&[Some(1.0), None, Some(1.0)]);
    let limited = |method| {
        SolveOptions::default()
            .with_method(method)
            .with_max_iterations(2)
            .with_num_starts(1)
    };
    let grid = solve(&sig, &ratios, &limited(Method::Grid)).unwrap();
    for method in OPTIMIZERS {
        let outcome = solve(&sig, &ratios, &limited(method)).unwrap();
        assert_that!(outcome.error).is_less_than_or_equal_to(grid.error);
    }
}

// --- 5. Trimming through the public entry point ---

#[test]
fn outer_free_deltas_are_excluded_from_the_fit() {
    // Effective root at note 1 (ratio 1.1); above it x = 5, deltas [1, 0.5, 1].
    let relative = synthetic_ratios(5.0, &[1.0, 0.5, 1.0]);
    let mut ratios = vec![1.1];
    ratios.extend(relative.iter().map(|r| r * 1.1));
    ratios.push(ratios[ratios.len() - 1] * 1.7);
    let sig = [
        DeltaEntry::Free(Some(3.0)),
        DeltaEntry::Fixed(1.0),
        DeltaEntry::free(),
        DeltaEntry::Fixed(1.0),
        DeltaEntry::Free(Some(7.0)),
    ];
    for method in OPTIMIZERS {
        let outcome = solve(&sig, &ratios, &tight(method)).unwrap();
        assert_eq!(outcome.root_offset, 1);
        assert_eq!(outcome.free_values.len(), 3);
        assert_eq!(outcome.free_values[0], Some(3.0));
        assert_eq!(outcome.free_values[2], Some(7.0));
        assert_that!(relative_error(outcome.x, 5.0)).is_less_than(1e-3);
        assert_that!(relative_error(outcome.free_values[1].unwrap(), 0.5)).is_less_than(1e-3);
    }
}

// --- 6. Reference chords ---

#[test]
fn scenario_chord_converges_for_every_optimizer() {
    let ratios: Vec<f64> = [498.0, 952.1, 1255.7]
        .iter()
        .map(|&c| cents_to_ratio(c))
        .collect();
    let sig = signature(&[Some(1.0), None, Some(1.0)]);
    for method in OPTIMIZERS {
        let outcome = solve(&sig, &ratios, &SolveOptions::default().with_method(method)).unwrap();
        assert_that!(outcome.x).is_close_to(3.0, 0.05);
        assert_that!(outcome.free_values[0].unwrap()).is_close_to(1.2, 0.05);
        assert_that!(outcome.error).is_less_than(0.01);
    }
}

#[test]
fn just_major_triad_has_scale_four() {
    let sig = signature(&[Some(1.0), Some(1.0)]);
    for method in [Method::Lbfgs, Method::NelderMead, Method::Powell, Method::Grid] {
        let outcome = solve(&sig, &[1.25, 1.5], &tight(method)).unwrap();
        assert_that!(outcome.x).is_close_to(4.0, 4e-3);
    }
}

#[test]
fn tempered_chords_match_the_closed_form_scale() {
    let cases: [(&[f64], &[f64]); 3] = [
        (&[400.0, 720.0], &[1.0, 1.0]),
        (&[276.9, 738.5, 923.1], &[1.0, 2.0, 1.0]),
        (&[257.1, 771.4, 942.9], &[1.0, 3.0, 1.0]),
    ];
    for (cents, deltas) in cases {
        let ratios: Vec<f64> = cents.iter().map(|&c| cents_to_ratio(c)).collect();
        let cumulative: Vec<f64> = deltas
            .iter()
            .scan(0.0, |acc, d| {
                *acc += d;
                Some(*acc)
            })
            .collect();
        let expected = dr_optimizer::analytic_fdr_x(&ratios, &cumulative).unwrap();
        let sig: Vec<DeltaEntry> = deltas.iter().map(|&d| DeltaEntry::Fixed(d)).collect();
        for method in [Method::Lbfgs, Method::Grid] {
            let outcome = solve(&sig, &ratios, &tight(method)).unwrap();
            assert_that!(relative_error(outcome.x, expected)).is_less_than(1e-5);
        }
    }
}
