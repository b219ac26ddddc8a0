//! The immutable fitting problem shared by every solver.

use ndarray::Array1;

use crate::error_model::{ComparisonModel, Domain, reported_error, sum_squared_error};
use crate::segments::{DeltaEntry, SegmentLayout};

/// An observed chord, its trimmed delta signature and the error metric.
///
/// Parameter vectors are laid out as `[x, y_1, ..., y_k]`: the scale factor
/// followed by one total per free segment.
#[derive(Debug, Clone)]
pub struct Problem {
    layout: SegmentLayout,
    /// Observed ratios including the effective root.
    observed: Vec<f64>,
    domain: Domain,
    model: ComparisonModel,
}

impl Problem {
    pub fn new(layout: SegmentLayout, domain: Domain, model: ComparisonModel) -> Self {
        let mut observed = Vec::with_capacity(layout.len() + 1);
        observed.push(1.0);
        observed.extend_from_slice(&layout.ratios);
        Self {
            layout,
            observed,
            domain,
            model,
        }
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn model(&self) -> ComparisonModel {
        self.model
    }

    /// Observed ratios including the effective root (first entry is 1).
    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    /// Length of a parameter vector.
    pub fn dimension(&self) -> usize {
        1 + self.layout.free_count()
    }

    /// The same problem measured with another metric.
    pub fn with_metric(&self, domain: Domain, model: ComparisonModel) -> Self {
        Self {
            layout: self.layout.clone(),
            observed: self.observed.clone(),
            domain,
            model,
        }
    }

    /// Per-entry deltas with every free member receiving an equal share of its
    /// segment total.
    pub fn deltas(&self, params: &Array1<f64>) -> Vec<f64> {
        let layout = &self.layout;
        layout
            .signature
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                DeltaEntry::Fixed(v) => *v,
                DeltaEntry::Free(_) => match layout.segment_of(i) {
                    Some(seg) => params[1 + seg] / layout.free_segments[seg].len() as f64,
                    None => 0.0,
                },
            })
            .collect()
    }

    /// Prefix sums of [`Problem::deltas`].
    pub fn cumulative_deltas(&self, params: &Array1<f64>) -> Vec<f64> {
        self.deltas(params)
            .into_iter()
            .scan(0.0, |acc, d| {
                *acc += d;
                Some(*acc)
            })
            .collect()
    }

    /// Model chord `[1, (x + D_1)/x, (x + D_2)/x, ...]`.
    pub fn target_ratios(&self, params: &Array1<f64>) -> Vec<f64> {
        let x = params[0];
        std::iter::once(1.0)
            .chain(
                self.cumulative_deltas(params)
                    .into_iter()
                    .map(|d| (x + d) / x),
            )
            .collect()
    }

    /// Sum of squared residuals at `params`; `+inf` for infeasible points.
    pub fn evaluate(&self, params: &Array1<f64>) -> f64 {
        if params.len() != self.dimension() || params.iter().any(|v| !v.is_finite()) {
            return f64::INFINITY;
        }
        if params[0] <= 0.0 {
            return f64::INFINITY;
        }
        let target = self.target_ratios(params);
        sum_squared_error(&target, &self.observed, self.domain, self.model)
    }

    /// The reported error at `params` (root-sum-square, cents in log domain).
    pub fn error(&self, params: &Array1<f64>) -> f64 {
        reported_error(self.evaluate(params), self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use spectral::prelude::*;

    fn problem(signature: &[Option<f64>], ratios: &[f64]) -> Problem {
        let sig: Vec<DeltaEntry> = signature.iter().map(|&e| DeltaEntry::from(e)).collect();
        let layout = SegmentLayout::from_signature(ratios, &sig).unwrap();
        Problem::new(layout, Domain::Linear, ComparisonModel::Rooted)
    }

    #[test]
    fn free_segment_total_is_shared_evenly() {
        let p = problem(&[Some(1.0), None, None, Some(1.0)], &[1.2, 1.4, 1.6, 1.8]);
        let deltas = p.deltas(&array![5.0, 3.0]);
        assert_eq!(deltas, vec![1.0, 1.5, 1.5, 1.0]);
        assert_eq!(p.cumulative_deltas(&array![5.0, 3.0]), vec![1.0, 2.5, 4.0, 5.0]);
    }

    #[test]
    fn target_ratios_follow_the_scale_factor() {
        let p = problem(&[Some(1.0), Some(1.0)], &[1.25, 1.5]);
        let target = p.target_ratios(&array![4.0]);
        assert_eq!(target, vec![1.0, 1.25, 1.5]);
        assert_that!(&p.evaluate(&array![4.0])).is_close_to(0.0, 1e-15);
    }

    #[test]
    fn non_positive_scale_is_infeasible() {
        let p = problem(&[Some(1.0), Some(1.0)], &[1.25, 1.5]);
        assert!(p.evaluate(&array![0.0]).is_infinite());
        assert!(p.evaluate(&array![-2.0]).is_infinite());
        assert!(p.evaluate(&array![f64::NAN]).is_infinite());
    }

    #[test]
    fn wrong_dimension_is_infeasible() {
        let p = problem(&[Some(1.0), None, Some(1.0)], &[1.2, 1.4, 1.6]);
        assert_eq!(p.dimension(), 2);
        assert!(p.evaluate(&array![3.0]).is_infinite());
    }
}
