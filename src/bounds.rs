//! Box constraints on parameter vectors.

use ndarray::Array1;

/// Relative inset used when projecting onto a finite bound, so that
/// projected points stay strictly feasible for objectives that are infinite
/// on the boundary itself.
const PROJECTION_INSET: f64 = 1e-10;

/// Per-coordinate box `lower <= x <= upper`; infinite entries are unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSpec {
    lower: Array1<f64>,
    upper: Array1<f64>,
}

impl BoxSpec {
    /// # Panics
    /// If the lengths differ or some `lower[i] > upper[i]`.
    pub fn new(lower: Array1<f64>, upper: Array1<f64>) -> Self {
        assert_eq!(lower.len(), upper.len(), "lower/upper lengths differ");
        for i in 0..lower.len() {
            assert!(
                lower[i] <= upper[i],
                "lower bound exceeds upper bound at index {i}"
            );
        }
        Self { lower, upper }
    }

    /// The chord-fit box: scale factor strictly positive, segment totals free.
    pub fn positive_scale(dimension: usize) -> Self {
        let mut lower = Array1::from_elem(dimension, f64::NEG_INFINITY);
        if dimension > 0 {
            lower[0] = 0.0;
        }
        Self::new(lower, Array1::from_elem(dimension, f64::INFINITY))
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    fn inset(bound: f64) -> f64 {
        PROJECTION_INSET * (1.0 + bound.abs())
    }

    /// Clamps every coordinate into the box, moving finite bounds inward by a
    /// small inset.
    pub fn project(&self, x: &Array1<f64>) -> Array1<f64> {
        let mut z = x.clone();
        for i in 0..z.len().min(self.len()) {
            let lo = self.lower[i];
            let hi = self.upper[i];
            if lo.is_finite() && z[i] < lo + Self::inset(lo) {
                z[i] = lo + Self::inset(lo);
            } else if hi.is_finite() && z[i] > hi - Self::inset(hi) {
                z[i] = hi - Self::inset(hi);
            }
        }
        z
    }

    /// True when every coordinate lies strictly inside its finite bounds.
    pub fn contains_strictly(&self, x: &Array1<f64>) -> bool {
        (0..x.len().min(self.len())).all(|i| {
            let v = x[i];
            !(self.lower[i].is_finite() && v <= self.lower[i])
                && !(self.upper[i].is_finite() && v >= self.upper[i])
        })
    }

    /// Log-barrier penalty `-weight * sum ln(distance to each finite bound)`,
    /// `+inf` outside the open box.
    pub fn barrier(&self, x: &Array1<f64>, weight: f64) -> f64 {
        if !self.contains_strictly(x) {
            return f64::INFINITY;
        }
        let mut penalty = 0.0;
        for i in 0..x.len().min(self.len()) {
            if self.lower[i].is_finite() {
                penalty -= weight * (x[i] - self.lower[i]).ln();
            }
            if self.upper[i].is_finite() {
                penalty -= weight * (self.upper[i] - x[i]).ln();
            }
        }
        penalty
    }
}
