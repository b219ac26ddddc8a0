//! Numerical gradients for objectives that only return a value.

use ndarray::Array1;

/// Default central-difference step.
pub const DEFAULT_STEP: f64 = 1e-8;

/// Central-difference gradient of `f` at `x` with absolute step `h`.
///
/// When one side of a coordinate is infeasible (non-finite), the one-sided
/// difference from the other side is used, using `fx = f(x)`. A coordinate
/// with both sides infeasible yields a non-finite component.
pub fn central_gradient<F>(f: &mut F, x: &Array1<f64>, fx: f64, h: f64) -> Array1<f64>
where
    F: FnMut(&Array1<f64>) -> f64,
{
    let mut g = Array1::zeros(x.len());
    let mut shifted = x.clone();
    for i in 0..x.len() {
        let xi = x[i];
        shifted[i] = xi + h;
        let f_plus = f(&shifted);
        shifted[i] = xi - h;
        let f_minus = f(&shifted);
        shifted[i] = xi;
        g[i] = match (f_plus.is_finite(), f_minus.is_finite()) {
            (true, true) => (f_plus - f_minus) / (2.0 * h),
            (true, false) => (f_plus - fx) / h,
            (false, true) => (fx - f_minus) / h,
            (false, false) => f64::NAN,
        };
    }
    g
}

/// Pairs an objective with its central-difference gradient, producing the
/// `(value, gradient)` closure shape expected by [`crate::lbfgs::Lbfgs`].
pub fn with_numerical_gradient<F>(
    mut f: F,
    h: f64,
) -> impl FnMut(&Array1<f64>) -> (f64, Array1<f64>)
where
    F: FnMut(&Array1<f64>) -> f64,
{
    move |x: &Array1<f64>| {
        let fx = f(x);
        if !fx.is_finite() {
            return (fx, Array1::from_elem(x.len(), f64::NAN));
        }
        let g = central_gradient(&mut f, x, fx, h);
        (fx, g)
    }
}
