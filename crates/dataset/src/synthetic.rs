//! Synthetic regression data: an exponentially damped cosine.

use ndarray::{s, Array3, Axis};
use std::f64::consts::PI;

/// Parameters of [`gen_cosine_amp`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosineSeries {
    /// Amplitude at `x = 0`.
    pub amp: f64,
    pub period: f64,
    /// First x of the series.
    pub x0: usize,
    /// Last x of the series (exclusive).
    pub xn: usize,
    pub step: usize,
    /// Exponential decay rate.
    pub k: f64,
}

impl Default for CosineSeries {
    fn default() -> Self {
        Self {
            amp: 100.0,
            period: 25.0,
            x0: 0,
            xn: 50_000,
            step: 1,
            k: 0.0001,
        }
    }
}

/// `amp * cos(x / (2 pi period)) * exp(-k x)` sampled as an `(n, 1, 1)` tensor,
/// with `n = (xn - x0) * step` and `x = x0 + i * step`.
pub fn gen_cosine_amp(params: &CosineSeries) -> Array3<f64> {
    let n = params.xn.saturating_sub(params.x0) * params.step;
    Array3::from_shape_fn((n, 1, 1), |(i, _, _)| {
        let x = (params.x0 + i * params.step) as f64;
        params.amp * (x / (2.0 * PI * params.period)).cos() * (-params.k * x).exp()
    })
}

/// Regression target: entry `i` is the mean of the next `lookahead` values.
///
/// The last `lookahead` entries have no complete future and stay zero.
pub fn lookahead_mean(series: &Array3<f64>, lookahead: usize) -> Array3<f64> {
    let n = series.len_of(Axis(0));
    let mut target = Array3::zeros(series.raw_dim());
    if lookahead == 0 {
        return target;
    }
    for i in 0..n.saturating_sub(lookahead) {
        let future = series.slice(s![i + 1..i + lookahead + 1, .., ..]);
        if let Some(mean) = future.mean() {
            target[[i, 0, 0]] = mean;
        }
    }
    target
}
