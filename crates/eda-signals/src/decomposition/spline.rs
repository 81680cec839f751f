//! Tonic regressors: a uniform spline basis and a linear trend.

use ndarray::{Array1, ArrayView1};

use super::sparse::{CscMatrix, TripletBuilder};
use crate::error::{DecomposeError, Result};

/// Spline basis `B` (`n x nB`) with knots every `s` samples.
///
/// The kernel is the order-1 spline `1, 2, .., s, .., 2, 1` convolved with
/// itself and scaled to a peak of 1, giving `4s - 3` taps centred on each
/// knot. Knots sit at `0, s, 2s, ..` below `n`; taps that fall outside
/// `[0, n)` are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineBasis {
    n: usize,
    spacing: usize,
    kernel: Vec<f64>,
}

impl SplineBasis {
    /// `delta_knot` is the knot spacing in seconds.
    pub fn new(delta_knot: f64, sampling_rate: f64, n: usize) -> Result<Self> {
        if !(delta_knot.is_finite() && sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(DecomposeError::invalid(format!(
                "invalid knot spacing {delta_knot} s at {sampling_rate} Hz"
            )));
        }
        let spacing = (delta_knot * sampling_rate).round();
        if spacing < 1.0 {
            return Err(DecomposeError::invalid(format!(
                "knot spacing of {delta_knot} s rounds to {spacing} samples at {sampling_rate} Hz"
            )));
        }
        let spacing = spacing as usize;
        Ok(Self {
            n,
            spacing,
            kernel: knot_kernel(spacing),
        })
    }

    /// Knot spacing in samples.
    pub fn spacing(&self) -> usize {
        self.spacing
    }

    pub fn rows(&self) -> usize {
        self.n
    }

    /// Number of basis functions, `ceil(n / s)`.
    pub fn len(&self) -> usize {
        self.n.div_ceil(self.spacing)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kernel(&self) -> &[f64] {
        &self.kernel
    }

    /// Non-zero `(row, value)` taps of basis column `j`.
    pub fn column(&self, j: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let half = (self.kernel.len() / 2) as isize;
        let center = (j * self.spacing) as isize;
        let n = self.n as isize;
        self.kernel.iter().enumerate().filter_map(move |(k, &v)| {
            let row = center - half + k as isize;
            (0..n).contains(&row).then_some((row as usize, v))
        })
    }

    /// `B * l`
    pub fn apply(&self, coefficients: ArrayView1<f64>) -> Array1<f64> {
        debug_assert_eq!(coefficients.len(), self.len());
        let mut out = Array1::zeros(self.n);
        for (j, &c) in coefficients.iter().enumerate() {
            for (row, v) in self.column(j) {
                out[row] += v * c;
            }
        }
        out
    }

    pub fn to_csc(&self) -> CscMatrix {
        let mut builder = TripletBuilder::with_capacity(self.n, self.len(), self.len() * self.kernel.len());
        for j in 0..self.len() {
            for (row, v) in self.column(j) {
                builder.push(row, j, v);
            }
        }
        builder.build()
    }
}

/// Tent `1..s..1` convolved with itself, peak 1.
///
/// The tent is two length-`s` boxes convolved, so tap `m` counts the ways to
/// write `m` as four integers in `[0, s)`. Inclusion-exclusion gives that
/// count directly, in exact integers.
fn knot_kernel(spacing: usize) -> Vec<f64> {
    let s = spacing as i64;
    let choose3 = |x: i64| if x < 3 { 0 } else { x * (x - 1) * (x - 2) / 6 };
    let count = |m: i64| {
        [1, -4, 6, -4, 1]
            .iter()
            .enumerate()
            .map(|(j, sign)| sign * choose3(m - j as i64 * s + 3))
            .sum::<i64>()
    };

    let peak = count(2 * (s - 1)) as f64;
    (0..4 * s - 3).map(|m| count(m) as f64 / peak).collect()
}

/// Linear trend basis `C = [1, (i + 1) / n]` (`n x 2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendBasis {
    n: usize,
}

impl TrendBasis {
    pub const COLUMNS: usize = 2;

    pub fn new(n: usize) -> Self {
        Self { n }
    }

    pub fn ramp(&self, i: usize) -> f64 {
        (i + 1) as f64 / self.n as f64
    }

    /// `C * d`
    pub fn apply(&self, d: ArrayView1<f64>) -> Array1<f64> {
        debug_assert_eq!(d.len(), Self::COLUMNS);
        Array1::from_iter((0..self.n).map(|i| d[0] + d[1] * self.ramp(i)))
    }

    pub fn to_csc(&self) -> CscMatrix {
        let mut builder = TripletBuilder::with_capacity(self.n, Self::COLUMNS, 2 * self.n);
        for i in 0..self.n {
            builder.push(i, 0, 1.0);
            builder.push(i, 1, self.ramp(i));
        }
        builder.build()
    }
}
