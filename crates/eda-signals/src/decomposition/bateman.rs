//! Bateman sweat-gland model discretised as an order-2 ARMA recursion.
//!
//! The continuous impulse response `exp(-t/tau0) - exp(-t/tau1)` has the
//! transfer function `1 / ((s + a0)(s + a1))` up to scale. The bilinear
//! transform turns it into three autoregressive taps `ar` over the fixed
//! moving-average taps `[1, 2, 1]`. Both become banded `n x n` operators:
//! row `i >= 2` holds the taps at columns `i, i-1, i-2`, rows 0 and 1 are
//! empty.

use ndarray::{Array1, ArrayView1};

use super::sparse::{CscMatrix, TripletBuilder};
use crate::error::{DecomposeError, Result};

/// Moving-average taps shared by every Bateman model.
pub const MA_TAPS: [f64; 3] = [1.0, 2.0, 1.0];

/// Discretised Bateman model for a fixed sampling rate.
#[derive(Debug, Clone, PartialEq)]
pub struct BatemanModel {
    tau0: f64,
    tau1: f64,
    sampling_rate: f64,
    ar: [f64; 3],
}

impl BatemanModel {
    /// Build the model from the slow/fast time constants (seconds).
    ///
    /// The order of `tau0` and `tau1` does not matter; they must be positive,
    /// finite and distinct.
    pub fn new(tau0: f64, tau1: f64, sampling_rate: f64) -> Result<Self> {
        if !(tau0.is_finite() && tau1.is_finite()) || tau0 <= 0.0 || tau1 <= 0.0 {
            return Err(DecomposeError::invalid(format!(
                "Bateman time constants must be positive, got tau0={tau0}, tau1={tau1}"
            )));
        }
        if tau0 == tau1 {
            return Err(DecomposeError::invalid(format!(
                "Bateman time constants must differ, got tau0=tau1={tau0}"
            )));
        }
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(DecomposeError::invalid(format!(
                "sampling rate must be positive, got {sampling_rate}"
            )));
        }

        let dt = 1.0 / sampling_rate;
        let a1 = 1.0 / tau0.min(tau1);
        let a0 = 1.0 / tau0.max(tau1);
        let scale = (a1 - a0) * dt * dt;
        let ar = [
            (a1 * dt + 2.0) * (a0 * dt + 2.0) / scale,
            (2.0 * a1 * a0 * dt * dt - 8.0) / scale,
            (a1 * dt - 2.0) * (a0 * dt - 2.0) / scale,
        ];

        Ok(Self {
            tau0,
            tau1,
            sampling_rate,
            ar,
        })
    }

    pub fn tau0(&self) -> f64 {
        self.tau0
    }

    pub fn tau1(&self) -> f64 {
        self.tau1
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn ar(&self) -> [f64; 3] {
        self.ar
    }

    pub fn ma(&self) -> [f64; 3] {
        MA_TAPS
    }

    /// `A`: maps the latent state to the sparse driver.
    pub fn ar_operator(&self, n: usize) -> BandedOperator {
        BandedOperator::new(self.ar, n)
    }

    /// `M`: maps the latent state to the phasic response.
    pub fn ma_operator(&self, n: usize) -> BandedOperator {
        BandedOperator::new(MA_TAPS, n)
    }
}

/// Causal `n x n` operator with three taps per row, starting at row 2.
#[derive(Debug, Clone, PartialEq)]
pub struct BandedOperator {
    taps: [f64; 3],
    n: usize,
}

impl BandedOperator {
    pub fn new(taps: [f64; 3], n: usize) -> Self {
        Self { taps, n }
    }

    pub fn taps(&self) -> [f64; 3] {
        self.taps
    }

    pub fn size(&self) -> usize {
        self.n
    }

    /// Largest tap magnitude.
    pub fn max_abs_tap(&self) -> f64 {
        self.taps.iter().fold(0.0f64, |m, t| m.max(t.abs()))
    }

    /// `out[i] = t0*x[i] + t1*x[i-1] + t2*x[i-2]` for `i >= 2`, zero otherwise.
    pub fn apply(&self, x: ArrayView1<f64>) -> Array1<f64> {
        debug_assert_eq!(x.len(), self.n);
        let [t0, t1, t2] = self.taps;
        let mut out = Array1::zeros(self.n);
        for i in 2..self.n {
            out[i] = t0 * x[i] + t1 * x[i - 1] + t2 * x[i - 2];
        }
        out
    }

    /// Transposed product.
    pub fn apply_transpose(&self, y: ArrayView1<f64>) -> Array1<f64> {
        debug_assert_eq!(y.len(), self.n);
        let mut out = Array1::zeros(self.n);
        for i in 2..self.n {
            for (k, tap) in self.taps.iter().enumerate() {
                out[i - k] += tap * y[i];
            }
        }
        out
    }

    pub fn to_csc(&self) -> CscMatrix {
        let mut builder = TripletBuilder::with_capacity(self.n, self.n, 3 * self.n.saturating_sub(2));
        self.push_into(&mut builder, 0, 0, 1.0);
        builder.build()
    }

    /// Push `scale * self` into `builder` at the given offsets, skipping the
    /// `skip_rows` leading rows (the shifted block starts at `row_offset`).
    pub(crate) fn push_rows_into(
        &self,
        builder: &mut TripletBuilder,
        row_offset: usize,
        col_offset: usize,
        scale: f64,
        skip_rows: usize,
    ) {
        for i in 2.max(skip_rows)..self.n {
            for (k, tap) in self.taps.iter().enumerate() {
                builder.push(row_offset + i - skip_rows, col_offset + i - k, scale * tap);
            }
        }
    }

    pub(crate) fn push_into(&self, builder: &mut TripletBuilder, row_offset: usize, col_offset: usize, scale: f64) {
        self.push_rows_into(builder, row_offset, col_offset, scale, 0);
    }
}
