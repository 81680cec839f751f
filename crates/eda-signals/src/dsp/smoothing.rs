//! Sliding-window smoothers.
//!
//! Windows are centred and always odd; an even size is bumped up by one.
//! Samples beyond either end are taken to equal the nearest edge sample.

use std::cmp::Ordering;

use ndarray::{Array1, ArrayView1};

use crate::error::{DecomposeError, Result};

/// Smoothing kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothKernel {
    /// Running median.
    Median,
    /// Running mean.
    Boxcar,
}

/// Running median over a centred window.
#[derive(Debug, Clone)]
pub struct MedianSmoother {
    window: usize,
}

impl MedianSmoother {
    /// `size` is made odd by rounding up.
    pub fn new(size: usize) -> Result<Self> {
        Ok(Self {
            window: odd_window(size)?,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn smooth(&self, signal: ArrayView1<f64>) -> Array1<f64> {
        let n = signal.len();
        if n == 0 {
            return Array1::zeros(0);
        }
        let half = (self.window / 2) as isize;
        let at = |i: isize| signal[i.clamp(0, n as isize - 1) as usize];

        let mut sorted: Vec<f64> = (-half..=half).map(at).collect();
        sorted.sort_by(f64::total_cmp);

        let mut out = Array1::zeros(n);
        for i in 0..n as isize {
            out[i as usize] = sorted[half as usize];

            let leaving = at(i - half);
            if let Ok(pos) = sorted.binary_search_by(|v| v.total_cmp(&leaving)) {
                sorted.remove(pos);
            }
            let entering = at(i + half + 1);
            let pos = sorted
                .binary_search_by(|v| match v.total_cmp(&entering) {
                    Ordering::Equal => Ordering::Less,
                    other => other,
                })
                .unwrap_or_else(|p| p);
            sorted.insert(pos, entering);
        }
        out
    }
}

fn odd_window(size: usize) -> Result<usize> {
    if size == 0 {
        return Err(DecomposeError::invalid("smoothing window must be at least 1 sample"));
    }
    Ok(if size % 2 == 0 { size + 1 } else { size })
}

fn boxcar(signal: ArrayView1<f64>, window: usize) -> Array1<f64> {
    let n = signal.len();
    if n == 0 {
        return Array1::zeros(0);
    }
    let half = (window / 2) as isize;
    let at = |i: isize| signal[i.clamp(0, n as isize - 1) as usize];

    let mut sum: f64 = (-half..=half).map(at).sum();
    let mut out = Array1::zeros(n);
    for i in 0..n as isize {
        out[i as usize] = sum / window as f64;
        sum += at(i + half + 1) - at(i - half);
    }
    out
}

/// Smooth `signal` with `kernel` over `size` samples.
pub fn signal_smooth(signal: ArrayView1<f64>, kernel: SmoothKernel, size: usize) -> Result<Array1<f64>> {
    match kernel {
        SmoothKernel::Median => Ok(MedianSmoother::new(size)?.smooth(signal)),
        SmoothKernel::Boxcar => Ok(boxcar(signal, odd_window(size)?)),
    }
}
