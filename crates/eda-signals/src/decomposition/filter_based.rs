//! Filter-based decompositions from the Biopac AcqKnowledge toolbox.
//!
//! - median: tonic is a running median over a few seconds, phasic the rest
//! - high-pass: tonic and phasic are low- and high-passed copies of the
//!   signal at the same cutoff. They are filtered independently, so their sum
//!   only approximates the signal.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DecompositionResult;
use crate::dsp::{signal_filter, signal_smooth, FilterBand, SmoothKernel};
use crate::error::{DecomposeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedianParams {
    /// Median window length in seconds.
    pub smoothing_factor: f64,
}

impl Default for MedianParams {
    fn default() -> Self {
        Self { smoothing_factor: 4.0 }
    }
}

impl MedianParams {
    /// Window length in samples before it is forced odd.
    pub fn window(&self, sampling_rate: f64) -> Result<usize> {
        let size = (self.smoothing_factor * sampling_rate).round();
        if !size.is_finite() || size < 1.0 {
            return Err(DecomposeError::invalid(format!(
                "median window of {} s at {sampling_rate} Hz is empty",
                self.smoothing_factor
            )));
        }
        Ok(size as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighpassParams {
    pub cutoff_hz: f64,
    /// Butterworth order, 2 unless configured.
    pub order: usize,
}

impl Default for HighpassParams {
    fn default() -> Self {
        Self {
            cutoff_hz: 0.05,
            order: 2,
        }
    }
}

/// Tonic by median smoothing, phasic as the remainder.
pub fn median_decompose(
    signal: ArrayView1<f64>,
    sampling_rate: f64,
    params: &MedianParams,
) -> Result<DecompositionResult> {
    let window = params.window(sampling_rate)?;
    debug!(window, "median decomposition");
    let tonic = signal_smooth(signal, SmoothKernel::Median, window)?;
    let phasic = &signal - &tonic;
    Ok(DecompositionResult { tonic, phasic })
}

/// Tonic by low-pass, phasic by high-pass at the same cutoff.
pub fn highpass_decompose(
    signal: ArrayView1<f64>,
    sampling_rate: f64,
    params: &HighpassParams,
) -> Result<DecompositionResult> {
    debug!(cutoff_hz = params.cutoff_hz, order = params.order, "high-pass decomposition");
    let phasic = signal_filter(signal, sampling_rate, FilterBand::Highpass(params.cutoff_hz), params.order)?;
    let tonic = signal_filter(signal, sampling_rate, FilterBand::Lowpass(params.cutoff_hz), params.order)?;
    Ok(DecompositionResult { tonic, phasic })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn test_median_window_in_samples() {
        let params = MedianParams::default();
        assert_eq!(params.window(1000.0).unwrap(), 4000);
        assert_eq!(params.window(2.5).unwrap(), 10);
        let tiny = MedianParams { smoothing_factor: 0.1 };
        assert!(tiny.window(2.0).is_err());
    }

    #[test]
    fn test_median_phasic_is_exact_remainder() {
        let signal: Array1<f64> = (0..60)
            .map(|i| 1.0 + (if i % 17 == 5 { 3.0 } else { 0.0 }) + 0.01 * i as f64)
            .collect();
        let out = median_decompose(signal.view(), 2.0, &MedianParams::default()).unwrap();
        for i in 0..60 {
            assert_eq!(out.phasic[i], signal[i] - out.tonic[i]);
        }
        // isolated spikes are rejected by the 9-sample median
        assert!(out.phasic[22] > 2.5);
        assert!(out.tonic[22] < 1.5);
    }

    #[test]
    fn test_highpass_components_are_filtered_independently() {
        let fs = 10.0;
        let signal: Array1<f64> = (0..600)
            .map(|i| 2.0 + 0.002 * i as f64 + (i as f64 * 0.3).sin())
            .collect();
        let params = HighpassParams::default();
        let out = highpass_decompose(signal.view(), fs, &params).unwrap();
        assert_eq!(params.order, 2);
        let low = signal_filter(signal.view(), fs, FilterBand::Lowpass(0.05), 2).unwrap();
        let high = signal_filter(signal.view(), fs, FilterBand::Highpass(0.05), 2).unwrap();
        assert_eq!(out.tonic, low);
        assert_eq!(out.phasic, high);
    }

    #[test]
    fn test_highpass_invalid_cutoff() {
        let signal = Array1::from_elem(100, 1.0);
        let params = HighpassParams { cutoff_hz: 0.05, order: 2 };
        // Nyquist of 0.1 Hz sits at the cutoff
        assert!(matches!(
            highpass_decompose(signal.view(), 0.1, &params),
            Err(DecomposeError::InvalidArgument(_))
        ));
    }
}
