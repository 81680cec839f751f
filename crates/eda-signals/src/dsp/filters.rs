//! Butterworth filters for EDA signal processing
//!
//! Designs low/high/band-pass Butterworth filters as cascades of
//! second-order sections (bilinear transform with pre-warping) and applies
//! them zero-phase: forward, then backward, with odd-extension padding and
//! steady-state initial conditions so that a constant input passes through a
//! low-pass unchanged.

use std::f64::consts::PI;

use ndarray::{Array1, ArrayView1};
use num_complex::Complex64;

use crate::error::{DecomposeError, Result};

/// Pass band of a Butterworth filter, in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterBand {
    /// Keep frequencies below the cutoff.
    Lowpass(f64),
    /// Keep frequencies above the cutoff.
    Highpass(f64),
    /// Keep frequencies between `low` and `high`.
    Bandpass(f64, f64),
}

/// One second-order section, `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`.
#[derive(Debug, Clone, Copy)]
struct Section {
    b: [f64; 3],
    a: [f64; 2],
}

impl Section {
    fn is_first_order(&self) -> bool {
        self.b[2] == 0.0 && self.a[1] == 0.0
    }

    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    /// Transposed direct-form II state reached after an infinite run of unit input.
    fn unit_steady_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        [g - self.b[0], self.b[2] - self.a[1] * g]
    }

    fn run(&self, data: &mut [f64], mut z: [f64; 2]) {
        for x in data.iter_mut() {
            let input = *x;
            let out = self.b[0] * input + z[0];
            z[0] = self.b[1] * input - self.a[0] * out + z[1];
            z[1] = self.b[2] * input - self.a[1] * out;
            *x = out;
        }
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let num = self.b[0] + z_inv * self.b[1] + z_inv2 * self.b[2];
        let den = 1.0 + z_inv * self.a[0] + z_inv2 * self.a[1];
        num / den
    }
}

/// Butterworth filter as a cascade of second-order sections.
#[derive(Debug, Clone)]
pub struct Butterworth {
    sections: Vec<Section>,
    order: usize,
}

impl Butterworth {
    /// Design a Butterworth filter.
    ///
    /// # Arguments
    /// * `order` - Filter order per edge (1-20)
    /// * `band` - Cutoff frequencies in Hz, strictly inside `(0, sampling_rate / 2)`
    /// * `sampling_rate` - Sample rate in Hz
    pub fn design(order: usize, band: FilterBand, sampling_rate: f64) -> Result<Self> {
        if order == 0 || order > 20 {
            return Err(DecomposeError::invalid(format!(
                "filter order must be in 1..=20, got {order}"
            )));
        }
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(DecomposeError::invalid(format!(
                "sampling rate must be positive, got {sampling_rate}"
            )));
        }
        let nyquist = sampling_rate / 2.0;
        let check = |fc: f64| {
            if fc.is_finite() && fc > 0.0 && fc < nyquist {
                Ok(())
            } else {
                Err(DecomposeError::invalid(format!(
                    "cutoff {fc} Hz must lie in (0, {nyquist}) for sampling rate {sampling_rate} Hz"
                )))
            }
        };

        let sections = match band {
            FilterBand::Lowpass(fc) => {
                check(fc)?;
                design_sections(order, fc, sampling_rate, false)
            }
            FilterBand::Highpass(fc) => {
                check(fc)?;
                design_sections(order, fc, sampling_rate, true)
            }
            FilterBand::Bandpass(low, high) => {
                check(low)?;
                check(high)?;
                if low >= high {
                    return Err(DecomposeError::invalid(format!(
                        "band-pass edges must satisfy low < high, got {low} >= {high}"
                    )));
                }
                let mut sections = design_sections(order, high, sampling_rate, false);
                sections.extend(design_sections(order, low, sampling_rate, true));
                sections
            }
        };

        Ok(Self { sections, order })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    /// Magnitude response at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64, sampling_rate: f64) -> f64 {
        let w = 2.0 * PI * freq_hz / sampling_rate;
        let z_inv = Complex64::from_polar(1.0, -w);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z_inv))
            .norm()
    }

    /// Zero-phase filtering (forward-backward).
    pub fn filtfilt(&self, signal: ArrayView1<f64>) -> Array1<f64> {
        let n = signal.len();
        if n == 0 {
            return Array1::zeros(0);
        }
        let pad = self.pad_len().min(n - 1);

        // odd extension about both end points
        let mut ext = Vec::with_capacity(n + 2 * pad);
        let first = signal[0];
        let last = signal[n - 1];
        ext.extend((1..=pad).rev().map(|k| 2.0 * first - signal[k]));
        ext.extend(signal.iter().copied());
        ext.extend((1..=pad).map(|k| 2.0 * last - signal[n - 1 - k]));

        self.run_cascade(&mut ext);
        ext.reverse();
        self.run_cascade(&mut ext);
        ext.reverse();

        Array1::from(ext[pad..pad + n].to_vec())
    }

    /// Filter in place, starting every section at the steady state for `data[0]`.
    fn run_cascade(&self, data: &mut [f64]) {
        let mut level = data[0];
        for section in &self.sections {
            let zi = section.unit_steady_state();
            section.run(data, [zi[0] * level, zi[1] * level]);
            level *= section.dc_gain();
        }
    }

    fn pad_len(&self) -> usize {
        let first_order = self.sections.iter().filter(|s| s.is_first_order()).count();
        3 * (2 * self.sections.len() + 1 - first_order)
    }
}

/// Analog Butterworth prototype poles in the upper-left quadrant, plus the
/// real pole at -1 for odd orders.
fn prototype_poles(order: usize) -> Vec<Complex64> {
    (0..order.div_ceil(2))
        .map(|k| {
            let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
            Complex64::from_polar(1.0, theta)
        })
        .collect()
}

fn design_sections(order: usize, cutoff_hz: f64, sampling_rate: f64, highpass: bool) -> Vec<Section> {
    // pre-warped cutoff, normalised by 2*fs
    let k = (PI * cutoff_hz / sampling_rate).tan();
    let k2 = k * k;

    prototype_poles(order)
        .into_iter()
        .map(|p| {
            if p.im.abs() < 1e-12 {
                let norm = 1.0 / (1.0 + k);
                let b = if highpass {
                    [norm, -norm, 0.0]
                } else {
                    [k * norm, k * norm, 0.0]
                };
                Section { b, a: [(k - 1.0) * norm, 0.0] }
            } else {
                let zeta = -p.re;
                let norm = 1.0 / (1.0 + 2.0 * zeta * k + k2);
                let b = if highpass {
                    [norm, -2.0 * norm, norm]
                } else {
                    [k2 * norm, 2.0 * k2 * norm, k2 * norm]
                };
                Section {
                    b,
                    a: [2.0 * (k2 - 1.0) * norm, (1.0 - 2.0 * zeta * k + k2) * norm],
                }
            }
        })
        .collect()
}

/// Zero-phase Butterworth filtering of `signal`.
pub fn signal_filter(
    signal: ArrayView1<f64>,
    sampling_rate: f64,
    band: FilterBand,
    order: usize,
) -> Result<Array1<f64>> {
    let filter = Butterworth::design(order, band, sampling_rate)?;
    Ok(filter.filtfilt(signal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_section_count_matches_order() {
        let even = Butterworth::design(4, FilterBand::Lowpass(1.0), 100.0).unwrap();
        assert_eq!(even.num_sections(), 2);
        let odd = Butterworth::design(5, FilterBand::Highpass(1.0), 100.0).unwrap();
        assert_eq!(odd.num_sections(), 3);
        assert_eq!(odd.pad_len(), 18);
    }

    #[test]
    fn test_cutoff_is_half_power_point() {
        let fs = 100.0;
        for order in [1, 2, 5] {
            let lp = Butterworth::design(order, FilterBand::Lowpass(5.0), fs).unwrap();
            assert_abs_diff_eq!(lp.magnitude_at(5.0, fs), 1.0 / 2f64.sqrt(), epsilon = 1e-9);
            assert_abs_diff_eq!(lp.magnitude_at(0.0, fs), 1.0, epsilon = 1e-12);

            let hp = Butterworth::design(order, FilterBand::Highpass(5.0), fs).unwrap();
            assert_abs_diff_eq!(hp.magnitude_at(5.0, fs), 1.0 / 2f64.sqrt(), epsilon = 1e-9);
            assert_abs_diff_eq!(hp.magnitude_at(fs / 2.0, fs), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_constant_signal_steady_state() {
        let signal = Array1::from_elem(100, 5.0);
        let low = signal_filter(signal.view(), 1000.0, FilterBand::Lowpass(0.05), 5).unwrap();
        let high = signal_filter(signal.view(), 1000.0, FilterBand::Highpass(0.05), 5).unwrap();
        for i in 0..100 {
            assert_abs_diff_eq!(low[i], 5.0, epsilon = 1e-6);
            assert_abs_diff_eq!(high[i], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_lowpass_removes_fast_oscillation() {
        let fs = 100.0;
        let signal: Array1<f64> = (0..2000)
            .map(|i| 2.0 + (2.0 * PI * 10.0 * i as f64 / fs).sin())
            .collect();
        let low = signal_filter(signal.view(), fs, FilterBand::Lowpass(1.0), 4).unwrap();
        for i in 200..1800 {
            assert_abs_diff_eq!(low[i], 2.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_bandpass_keeps_center_frequency() {
        let fs = 100.0;
        let signal: Array1<f64> = (0..4000)
            .map(|i| (2.0 * PI * 2.0 * i as f64 / fs).sin())
            .collect();
        let band = signal_filter(signal.view(), fs, FilterBand::Bandpass(0.5, 8.0), 3).unwrap();
        let peak = band.slice(ndarray::s![1000..3000]).fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak > 0.9 && peak < 1.05, "peak = {peak}");
    }

    #[test]
    fn test_invalid_designs_rejected() {
        assert!(Butterworth::design(0, FilterBand::Lowpass(1.0), 100.0).is_err());
        assert!(Butterworth::design(2, FilterBand::Lowpass(50.0), 100.0).is_err());
        assert!(Butterworth::design(2, FilterBand::Highpass(-1.0), 100.0).is_err());
        assert!(Butterworth::design(2, FilterBand::Bandpass(5.0, 1.0), 100.0).is_err());
    }

    #[test]
    fn test_short_and_empty_inputs() {
        let filter = Butterworth::design(5, FilterBand::Lowpass(0.05), 10.0).unwrap();
        assert_eq!(filter.filtfilt(Array1::<f64>::zeros(0).view()).len(), 0);
        let one = filter.filtfilt(Array1::from(vec![3.0]).view());
        assert_abs_diff_eq!(one[0], 3.0, epsilon = 1e-9);
    }
}
