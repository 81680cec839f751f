//! DSP (Digital Signal Processing) module
//!
//! Filtering and smoothing primitives consumed by the filter-based
//! decomposition methods:
//! - `signal_filter` - zero-phase Butterworth low/high/band-pass
//! - `signal_smooth` - centred median or boxcar smoothing

mod filters;
mod smoothing;

pub use filters::{signal_filter, Butterworth, FilterBand};
pub use smoothing::{signal_smooth, MedianSmoother, SmoothKernel};
