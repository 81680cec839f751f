//! # eda-signals
//!
//! Electrodermal activity (EDA) processing.
//!
//! This crate provides:
//! - **Decomposition**: split skin conductance into a slow tonic level and a
//!   fast phasic response (cvxEDA, median smoothing, high-pass filtering)
//! - **DSP functions**: zero-phase Butterworth filtering and median smoothing
//! - **Configuration**: TOML files with `EDA_*` environment overrides
//!
//! ## Example
//!
//! ```ignore
//! use eda_signals::{decompose, DecomposeParams};
//!
//! let result = decompose(&samples, 100, "cvxeda", &DecomposeParams::default())?;
//!
//! for (tonic, phasic) in result.rows() {
//!     println!("{tonic:.4},{phasic:.4}");
//! }
//! ```
//!
//! cvxEDA needs a convex solver. The default `clarabel` feature provides one;
//! without it the cvxEDA method fails with
//! [`DecomposeError::DependencyMissing`] while the filter methods keep working.

pub mod config;
pub mod decomposition;
pub mod dsp;
pub mod error;

pub use config::{ConfigError, EdaConfig};
pub use decomposition::{
    cvxeda, decompose, CvxEdaOutput, CvxEdaParams, DecomposeParams, DecompositionMethod, DecompositionResult,
    EdaDecomposer, HighpassParams, MedianParams, SolverVariant,
};
pub use error::{DecomposeError, Result};
