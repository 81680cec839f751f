//! Method selection and input validation for every decomposition.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cvxeda::{cvxeda, CvxEdaOutput, CvxEdaParams};
use super::filter_based::{highpass_decompose, median_decompose, HighpassParams, MedianParams};
use super::solver::{default_solver, ConvexSolver};
use super::DecompositionResult;
use crate::error::{DecomposeError, Result};

/// Decomposition method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum DecompositionMethod {
    /// Convex optimisation (Greco et al. 2016)
    CvxEda,
    /// Running median tonic (AcqKnowledge)
    #[serde(rename = "smoothmedian")]
    SmoothMedian,
    /// Low-pass tonic, high-pass phasic (AcqKnowledge)
    #[default]
    Highpass,
}

impl DecompositionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecompositionMethod::CvxEda => "cvxeda",
            DecompositionMethod::SmoothMedian => "smoothmedian",
            DecompositionMethod::Highpass => "highpass",
        }
    }
}

impl FromStr for DecompositionMethod {
    type Err = DecomposeError;

    /// Case-insensitive; accepts every alias of each method.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cvxeda" => Ok(DecompositionMethod::CvxEda),
            "median" | "smoothmedian" => Ok(DecompositionMethod::SmoothMedian),
            "highpass" | "biopac" | "acqknowledge" => Ok(DecompositionMethod::Highpass),
            _ => Err(DecomposeError::invalid(format!(
                "unknown decomposition method '{s}', expected one of \
                 cvxeda, median, smoothmedian, highpass, biopac, acqknowledge"
            ))),
        }
    }
}

impl TryFrom<String> for DecompositionMethod {
    type Error = DecomposeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for DecompositionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of every method; only the selected method's block is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposeParams {
    pub cvxeda: CvxEdaParams,
    pub median: MedianParams,
    pub highpass: HighpassParams,
}

/// EDA decomposer
///
/// Holds the method parameters and the convex solver backend used by cvxEDA.
/// Stateless between calls; can be shared across threads.
#[derive(Clone)]
pub struct EdaDecomposer {
    params: DecomposeParams,
    solver: Arc<dyn ConvexSolver>,
}

impl fmt::Debug for EdaDecomposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdaDecomposer")
            .field("params", &self.params)
            .field("solver", &self.solver.name())
            .finish()
    }
}

impl Default for EdaDecomposer {
    fn default() -> Self {
        Self::new(DecomposeParams::default())
    }
}

impl EdaDecomposer {
    /// Create a decomposer using the default solver backend.
    pub fn new(params: DecomposeParams) -> Self {
        Self {
            params,
            solver: default_solver(),
        }
    }

    /// Replace the convex solver backend.
    pub fn with_solver(mut self, solver: Arc<dyn ConvexSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn params(&self) -> &DecomposeParams {
        &self.params
    }

    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    /// Split `signal` into tonic and phasic components.
    ///
    /// # Arguments
    /// * `signal` - Raw EDA samples (µS)
    /// * `sampling_rate` - Samples per second
    /// * `method` - Method name, case-insensitive (see [`DecompositionMethod`])
    ///
    /// # Errors
    /// [`DecomposeError::InvalidArgument`] for an unknown method or bad
    /// input, before any filtering or matrix work.
    pub fn decompose(&self, signal: &[f64], sampling_rate: u32, method: &str) -> Result<DecompositionResult> {
        let method: DecompositionMethod = method.parse()?;
        self.decompose_with(signal, sampling_rate, method)
    }

    /// Same as [`decompose`](Self::decompose) with an already parsed method.
    pub fn decompose_with(
        &self,
        signal: &[f64],
        sampling_rate: u32,
        method: DecompositionMethod,
    ) -> Result<DecompositionResult> {
        validate_input(signal, sampling_rate)?;
        debug!(%method, n = signal.len(), sampling_rate, "decomposing EDA");

        let view = ArrayView1::from(signal);
        let fs = f64::from(sampling_rate);
        match method {
            DecompositionMethod::CvxEda => {
                cvxeda(view, fs, &self.params.cvxeda, self.solver.as_ref()).map(CvxEdaOutput::into_result)
            }
            DecompositionMethod::SmoothMedian => median_decompose(view, fs, &self.params.median),
            DecompositionMethod::Highpass => highpass_decompose(view, fs, &self.params.highpass),
        }
    }

    /// Full cvxEDA fit, including driver, residual and solver diagnostics.
    pub fn decompose_cvxeda(&self, signal: &[f64], sampling_rate: u32) -> Result<CvxEdaOutput> {
        validate_input(signal, sampling_rate)?;
        cvxeda(
            ArrayView1::from(signal),
            f64::from(sampling_rate),
            &self.params.cvxeda,
            self.solver.as_ref(),
        )
    }
}

/// Decompose with the default solver backend.
///
/// `method` is matched case-insensitively; an unknown name fails with
/// [`DecomposeError::InvalidArgument`] and nothing is computed.
pub fn decompose(
    signal: &[f64],
    sampling_rate: u32,
    method: &str,
    params: &DecomposeParams,
) -> Result<DecompositionResult> {
    let method: DecompositionMethod = method.parse()?;
    EdaDecomposer::new(*params).decompose_with(signal, sampling_rate, method)
}

fn validate_input(signal: &[f64], sampling_rate: u32) -> Result<()> {
    if sampling_rate == 0 {
        return Err(DecomposeError::invalid("sampling rate must be positive"));
    }
    if signal.is_empty() {
        return Err(DecomposeError::invalid("signal is empty"));
    }
    if let Some(i) = signal.iter().position(|v| !v.is_finite()) {
        return Err(DecomposeError::invalid(format!(
            "signal contains a non-finite sample at index {i}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::solver::{ConvexProblem, SolverOutput, SolverSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and refuses to solve anything.
    #[derive(Default)]
    struct CountingSolver {
        checks: AtomicUsize,
        solves: AtomicUsize,
    }

    impl ConvexSolver for CountingSolver {
        fn name(&self) -> &str {
            "counting"
        }

        fn check_available(&self) -> Result<()> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn solve(&self, _problem: &ConvexProblem, _settings: &SolverSettings) -> Result<SolverOutput> {
            self.solves.fetch_add(1, Ordering::SeqCst);
            Err(DecomposeError::numerical("counting solver never solves"))
        }
    }

    #[test]
    fn test_method_aliases() {
        let cases = [
            ("cvxeda", DecompositionMethod::CvxEda),
            ("CvxEDA", DecompositionMethod::CvxEda),
            ("median", DecompositionMethod::SmoothMedian),
            ("SmoothMedian", DecompositionMethod::SmoothMedian),
            (" highpass ", DecompositionMethod::Highpass),
            ("BIOPAC", DecompositionMethod::Highpass),
            ("acqknowledge", DecompositionMethod::Highpass),
        ];
        for (name, expected) in cases {
            assert_eq!(name.parse::<DecompositionMethod>().unwrap(), expected, "{name}");
        }
        assert_eq!(DecompositionMethod::default(), DecompositionMethod::Highpass);
    }

    #[test]
    fn test_unknown_method_never_touches_solver() {
        let solver = Arc::new(CountingSolver::default());
        let decomposer = EdaDecomposer::default().with_solver(solver.clone());
        let err = decomposer.decompose(&[1.0; 50], 1000, "unknown_method").unwrap_err();
        assert!(matches!(err, DecomposeError::InvalidArgument(ref msg) if msg.contains("unknown_method")));
        assert_eq!(solver.checks.load(Ordering::SeqCst), 0);
        assert_eq!(solver.solves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_inputs() {
        let decomposer = EdaDecomposer::default();
        for (signal, fs) in [(vec![], 100), (vec![1.0, 2.0], 0), (vec![1.0, f64::NAN, 2.0], 100)] {
            assert!(matches!(
                decomposer.decompose(&signal, fs, "median"),
                Err(DecomposeError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_cvxeda_routes_to_solver() {
        let solver = Arc::new(CountingSolver::default());
        let decomposer = EdaDecomposer::default().with_solver(solver.clone());
        assert_eq!(decomposer.solver_name(), "counting");
        let err = decomposer.decompose(&[2.0; 50], 10, "CVXEDA").unwrap_err();
        assert!(matches!(err, DecomposeError::NumericalFailure(_)));
        assert_eq!(solver.checks.load(Ordering::SeqCst), 1);
        assert_eq!(solver.solves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_median_route() {
        let signal: Vec<f64> = (0..40).map(|i| (i % 5) as f64).collect();
        let out = decompose(&signal, 2, "median", &DecomposeParams::default()).unwrap();
        assert_eq!(out.len(), 40);
        for i in 0..40 {
            assert_eq!(out.tonic[i] + out.phasic[i], signal[i]);
        }
    }
}
