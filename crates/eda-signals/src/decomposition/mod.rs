//! EDA tonic/phasic decomposition
//!
//! Methods:
//! - `cvxeda` - convex optimisation over a Bateman ARMA model and a spline tonic
//! - `median` / `smoothmedian` - running-median tonic
//! - `highpass` / `biopac` / `acqknowledge` - filtered tonic and phasic
//!
//! The cvxEDA path is built from small pieces: [`bateman`] turns time
//! constants into banded operators, [`spline`] builds the tonic bases,
//! [`formulation`] assembles the conic problem over [`sparse`] matrices and
//! [`solver`] hands it to a backend.

pub mod bateman;
mod cvxeda;
mod dispatcher;
mod filter_based;
pub mod formulation;
pub mod solver;
pub mod sparse;
pub mod spline;

use ndarray::Array1;
use serde::{Serialize, Serializer};

pub use bateman::{BandedOperator, BatemanModel};
pub use cvxeda::{cvxeda, CvxEdaOutput, CvxEdaParams};
pub use dispatcher::{decompose, DecomposeParams, DecompositionMethod, EdaDecomposer};
pub use filter_based::{highpass_decompose, median_decompose, HighpassParams, MedianParams};
pub use formulation::{formulate, CvxEdaMatrices, Formulation, SolverVariant};
pub use solver::{default_solver, Cone, ConvexProblem, ConvexSolver, MissingBackend, SolveStatus, SolverOutput, SolverSettings};
#[cfg(feature = "clarabel")]
pub use solver::ClarabelSolver;
pub use sparse::{CscMatrix, TripletBuilder};
pub use spline::{SplineBasis, TrendBasis};

/// Tonic and phasic components, one value per input sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecompositionResult {
    #[serde(rename = "EDA_Tonic", serialize_with = "serialize_samples")]
    pub tonic: Array1<f64>,
    #[serde(rename = "EDA_Phasic", serialize_with = "serialize_samples")]
    pub phasic: Array1<f64>,
}

impl DecompositionResult {
    pub fn len(&self) -> usize {
        self.tonic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tonic.is_empty()
    }

    /// Rows of `(tonic, phasic)`.
    pub fn rows(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.tonic.iter().copied().zip(self.phasic.iter().copied())
    }
}

/// Writes a component as a plain sequence of samples.
pub(crate) fn serialize_samples<S>(samples: &Array1<f64>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(samples.iter())
}
