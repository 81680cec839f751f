//! cvxEDA: convex-optimisation tonic/phasic decomposition.
//!
//! The skin-conductance signal is modelled as
//!
//! ```text
//! y = M q + B l + C d + e
//! ```
//!
//! where `A q` is a sparse nonnegative sudomotor driver passed through the
//! Bateman ARMA model, `B l` is a smooth cubic-spline tonic level, `C d` an
//! offset plus linear trend and `e` white noise. See [`super::formulation`]
//! for the optimisation problem itself.
//!
//! Reference: Greco, A., Valenza, G., Lanata, A., Scilingo, E. P. & Citi, L.
//! (2016). cvxEDA: a Convex Optimization Approach to Electrodermal Activity
//! Processing. IEEE Trans. Biomed. Eng. 63(4), 797-804.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::bateman::BatemanModel;
use super::formulation::{formulate, CvxEdaMatrices, SolverVariant};
use super::solver::{ConvexSolver, SolveStatus, SolverSettings};
use super::{serialize_samples, DecompositionResult};
use crate::error::{DecomposeError, Result};

/// cvxEDA model and solver parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvxEdaParams {
    /// Slow Bateman time constant (s).
    pub tau0: f64,
    /// Fast Bateman time constant (s).
    pub tau1: f64,
    /// Tonic spline knot spacing (s).
    pub delta_knot: f64,
    /// Sparsity penalty on the driver.
    pub alpha: f64,
    /// Ridge penalty on the spline coefficients.
    pub gamma: f64,
    /// Relative duality-gap tolerance handed to the solver.
    pub reltol: f64,
    pub solver: SolverVariant,
    pub max_iter: u32,
}

impl Default for CvxEdaParams {
    fn default() -> Self {
        Self {
            tau0: 2.0,
            tau1: 0.7,
            delta_knot: 10.0,
            alpha: 8e-4,
            gamma: 1e-2,
            reltol: 1e-9,
            solver: SolverVariant::QuadraticProgram,
            max_iter: 200,
        }
    }
}

impl CvxEdaParams {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("tau0", self.tau0),
            ("tau1", self.tau1),
            ("delta_knot", self.delta_knot),
            ("reltol", self.reltol),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(DecomposeError::invalid(format!("{name} must be positive, got {value}")));
            }
        }
        for (name, value) in [("alpha", self.alpha), ("gamma", self.gamma)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(DecomposeError::invalid(format!("{name} must be non-negative, got {value}")));
            }
        }
        if self.tau0 == self.tau1 {
            return Err(DecomposeError::invalid("tau0 and tau1 must differ"));
        }
        if self.max_iter == 0 {
            return Err(DecomposeError::invalid("max_iter must be at least 1"));
        }
        Ok(())
    }

    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            reltol: self.reltol,
            max_iter: self.max_iter,
            ..SolverSettings::default()
        }
    }
}

/// Every component of a cvxEDA fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvxEdaOutput {
    /// `B l + C d`
    #[serde(serialize_with = "serialize_samples")]
    pub tonic: Array1<f64>,
    /// `M q`
    #[serde(serialize_with = "serialize_samples")]
    pub phasic: Array1<f64>,
    /// `A q`, the sparse sudomotor driver.
    #[serde(serialize_with = "serialize_samples")]
    pub driver: Array1<f64>,
    /// `y - phasic - tonic`
    #[serde(serialize_with = "serialize_samples")]
    pub residual: Array1<f64>,
    /// `l`
    #[serde(serialize_with = "serialize_samples")]
    pub spline_coefficients: Array1<f64>,
    /// `d`: offset and slope.
    #[serde(serialize_with = "serialize_samples")]
    pub trend_coefficients: Array1<f64>,
    /// Full objective value including the constant `½yᵀy`.
    pub objective: f64,
    pub iterations: u32,
    pub status: SolveStatus,
    pub variant: SolverVariant,
}

impl CvxEdaOutput {
    pub fn into_result(self) -> DecompositionResult {
        DecompositionResult {
            tonic: self.tonic,
            phasic: self.phasic,
        }
    }
}

/// Fit the cvxEDA model to `signal` sampled at `sampling_rate` Hz.
///
/// The solver's availability is checked before any matrix is built, so a
/// missing backend fails fast with [`DecomposeError::DependencyMissing`].
pub fn cvxeda(
    signal: ArrayView1<f64>,
    sampling_rate: f64,
    params: &CvxEdaParams,
    solver: &dyn ConvexSolver,
) -> Result<CvxEdaOutput> {
    solver.check_available()?;
    params.validate()?;

    let n = signal.len();
    if n < 3 {
        return Err(DecomposeError::invalid(format!(
            "cvxEDA needs at least 3 samples, got {n}"
        )));
    }

    let model = BatemanModel::new(params.tau0, params.tau1, sampling_rate)?;
    let matrices = CvxEdaMatrices::build(&model, params.delta_knot, n)?;
    let formulation = formulate(&matrices, signal, params.alpha, params.gamma, params.solver);
    debug!(
        n,
        splines = matrices.num_splines(),
        knot_spacing = matrices.spline.spacing(),
        variant = %params.solver,
        variables = formulation.problem.num_variables(),
        constraints = formulation.problem.num_constraints(),
        "cvxEDA problem assembled"
    );

    let output = solver.solve(&formulation.problem, &params.solver_settings())?;
    if !output.status.is_converged() {
        warn!(status = %output.status, iterations = output.iterations, solver = solver.name(), "cvxEDA did not converge");
        return Err(DecomposeError::numerical(format!(
            "{} stopped with status {} after {} iterations",
            solver.name(),
            output.status,
            output.iterations
        )));
    }
    if output.status == SolveStatus::AlmostSolved {
        warn!(iterations = output.iterations, "cvxEDA accepted at reduced tolerance");
    }

    let solution = formulation.decode(&output.x)?;
    let phasic = matrices.ma.apply(solution.q.view());
    let driver = matrices.ar.apply(solution.q.view());
    let tonic = matrices.spline.apply(solution.l.view()) + matrices.trend.apply(solution.d.view());
    let residual = &signal - &phasic - &tonic;
    let objective = output.objective + formulation.objective_offset;

    info!(
        n,
        iterations = output.iterations,
        objective,
        status = %output.status,
        "cvxEDA decomposition finished"
    );

    Ok(CvxEdaOutput {
        tonic,
        phasic,
        driver,
        residual,
        spline_coefficients: solution.l,
        trend_coefficients: solution.d,
        objective,
        iterations: output.iterations,
        status: output.status,
        variant: params.solver,
    })
}
