//! Convex solver seam.
//!
//! Problems are handed over in one conic form,
//!
//! ```text
//! minimize    ½ xᵀ P x + cᵀ x
//! subject to  G x + s = h,   s ∈ K
//! ```
//!
//! with `P` stored as its upper triangle and `K` a product of nonnegative and
//! second-order cones. Tolerances travel with each call in
//! [`SolverSettings`]; no backend keeps process-wide configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::sparse::CscMatrix;
use crate::error::{DecomposeError, Result};

/// One block of the cone `K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cone {
    /// `s_i >= 0` for every entry of the block.
    Nonnegative(usize),
    /// `s_0 >= ‖s_1..‖₂`.
    SecondOrder(usize),
}

impl Cone {
    pub fn dim(&self) -> usize {
        match *self {
            Cone::Nonnegative(d) | Cone::SecondOrder(d) => d,
        }
    }

    /// Whether `s` lies in this cone up to `tol`.
    pub fn contains(&self, s: &[f64], tol: f64) -> bool {
        debug_assert_eq!(s.len(), self.dim());
        match self {
            Cone::Nonnegative(_) => s.iter().all(|&v| v >= -tol),
            Cone::SecondOrder(_) => match s.split_first() {
                Some((head, tail)) => tail.iter().map(|v| v * v).sum::<f64>().sqrt() <= head + tol,
                None => true,
            },
        }
    }
}

/// A problem in the conic form above.
#[derive(Debug, Clone)]
pub struct ConvexProblem {
    /// Quadratic cost, upper triangle only.
    pub p: CscMatrix,
    pub c: Vec<f64>,
    pub g: CscMatrix,
    pub h: Vec<f64>,
    pub cones: Vec<Cone>,
}

impl ConvexProblem {
    pub fn num_variables(&self) -> usize {
        self.c.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.h.len()
    }

    /// Dimension checks every backend relies on.
    pub fn validate(&self) -> Result<()> {
        let n = self.c.len();
        let m = self.h.len();
        let cone_dim: usize = self.cones.iter().map(Cone::dim).sum();
        if self.p.nrows != n || self.p.ncols != n {
            return Err(DecomposeError::numerical(format!(
                "quadratic cost is {}x{}, expected {n}x{n}",
                self.p.nrows, self.p.ncols
            )));
        }
        if !self.p.is_upper_triangular() {
            return Err(DecomposeError::numerical("quadratic cost must be upper triangular"));
        }
        if self.g.nrows != m || self.g.ncols != n {
            return Err(DecomposeError::numerical(format!(
                "constraint matrix is {}x{}, expected {m}x{n}",
                self.g.nrows, self.g.ncols
            )));
        }
        if cone_dim != m {
            return Err(DecomposeError::numerical(format!(
                "cones cover {cone_dim} rows, constraints have {m}"
            )));
        }
        Ok(())
    }

    /// `½ xᵀ P x + cᵀ x`, expanding the stored upper triangle symmetrically.
    pub fn objective(&self, x: &[f64]) -> f64 {
        let mut quad = 0.0;
        for j in 0..self.p.ncols {
            for (i, v) in self.p.column(j) {
                let term = v * x[i] * x[j];
                quad += if i == j { term } else { 2.0 * term };
            }
        }
        0.5 * quad + self.c.iter().zip(x).map(|(c, x)| c * x).sum::<f64>()
    }

    /// Slack `s = h - G x`.
    pub fn slack(&self, x: &[f64]) -> Vec<f64> {
        let gx = self.g.mul_vec(x);
        self.h.iter().zip(gx).map(|(h, g)| h - g).collect()
    }

    /// Whether `x` satisfies every cone constraint up to `tol`.
    pub fn is_feasible(&self, x: &[f64], tol: f64) -> bool {
        let s = self.slack(x);
        let mut offset = 0;
        self.cones.iter().all(|cone| {
            let block = &s[offset..offset + cone.dim()];
            offset += cone.dim();
            cone.contains(block, tol)
        })
    }
}

/// Per-call solver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Relative duality-gap tolerance.
    pub reltol: f64,
    /// Absolute duality-gap tolerance.
    pub abstol: f64,
    /// Primal/dual feasibility tolerance.
    pub feastol: f64,
    pub max_iter: u32,
    /// Let the backend print its iteration log.
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            reltol: 1e-9,
            abstol: 1e-8,
            feastol: 1e-8,
            max_iter: 200,
            verbose: false,
        }
    }
}

/// Termination state reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Solved,
    /// Converged to the backend's reduced tolerances.
    AlmostSolved,
    PrimalInfeasible,
    DualInfeasible,
    MaxIterations,
    NumericalError,
    /// Anything else the backend reports (stalls, time limits, ...).
    Other,
}

impl SolveStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, SolveStatus::Solved | SolveStatus::AlmostSolved)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Primal solution and bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    pub x: Vec<f64>,
    pub status: SolveStatus,
    /// Primal objective as seen by the backend.
    pub objective: f64,
    pub iterations: u32,
}

/// A convex solver backend.
pub trait ConvexSolver: Send + Sync {
    fn name(&self) -> &str;

    /// Capability check run before any problem is assembled.
    fn check_available(&self) -> Result<()> {
        Ok(())
    }

    fn solve(&self, problem: &ConvexProblem, settings: &SolverSettings) -> Result<SolverOutput>;
}

/// Stand-in for a backend that was not compiled in.
#[derive(Debug, Clone)]
pub struct MissingBackend {
    backend: &'static str,
    feature: &'static str,
}

impl MissingBackend {
    pub fn new(backend: &'static str, feature: &'static str) -> Self {
        Self { backend, feature }
    }

    fn error(&self) -> DecomposeError {
        DecomposeError::DependencyMissing(format!(
            "convex solver backend '{}' is required for cvxEDA; rebuild with the `{}` feature",
            self.backend, self.feature
        ))
    }
}

impl ConvexSolver for MissingBackend {
    fn name(&self) -> &str {
        self.backend
    }

    fn check_available(&self) -> Result<()> {
        Err(self.error())
    }

    fn solve(&self, _problem: &ConvexProblem, _settings: &SolverSettings) -> Result<SolverOutput> {
        Err(self.error())
    }
}

/// Backend used when the caller does not supply one.
pub fn default_solver() -> Arc<dyn ConvexSolver> {
    #[cfg(feature = "clarabel")]
    {
        Arc::new(clarabel_backend::ClarabelSolver)
    }
    #[cfg(not(feature = "clarabel"))]
    {
        Arc::new(MissingBackend::new("clarabel", "clarabel"))
    }
}

#[cfg(feature = "clarabel")]
pub use clarabel_backend::ClarabelSolver;

#[cfg(feature = "clarabel")]
mod clarabel_backend {
    use clarabel::algebra::CscMatrix as ClarabelCsc;
    use clarabel::solver::{DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT};
    use tracing::debug;

    use super::{Cone, ConvexProblem, ConvexSolver, SolveStatus, SolverOutput, SolverSettings};
    use crate::decomposition::sparse::CscMatrix;
    use crate::error::{DecomposeError, Result};

    /// Interior-point solver from the `clarabel` crate.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ClarabelSolver;

    fn to_clarabel(m: &CscMatrix) -> ClarabelCsc<f64> {
        ClarabelCsc::new(m.nrows, m.ncols, m.colptr.clone(), m.rowval.clone(), m.nzval.clone())
    }

    fn map_status(status: &SolverStatus) -> SolveStatus {
        match status {
            SolverStatus::Solved => SolveStatus::Solved,
            SolverStatus::AlmostSolved => SolveStatus::AlmostSolved,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => SolveStatus::PrimalInfeasible,
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => SolveStatus::DualInfeasible,
            SolverStatus::MaxIterations => SolveStatus::MaxIterations,
            SolverStatus::NumericalError => SolveStatus::NumericalError,
            _ => SolveStatus::Other,
        }
    }

    impl ConvexSolver for ClarabelSolver {
        fn name(&self) -> &str {
            "clarabel"
        }

        fn solve(&self, problem: &ConvexProblem, settings: &SolverSettings) -> Result<SolverOutput> {
            problem.validate()?;

            let options = DefaultSettingsBuilder::<f64>::default()
                .tol_gap_rel(settings.reltol)
                .tol_gap_abs(settings.abstol)
                .tol_feas(settings.feastol)
                .max_iter(settings.max_iter)
                .verbose(settings.verbose)
                .build()
                .map_err(|e| DecomposeError::invalid(format!("solver settings rejected: {e}")))?;

            let cones: Vec<SupportedConeT<f64>> = problem
                .cones
                .iter()
                .map(|cone| match *cone {
                    Cone::Nonnegative(d) => SupportedConeT::NonnegativeConeT(d),
                    Cone::SecondOrder(d) => SupportedConeT::SecondOrderConeT(d),
                })
                .collect();

            let p = to_clarabel(&problem.p);
            let g = to_clarabel(&problem.g);
            debug!(
                variables = problem.num_variables(),
                constraints = problem.num_constraints(),
                p_nnz = problem.p.nnz(),
                g_nnz = problem.g.nnz(),
                "running clarabel"
            );

            let mut solver = DefaultSolver::new(&p, &problem.c, &g, &problem.h, &cones, options);
            solver.solve();

            Ok(SolverOutput {
                x: solver.solution.x.clone(),
                status: map_status(&solver.solution.status),
                objective: solver.solution.obj_val,
                iterations: solver.solution.iterations,
            })
        }
    }
}
