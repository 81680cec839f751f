//! cvxEDA optimisation problem.
//!
//! Fits `y ≈ M q + B l + C d` with a sparse nonnegative driver `A q`:
//!
//! ```text
//! minimize   ½‖M q + B l + C d − y‖² + α·1ᵀA q + ½γ‖l‖²
//! subject to A q ≥ 0
//! ```
//!
//! Two encodings of the same problem are produced, both in the conic form of
//! [`ConvexProblem`]:
//! - quadratic program over `x = [q; d; l]`
//! - cone program over `x = [q; d; t; u; l]` with epigraph variables
//!   `t ≥ ½‖r‖²` and `u ≥ ½‖l‖²` expressed as rotated second-order cones.
//!
//! Rows 0 and 1 of `A` are empty, so their constraints (`0 ≥ 0`) are left
//! out. The remaining inequality rows are divided by the largest AR tap; the
//! feasible set is unchanged and the constraint block is far better scaled at
//! high sampling rates.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use super::bateman::{BandedOperator, BatemanModel};
use super::solver::{Cone, ConvexProblem};
use super::sparse::{CscMatrix, TripletBuilder};
use super::spline::{SplineBasis, TrendBasis};
use crate::error::{DecomposeError, Result};

/// Problem encoding handed to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum SolverVariant {
    #[default]
    #[serde(rename = "qp")]
    QuadraticProgram,
    #[serde(rename = "cone")]
    ConeProgram,
}

impl FromStr for SolverVariant {
    type Err = DecomposeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "qp" | "quadratic" => Ok(SolverVariant::QuadraticProgram),
            "cone" | "conelp" | "socp" => Ok(SolverVariant::ConeProgram),
            other => Err(DecomposeError::invalid(format!(
                "unknown solver variant '{other}', expected 'qp' or 'cone'"
            ))),
        }
    }
}

impl TryFrom<String> for SolverVariant {
    type Error = DecomposeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for SolverVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SolverVariant::QuadraticProgram => "qp",
            SolverVariant::ConeProgram => "cone",
        })
    }
}

/// The four regressors of the cvxEDA model for one signal length.
#[derive(Debug, Clone)]
pub struct CvxEdaMatrices {
    /// `A`, latent state to driver.
    pub ar: BandedOperator,
    /// `M`, latent state to phasic response.
    pub ma: BandedOperator,
    /// `B`, tonic spline.
    pub spline: SplineBasis,
    /// `C`, tonic offset and slope.
    pub trend: TrendBasis,
}

impl CvxEdaMatrices {
    pub fn build(model: &BatemanModel, delta_knot: f64, n: usize) -> Result<Self> {
        Ok(Self {
            ar: model.ar_operator(n),
            ma: model.ma_operator(n),
            spline: SplineBasis::new(delta_knot, model.sampling_rate(), n)?,
            trend: TrendBasis::new(n),
        })
    }

    pub fn n(&self) -> usize {
        self.ar.size()
    }

    pub fn num_splines(&self) -> usize {
        self.spline.len()
    }

    /// `[M C B]`, the design matrix of the least-squares term.
    fn design(&self) -> CscMatrix {
        let n = self.n();
        let nb = self.num_splines();
        let mut builder = TripletBuilder::with_capacity(n, n + TrendBasis::COLUMNS + nb, 5 * n);
        self.ma.push_into(&mut builder, 0, 0, 1.0);
        builder.push_block(0, n, &self.trend.to_csc(), 1.0);
        builder.push_block(0, n + TrendBasis::COLUMNS, &self.spline.to_csc(), 1.0);
        builder.build()
    }

    /// `α·Aᵀ1`, the driver penalty as a linear cost on `q`.
    fn driver_cost(&self, alpha: f64) -> Array1<f64> {
        self.ar.apply_transpose(Array1::ones(self.n()).view()) * alpha
    }

    /// Inequality rows `-A q / max|ar| ≤ 0` for rows `2..n`.
    fn push_driver_constraint(&self, builder: &mut TripletBuilder, row_offset: usize) {
        let scale = self.ar.max_abs_tap();
        self.ar.push_rows_into(builder, row_offset, 0, -1.0 / scale, 2);
    }
}

/// Where each block of variables sits in the solver's `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableLayout {
    n: usize,
    nb: usize,
    /// Epigraph scalars between `d` and `l` (cone form only).
    epigraph: usize,
}

impl VariableLayout {
    pub fn driver(&self) -> Range<usize> {
        0..self.n
    }

    pub fn trend(&self) -> Range<usize> {
        self.n..self.n + TrendBasis::COLUMNS
    }

    pub fn spline(&self) -> Range<usize> {
        let start = self.n + TrendBasis::COLUMNS + self.epigraph;
        start..start + self.nb
    }

    pub fn len(&self) -> usize {
        self.n + TrendBasis::COLUMNS + self.epigraph + self.nb
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A formulated cvxEDA problem ready for a solver.
#[derive(Debug, Clone)]
pub struct Formulation {
    pub variant: SolverVariant,
    pub problem: ConvexProblem,
    pub layout: VariableLayout,
    /// Constant dropped from the objective (`½yᵀy` for the QP form).
    pub objective_offset: f64,
}

/// Solution blocks pulled out of the solver's primal vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSolution {
    pub q: Array1<f64>,
    pub d: Array1<f64>,
    pub l: Array1<f64>,
}

impl Formulation {
    pub fn decode(&self, x: &[f64]) -> Result<DecodedSolution> {
        if x.len() != self.layout.len() {
            return Err(DecomposeError::numerical(format!(
                "solver returned {} values, expected {}",
                x.len(),
                self.layout.len()
            )));
        }
        if let Some(bad) = x.iter().position(|v| !v.is_finite()) {
            return Err(DecomposeError::numerical(format!(
                "solver returned a non-finite value at index {bad}"
            )));
        }
        Ok(DecodedSolution {
            q: Array1::from(x[self.layout.driver()].to_vec()),
            d: Array1::from(x[self.layout.trend()].to_vec()),
            l: Array1::from(x[self.layout.spline()].to_vec()),
        })
    }
}

/// Build the optimisation problem for signal `y`.
pub fn formulate(
    matrices: &CvxEdaMatrices,
    y: ArrayView1<f64>,
    alpha: f64,
    gamma: f64,
    variant: SolverVariant,
) -> Formulation {
    match variant {
        SolverVariant::QuadraticProgram => formulate_qp(matrices, y, alpha, gamma),
        SolverVariant::ConeProgram => formulate_cone(matrices, y, alpha, gamma),
    }
}

fn formulate_qp(matrices: &CvxEdaMatrices, y: ArrayView1<f64>, alpha: f64, gamma: f64) -> Formulation {
    let n = matrices.n();
    let nb = matrices.num_splines();
    let layout = VariableLayout { n, nb, epigraph: 0 };
    let size = layout.len();

    let design = matrices.design();
    let gram = design.gram_upper();
    let mut p = TripletBuilder::with_capacity(size, size, gram.nnz() + nb);
    p.push_block(0, 0, &gram, 1.0);
    p.push_identity(layout.spline().start, layout.spline().start, nb, gamma);

    let y_slice = y.to_vec();
    let mut c: Vec<f64> = design.tr_mul_vec(&y_slice).into_iter().map(|v| -v).collect();
    let driver_cost = matrices.driver_cost(alpha);
    for (ci, cost) in c[layout.driver()].iter_mut().zip(driver_cost.iter()) {
        *ci += cost;
    }

    let rows = n - 2;
    let mut g = TripletBuilder::with_capacity(rows, size, 3 * rows);
    matrices.push_driver_constraint(&mut g, 0);

    Formulation {
        variant: SolverVariant::QuadraticProgram,
        problem: ConvexProblem {
            p: p.build(),
            c,
            g: g.build(),
            h: vec![0.0; rows],
            cones: vec![Cone::Nonnegative(rows)],
        },
        layout,
        objective_offset: 0.5 * y.dot(&y),
    }
}

fn formulate_cone(matrices: &CvxEdaMatrices, y: ArrayView1<f64>, alpha: f64, gamma: f64) -> Formulation {
    let n = matrices.n();
    let nb = matrices.num_splines();
    let layout = VariableLayout { n, nb, epigraph: 2 };
    let size = layout.len();
    let t = layout.trend().end;
    let u = t + 1;

    let linear_rows = n - 2;
    let fit_rows = n + 2;
    let ridge_rows = nb + 2;
    let fit_start = linear_rows;
    let ridge_start = fit_start + fit_rows;
    let total_rows = ridge_start + ridge_rows;

    let mut c = vec![0.0; size];
    let driver_cost = matrices.driver_cost(alpha);
    for (ci, cost) in c[layout.driver()].iter_mut().zip(driver_cost.iter()) {
        *ci = *cost;
    }
    c[t] = 1.0;
    c[u] = gamma;

    let mut g = TripletBuilder::with_capacity(total_rows, size, 3 * linear_rows + 6 * n + nb * matrices.spline.kernel().len());
    let mut h = vec![0.0; total_rows];

    matrices.push_driver_constraint(&mut g, 0);

    // (½ + t, ½ − t, y − M q − C d − B l) ∈ SOC
    g.push(fit_start, t, -1.0);
    g.push(fit_start + 1, t, 1.0);
    h[fit_start] = 0.5;
    h[fit_start + 1] = 0.5;
    matrices.ma.push_into(&mut g, fit_start + 2, 0, 1.0);
    g.push_block(fit_start + 2, layout.trend().start, &matrices.trend.to_csc(), 1.0);
    g.push_block(fit_start + 2, layout.spline().start, &matrices.spline.to_csc(), 1.0);
    for (hi, yi) in h[fit_start + 2..fit_start + 2 + n].iter_mut().zip(y.iter()) {
        *hi = *yi;
    }

    // (½ + u, ½ − u, −l) ∈ SOC
    g.push(ridge_start, u, -1.0);
    g.push(ridge_start + 1, u, 1.0);
    h[ridge_start] = 0.5;
    h[ridge_start + 1] = 0.5;
    g.push_identity(ridge_start + 2, layout.spline().start, nb, 1.0);

    Formulation {
        variant: SolverVariant::ConeProgram,
        problem: ConvexProblem {
            p: CscMatrix::zeros(size, size),
            c,
            g: g.build(),
            h,
            cones: vec![
                Cone::Nonnegative(linear_rows),
                Cone::SecondOrder(fit_rows),
                Cone::SecondOrder(ridge_rows),
            ],
        },
        layout,
        objective_offset: 0.0,
    }
}
