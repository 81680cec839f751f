use approx::assert_relative_eq;
use eda_signals::decomposition::{
    formulate, BatemanModel, CvxEdaMatrices, SolverVariant, SplineBasis, TripletBuilder,
};
use eda_signals::{decompose, DecomposeParams};
use ndarray::Array1;
use proptest::prelude::*;

fn signal_strategy(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-50.0..50.0f64, min_len..max_len)
}

#[test]
fn median_phasic_is_exact_complement() {
    proptest!(|(signal in signal_strategy(1, 120), fs in 1u32..20)| {
        let result = decompose(&signal, fs, "median", &DecomposeParams::default()).unwrap();
        prop_assert_eq!(result.len(), signal.len());
        for i in 0..signal.len() {
            prop_assert_eq!(result.phasic[i], signal[i] - result.tonic[i]);
        }
    });
}

#[test]
fn median_tonic_stays_within_signal_range() {
    proptest!(|(signal in signal_strategy(1, 120))| {
        let result = decompose(&signal, 4, "smoothmedian", &DecomposeParams::default()).unwrap();
        let lo = signal.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = signal.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(result.tonic.iter().all(|&t| t >= lo && t <= hi));
    });
}

#[test]
fn dc_gain_is_time_constant_gap() {
    proptest!(|(tau_a in 0.1..10.0f64, tau_b in 0.1..10.0f64, fs in 1.0..500.0f64)| {
        prop_assume!((tau_a - tau_b).abs() > 0.05);
        let model = BatemanModel::new(tau_a, tau_b, fs).unwrap();
        let gain = model.ma().iter().sum::<f64>() / model.ar().iter().sum::<f64>();
        prop_assert!((gain - (tau_a - tau_b).abs()).abs() < 1e-6 * (tau_a - tau_b).abs().max(1.0));
    });
}

#[test]
fn interior_spline_rows_sum_to_constant() {
    proptest!(|(knots in 1usize..8, spacing in 2usize..12)| {
        let n = (knots + 4) * spacing;
        let basis = SplineBasis::new(spacing as f64, 1.0, n).unwrap();
        prop_assert_eq!(basis.spacing(), spacing);
        let sums = basis.apply(Array1::ones(basis.len()).view());
        // rows covered by a full set of overlapping kernels
        let margin = 2 * spacing;
        let reference = sums[margin];
        for i in margin..n - 3 * spacing {
            prop_assert!((sums[i] - reference).abs() < 1e-9 * reference, "row {} sums to {} not {}", i, sums[i], reference);
        }
    });
}

#[test]
fn banded_operator_matches_sparse_form() {
    proptest!(|(x in signal_strategy(3, 60), fs in 2.0..200.0f64)| {
        let model = BatemanModel::new(2.0, 0.7, fs).unwrap();
        let op = model.ar_operator(x.len());
        let csc = op.to_csc();
        let direct = op.apply(Array1::from(x.clone()).view());
        let sparse = csc.mul_vec(&x);
        let direct_t = op.apply_transpose(Array1::from(x.clone()).view());
        let sparse_t = csc.tr_mul_vec(&x);
        for i in 0..x.len() {
            let scale = direct[i].abs().max(1.0);
            prop_assert!((direct[i] - sparse[i]).abs() < 1e-9 * scale);
            let scale_t = direct_t[i].abs().max(1.0);
            prop_assert!((direct_t[i] - sparse_t[i]).abs() < 1e-9 * scale_t);
        }
    });
}

#[test]
fn triplet_builder_sums_duplicates() {
    proptest!(|(entries in prop::collection::vec((0usize..6, 0usize..6, -10.0..10.0f64), 0..40))| {
        let mut builder = TripletBuilder::new(6, 6);
        let mut dense = [[0.0f64; 6]; 6];
        for &(i, j, v) in &entries {
            builder.push(i, j, v);
            dense[i][j] += v;
        }
        let m = builder.build();
        prop_assert_eq!(m.colptr.len(), 7);
        for j in 0..6 {
            let rows: Vec<usize> = m.column(j).map(|(i, _)| i).collect();
            prop_assert!(rows.windows(2).all(|w| w[0] < w[1]));
            for (i, row) in dense.iter().enumerate() {
                prop_assert!((m.get(i, j) - row[j]).abs() < 1e-9);
            }
        }
    });
}

#[test]
fn qp_objective_matches_direct_evaluation() {
    let n = 80;
    let model = BatemanModel::new(2.0, 0.7, 8.0).unwrap();
    let matrices = CvxEdaMatrices::build(&model, 3.0, n).unwrap();
    let y: Array1<f64> = (0..n).map(|i| 1.5 + 0.2 * (i as f64 / 7.0).cos()).collect();
    let formulation = formulate(&matrices, y.view(), 8e-4, 1e-2, SolverVariant::QuadraticProgram);

    let x: Vec<f64> = (0..formulation.layout.len()).map(|k| 0.01 * (k % 7) as f64).collect();
    let decoded = formulation.decode(&x).unwrap();
    let fit = matrices.ma.apply(decoded.q.view())
        + matrices.spline.apply(decoded.l.view())
        + matrices.trend.apply(decoded.d.view());
    let r = &fit - &y;
    let expected = 0.5 * r.dot(&r)
        + 8e-4 * matrices.ar.apply(decoded.q.view()).sum()
        + 0.5 * 1e-2 * decoded.l.dot(&decoded.l);

    assert_relative_eq!(
        formulation.problem.objective(&x) + formulation.objective_offset,
        expected,
        max_relative = 1e-10
    );
}
