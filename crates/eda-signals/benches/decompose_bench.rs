use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use eda_signals::decomposition::{formulate, BatemanModel, CvxEdaMatrices, SolverVariant};
use eda_signals::{decompose, DecomposeParams};
use ndarray::Array1;

/// Slow drift plus a skin-conductance response every 15 s.
fn synthetic_eda(fs: f64, seconds: f64) -> Vec<f64> {
    let n = (fs * seconds) as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / fs;
            let since = t % 15.0;
            2.0 + 0.01 * t + 0.8 * ((-since / 2.0).exp() - (-since / 0.7).exp())
        })
        .collect()
}

fn benchmark_filter_methods(c: &mut Criterion) {
    let signal = synthetic_eda(100.0, 120.0);
    let params = DecomposeParams::default();

    c.bench_function("highpass_120s_100hz", |b| {
        b.iter(|| decompose(black_box(&signal), 100, "highpass", &params))
    });
    c.bench_function("median_120s_100hz", |b| {
        b.iter(|| decompose(black_box(&signal), 100, "median", &params))
    });
}

fn benchmark_formulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cvxeda_formulate");
    for fs in [20.0, 100.0] {
        let signal = Array1::from(synthetic_eda(fs, 60.0));
        let model = BatemanModel::new(2.0, 0.7, fs).unwrap();
        let matrices = CvxEdaMatrices::build(&model, 10.0, signal.len()).unwrap();
        for variant in [SolverVariant::QuadraticProgram, SolverVariant::ConeProgram] {
            group.bench_with_input(BenchmarkId::new(variant.to_string(), fs), &signal, |b, y| {
                b.iter(|| formulate(&matrices, black_box(y.view()), 8e-4, 1e-2, variant))
            });
        }
    }
    group.finish();
}

#[cfg(feature = "clarabel")]
fn benchmark_cvxeda_solve(c: &mut Criterion) {
    let signal = synthetic_eda(20.0, 60.0);
    let params = DecomposeParams::default();

    let mut group = c.benchmark_group("cvxeda_solve");
    group.sample_size(10);
    group.bench_function("qp_60s_20hz", |b| {
        b.iter(|| decompose(black_box(&signal), 20, "cvxeda", &params))
    });
    group.finish();
}

#[cfg(not(feature = "clarabel"))]
fn benchmark_cvxeda_solve(_c: &mut Criterion) {}

criterion_group!(
    benches,
    benchmark_filter_methods,
    benchmark_formulation,
    benchmark_cvxeda_solve
);
criterion_main!(benches);
