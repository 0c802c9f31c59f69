use cpab::{Cpab, CpabConfig, NumericBackend};
use ndarray::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use std::path::PathBuf;
use tempfile::TempDir;

#[macro_export]
macro_rules! def_test {
    (fn $name:ident($test:ident) $test_body:block) => {
        #[test]
        fn $name() {
            let $test = common::Test::new(stringify!($name));
            $test_body
        }
    };
}

/// Scratch space for a single test, removed when the test ends.
pub struct Test {
    name: String,
    directory: TempDir,
}

impl Test {
    pub fn new(name: &str) -> Self {
        let directory = tempfile::Builder::new()
            .prefix(&format!("cpab_{}_", name))
            .tempdir()
            .unwrap();
        Self {
            name: name.to_string(),
            directory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.directory.path().join(file_name)
    }
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn cpab_f64(config: CpabConfig) -> Cpab<f64> {
    Cpab::new(config).unwrap()
}

/// Draws random parameter vectors and rescales each to the given norm.
pub fn thetas_with_norm<B: NumericBackend<f64>>(
    cpab: &Cpab<f64, B>,
    n_samples: usize,
    norm: f64,
    seed: u64,
) -> Array2<f64> {
    let mut thetas = cpab
        .sample_theta_with_rng(&mut seeded_rng(seed), n_samples, None, None)
        .unwrap();
    for mut theta in thetas.rows_mut() {
        let current_norm = theta.dot(&theta).sqrt();
        theta.mapv_inplace(|value| value * norm / current_norm);
    }
    thetas
}

pub fn max_abs_difference<D: Dimension>(a: &Array<f64, D>, b: &Array<f64, D>) -> f64 {
    assert_eq!(a.shape(), b.shape());
    a.iter()
        .zip(b.iter())
        .fold(0.0, |max, (x, y)| f64::max(max, (x - y).abs()))
}
