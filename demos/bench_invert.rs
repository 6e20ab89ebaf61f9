//! Times every inversion variant on doubling orders and prints one JSON record
//! per run.
//!
//! ```text
//! cargo run --release --example bench_invert -- --min 16 --max 1024 --workers 8 --seed 7
//! ```

use blockinv::{InversionOptions, invert_with};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::process::ExitCode;
use std::time::Instant;

struct BenchConfig {
    min_order: usize,
    max_order: usize,
    workers: usize,
    seed: u64,
}

impl BenchConfig {
    fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut config = Self {
            min_order: 8,
            max_order: 512,
            workers: blockinv::types::default_worker_count(),
            seed: 42,
        };
        while let Some(flag) = args.next() {
            let value = args
                .next()
                .ok_or_else(|| format!("{flag} expects a value"))?;
            let bad = |_| format!("invalid value {value:?} for {flag}");
            match flag.as_str() {
                "--min" => config.min_order = value.parse().map_err(bad)?,
                "--max" => config.max_order = value.parse().map_err(bad)?,
                "--workers" => config.workers = value.parse().map_err(bad)?,
                "--seed" => config.seed = value.parse().map_err(bad)?,
                other => return Err(format!("unknown flag {other}")),
            }
        }
        config.min_order = config.min_order.max(1);
        config.max_order = config.max_order.max(config.min_order);
        Ok(config)
    }
}

fn dominant_matrix(order: usize, rng: &mut StdRng) -> Array2<f64> {
    let mut a = Array2::<f64>::from_shape_fn((order, order), |_| rng.random_range(-1.0..1.0));
    for (i, mut row) in a.outer_iter_mut().enumerate() {
        row[i] = 0.0;
        row[i] = row.iter().map(|v| v.abs()).sum::<f64>() + 1.0;
    }
    a
}

/// `max_i sum_j |(A * inv - I)_ij|`.
fn residual_inf_norm(a: &Array2<f64>, inv: &Array2<f64>) -> f64 {
    let mut residual = a.dot(inv);
    residual.diag_mut().mapv_inplace(|v| v - 1.0);
    residual
        .outer_iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

fn main() -> ExitCode {
    let config = match BenchConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("bench_invert: {msg}");
            return ExitCode::FAILURE;
        }
    };

    let variants = [
        ("auxiliary", InversionOptions::auxiliary()),
        ("in_place", InversionOptions::in_place()),
        ("parallel", InversionOptions::parallel(config.workers)),
    ];

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order = config.min_order;
    while order <= config.max_order {
        let a = dominant_matrix(order, &mut rng);
        for (name, opts) in &variants {
            let start = Instant::now();
            let inv = match invert_with(order, &a, opts) {
                Ok(inv) => inv,
                Err(err) => {
                    eprintln!("bench_invert: {name} failed at order {order}: {err}");
                    return ExitCode::FAILURE;
                }
            };
            let sec = start.elapsed().as_secs_f64();
            let record = json!({
                "variant": name,
                "order": order,
                "workers": opts.effective_workers(),
                "sec": sec,
                "residual_inf": residual_inf_norm(&a, &inv),
            });
            println!("{record}");
        }
        order *= 2;
    }
    ExitCode::SUCCESS
}
