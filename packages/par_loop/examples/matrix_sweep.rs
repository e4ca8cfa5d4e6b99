//! Benchmarks dense matrix multiplication across thread counts, schedules and chunk sizes and
//! prints the report, including the fastest configuration found.
//!
//! Pass a path to a TOML sweep configuration to override the default parameter lists:
//!
//! ```toml
//! thread_counts = [1, 2, 4]
//! policies = ["static", "dynamic"]
//! chunk_sizes = [1, 16]
//! strategies = ["reduction_merge"]
//! ```
//!
//! Set `RUST_LOG=par_loop=debug` to see every run as it finishes.

#![allow(missing_docs, reason = "No need for API documentation in example code")]

use std::error::Error;
use std::{env, fs};

use par_loop::workloads::MatrixMultiply;
use par_loop::{CombineStrategy, SweepConfig, sweep};
use tracing_subscriber::EnvFilter;

const MATRIX_SIZE: usize = 200;

fn main() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match env::args().nth(1) {
        Some(path) => SweepConfig::from_toml_str(&fs::read_to_string(path)?)?,
        // Rows are written by exactly one worker each, so the strategy does not matter.
        None => SweepConfig::default().with_strategies([CombineStrategy::ReductionMerge]),
    };

    let workload = MatrixMultiply::new(MATRIX_SIZE)?;

    println!("Multiplying two {MATRIX_SIZE}x{MATRIX_SIZE} matrices");
    println!();

    let report = sweep(&workload, &config)?;
    println!("{report}");

    let collapsed = sweep(&workload.collapsed(), &config)?;
    println!();
    println!("{collapsed}");

    Ok(())
}
