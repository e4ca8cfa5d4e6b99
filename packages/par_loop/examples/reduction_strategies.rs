//! Sums an array and counts primes with every combine strategy, showing how atomic updates and
//! the critical section compare with a contention-free reduction.

#![allow(missing_docs, reason = "No need for API documentation in example code")]

use std::error::Error;

use par_loop::workloads::{ArraySum, HarmonicSum, PrimeCount};
use par_loop::{BenchmarkReport, SchedulePolicy, SweepConfig, sweep};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = SweepConfig::default()
        .with_thread_counts([1, 2, 4, 8])
        .with_policies([SchedulePolicy::Static])
        .with_chunk_sizes([1_024]);

    print_summary(&sweep(&ArraySum::new(1_000_000), &config)?);
    print_summary(&sweep(&HarmonicSum::new(1_000_000), &config)?);

    // Prime testing gets more expensive toward the end of the range.
    let uneven = config.with_policies(SchedulePolicy::ALL).with_chunk_sizes([16]);
    print_summary(&sweep(&PrimeCount::new(200_000), &uneven)?);

    Ok(())
}

fn print_summary<O>(report: &BenchmarkReport<O>) {
    println!("{report}");

    if !report.all_verified() {
        println!("WARNING: some runs did not match the sequential baseline");
    }

    println!();
}
