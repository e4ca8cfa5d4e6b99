#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Parallel loops over index ranges with selectable scheduling and combination strategies, plus
//! a harness that measures how they perform against a sequential baseline.
//!
//! The building blocks, from the bottom up:
//!
//! - [`IterationSpace`] - the half-open index range a loop runs over. [`CollapsedSpace`]
//!   flattens two nested loops into one range.
//! - [`Schedule`] - a [`SchedulePolicy`] (static, dynamic or guided) with a chunk size.
//!   [`partition()`] shows how a schedule divides a space into [`Chunk`]s.
//! - [`Combiner`] - combines per-index values with an [`Operator`] using a
//!   [`CombineStrategy`]: private partials merged at the end, atomic updates or a lock.
//! - [`Executor`] - spawns a fixed number of workers that claim chunks until the space is
//!   exhausted, then joins them. Offers [`reduce()`](Executor::reduce),
//!   [`for_each()`](Executor::for_each), [`map()`](Executor::map) and
//!   [`scoped()`](Executor::scoped) loops, each timed.
//! - [`PrivateScope`] - how per-worker private variables start out and whether the value after
//!   the last index flows back.
//! - [`sweep()`] - runs a [`Workload`] sequentially and then under every configuration of a
//!   [`SweepConfig`], producing a [`BenchmarkReport`] with speedup, efficiency and the best
//!   configuration found.
//!
//! Reference workloads live in [`workloads`].
//!
//! The crate performs no console or file output. Progress and failures are reported as
//! [`tracing`](https://docs.rs/tracing) events; reports implement `Display` for rendering.
//!
//! # Example
//!
//! ```
//! use par_loop::workloads::PrimeCount;
//! use par_loop::{CombineStrategy, SchedulePolicy, SweepConfig, sweep};
//!
//! let config = SweepConfig::default()
//!     .with_thread_counts([1, 2, 4])
//!     .with_chunk_sizes([8, 64])
//!     .with_strategies([CombineStrategy::ReductionMerge]);
//!
//! let report = sweep(&PrimeCount::new(5_000), &config).unwrap();
//!
//! assert_eq!(report.runs().len(), 3 * SchedulePolicy::ALL.len() * 2);
//! assert!(report.all_verified());
//!
//! println!("{report}");
//! ```

mod claim;
mod combine;
mod config;
mod error;
mod executor;
mod harness;
mod schedule;
mod scope;
mod space;

pub mod workloads;

pub(crate) use claim::*;
pub use combine::*;
pub use config::*;
pub use error::{Error, Result};
pub(crate) use error::panic_message;
pub use executor::*;
pub use harness::*;
pub use schedule::*;
pub use scope::*;
pub use space::*;
