//! Benchmark harness that compares parallel configurations against a sequential baseline.
//!
//! A [`Workload`] knows how to compute its result sequentially and in parallel on a given
//! [`Executor`]. [`sweep()`] runs the sequential version once as the baseline, then every
//! configuration of a [`SweepConfig`], verifying each parallel result against the baseline and
//! tracking the fastest configuration.
//!
//! The harness never prints. Reports implement `Display` and expose every metric through
//! accessors so any reporting layer can render them.

use std::fmt;
use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{
    CombineStrategy, Executor, Result, Schedule, SweepConfig, Timed, panic_message,
};

/// Largest absolute difference at which two floating-point results are considered equal.
pub const FLOAT_TOLERANCE: f64 = 1e-6;

/// Checks a parallel result against the sequential baseline.
pub trait Verify {
    /// Whether `self` matches `expected`: exactly for integers, within [`FLOAT_TOLERANCE`] for
    /// floating-point values and element-wise for buffers.
    fn matches(&self, expected: &Self) -> bool;
}

macro_rules! impl_verify_exact {
    ($($t:ty),*) => {
        $(
            impl Verify for $t {
                fn matches(&self, expected: &Self) -> bool {
                    self == expected
                }
            }
        )*
    };
}

impl_verify_exact!(i32, i64, u32, u64, usize, ());

impl Verify for f64 {
    fn matches(&self, expected: &Self) -> bool {
        (self - expected).abs() <= FLOAT_TOLERANCE
    }
}

impl Verify for f32 {
    fn matches(&self, expected: &Self) -> bool {
        f64::from(*self).matches(&f64::from(*expected))
    }
}

impl<T: Verify> Verify for Vec<T> {
    fn matches(&self, expected: &Self) -> bool {
        self.len() == expected.len() && self.iter().zip(expected).all(|(a, b)| a.matches(b))
    }
}

/// A data-parallel computation that can be benchmarked by [`sweep()`].
///
/// The sequential and parallel versions must compute the same result; the parallel version
/// may use the executor's schedule and the given strategy however it sees fit.
pub trait Workload {
    /// The computed result.
    type Output: Verify + Send + fmt::Debug;

    /// Name of the workload, used in reports and log events.
    fn name(&self) -> &str;

    /// Computes the result on the calling thread without any parallel machinery.
    fn run_sequential(&self) -> Self::Output;

    /// Computes the result on `executor`, combining shared values with `strategy`.
    ///
    /// # Errors
    ///
    /// Returns whatever the executor reports, typically [`crate::Error::ExecutionFailure`].
    fn run_parallel(
        &self,
        executor: &Executor,
        strategy: CombineStrategy,
    ) -> Result<Timed<Self::Output>>;
}

/// One point of a sweep: how many workers, which schedule and which combine strategy.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
#[display("{threads} threads, {schedule}, {strategy}")]
pub struct RunConfig {
    threads: NonZero<usize>,
    schedule: Schedule,
    strategy: CombineStrategy,
}

impl RunConfig {
    /// Creates a run configuration.
    #[must_use]
    pub fn new(threads: NonZero<usize>, schedule: Schedule, strategy: CombineStrategy) -> Self {
        Self {
            threads,
            schedule,
            strategy,
        }
    }

    /// Number of workers.
    #[must_use]
    pub fn threads(&self) -> NonZero<usize> {
        self.threads
    }

    /// Schedule policy and chunk size.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// How shared values are combined.
    #[must_use]
    pub fn strategy(&self) -> CombineStrategy {
        self.strategy
    }

    /// An executor matching this configuration.
    #[must_use]
    pub fn executor(&self) -> Executor {
        Executor::with_thread_count(self.threads, self.schedule)
    }
}

/// The measured outcome of the baseline or of one parallel configuration.
#[derive(Clone, Debug)]
pub struct RunResult<O> {
    config: Option<RunConfig>,
    elapsed_seconds: f64,
    speedup: f64,
    efficiency: f64,
    output: Option<O>,
    verified: bool,
    failure: Option<String>,
}

impl<O> RunResult<O> {
    fn baseline(elapsed: Duration, output: O) -> Self {
        Self {
            config: None,
            elapsed_seconds: elapsed.as_secs_f64(),
            speedup: 1.0,
            efficiency: 1.0,
            output: Some(output),
            verified: true,
            failure: None,
        }
    }

    fn completed(
        config: RunConfig,
        baseline_seconds: f64,
        elapsed: Duration,
        output: O,
        verified: bool,
    ) -> Self {
        let elapsed_seconds = elapsed.as_secs_f64();
        let speedup = speedup(baseline_seconds, elapsed_seconds);

        Self {
            config: Some(config),
            elapsed_seconds,
            speedup,
            efficiency: efficiency(speedup, config.threads),
            output: Some(output),
            verified,
            failure: None,
        }
    }

    fn failed(config: RunConfig, failure: String) -> Self {
        Self {
            config: Some(config),
            elapsed_seconds: f64::INFINITY,
            speedup: 0.0,
            efficiency: 0.0,
            output: None,
            verified: false,
            failure: Some(failure),
        }
    }

    /// The configuration that produced this result, `None` for the sequential baseline.
    #[must_use]
    pub fn config(&self) -> Option<&RunConfig> {
        self.config.as_ref()
    }

    /// Number of workers; the baseline reports one.
    #[must_use]
    pub fn threads(&self) -> NonZero<usize> {
        self.config.map_or(NonZero::<usize>::MIN, |config| config.threads)
    }

    /// Wall-clock time of the run in seconds. Infinite if the run failed.
    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    /// Baseline time divided by this run's time. Zero if the run failed.
    #[must_use]
    pub fn speedup(&self) -> f64 {
        self.speedup
    }

    /// Speedup divided by the number of workers.
    #[must_use]
    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    /// The computed result, absent if the run failed.
    #[must_use]
    pub fn output(&self) -> Option<&O> {
        self.output.as_ref()
    }

    /// Whether the output matched the baseline.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Why the run failed, if it did.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Whether the run completed, regardless of verification.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.failure.is_none()
    }
}

fn speedup(baseline_seconds: f64, elapsed_seconds: f64) -> f64 {
    if !elapsed_seconds.is_finite() {
        0.0
    } else if elapsed_seconds > 0.0 {
        baseline_seconds / elapsed_seconds
    } else {
        f64::INFINITY
    }
}

fn efficiency(speedup: f64, threads: NonZero<usize>) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "thread counts are far below the range where f64 loses integer precision"
    )]
    let threads = threads.get() as f64;

    speedup / threads
}

impl<O> fmt::Display for RunResult<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.config {
            Some(config) => write!(f, "{config}: ")?,
            None => write!(f, "sequential: ")?,
        }

        if let Some(failure) = &self.failure {
            return write!(f, "failed ({failure})");
        }

        write!(
            f,
            "{:.6} s, speedup {:.2}x, efficiency {:.1}%",
            self.elapsed_seconds,
            self.speedup,
            self.efficiency * 100.0
        )?;

        if !self.verified {
            write!(f, ", MISMATCH")?;
        }

        Ok(())
    }
}

/// Everything a sweep measured for one workload.
#[derive(Clone, Debug)]
pub struct BenchmarkReport<O> {
    workload: String,
    baseline: RunResult<O>,
    runs: Vec<RunResult<O>>,
    best: Option<usize>,
}

impl<O> BenchmarkReport<O> {
    /// Name of the benchmarked workload.
    #[must_use]
    pub fn workload(&self) -> &str {
        &self.workload
    }

    /// The sequential baseline.
    #[must_use]
    pub fn baseline(&self) -> &RunResult<O> {
        &self.baseline
    }

    /// Every evaluated configuration, in evaluation order.
    #[must_use]
    pub fn runs(&self) -> &[RunResult<O>] {
        &self.runs
    }

    /// The completed run with the lowest elapsed time, the earliest one on ties.
    ///
    /// Failed runs are never selected, even though they all tie at an infinite elapsed time.
    /// If every run failed this is `None` rather than the first failed run, and the report
    /// says so instead of naming a configuration.
    #[must_use]
    pub fn best(&self) -> Option<&RunResult<O>> {
        self.best.and_then(|index| self.runs.get(index))
    }

    /// Whether every run completed and matched the baseline.
    #[must_use]
    pub fn all_verified(&self) -> bool {
        self.runs.iter().all(RunResult::is_verified)
    }
}

impl<O> fmt::Display for BenchmarkReport<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.workload)?;
        writeln!(f, "  {}", self.baseline)?;

        for run in &self.runs {
            writeln!(f, "  {run}")?;
        }

        match self.best() {
            Some(best) => write!(f, "best: {best}"),
            None => write!(f, "best: none, every run failed"),
        }
    }
}

/// Benchmarks `workload` under every configuration of `config`.
///
/// All configurations are validated before the baseline runs. A run that fails or panics is
/// recorded with infinite elapsed time and the sweep moves on to the next configuration.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidConfiguration`] if `config` contains an empty list, a zero
/// thread count or a zero chunk size.
///
/// # Examples
///
/// ```
/// use par_loop::workloads::ArraySum;
/// use par_loop::{SchedulePolicy, SweepConfig, sweep};
///
/// let config = SweepConfig::default()
///     .with_thread_counts([1, 2])
///     .with_policies([SchedulePolicy::Static])
///     .with_chunk_sizes([16]);
///
/// let report = sweep(&ArraySum::new(1_000), &config).unwrap();
///
/// assert_eq!(report.runs().len(), 6);
/// assert!(report.all_verified());
/// assert_eq!(report.best().unwrap().output(), Some(&500_500));
/// ```
pub fn sweep<W>(workload: &W, config: &SweepConfig) -> Result<BenchmarkReport<W::Output>>
where
    W: Workload + ?Sized,
{
    let configurations = config.configurations()?;

    debug!(
        workload = workload.name(),
        configurations = configurations.len(),
        "starting sweep"
    );

    let started = Instant::now();
    let expected = workload.run_sequential();
    let baseline = RunResult::baseline(started.elapsed(), expected);

    debug!(
        workload = workload.name(),
        elapsed_seconds = baseline.elapsed_seconds(),
        "baseline finished"
    );

    let mut runs = Vec::with_capacity(configurations.len());
    let mut best: Option<(usize, f64)> = None;

    for run_config in configurations {
        let run = evaluate(workload, run_config, &baseline);

        if run.is_completed()
            && best.is_none_or(|(_, fastest)| run.elapsed_seconds() < fastest)
        {
            best = Some((runs.len(), run.elapsed_seconds()));
        }

        runs.push(run);
    }

    let report = BenchmarkReport {
        workload: workload.name().to_string(),
        baseline,
        runs,
        best: best.map(|(index, _)| index),
    };

    log_best(&report);

    Ok(report)
}

fn evaluate<W>(
    workload: &W,
    config: RunConfig,
    baseline: &RunResult<W::Output>,
) -> RunResult<W::Output>
where
    W: Workload + ?Sized,
{
    let executor = config.executor();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        workload.run_parallel(&executor, config.strategy())
    }));

    let failure = match outcome {
        Ok(Ok(timed)) => {
            let (elapsed, output) = timed.into_parts();

            let verified = baseline
                .output()
                .is_some_and(|expected| output.matches(expected));

            if !verified {
                warn!(
                    workload = workload.name(),
                    %config,
                    ?output,
                    expected = ?baseline.output(),
                    "parallel result does not match the baseline"
                );
            }

            let run = RunResult::completed(
                config,
                baseline.elapsed_seconds(),
                elapsed,
                output,
                verified,
            );

            debug!(
                workload = workload.name(),
                %config,
                elapsed_seconds = run.elapsed_seconds(),
                speedup = run.speedup(),
                "run finished"
            );

            return run;
        }
        Ok(Err(error)) => error.to_string(),
        Err(payload) => panic_message(&*payload),
    };

    warn!(workload = workload.name(), %config, %failure, "run failed");

    RunResult::failed(config, failure)
}

#[cfg_attr(test, mutants::skip)] // Logging only.
fn log_best<O>(report: &BenchmarkReport<O>) {
    match report.best() {
        Some(best) => info!(
            workload = report.workload(),
            best = %best,
            "sweep finished"
        ),
        None => warn!(workload = report.workload(), "sweep finished without a completed run"),
    }
}
