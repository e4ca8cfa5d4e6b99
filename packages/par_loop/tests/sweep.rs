//! End-to-end tests that drive whole sweeps through the public API only.
#![cfg(not(miri))] // Real threads and timing, too slow under Miri.

use std::sync::atomic::{AtomicUsize, Ordering};

use par_loop::workloads::{ArraySum, HarmonicSum, MatrixMultiply, PrimeCount};
use par_loop::{
    CombineStrategy, Combiner, Error, Executor, IterationSpace, Operator, RunResult,
    SchedulePolicy, SweepConfig, Timed, Workload, sweep,
};

#[test]
fn sum_to_one_thousand_verified_for_every_strategy() {
    let config = SweepConfig::default()
        .with_thread_counts([1, 2, 4])
        .with_policies([SchedulePolicy::Static])
        .with_chunk_sizes([16]);

    let report = sweep(&ArraySum::new(1_000), &config).unwrap();

    assert_eq!(report.workload(), "array sum");
    assert_eq!(report.baseline().output(), Some(&500_500));
    assert_eq!(report.runs().len(), 9);

    for run in report.runs() {
        assert_eq!(run.output(), Some(&500_500), "{run}");
        assert!(run.is_verified(), "{run}");
    }
}

#[test]
fn default_sweep_over_prime_count() {
    let report = sweep(&PrimeCount::new(2_000), &SweepConfig::default()).unwrap();

    assert_eq!(report.runs().len(), 225);
    assert!(report.all_verified());

    let best = report.best().unwrap();
    assert!(best.elapsed_seconds().is_finite());
    assert!(
        report
            .runs()
            .iter()
            .all(|run| best.elapsed_seconds() <= run.elapsed_seconds())
    );
}

#[test]
fn float_workloads_verify_within_tolerance() {
    let config = SweepConfig::default()
        .with_thread_counts([2, 3])
        .with_chunk_sizes([1, 32]);

    let report = sweep(&HarmonicSum::new(20_000), &config).unwrap();
    assert!(report.all_verified());

    let matrix = sweep(&MatrixMultiply::new(16).unwrap().collapsed(), &config).unwrap();
    assert!(matrix.all_verified());
    assert_eq!(matrix.baseline().output().map(Vec::len), Some(256));
}

#[test]
fn metrics_are_consistent() {
    let config = SweepConfig::default()
        .with_thread_counts([1, 4])
        .with_chunk_sizes([64]);

    let report = sweep(&ArraySum::new(50_000), &config).unwrap();
    let baseline_seconds = report.baseline().elapsed_seconds();

    for run in report.runs() {
        let threads = run.threads().get() as f64;

        assert_eq!(run.speedup(), baseline_seconds / run.elapsed_seconds());
        assert_eq!(run.efficiency(), run.speedup() / threads);
    }
}

/// Panics whenever it runs with more than one worker.
struct SingleThreadedOnly;

impl Workload for SingleThreadedOnly {
    type Output = i64;

    fn name(&self) -> &str {
        "single threaded only"
    }

    fn run_sequential(&self) -> i64 {
        10
    }

    fn run_parallel(
        &self,
        executor: &Executor,
        strategy: CombineStrategy,
    ) -> par_loop::Result<Timed<i64>> {
        let threads = executor.thread_count().get();
        let combiner = Combiner::new(strategy, Operator::sum());

        executor.reduce(IterationSpace::with_len(5), &combiner, 0, |i| {
            assert!(threads == 1, "cannot run on {threads} threads");
            i64::try_from(i).unwrap()
        })
    }
}

#[test]
fn failing_runs_do_not_stop_the_sweep() {
    let config = SweepConfig::default()
        .with_thread_counts([1, 2])
        .with_policies([SchedulePolicy::Dynamic])
        .with_chunk_sizes([1])
        .with_strategies([CombineStrategy::Atomic]);

    let report = sweep(&SingleThreadedOnly, &config).unwrap();

    let [single, double] = report.runs() else {
        panic!("expected two runs, got {}", report.runs().len());
    };

    assert!(single.is_verified());
    assert_eq!(single.output(), Some(&10));

    assert!(!double.is_completed());
    assert_eq!(double.elapsed_seconds(), f64::INFINITY);
    assert!(double.failure().unwrap().contains("cannot run on 2 threads"));

    assert_eq!(report.best().map(RunResult::threads).map(|t| t.get()), Some(1));
    assert!(report.to_string().contains("failed"));
}

/// Counts how often the baseline runs.
struct Watched(AtomicUsize);

impl Workload for Watched {
    type Output = u64;

    fn name(&self) -> &str {
        "watched"
    }

    fn run_sequential(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed);
        0
    }

    fn run_parallel(
        &self,
        _executor: &Executor,
        _strategy: CombineStrategy,
    ) -> par_loop::Result<Timed<u64>> {
        unreachable!("invalid sweeps never reach a parallel run")
    }
}

#[test]
fn invalid_config_fails_before_any_work() {
    let workload = Watched(AtomicUsize::new(0));

    for config in [
        SweepConfig::default().with_thread_counts([2, 0]),
        SweepConfig::default().with_chunk_sizes([0]),
        SweepConfig::default().with_policies([]),
    ] {
        assert!(matches!(
            sweep(&workload, &config),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    assert_eq!(workload.0.load(Ordering::Relaxed), 0);
}

#[test]
fn sweep_from_toml() {
    let config = SweepConfig::from_toml_str(
        r#"
        thread_counts = [1, 2]
        policies = ["guided"]
        chunk_sizes = [4]
        strategies = ["critical_section"]
        "#,
    )
    .unwrap();

    let report = sweep(&PrimeCount::new(1_000), &config).unwrap();

    assert_eq!(report.runs().len(), 2);
    assert_eq!(report.baseline().output(), Some(&168));

    let described: Vec<_> = report
        .runs()
        .iter()
        .map(|run| run.config().unwrap().to_string())
        .collect();
    assert_eq!(
        described,
        [
            "1 threads, guided(4), critical",
            "2 threads, guided(4), critical"
        ]
    );
}

#[test]
fn malformed_toml_is_config_error() {
    let error = SweepConfig::from_toml_str("thread_counts = \"many\"").unwrap_err();

    assert!(matches!(error, Error::Config(_)));
}
