use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::{
    ChunkCursor, Claims, Combiner, Error, IterationSpace, PrivateScope, Result, Schedule,
    ScopedOutcome, Value, validate_thread_count,
};

/// Executes parallel loops on a fixed number of worker threads using one [`Schedule`].
///
/// Every call spawns exactly [`thread_count()`](Self::thread_count) workers, lets them claim
/// chunks of the iteration space until it is exhausted and joins all of them before returning.
/// The join is the only synchronization point visible to the caller.
///
/// The per-index function must not have side effects other than through its return value (or,
/// for [`scoped()`](Self::scoped), through its private variable). Which worker executes which
/// index is up to the schedule.
///
/// # Examples
///
/// ```
/// use par_loop::{
///     CombineStrategy, Combiner, Executor, IterationSpace, Operator, Schedule, SchedulePolicy,
/// };
///
/// let executor = Executor::new(4, Schedule::new(SchedulePolicy::Dynamic, 16).unwrap()).unwrap();
/// let combiner = Combiner::new(CombineStrategy::ReductionMerge, Operator::<i64>::sum());
///
/// let sum = executor
///     .reduce(IterationSpace::new(1, 1001).unwrap(), &combiner, 0, |i| i as i64)
///     .unwrap();
///
/// assert_eq!(*sum.value(), 500_500);
/// println!("summed in {:?}", sum.elapsed());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Executor {
    thread_count: NonZero<usize>,
    schedule: Schedule,
}

impl Executor {
    /// Creates an executor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `thread_count` is zero.
    pub fn new(thread_count: usize, schedule: Schedule) -> Result<Self> {
        Ok(Self::with_thread_count(
            validate_thread_count(thread_count)?,
            schedule,
        ))
    }

    pub(crate) const fn with_thread_count(
        thread_count: NonZero<usize>,
        schedule: Schedule,
    ) -> Self {
        Self {
            thread_count,
            schedule,
        }
    }

    /// Number of workers spawned for every loop.
    #[must_use]
    pub fn thread_count(&self) -> NonZero<usize> {
        self.thread_count
    }

    /// The schedule used to distribute chunks.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Runs `body` for every index in `space` without producing a shared result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionFailure`] if `body` panicked on any worker and
    /// [`Error::ThreadSpawn`] if a worker could not be started.
    pub fn for_each<F>(&self, space: IterationSpace, body: F) -> Result<Timed<()>>
    where
        F: Fn(usize) + Sync,
    {
        let timed = self.execute(space, |claims| {
            for span in claims {
                span.range().for_each(&body);
            }
        })?;

        Ok(timed.map(|_| ()))
    }

    /// Runs `body` for every index in `space` and combines the returned values into `initial`
    /// using `combiner`.
    ///
    /// The elapsed time covers spawning, executing and joining the workers. Folding the
    /// private partials of [`CombineStrategy::ReductionMerge`](crate::CombineStrategy) happens
    /// after the join.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionFailure`] if `body` panicked on any worker and
    /// [`Error::ThreadSpawn`] if a worker could not be started.
    pub fn reduce<T, F>(
        &self,
        space: IterationSpace,
        combiner: &Combiner<T>,
        initial: T,
        body: F,
    ) -> Result<Timed<T>>
    where
        T: Value,
        F: Fn(usize) -> T + Sync,
    {
        let shared = combiner.accumulator(initial);

        let timed = self.execute(space, |claims| {
            let mut local = shared.begin();

            for span in claims {
                for index in span.range() {
                    shared.update(&mut local, body(index));
                }
            }

            local
        })?;

        Ok(timed.map(|partials| shared.finish(partials)))
    }

    /// Runs `body` for every index in `space` and returns the outputs in index order.
    ///
    /// Each output slot is produced by exactly one worker. Workers keep their outputs private
    /// and the buffer is assembled after the join.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionFailure`] if `body` panicked on any worker and
    /// [`Error::ThreadSpawn`] if a worker could not be started.
    pub fn map<T, F>(&self, space: IterationSpace, body: F) -> Result<Timed<Vec<T>>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let timed = self.execute(space, |claims| {
            claims
                .map(|span| (span.start(), span.range().map(&body).collect::<Vec<_>>()))
                .collect::<Vec<_>>()
        })?;

        Ok(timed.map(|per_thread| {
            let mut blocks = per_thread.into_iter().flatten().collect::<Vec<_>>();
            blocks.sort_unstable_by_key(|(start, _)| *start);

            let mut output = Vec::with_capacity(space.len());
            for (_, values) in blocks {
                output.extend(values);
            }

            output
        }))
    }

    /// Runs `body` for every index in `space`, giving each worker a private variable governed by
    /// `scope`.
    ///
    /// See the [`scope`](crate::PrivateScope) documentation for how the value after the last
    /// index is chosen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionFailure`] if `body` panicked on any worker and
    /// [`Error::ThreadSpawn`] if a worker could not be started.
    pub fn scoped<T, F>(
        &self,
        space: IterationSpace,
        scope: PrivateScope<T>,
        body: F,
    ) -> Result<Timed<ScopedOutcome<T>>>
    where
        T: Clone + Send + Sync,
        F: Fn(usize, &mut T) + Sync,
    {
        let last_index = space.last().filter(|_| scope.captures_last());

        let timed = self.execute(space, |claims| {
            let mut value = scope.initial_copy();
            let mut last = None;

            for span in claims {
                for index in span.range() {
                    body(index, &mut value);

                    if Some(index) == last_index {
                        last = Some(value.clone());
                    }
                }
            }

            (value, last)
        })?;

        Ok(timed.map(|per_thread| {
            let mut captured = None;
            let mut thread_values = Vec::with_capacity(per_thread.len());

            for (value, last) in per_thread {
                thread_values.push(value);

                if last.is_some() {
                    captured = last;
                }
            }

            ScopedOutcome::new(captured, thread_values)
        }))
    }

    /// Spawns the workers, runs `worker` on each of them with that worker's chunk claims and
    /// joins them, returning the per-worker results in worker order.
    fn execute<R, W>(&self, space: IterationSpace, worker: W) -> Result<Timed<Vec<R>>>
    where
        R: Send,
        W: Fn(Claims<'_>) -> R + Sync,
    {
        let cursor = ChunkCursor::new(space, self.thread_count, self.schedule);

        debug!(
            %space,
            threads = self.thread_count.get(),
            schedule = %self.schedule,
            "starting parallel loop"
        );

        let started = Instant::now();

        let results = thread::scope(|s| -> Result<Vec<R>> {
            let handles = (0..self.thread_count.get())
                .map(|thread_index| {
                    let cursor = &cursor;
                    let worker = &worker;

                    thread::Builder::new()
                        .name(format!("par_loop-{thread_index}"))
                        .spawn_scoped(s, move || {
                            let claims = cursor.claims(thread_index);
                            trace!(thread_index = claims.thread_index(), "worker started");

                            panic::catch_unwind(AssertUnwindSafe(|| worker(claims)))
                        })
                        .map_err(|source| Error::ThreadSpawn {
                            thread_index,
                            source,
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            let mut results = Vec::with_capacity(handles.len());
            let mut failure = None;

            for (thread_index, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(Ok(result)) => results.push(result),
                    Ok(Err(payload)) | Err(payload) => {
                        failure.get_or_insert_with(|| Error::from_panic(thread_index, &*payload));
                    }
                }
            }

            failure.map_or(Ok(results), Err)
        });

        let elapsed = started.elapsed();

        match &results {
            Ok(_) => debug!(?elapsed, "parallel loop finished"),
            Err(error) => debug!(?elapsed, %error, "parallel loop failed"),
        }

        Ok(Timed::new(elapsed, results?))
    }
}

/// A value together with the wall-clock time it took to produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timed<T> {
    elapsed: Duration,
    value: T,
}

impl<T> Timed<T> {
    /// Pairs a value with the time it took to produce.
    pub fn new(elapsed: Duration, value: T) -> Self {
        Self { elapsed, value }
    }

    /// Wall-clock time spent producing the value.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Wall-clock time spent producing the value, in seconds.
    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// The produced value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Discards the timing, returning the produced value.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Splits into the elapsed time and the produced value.
    #[must_use]
    pub fn into_parts(self) -> (Duration, T) {
        (self.elapsed, self.value)
    }

    /// Transforms the value, keeping the timing.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Timed<U> {
        Timed {
            elapsed: self.elapsed,
            value: f(self.value),
        }
    }
}
