use std::fmt;
use std::iter;
use std::num::NonZero;
use std::slice;

use serde::Deserialize;

use crate::{ChunkCursor, Error, IterationSpace, Result};

/// How the chunks of an iteration space are handed out to worker threads.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, derive_more::Display)]
#[serde(rename_all = "snake_case")]
#[allow(
    clippy::exhaustive_enums,
    reason = "the set of policies is part of the scheduling model and will not grow silently"
)]
pub enum SchedulePolicy {
    /// Fixed-size chunks dealt out round-robin before the loop starts. Chunk `k` always goes to
    /// thread `k mod thread_count` and no runtime coordination is needed.
    #[display("static")]
    Static,

    /// Fixed-size chunks claimed at runtime by whichever worker asks next.
    #[display("dynamic")]
    Dynamic,

    /// Chunks claimed at runtime whose size starts near `remaining / thread_count` and shrinks
    /// toward the configured chunk size as work runs out.
    #[display("guided")]
    Guided,
}

impl SchedulePolicy {
    /// Every policy, in the order the benchmark harness evaluates them by default.
    pub const ALL: [Self; 3] = [Self::Static, Self::Dynamic, Self::Guided];
}

/// A [`SchedulePolicy`] paired with its chunk size.
///
/// For [`SchedulePolicy::Guided`] the chunk size is the minimum chunk size.
///
/// # Examples
///
/// ```
/// use par_loop::{Schedule, SchedulePolicy};
///
/// let schedule = Schedule::new(SchedulePolicy::Dynamic, 16).unwrap();
/// assert_eq!(schedule.chunk_size().get(), 16);
/// assert_eq!(schedule.to_string(), "dynamic(16)");
///
/// assert!(Schedule::new(SchedulePolicy::Static, 0).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Schedule {
    policy: SchedulePolicy,
    chunk_size: NonZero<usize>,
}

impl Schedule {
    /// Creates a schedule with the given policy and chunk size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `chunk_size` is zero.
    pub fn new(policy: SchedulePolicy, chunk_size: usize) -> Result<Self> {
        let chunk_size = NonZero::new(chunk_size).ok_or_else(|| {
            Error::invalid(format!("chunk size for {policy} schedule must be at least 1"))
        })?;

        Ok(Self::with_chunk_size(policy, chunk_size))
    }

    /// Creates a schedule from a chunk size that is already known to be valid.
    #[must_use]
    pub const fn with_chunk_size(policy: SchedulePolicy, chunk_size: NonZero<usize>) -> Self {
        Self { policy, chunk_size }
    }

    /// The policy used to hand out chunks.
    #[must_use]
    pub fn policy(&self) -> SchedulePolicy {
        self.policy
    }

    /// The chunk size (minimum chunk size for guided scheduling).
    #[must_use]
    pub fn chunk_size(&self) -> NonZero<usize> {
        self.chunk_size
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.policy, self.chunk_size)
    }
}

/// One contiguous piece of an iteration space and the worker it belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Chunk {
    thread_index: usize,
    span: IterationSpace,
}

impl Chunk {
    pub(crate) fn new(thread_index: usize, span: IterationSpace) -> Self {
        Self { thread_index, span }
    }

    /// The worker that executes this chunk.
    ///
    /// For dynamic and guided schedules this is the nominal label produced by [`partition()`];
    /// at runtime any worker may claim the chunk.
    #[must_use]
    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    /// The indices covered by this chunk.
    #[must_use]
    pub fn span(&self) -> IterationSpace {
        self.span
    }
}

/// The chunks an iteration space was divided into, ordered by position in the space.
///
/// The chunks always cover the space exactly once, with no gaps and no overlaps.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WorkAssignment {
    chunks: Vec<Chunk>,
}

impl WorkAssignment {
    /// All chunks, ordered by their start index.
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Iterates over all chunks, ordered by their start index.
    pub fn iter(&self) -> slice::Iter<'_, Chunk> {
        self.chunks.iter()
    }

    /// Number of chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether there are no chunks, which is the case exactly when the space was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The spans labeled with the given worker, in order.
    pub fn for_thread(&self, thread_index: usize) -> impl Iterator<Item = IterationSpace> + '_ {
        self.chunks
            .iter()
            .filter(move |chunk| chunk.thread_index == thread_index)
            .map(Chunk::span)
    }

    /// Whether the chunks tile `space` exactly: contiguous, non-overlapping and complete.
    #[must_use]
    pub fn covers(&self, space: IterationSpace) -> bool {
        let mut expected_start = space.start();

        for chunk in &self.chunks {
            if chunk.span.is_empty() || chunk.span.start() != expected_start {
                return false;
            }

            expected_start = chunk.span.end();
        }

        expected_start == space.end()
    }
}

impl<'a> IntoIterator for &'a WorkAssignment {
    type Item = &'a Chunk;
    type IntoIter = slice::Iter<'a, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub(crate) fn validate_thread_count(thread_count: usize) -> Result<NonZero<usize>> {
    NonZero::new(thread_count)
        .ok_or_else(|| Error::invalid("thread count must be at least 1"))
}

/// Divides `space` into chunks for `thread_count` workers according to `schedule`.
///
/// Static schedules are fully determined here. For dynamic and guided schedules the chunk
/// boundaries are produced by replaying the runtime claim sequence on the calling thread and
/// the chunks are labeled round-robin in claim order; which worker really executes a chunk is
/// decided while the loop runs.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] if `thread_count` is zero.
///
/// # Examples
///
/// ```
/// use par_loop::{IterationSpace, Schedule, SchedulePolicy, partition};
///
/// let space = IterationSpace::new(0, 12).unwrap();
/// let schedule = Schedule::new(SchedulePolicy::Static, 2).unwrap();
///
/// let assignment = partition(space, 3, schedule).unwrap();
///
/// let thread_0: Vec<_> = assignment.for_thread(0).map(|s| s.range()).collect();
/// assert_eq!(thread_0, vec![0..2, 6..8]);
/// ```
pub fn partition(
    space: IterationSpace,
    thread_count: usize,
    schedule: Schedule,
) -> Result<WorkAssignment> {
    let thread_count = validate_thread_count(thread_count)?;
    let cursor = ChunkCursor::new(space, thread_count, schedule);

    let spans: Box<dyn Iterator<Item = IterationSpace> + '_> = match schedule.policy() {
        SchedulePolicy::Static => Box::new(cursor.fixed_chunks()),
        SchedulePolicy::Dynamic | SchedulePolicy::Guided => {
            Box::new(iter::from_fn(|| cursor.claim_shared()))
        }
    };

    let chunks = spans
        .enumerate()
        .map(|(k, span)| Chunk::new(k % thread_count, span))
        .collect();

    Ok(WorkAssignment { chunks })
}
