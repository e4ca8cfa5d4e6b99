//! Runtime side of chunk scheduling: the shared cursor that workers claim chunks from.

use std::num::NonZero;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use tracing::trace;

use crate::{IterationSpace, Schedule, SchedulePolicy};

/// Hands out the chunks of one iteration space to the workers of one loop execution.
///
/// Static schedules never touch the shared counter. Dynamic schedules treat it as the index of
/// the next unclaimed fixed-size chunk, guided schedules as the next unclaimed loop index.
#[derive(Debug)]
pub(crate) struct ChunkCursor {
    space: IterationSpace,
    thread_count: NonZero<usize>,
    schedule: Schedule,

    // Only ordering between claims matters, the loop results are published by the join.
    next: CachePadded<AtomicUsize>,
}

impl ChunkCursor {
    pub(crate) fn new(
        space: IterationSpace,
        thread_count: NonZero<usize>,
        schedule: Schedule,
    ) -> Self {
        let next = match schedule.policy() {
            SchedulePolicy::Static | SchedulePolicy::Dynamic => 0,
            SchedulePolicy::Guided => space.start(),
        };

        Self {
            space,
            thread_count,
            schedule,
            next: CachePadded::new(AtomicUsize::new(next)),
        }
    }

    /// The `k`-th fixed-size chunk, or `None` once `k` is past the end of the space.
    fn fixed_chunk(&self, k: usize) -> Option<IterationSpace> {
        let chunk_size = self.schedule.chunk_size().get();

        let start = k
            .checked_mul(chunk_size)
            .and_then(|offset| self.space.start().checked_add(offset))
            .filter(|start| *start < self.space.end())?;

        let end = start.saturating_add(chunk_size).min(self.space.end());

        Some(IterationSpace::between(start, end))
    }

    /// All fixed-size chunks in order, as used by static and dynamic schedules.
    pub(crate) fn fixed_chunks(&self) -> impl Iterator<Item = IterationSpace> + '_ {
        (0..).map_while(|k| self.fixed_chunk(k))
    }

    /// Claims the next chunk from the shared counter. Only meaningful for dynamic and guided
    /// schedules.
    pub(crate) fn claim_shared(&self) -> Option<IterationSpace> {
        match self.schedule.policy() {
            SchedulePolicy::Static => None,
            SchedulePolicy::Dynamic => {
                let k = self.next.fetch_add(1, Ordering::Relaxed);
                self.fixed_chunk(k)
            }
            SchedulePolicy::Guided => self.claim_guided(),
        }
    }

    fn claim_guided(&self) -> Option<IterationSpace> {
        let mut start = self.next.load(Ordering::Relaxed);

        loop {
            let remaining = self.space.end().checked_sub(start).filter(|r| *r > 0)?;
            let len = guided_chunk_len(remaining, self.thread_count, self.schedule.chunk_size());
            let end = start.saturating_add(len);

            match self
                .next
                .compare_exchange_weak(start, end, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Some(IterationSpace::between(start, end)),
                Err(actual) => start = actual,
            }
        }
    }

    /// The chunks claimed by one worker over the lifetime of the loop.
    pub(crate) fn claims(&self, thread_index: usize) -> Claims<'_> {
        Claims {
            cursor: self,
            thread_index,
            next_fixed: thread_index,
        }
    }
}

/// Size of the next guided chunk: an even share of what is left, but never below the
/// configured minimum and never beyond what remains.
fn guided_chunk_len(
    remaining: usize,
    thread_count: NonZero<usize>,
    min_chunk_size: NonZero<usize>,
) -> usize {
    remaining
        .div_ceil(thread_count.get())
        .max(min_chunk_size.get())
        .min(remaining)
}

/// Iterator over the chunks one worker executes.
#[derive(Debug)]
pub(crate) struct Claims<'a> {
    cursor: &'a ChunkCursor,
    thread_index: usize,

    // Static schedules only: index of the next chunk dealt to this worker.
    next_fixed: usize,
}

impl Claims<'_> {
    pub(crate) fn thread_index(&self) -> usize {
        self.thread_index
    }
}

impl Iterator for Claims<'_> {
    type Item = IterationSpace;

    fn next(&mut self) -> Option<Self::Item> {
        let span = match self.cursor.schedule.policy() {
            SchedulePolicy::Static => {
                let k = self.next_fixed;
                self.next_fixed = k.saturating_add(self.cursor.thread_count.get());
                self.cursor.fixed_chunk(k)
            }
            SchedulePolicy::Dynamic | SchedulePolicy::Guided => self.cursor.claim_shared(),
        }?;

        trace!(thread_index = self.thread_index, %span, "claimed chunk");

        Some(span)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::thread;

    use super::*;

    fn nz(value: usize) -> NonZero<usize> {
        NonZero::new(value).unwrap()
    }

    fn cursor(
        space: IterationSpace,
        threads: usize,
        policy: SchedulePolicy,
        chunk: usize,
    ) -> ChunkCursor {
        ChunkCursor::new(space, nz(threads), Schedule::new(policy, chunk).unwrap())
    }

    #[test]
    fn static_claims_are_round_robin() {
        let cursor = cursor(IterationSpace::with_len(10), 2, SchedulePolicy::Static, 3);

        let thread_0: Vec<_> = cursor.claims(0).map(|s| s.range()).collect();
        let thread_1: Vec<_> = cursor.claims(1).map(|s| s.range()).collect();

        assert_eq!(thread_0, vec![0..3, 6..9]);
        assert_eq!(thread_1, vec![3..6, 9..10]);
    }

    #[test]
    fn static_claims_ignore_shared_counter() {
        let cursor = cursor(IterationSpace::with_len(10), 2, SchedulePolicy::Static, 3);

        assert_eq!(cursor.claim_shared(), None);
        assert_eq!(cursor.claims(0).count(), 2);
    }

    #[test]
    fn dynamic_claims_drain_once() {
        let cursor = cursor(IterationSpace::new(4, 14).unwrap(), 3, SchedulePolicy::Dynamic, 4);

        let all: Vec<_> = cursor.claims(2).map(|s| s.range()).collect();

        assert_eq!(all, vec![4..8, 8..12, 12..14]);
        assert_eq!(cursor.claims(0).next(), None);
    }

    #[test]
    fn guided_chunk_len_examples() {
        assert_eq!(guided_chunk_len(1000, nz(4), nz(1)), 250);
        assert_eq!(guided_chunk_len(10, nz(4), nz(8)), 8);
        assert_eq!(guided_chunk_len(5, nz(4), nz(8)), 5);
        assert_eq!(guided_chunk_len(1, nz(16), nz(1)), 1);
    }

    #[cfg_attr(miri, ignore)] // Slow under Miri.
    #[test]
    fn concurrent_claims_cover_space_exactly_once() {
        const LEN: usize = 20_000;
        const THREADS: usize = 8;

        for policy in [SchedulePolicy::Dynamic, SchedulePolicy::Guided] {
            let cursor = cursor(IterationSpace::with_len(LEN), THREADS, policy, 3);
            let seen = Mutex::new(vec![0_u8; LEN]);

            thread::scope(|s| {
                for thread_index in 0..THREADS {
                    let cursor = &cursor;
                    let seen = &seen;

                    s.spawn(move || {
                        for span in cursor.claims(thread_index) {
                            let mut seen = seen.lock().unwrap();
                            for i in span.range() {
                                seen[i] += 1;
                            }
                        }
                    });
                }
            });

            assert!(seen.into_inner().unwrap().iter().all(|&n| n == 1), "{policy}");
        }
    }
}
