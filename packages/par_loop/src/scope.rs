//! Data-scoping policies for per-worker private variables.
//!
//! A parallel loop body often needs a variable of its own that it can mutate without
//! synchronization. The policies here say how each worker's private copy starts out and what,
//! if anything, flows back to the original variable once the loop has finished.
//!
//! * [`PrivateScope::private()`] - every copy starts from `T::default()`. The body is expected
//!   to write the variable before reading it, the same as an uninitialized private variable.
//! * [`PrivateScope::first_private()`] - every copy starts as a clone of the given value.
//! * [`PrivateScope::last_private()`] - additionally captures the private value held right after
//!   the last index of the iteration space executed, so it can be written back.
//!
//! Each worker keeps the same private copy for every chunk it claims.
//!
//! # Which value is "last"
//!
//! The captured value is the one belonging to whichever worker executed the index `end - 1`,
//! taken immediately after that index executed. This is the last index in iteration-space order,
//! not the value of whichever worker finished last. Under dynamic and guided schedules the worker
//! that runs `end - 1` is decided at runtime, so the captured value is only reproducible if the
//! body's write for the last index does not depend on state left over from earlier indices.

/// How each worker's private copy of a variable is initialized and whether the value after the
/// last iteration is captured.
///
/// # Examples
///
/// ```
/// use par_loop::{Executor, IterationSpace, PrivateScope, Schedule, SchedulePolicy};
///
/// let executor = Executor::new(2, Schedule::new(SchedulePolicy::Static, 2).unwrap()).unwrap();
///
/// let mut x = 100;
/// let outcome = executor
///     .scoped(
///         IterationSpace::with_len(4),
///         PrivateScope::first_private(x).last_private(),
///         |i, x: &mut i64| *x += i as i64,
///     )
///     .unwrap()
///     .into_value();
///
/// outcome.write_back(&mut x);
///
/// // Worker 1 ran indices 2 and 3 starting from 100.
/// assert_eq!(x, 105);
/// ```
#[derive(Clone, Debug)]
pub struct PrivateScope<T> {
    initial: T,
    capture_last: bool,
}

impl<T: Clone> PrivateScope<T> {
    /// Every worker's copy starts from `T::default()`.
    #[must_use]
    pub fn private() -> Self
    where
        T: Default,
    {
        Self {
            initial: T::default(),
            capture_last: false,
        }
    }

    /// Every worker's copy starts as a clone of `value`.
    #[must_use]
    pub fn first_private(value: T) -> Self {
        Self {
            initial: value,
            capture_last: false,
        }
    }

    /// Also captures the private value held right after the last index of the iteration space
    /// executed.
    #[must_use]
    pub fn last_private(mut self) -> Self {
        self.capture_last = true;
        self
    }

    /// Whether the value after the last index is captured.
    #[must_use]
    pub fn captures_last(&self) -> bool {
        self.capture_last
    }

    pub(crate) fn initial_copy(&self) -> T {
        self.initial.clone()
    }
}

/// What a scoped loop left behind in its private variables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScopedOutcome<T> {
    last: Option<T>,
    thread_values: Vec<T>,
}

impl<T> ScopedOutcome<T> {
    pub(crate) fn new(last: Option<T>, thread_values: Vec<T>) -> Self {
        Self {
            last,
            thread_values,
        }
    }

    /// The private value captured right after the last index executed.
    ///
    /// `None` if the scope was not [`last_private()`](PrivateScope::last_private) or the
    /// iteration space was empty.
    #[must_use]
    pub fn last_value(&self) -> Option<&T> {
        self.last.as_ref()
    }

    /// Every worker's private value at the end of the loop, in worker order. Workers that
    /// claimed no work still hold their initial copy.
    #[must_use]
    pub fn thread_values(&self) -> &[T] {
        &self.thread_values
    }

    /// Applies lastprivate semantics to the original variable: it takes the captured value if
    /// there is one and is left untouched otherwise.
    pub fn write_back(self, original: &mut T) {
        if let Some(last) = self.last {
            *original = last;
        }
    }
}
