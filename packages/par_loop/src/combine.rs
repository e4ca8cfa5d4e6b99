use std::fmt;
use std::ops::{Add, Mul};
use std::panic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use num_traits::{Bounded, One, Zero};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::{Error, Result};

/// A value that can be combined by [`CombineStrategy::ReductionMerge`] and
/// [`CombineStrategy::CriticalSection`].
///
/// Implemented for every `Copy` type that can be shared between threads, including compound
/// values such as `(f64, usize)` for an argmax.
pub trait Value: Copy + Send + Sync + fmt::Debug + 'static {}

impl<T> Value for T where T: Copy + Send + Sync + fmt::Debug + 'static {}

/// A value that can additionally be combined by [`CombineStrategy::Atomic`].
///
/// The atomic strategy stores the shared value as a single 64-bit word, so implementations
/// must round-trip losslessly through [`to_word()`](Self::to_word) and
/// [`from_word()`](Self::from_word).
pub trait AtomicValue: Value {
    /// Packs the value into a 64-bit word.
    fn to_word(self) -> u64;

    /// Unpacks a value previously packed with [`to_word()`](Self::to_word).
    fn from_word(word: u64) -> Self;
}

macro_rules! impl_atomic_value_for_wide {
    ($($ty:ty),*) => {$(
        impl AtomicValue for $ty {
            fn to_word(self) -> u64 {
                u64::from_ne_bytes(self.to_ne_bytes())
            }

            fn from_word(word: u64) -> Self {
                Self::from_ne_bytes(word.to_ne_bytes())
            }
        }
    )*};
}

macro_rules! impl_atomic_value_for_narrow {
    ($($ty:ty),*) => {$(
        impl AtomicValue for $ty {
            fn to_word(self) -> u64 {
                u64::from(u32::from_ne_bytes(self.to_ne_bytes()))
            }

            #[allow(
                clippy::cast_possible_truncation,
                reason = "only the low 32 bits of the word are ever populated"
            )]
            fn from_word(word: u64) -> Self {
                Self::from_ne_bytes((word as u32).to_ne_bytes())
            }
        }
    )*};
}

impl_atomic_value_for_wide!(i64, u64, f64);
impl_atomic_value_for_narrow!(i32, u32, f32);

/// The packing functions of an [`AtomicValue`], captured so that a [`Combiner`] over any
/// [`Value`] can carry them.
#[derive(Clone, Copy)]
struct WordCodec<T> {
    to_word: fn(T) -> u64,
    from_word: fn(u64) -> T,
}

impl<T: AtomicValue> WordCodec<T> {
    fn of() -> Self {
        Self {
            to_word: T::to_word,
            from_word: T::from_word,
        }
    }
}

impl<T> fmt::Debug for WordCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordCodec").finish_non_exhaustive()
    }
}

/// An associative and commutative binary operator together with its identity element.
///
/// # Examples
///
/// ```
/// use par_loop::Operator;
///
/// let sum = Operator::<i64>::sum();
/// assert_eq!(sum.apply(2, 3), 5);
/// assert_eq!(sum.identity(), 0);
///
/// let bit_or = Operator::new("bit_or", 0_u64, |a, b| a | b);
/// assert_eq!(bit_or.apply(0b01, 0b10), 0b11);
/// ```
#[derive(Clone, Copy, derive_more::Debug)]
pub struct Operator<T> {
    name: &'static str,
    identity: T,

    #[debug(ignore)]
    apply: fn(T, T) -> T,
}

impl<T: Value> Operator<T> {
    /// Creates an operator from its name, identity element and combining function.
    ///
    /// The function must be associative and commutative and `identity` must be its identity
    /// element, otherwise the combine strategies will disagree with each other.
    #[must_use]
    pub const fn new(name: &'static str, identity: T, apply: fn(T, T) -> T) -> Self {
        Self {
            name,
            identity,
            apply,
        }
    }

    /// Addition, with identity zero.
    #[must_use]
    pub fn sum() -> Self
    where
        T: Zero + Add<Output = T>,
    {
        Self::new("sum", T::zero(), |a, b| a + b)
    }

    /// Multiplication, with identity one.
    #[must_use]
    pub fn product() -> Self
    where
        T: One + Mul<Output = T>,
    {
        Self::new("product", T::one(), |a, b| a * b)
    }

    /// Minimum, with the largest representable value as identity.
    #[must_use]
    pub fn min() -> Self
    where
        T: Bounded + PartialOrd,
    {
        Self::new("min", T::max_value(), |a, b| if b < a { b } else { a })
    }

    /// Maximum, with the smallest representable value as identity.
    #[must_use]
    pub fn max() -> Self
    where
        T: Bounded + PartialOrd,
    {
        Self::new("max", T::min_value(), |a, b| if b > a { b } else { a })
    }

    /// Name of the operator, for reporting.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The identity element.
    #[must_use]
    pub fn identity(&self) -> T {
        self.identity
    }

    /// Combines two values.
    #[must_use]
    pub fn apply(&self, left: T, right: T) -> T {
        (self.apply)(left, right)
    }
}

/// How concurrent per-index contributions are combined into one shared value.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, derive_more::Display)]
#[serde(rename_all = "snake_case")]
#[allow(
    clippy::exhaustive_enums,
    reason = "the set of strategies is part of the combination model and will not grow silently"
)]
pub enum CombineStrategy {
    /// Every worker accumulates into a private copy starting at the identity. Once all workers
    /// have finished, the copies are folded in worker order after the initial shared value.
    /// There is no contention while the loop runs.
    #[display("reduction")]
    ReductionMerge,

    /// Every per-index contribution is applied to the shared value as one indivisible
    /// read-modify-write. Throughput drops as contention grows.
    #[display("atomic")]
    Atomic,

    /// Every per-index contribution takes a lock shared by all workers. Slowest of the three
    /// but works for any operator.
    #[display("critical")]
    CriticalSection,
}

impl CombineStrategy {
    /// Every strategy, in the order the benchmark harness evaluates them by default.
    pub const ALL: [Self; 3] = [Self::ReductionMerge, Self::Atomic, Self::CriticalSection];
}

/// Applies an [`Operator`] to concurrent contributions using one [`CombineStrategy`].
///
/// All strategies yield the same value for integer data. For floating-point data the order in
/// which contributions are combined differs between strategies, so results may differ in the
/// last bits.
///
/// # Examples
///
/// ```
/// use par_loop::{CombineStrategy, Combiner, Operator};
///
/// let contributions = vec![vec![1, 2, 3], vec![4, 5], vec![6]];
///
/// for strategy in CombineStrategy::ALL {
///     let combiner = Combiner::new(strategy, Operator::<i64>::sum());
///     assert_eq!(combiner.combine(100, &contributions), 121);
/// }
/// ```
///
/// Values that do not fit in one atomic word can still be combined by the other strategies:
///
/// ```
/// use par_loop::{CombineStrategy, Combiner, Operator};
///
/// let argmax = Operator::new("argmax", (f64::MIN, 0_usize), |a, b| if b.0 > a.0 { b } else { a });
///
/// let combiner = Combiner::try_new(CombineStrategy::CriticalSection, argmax).unwrap();
/// let best = combiner.combine(argmax.identity(), &[vec![(1.5, 0), (9.0, 1)], vec![(4.0, 2)]]);
/// assert_eq!(best, (9.0, 1));
///
/// assert!(Combiner::try_new(CombineStrategy::Atomic, argmax).is_err());
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Combiner<T> {
    mode: Mode<T>,
    operator: Operator<T>,
}

#[derive(Clone, Copy, Debug)]
enum Mode<T> {
    Merge,
    Atomic(WordCodec<T>),
    Critical,
}

impl<T: Value> Combiner<T> {
    /// Creates a combiner for a value that supports every strategy.
    #[must_use]
    pub fn new(strategy: CombineStrategy, operator: Operator<T>) -> Self
    where
        T: AtomicValue,
    {
        let mode = match strategy {
            CombineStrategy::ReductionMerge => Mode::Merge,
            CombineStrategy::Atomic => Mode::Atomic(WordCodec::of()),
            CombineStrategy::CriticalSection => Mode::Critical,
        };

        Self { mode, operator }
    }

    /// Creates a combiner for any [`Value`], including compound values that do not fit in one
    /// atomic word.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `strategy` is [`CombineStrategy::Atomic`]. Use
    /// [`new()`](Self::new) for [`AtomicValue`] types.
    pub fn try_new(strategy: CombineStrategy, operator: Operator<T>) -> Result<Self> {
        let mode = match strategy {
            CombineStrategy::ReductionMerge => Mode::Merge,
            CombineStrategy::Atomic => {
                return Err(Error::invalid(format!(
                    "the {} operator combines values that do not fit in one atomic word, \
                     use the reduction or critical strategy instead",
                    operator.name()
                )));
            }
            CombineStrategy::CriticalSection => Mode::Critical,
        };

        Ok(Self { mode, operator })
    }

    /// The strategy used for shared updates.
    #[must_use]
    pub fn strategy(&self) -> CombineStrategy {
        match self.mode {
            Mode::Merge => CombineStrategy::ReductionMerge,
            Mode::Atomic(_) => CombineStrategy::Atomic,
            Mode::Critical => CombineStrategy::CriticalSection,
        }
    }

    /// The operator applied to contributions.
    #[must_use]
    pub fn operator(&self) -> Operator<T> {
        self.operator
    }

    /// Combines per-thread contributions into `initial`, running one thread per entry in
    /// `contributions`.
    ///
    /// `initial` is the pre-existing shared value. It is always the leftmost operand, so the
    /// result equals a sequential fold starting from `initial`.
    ///
    /// # Panics
    ///
    /// Propagates any panic raised by the operator.
    #[must_use]
    pub fn combine(&self, initial: T, contributions: &[Vec<T>]) -> T {
        let shared = self.accumulator(initial);

        let partials = thread::scope(|s| {
            let handles = contributions
                .iter()
                .map(|values| {
                    let shared = &shared;

                    s.spawn(move || {
                        let mut local = shared.begin();

                        for value in values {
                            shared.update(&mut local, *value);
                        }

                        local
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect::<Vec<_>>()
        });

        shared.finish(partials)
    }

    pub(crate) fn accumulator(&self, initial: T) -> SharedAccumulator<T> {
        let state = match self.mode {
            Mode::Merge => SharedState::Merge { initial },
            Mode::Atomic(codec) => SharedState::Atomic {
                word: AtomicU64::new((codec.to_word)(initial)),
                codec,
            },
            Mode::Critical => SharedState::Critical(Mutex::new(initial)),
        };

        SharedAccumulator {
            operator: self.operator,
            state,
        }
    }
}

/// The shared value of one loop execution, updated by every worker according to a strategy.
#[derive(Debug)]
pub(crate) struct SharedAccumulator<T> {
    operator: Operator<T>,
    state: SharedState<T>,
}

#[derive(Debug)]
enum SharedState<T> {
    Merge { initial: T },
    Atomic { word: AtomicU64, codec: WordCodec<T> },
    Critical(Mutex<T>),
}

impl<T: Value> SharedAccumulator<T> {
    /// The starting value of a worker's private accumulator.
    pub(crate) fn begin(&self) -> T {
        self.operator.identity()
    }

    /// Applies one per-index contribution.
    ///
    /// Only the merge strategy writes to `local`; the others write straight to shared state.
    #[inline]
    pub(crate) fn update(&self, local: &mut T, value: T) {
        match &self.state {
            SharedState::Merge { .. } => {
                *local = self.operator.apply(*local, value);
            }
            SharedState::Atomic { word, codec } => {
                let mut current = word.load(Ordering::Relaxed);

                loop {
                    let updated =
                        (codec.to_word)(self.operator.apply((codec.from_word)(current), value));

                    match word.compare_exchange_weak(
                        current,
                        updated,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(actual) => current = actual,
                    }
                }
            }
            SharedState::Critical(shared) => {
                let mut shared = shared.lock();
                *shared = self.operator.apply(*shared, value);
            }
        }
    }

    /// Produces the final value once every worker has finished. `partials` are the private
    /// accumulators in worker order.
    pub(crate) fn finish(self, partials: impl IntoIterator<Item = T>) -> T {
        match self.state {
            SharedState::Merge { initial } => partials
                .into_iter()
                .fold(initial, |acc, partial| self.operator.apply(acc, partial)),
            SharedState::Atomic { word, codec } => (codec.from_word)(word.into_inner()),
            SharedState::Critical(shared) => shared.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cmp;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SharedAccumulator<i64>: Send, Sync);
    assert_impl_all!(Combiner<f64>: Send, Sync, Copy);

    fn split_into<T: Copy>(values: &[T], parts: usize) -> Vec<Vec<T>> {
        let mut split = vec![Vec::new(); parts];

        for (i, value) in values.iter().enumerate() {
            split[i % parts].push(*value);
        }

        split
    }

    #[test]
    fn integer_sum_identical_across_strategies() {
        let values: Vec<i64> = (1..=10_000).collect();
        let contributions = split_into(&values, 4);

        for strategy in CombineStrategy::ALL {
            let combiner = Combiner::new(strategy, Operator::sum());

            assert_eq!(combiner.combine(0, &contributions), 50_005_000, "{strategy}");
        }
    }

    #[test]
    fn float_sum_agrees_within_tolerance() {
        // Floating-point addition is not associative, so strategies that combine in a different
        // order may differ in the last bits. They must agree within 1e-6.
        let contributions: Vec<Vec<f64>> = (0..4)
            .map(|t| (0..2_500).map(|i| 1.0 / f64::from(t * 2_500 + i + 1)).collect())
            .collect();

        let expected: f64 = contributions.iter().flatten().sum();

        for strategy in CombineStrategy::ALL {
            let combiner = Combiner::new(strategy, Operator::sum());
            let actual = combiner.combine(0.0, &contributions);

            assert!((actual - expected).abs() <= 1e-6, "{strategy}: {actual} vs {expected}");
        }
    }

    #[test]
    fn reduction_preserves_initial_value() {
        let contributions = vec![vec![1, 2], vec![3], vec![], vec![4]];
        let combiner = Combiner::new(CombineStrategy::ReductionMerge, Operator::<i64>::sum());

        assert_eq!(combiner.combine(1000, &contributions), 1010);
    }

    #[test]
    fn reduction_folds_initial_value_as_leftmost_operand() {
        // Subtraction is neither associative nor commutative, which exposes the fold order:
        // ((initial - p0) - p1) with each partial starting at the identity 0.
        let minus = Operator::new("minus", 0_i64, |a, b| a - b);
        let combiner = Combiner::new(CombineStrategy::ReductionMerge, minus);

        // p0 = (0 - 5) = -5, p1 = (0 - 7) = -7, result = (100 - -5) - -7 = 112.
        assert_eq!(combiner.combine(100, &[vec![5], vec![7]]), 112);
    }

    #[test]
    fn min_and_max_on_negative_narrow_values() {
        let contributions = vec![vec![-3_i32, 17, -40], vec![8, -2], vec![99]];

        for strategy in CombineStrategy::ALL {
            let min = Combiner::new(strategy, Operator::min());
            let max = Combiner::new(strategy, Operator::max());

            assert_eq!(min.combine(i32::MAX, &contributions), -40, "{strategy}");
            assert_eq!(max.combine(i32::MIN, &contributions), 99, "{strategy}");
        }
    }

    #[test]
    fn product_with_empty_contributions_is_initial() {
        for strategy in CombineStrategy::ALL {
            let combiner = Combiner::new(strategy, Operator::<u64>::product());

            assert_eq!(combiner.combine(7, &[]), 7, "{strategy}");
            assert_eq!(combiner.combine(7, &[vec![], vec![]]), 7, "{strategy}");
        }
    }

    #[test]
    fn custom_operator_applies_in_every_strategy() {
        let bit_or = Operator::new("bit_or", 0_u64, |a, b| a | b);
        let contributions = vec![vec![0b0001, 0b0100], vec![0b1000]];

        for strategy in CombineStrategy::ALL {
            let combiner = Combiner::new(strategy, bit_or);

            assert_eq!(combiner.combine(0b0010, &contributions), 0b1111, "{strategy}");
        }
    }

    #[test]
    fn words_round_trip_for_floats() {
        for value in [0.0_f64, -0.0, 1.5, -1e300, f64::INFINITY] {
            assert_eq!(f64::from_word(value.to_word()).to_bits(), value.to_bits());
        }

        for value in [0.0_f32, -2.25, f32::MAX] {
            assert_eq!(f32::from_word(value.to_word()).to_bits(), value.to_bits());
        }
    }

    /// Index and value of the largest element, the earliest index on ties.
    fn argmax() -> Operator<(f64, usize)> {
        Operator::new("argmax", (f64::MIN, usize::MAX), |a, b| {
            match b.0.total_cmp(&a.0) {
                cmp::Ordering::Greater => b,
                cmp::Ordering::Equal if b.1 < a.1 => b,
                _ => a,
            }
        })
    }

    #[test]
    fn compound_values_combine_without_atomics() {
        let values = [3.5, -1.0, 12.25, 7.0, 12.25, 0.5, 11.0];
        let indexed: Vec<(f64, usize)> = values.iter().copied().zip(0..).collect();
        let contributions = split_into(&indexed, 3);

        let sequential = indexed
            .iter()
            .fold(argmax().identity(), |a, b| argmax().apply(a, *b));
        assert_eq!(sequential, (12.25, 2));

        for strategy in [CombineStrategy::ReductionMerge, CombineStrategy::CriticalSection] {
            let combiner = Combiner::try_new(strategy, argmax()).unwrap();

            assert_eq!(combiner.strategy(), strategy);
            assert_eq!(
                combiner.combine(argmax().identity(), &contributions),
                sequential,
                "{strategy}"
            );
        }
    }

    #[test]
    fn compound_values_reject_atomic_strategy() {
        let error = Combiner::try_new(CombineStrategy::Atomic, argmax()).unwrap_err();

        assert!(matches!(error, Error::InvalidConfiguration { .. }));
        assert!(error.to_string().contains("argmax"), "{error}");
    }

    #[test]
    fn strategy_display_names() {
        let names: Vec<_> = CombineStrategy::ALL.iter().map(ToString::to_string).collect();

        assert_eq!(names, ["reduction", "atomic", "critical"]);
    }
}
