//! Reference workloads for the benchmark harness.
//!
//! Each workload has a sequential implementation that serves as the baseline and a parallel one
//! built on an [`Executor`]. Their per-index cost profiles differ on purpose: array and harmonic
//! sums are uniform, prime counting gets more expensive toward the end of the range and matrix
//! rows are few but heavy.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::{
    CollapsedSpace, CombineStrategy, Combiner, Executor, IterationSpace, Operator, Result, Timed,
    Workload,
};

/// Sums an array holding `1..=len`.
#[derive(Clone, Debug)]
pub struct ArraySum {
    values: Vec<i64>,
}

impl ArraySum {
    /// Creates the array `[1, 2, ..., len]`.
    #[must_use]
    pub fn new(len: u32) -> Self {
        Self {
            values: (1..=i64::from(len)).collect(),
        }
    }

    /// Number of elements summed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the array is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Workload for ArraySum {
    type Output = i64;

    fn name(&self) -> &str {
        "array sum"
    }

    fn run_sequential(&self) -> i64 {
        self.values.iter().sum()
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "the iteration space is exactly the index range of the array"
    )]
    fn run_parallel(&self, executor: &Executor, strategy: CombineStrategy) -> Result<Timed<i64>> {
        let combiner = Combiner::new(strategy, Operator::sum());

        executor.reduce(
            IterationSpace::with_len(self.values.len()),
            &combiner,
            0,
            |i| self.values[i],
        )
    }
}

/// Sums `1/i` for `i` in `1..=terms`, in floating point.
///
/// Strategies add the terms in different orders, so results agree with the baseline within
/// [`FLOAT_TOLERANCE`](crate::FLOAT_TOLERANCE) rather than exactly.
#[derive(Clone, Copy, Debug)]
pub struct HarmonicSum {
    terms: usize,
}

impl HarmonicSum {
    /// Creates a harmonic sum of `terms` terms.
    #[must_use]
    pub fn new(terms: usize) -> Self {
        Self { terms }
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "indices above 2^53 are not practical to sum"
    )]
    fn term(index: usize) -> f64 {
        1.0 / (index as f64 + 1.0)
    }
}

impl Workload for HarmonicSum {
    type Output = f64;

    fn name(&self) -> &str {
        "harmonic sum"
    }

    fn run_sequential(&self) -> f64 {
        (0..self.terms).map(Self::term).sum()
    }

    fn run_parallel(&self, executor: &Executor, strategy: CombineStrategy) -> Result<Timed<f64>> {
        let combiner = Combiner::new(strategy, Operator::sum());

        executor.reduce(IterationSpace::with_len(self.terms), &combiner, 0.0, Self::term)
    }
}

/// Counts the primes in `[2, limit]` by trial division.
///
/// Testing a number costs up to its square root in divisions, so later indices are more
/// expensive than earlier ones and static schedules with large chunks leave workers idle.
#[derive(Clone, Copy, Debug)]
pub struct PrimeCount {
    limit: usize,
}

impl PrimeCount {
    /// Creates a prime count over `[2, limit]`.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    fn space(&self) -> IterationSpace {
        let end = self.limit.saturating_add(1);

        IterationSpace::between(end.min(2), end)
    }
}

/// Whether `n` is prime, by trial division up to its square root.
#[must_use]
pub fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }

    (2_usize..)
        .take_while(|&d| n.checked_div(d).is_some_and(|quotient| d <= quotient))
        .all(|d| n.checked_rem(d) != Some(0))
}

impl Workload for PrimeCount {
    type Output = u64;

    fn name(&self) -> &str {
        "prime count"
    }

    fn run_sequential(&self) -> u64 {
        self.space().range().map(|n| u64::from(is_prime(n))).sum()
    }

    fn run_parallel(&self, executor: &Executor, strategy: CombineStrategy) -> Result<Timed<u64>> {
        let combiner = Combiner::new(strategy, Operator::sum());

        executor.reduce(self.space(), &combiner, 0, |n| u64::from(is_prime(n)))
    }
}

/// Seed of the pseudo-random matrix contents, fixed so that every run multiplies the same data.
pub const MATRIX_SEED: u64 = 42;

/// Multiplies two dense `size x size` matrices with pseudo-random entries in `[0, 10)`.
///
/// By default every loop index is one output row. A [`collapsed()`](Self::collapsed) multiply
/// flattens the row and column loops into one iteration space of `size * size` elements so
/// that small matrices still give every worker something to do.
///
/// The combine strategy is irrelevant: every output element is written by exactly one worker.
#[derive(Clone, Debug)]
pub struct MatrixMultiply {
    elements: CollapsedSpace,
    lhs: Vec<f64>,
    rhs: Vec<f64>,
    collapsed: bool,
}

impl MatrixMultiply {
    /// Creates the two input matrices from [`MATRIX_SEED`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfiguration`] if `size * size` does not fit in `usize`.
    pub fn new(size: usize) -> Result<Self> {
        let elements = CollapsedSpace::new(size, size)?;
        let mut rng = SmallRng::seed_from_u64(MATRIX_SEED);

        let mut random_matrix = || {
            elements
                .flatten()
                .range()
                .map(|_| f64::from(rng.random_range(0..100_u32)) / 10.0)
                .collect::<Vec<_>>()
        };

        let lhs = random_matrix();
        let rhs = random_matrix();

        Ok(Self {
            elements,
            lhs,
            rhs,
            collapsed: false,
        })
    }

    /// Parallelizes over individual output elements instead of rows.
    #[must_use]
    pub fn collapsed(mut self) -> Self {
        self.collapsed = true;
        self
    }

    /// Number of rows and columns.
    #[must_use]
    pub fn size(&self) -> usize {
        self.elements.outer()
    }

    fn lhs_row(&self, row: usize) -> Option<&[f64]> {
        self.lhs.chunks_exact(self.size()).nth(row)
    }

    /// One output row, accumulated in i-k-j order.
    fn multiply_row(&self, row: usize) -> Vec<f64> {
        let mut output = vec![0.0; self.size()];

        let Some(lhs_row) = self.lhs_row(row) else {
            return output;
        };

        for (&lhs_value, rhs_row) in lhs_row.iter().zip(self.rhs.chunks_exact(self.size())) {
            for (out, &rhs_value) in output.iter_mut().zip(rhs_row) {
                *out += lhs_value * rhs_value;
            }
        }

        output
    }

    /// One output element, the dot product of a row and a column.
    fn multiply_element(&self, index: usize) -> f64 {
        let (row, column) = self.elements.split(index);

        let Some(lhs_row) = self.lhs_row(row) else {
            return 0.0;
        };

        let rhs_column = self.rhs.iter().skip(column).step_by(self.size());

        let mut sum = 0.0;
        for (lhs_value, rhs_value) in lhs_row.iter().zip(rhs_column) {
            sum += lhs_value * rhs_value;
        }

        sum
    }
}

impl Workload for MatrixMultiply {
    type Output = Vec<f64>;

    fn name(&self) -> &str {
        if self.collapsed {
            "matrix multiply (collapsed)"
        } else {
            "matrix multiply"
        }
    }

    fn run_sequential(&self) -> Vec<f64> {
        (0..self.size()).flat_map(|row| self.multiply_row(row)).collect()
    }

    fn run_parallel(
        &self,
        executor: &Executor,
        _strategy: CombineStrategy,
    ) -> Result<Timed<Vec<f64>>> {
        if self.collapsed {
            return executor.map(self.elements.flatten(), |index| self.multiply_element(index));
        }

        let rows = executor.map(IterationSpace::with_len(self.size()), |row| {
            self.multiply_row(row)
        })?;

        Ok(rows.map(|rows| rows.into_iter().flatten().collect()))
    }
}
