use std::fmt;
use std::ops::Range;

use crate::{Error, Result};

/// A half-open range of loop indices `[start, end)` that a parallel loop iterates over.
///
/// The space is immutable once constructed and always satisfies `start <= end`.
///
/// # Examples
///
/// ```
/// use par_loop::IterationSpace;
///
/// let space = IterationSpace::new(5, 12).unwrap();
/// assert_eq!(space.len(), 7);
/// assert_eq!(space.to_string(), "[5, 12)");
///
/// // A reversed range is rejected.
/// assert!(IterationSpace::new(3, 1).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IterationSpace {
    start: usize,
    end: usize,
}

impl IterationSpace {
    /// Creates the space `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `start > end`.
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start > end {
            return Err(Error::invalid(format!(
                "iteration space start {start} is after its end {end}"
            )));
        }

        Ok(Self { start, end })
    }

    /// Creates the space `[0, len)`.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self { start: 0, end: len }
    }

    /// Internal constructor for bounds that are already known to be ordered.
    pub(crate) fn between(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);

        Self { start, end }
    }

    /// The first index in the space.
    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last index in the space.
    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of indices in the space.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.wrapping_sub(self.start)
    }

    /// Whether the space contains no indices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The last index in iteration-space order, if any.
    #[must_use]
    pub fn last(&self) -> Option<usize> {
        self.end.checked_sub(1).filter(|_| !self.is_empty())
    }

    /// Whether `index` falls inside the space.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }

    /// The indices of the space as a standard range.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl TryFrom<Range<usize>> for IterationSpace {
    type Error = Error;

    fn try_from(range: Range<usize>) -> Result<Self> {
        Self::new(range.start, range.end)
    }
}

impl fmt::Display for IterationSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Two perfectly nested loops `for i in 0..outer { for j in 0..inner { .. } }` flattened into
/// a single iteration space, so that work can be spread over more threads than the outer loop
/// alone has iterations.
///
/// Flat indices are assigned in row-major order: `(0, 0), (0, 1), .., (1, 0), ..`.
///
/// # Examples
///
/// ```
/// use par_loop::CollapsedSpace;
///
/// let grid = CollapsedSpace::new(4, 1000).unwrap();
/// assert_eq!(grid.flatten().len(), 4000);
/// assert_eq!(grid.split(1001), (1, 1));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CollapsedSpace {
    outer: usize,
    inner: usize,
}

impl CollapsedSpace {
    /// Creates a collapsed space for an `outer` by `inner` loop nest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the total number of iterations does not fit
    /// in `usize`.
    pub fn new(outer: usize, inner: usize) -> Result<Self> {
        if outer.checked_mul(inner).is_none() {
            return Err(Error::invalid(format!(
                "collapsed loop nest {outer} x {inner} has more iterations than can be indexed"
            )));
        }

        Ok(Self { outer, inner })
    }

    /// Extent of the outer loop.
    #[must_use]
    pub fn outer(&self) -> usize {
        self.outer
    }

    /// Extent of the inner loop.
    #[must_use]
    pub fn inner(&self) -> usize {
        self.inner
    }

    /// The flat iteration space covering every `(i, j)` pair exactly once.
    #[must_use]
    pub fn flatten(&self) -> IterationSpace {
        // Checked in the constructor.
        IterationSpace::with_len(self.outer.wrapping_mul(self.inner))
    }

    /// Maps a flat index back to its `(outer, inner)` coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the flattened space.
    #[must_use]
    pub fn split(&self, index: usize) -> (usize, usize) {
        assert!(
            self.flatten().contains(index),
            "flat index {index} is outside the collapsed space {}",
            self.flatten()
        );

        // The assertion above guarantees inner > 0.
        (
            index.checked_div(self.inner).unwrap_or_default(),
            index.checked_rem(self.inner).unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reversed_bounds() {
        let error = IterationSpace::new(10, 2).unwrap_err();

        assert!(matches!(error, Error::InvalidConfiguration { .. }));
    }

    #[test]
    fn empty_space_has_no_last_index() {
        let space = IterationSpace::new(5, 5).unwrap();

        assert!(space.is_empty());
        assert_eq!(space.len(), 0);
        assert_eq!(space.last(), None);
    }

    #[test]
    fn last_index_is_end_minus_one() {
        let space = IterationSpace::new(3, 9).unwrap();

        assert_eq!(space.last(), Some(8));
        assert!(space.contains(3));
        assert!(!space.contains(9));
    }

    #[test]
    fn try_from_range() {
        let space = IterationSpace::try_from(2..6).unwrap();

        assert_eq!(space.range(), 2..6);
        assert_eq!(space.to_string(), "[2, 6)");
    }

    #[test]
    fn collapsed_space_maps_row_major() {
        let grid = CollapsedSpace::new(4, 1000).unwrap();

        assert_eq!(grid.flatten(), IterationSpace::with_len(4000));
        assert_eq!(grid.split(0), (0, 0));
        assert_eq!(grid.split(999), (0, 999));
        assert_eq!(grid.split(1000), (1, 0));
        assert_eq!(grid.split(3999), (3, 999));
    }

    #[test]
    fn collapsed_space_rejects_overflow() {
        assert!(CollapsedSpace::new(usize::MAX, 2).is_err());
    }

    #[test]
    #[should_panic]
    fn collapsed_space_split_out_of_range_panics() {
        let grid = CollapsedSpace::new(2, 3).unwrap();

        _ = grid.split(6);
    }
}
