//! Shape bookkeeping for factory calls.

use std::fmt;

/// Dimension sizes handed to a native factory, kept as `i64` so no 64-bit extent is truncated.
///
/// An empty shape denotes a scalar tensor. Negative extents are representable on purpose: the
/// caller can send them and the native factory is the one that rejects them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<i64>,
}

impl Shape {
    pub fn new<D: Into<Vec<i64>>>(dims: D) -> Self {
        Shape { dims: dims.into() }
    }

    pub fn scalar() -> Self {
        Shape { dims: Vec::new() }
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the first negative extent, if any.
    pub fn first_negative(&self) -> Option<i64> {
        self.dims.iter().copied().find(|&d| d < 0)
    }

    /// Element count, or `None` when an extent is negative or the product overflows `usize`.
    pub fn num_elements(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| {
            let d = usize::try_from(d).ok()?;
            acc.checked_mul(d)
        })
    }

    /// Extents as `usize`, or `None` when one is negative.
    pub fn to_usize(&self) -> Option<Vec<usize>> {
        self.dims.iter().map(|&d| usize::try_from(d).ok()).collect()
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.iter().map(|&d| d as i64).collect::<Vec<_>>())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_shape_has_one_element() {
        assert_eq!(Shape::scalar().num_elements(), Some(1));
        assert_eq!(Shape::new([2, 0, 3]).num_elements(), Some(0));
    }

    #[test]
    fn negative_and_overflowing_extents_have_no_element_count() {
        assert_eq!(Shape::new([2, -1]).num_elements(), None);
        assert_eq!(Shape::new([2, -1]).first_negative(), Some(-1));
        assert_eq!(Shape::new([i64::MAX, i64::MAX]).num_elements(), None);
    }
}
