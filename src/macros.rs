// (c) Copyright 2025 Helsing GmbH. All rights reserved.
/// Convenience macro for creating dense arrays from literals.
///
/// Rows are written as nested brackets; all rows must have the same length, which the compiler
/// checks. Mostly useful for tests.
///
/// ```rust
/// # use tessera::array;
/// let grid = array![
///     [1, 2, 3],
///     [4, 5, 6],
/// ];
/// assert_eq!(grid.shape(), &[2, 3]);
/// assert_eq!(grid[[1, 0]], 4);
///
/// let line = array![7, 8, 9];
/// assert_eq!(line.shape(), &[3]);
/// ```
#[macro_export]
macro_rules! array {
    ($([$($x:expr),* $(,)?]),+ $(,)?) => {{
        let rows = [$([$($x),*]),+];
        let shape = [rows.len(), rows[0].len()];
        $crate::Array::from_vec(shape, rows.into_iter().flatten().collect())
            .expect("rows of a fixed-size array have equal lengths")
    }};
    ($($x:expr),* $(,)?) => {{
        let elements = ::std::vec![$($x),*];
        $crate::Array::from_vec([elements.len()], elements)
            .expect("a vector fills a one-dimensional array of its length")
    }};
}

/// Implements [`Generation`](crate::Generation) for unsigned integers.
#[doc(hidden)]
#[macro_export]
macro_rules! impl_generation {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::Generation for $t {
                const ZERO: Self = 0;

                fn next(self) -> Self {
                    self + 1
                }

                fn previous(self) -> Option<Self> {
                    self.checked_sub(1)
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use crate::Generation;

    #[test]
    fn array_literal() {
        let grid = array![[1, 2], [3, 4], [5, 6]];
        assert_eq!(grid.shape(), &[3, 2]);
        assert_eq!(grid.as_slice(), &[1, 2, 3, 4, 5, 6]);

        let line = array![1.5, 2.5];
        assert_eq!(line.shape(), &[2]);
    }

    #[test]
    fn generations() {
        assert_eq!(u32::ZERO.next(), 1);
        assert_eq!(7_usize.previous(), Some(6));
        assert_eq!(u64::ZERO.previous(), None);
    }
}
