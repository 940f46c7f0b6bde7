// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Dense, row-major, fixed-rank arrays.
//!
//! [`Array`] stores the elements of a single partition, and is also the grid type used by a
//! [`PartitionedArray`](crate::PartitionedArray) to hold its partition handles and the compute
//! node each of them lives on. Neighbouring cells are found through index arithmetic on the
//! shape (see [`shape::neighbour`](crate::shape::neighbour)).
use crate::shape::{self, Indices, Shape};
use std::{
    fmt,
    ops::{Index, IndexMut, Range},
};

/// A dense array of `RANK` dimensions, stored row-major.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize))]
pub struct Array<T, const RANK: usize> {
    #[cfg_attr(feature = "serde", serde(with = "shape_serde"))]
    shape: Shape<RANK>,
    elements: Vec<T>,
}

impl<T, const RANK: usize> Array<T, RANK> {
    /// Creates an array of `shape`, with every element set to `value`.
    pub fn filled(shape: Shape<RANK>, value: T) -> Self
    where
        T: Clone,
    {
        Self {
            shape,
            elements: vec![value; shape::nr_elements(&shape)],
        }
    }

    /// Creates an array of `shape` with default-initialized elements.
    pub fn new(shape: Shape<RANK>) -> Self
    where
        T: Clone + Default,
    {
        Self::filled(shape, T::default())
    }

    /// Wraps `elements`, which must be laid out row-major and hold exactly one element per cell.
    ///
    /// Returns `None` if the number of elements does not match the shape.
    pub fn from_vec(shape: Shape<RANK>, elements: Vec<T>) -> Option<Self> {
        (elements.len() == shape::nr_elements(&shape)).then_some(Self { shape, elements })
    }

    /// Creates an array of `shape` by calling `f` with the indices of each cell, in row-major
    /// order.
    pub fn from_fn(shape: Shape<RANK>, mut f: impl FnMut(Indices<RANK>) -> T) -> Self {
        let elements = (0..shape::nr_elements(&shape))
            .map(|idx| f(shape::linear_to_indices(&shape, idx)))
            .collect();
        Self { shape, elements }
    }

    pub fn shape(&self) -> &Shape<RANK> {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, indices: &Indices<RANK>) -> Option<&T> {
        shape::is_within(indices, &self.shape)
            .then(|| &self.elements[shape::linear_index(&self.shape, indices)])
    }

    pub fn get_mut(&mut self, indices: &Indices<RANK>) -> Option<&mut T> {
        if shape::is_within(indices, &self.shape) {
            let idx = shape::linear_index(&self.shape, indices);
            Some(&mut self.elements[idx])
        } else {
            None
        }
    }

    /// The elements, in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.elements
    }

    pub fn into_vec(self) -> Vec<T> {
        self.elements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.elements.iter()
    }

    /// Iterates over `(indices, element)` pairs in row-major order.
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Indices<RANK>, &T)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(idx, element)| (shape::linear_to_indices(&self.shape, idx), element))
    }

    /// Returns a new array with `f` applied to every element.
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Array<U, RANK> {
        Array {
            shape: self.shape,
            elements: self.elements.iter().map(f).collect(),
        }
    }

    /// Sets every element to `value`.
    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        self.elements.fill(value);
    }

    /// Copies the hyperslab selected by `ranges` (one half-open range per dimension) into a new
    /// array.
    ///
    /// # Panics
    ///
    /// If a range extends beyond the array's shape.
    pub fn slice(&self, ranges: &[Range<usize>; RANK]) -> Array<T, RANK>
    where
        T: Clone,
    {
        for (range, extent) in ranges.iter().zip(&self.shape) {
            assert!(
                range.start <= range.end && range.end <= *extent,
                "slice {ranges:?} out of bounds for shape {:?}",
                self.shape
            );
        }
        let shape: Shape<RANK> = std::array::from_fn(|d| ranges[d].len());
        Array::from_fn(shape, |indices| {
            let source: Indices<RANK> = std::array::from_fn(|d| ranges[d].start + indices[d]);
            self[source].clone()
        })
    }

    /// Writes all elements of `source` into the hyperslab starting at `start`.
    ///
    /// # Panics
    ///
    /// If `source` does not fit at `start`.
    pub fn copy_from(&mut self, start: &Indices<RANK>, source: &Array<T, RANK>)
    where
        T: Clone,
    {
        for (indices, element) in source.indexed_iter() {
            let target: Indices<RANK> = std::array::from_fn(|d| start[d] + indices[d]);
            self[target] = element.clone();
        }
    }
}

impl<T> Array<T, 2> {
    /// Iterates over the rows of a two-dimensional array.
    pub fn rows(&self) -> std::slice::Chunks<'_, T> {
        self.elements.chunks(self.shape[1].max(1))
    }
}

impl<T, const RANK: usize> Index<Indices<RANK>> for Array<T, RANK> {
    type Output = T;

    fn index(&self, indices: Indices<RANK>) -> &Self::Output {
        assert!(
            shape::is_within(&indices, &self.shape),
            "indices {indices:?} outside of shape {:?}",
            self.shape
        );
        &self.elements[shape::linear_index(&self.shape, &indices)]
    }
}

impl<T, const RANK: usize> IndexMut<Indices<RANK>> for Array<T, RANK> {
    fn index_mut(&mut self, indices: Indices<RANK>) -> &mut Self::Output {
        assert!(
            shape::is_within(&indices, &self.shape),
            "indices {indices:?} outside of shape {:?}",
            self.shape
        );
        let idx = shape::linear_index(&self.shape, &indices);
        &mut self.elements[idx]
    }
}

impl<'a, T, const RANK: usize> IntoIterator for &'a Array<T, RANK> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// Renders two-dimensional arrays as a grid, one row per line.
impl<T: fmt::Debug, const RANK: usize> fmt::Debug for Array<T, RANK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if RANK == 2 && !self.elements.is_empty() {
            writeln!(f, "Array {:?} [", self.shape)?;
            for row in self.elements.chunks(self.shape[RANK - 1]) {
                write!(f, "   ")?;
                for element in row {
                    write!(f, " {element:?}")?;
                }
                writeln!(f)?;
            }
            write!(f, "]")
        } else {
            f.debug_struct("Array")
                .field("shape", &self.shape)
                .field("elements", &self.elements)
                .finish()
        }
    }
}

/// Wire form of [`Array`], checked against the shape before it becomes one.
#[cfg(feature = "serde")]
#[derive(::serde::Deserialize)]
struct RawArray<T, const RANK: usize> {
    #[serde(with = "shape_serde")]
    shape: Shape<RANK>,
    elements: Vec<T>,
}

#[cfg(feature = "serde")]
impl<'de, T, const RANK: usize> ::serde::Deserialize<'de> for Array<T, RANK>
where
    T: ::serde::Deserialize<'de>,
{
    fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use ::serde::de::Error;

        let RawArray { shape, elements } = RawArray::deserialize(deserializer)?;
        let len = elements.len();
        Array::from_vec(shape, elements).ok_or_else(|| {
            let expected = format!("{} elements for shape {shape:?}", shape::nr_elements(&shape));
            D::Error::invalid_length(len, &expected.as_str())
        })
    }
}

// serde only implements (de)serialization for arrays up to a fixed length and not for
// const-generic ones, so shapes go over the wire as sequences.
#[cfg(feature = "serde")]
pub(crate) mod shape_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};

    pub(crate) fn serialize<S: Serializer, const RANK: usize>(
        shape: &[usize; RANK],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        shape.as_slice().serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>, const RANK: usize>(
        deserializer: D,
    ) -> Result<[usize; RANK], D::Error> {
        let extents = Vec::<usize>::deserialize(deserializer)?;
        let len = extents.len();
        extents
            .try_into()
            .map_err(|_| D::Error::custom(format!("expected {RANK} extents, got {len}")))
    }
}
