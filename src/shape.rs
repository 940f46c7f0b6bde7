// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Fixed-rank shapes, cell indices and neighbour offsets.
//!
//! All three are plain arrays whose length is the rank of the array they describe, so a
//! mismatch between the rank of an array shape and the rank of a partition shape is a type
//! error rather than a runtime condition.
//!
//! - [`Shape`]: extent per dimension. A non-empty array has all extents larger than zero.
//! - [`Indices`]: position of a cell (or a partition in the partition grid), one component per
//!   dimension, each in `[0, extent)`.
//! - [`Offset`]: small relative step per dimension, conventionally in `{-1, 0, 1}`, used to name
//!   the direction towards a neighbouring cell or partition.
//!
//! Layouts are always row-major: the last dimension varies fastest.

/// Extent of an array (or partition, or partition grid) along each dimension.
pub type Shape<const RANK: usize> = [usize; RANK];

/// Position of a cell along each dimension.
pub type Indices<const RANK: usize> = [usize; RANK];

/// Relative step along each dimension, conventionally in `{-1, 0, 1}`.
pub type Offset<const RANK: usize> = [i8; RANK];

/// Number of cells in `shape`.
pub fn nr_elements<const RANK: usize>(shape: &Shape<RANK>) -> usize {
    shape.iter().product()
}

/// Returns whether `shape` contains no cells.
pub fn is_empty<const RANK: usize>(shape: &Shape<RANK>) -> bool {
    shape.iter().any(|&extent| extent == 0)
}

/// Row-major strides: the number of cells skipped by one step along each dimension.
pub fn strides<const RANK: usize>(shape: &Shape<RANK>) -> [usize; RANK] {
    let mut strides = [1; RANK];
    for d in (0..RANK.saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Converts multi-dimensional `indices` into a row-major linear index.
pub fn linear_index<const RANK: usize>(shape: &Shape<RANK>, indices: &Indices<RANK>) -> usize {
    debug_assert!(
        is_within(indices, shape),
        "indices {indices:?} outside of shape {shape:?}"
    );
    strides(shape)
        .iter()
        .zip(indices)
        .map(|(stride, idx)| stride * idx)
        .sum()
}

/// Converts a row-major linear index into the multi-dimensional indices of the same cell.
pub fn linear_to_indices<const RANK: usize>(shape: &Shape<RANK>, mut idx: usize) -> Indices<RANK> {
    debug_assert!(
        idx < nr_elements(shape),
        "linear index {idx} outside of shape {shape:?}"
    );
    let mut indices = [0; RANK];
    for (d, stride) in strides(shape).into_iter().enumerate() {
        // integer division floors
        indices[d] = idx / stride;
        idx -= indices[d] * stride;
    }
    indices
}

/// Returns whether `indices` address a cell inside `shape`.
pub fn is_within<const RANK: usize>(indices: &Indices<RANK>, shape: &Shape<RANK>) -> bool {
    indices.iter().zip(shape).all(|(idx, extent)| idx < extent)
}

/// Returns whether the cell at `indices` lies on the outer ring of cells of `shape`.
pub fn on_border<const RANK: usize>(indices: &Indices<RANK>, shape: &Shape<RANK>) -> bool {
    indices
        .iter()
        .zip(shape)
        .any(|(&idx, &extent)| idx == 0 || idx + 1 == extent)
}

/// Returns whether every component of `offset` lies in `{-1, 0, 1}`.
pub fn is_unit_offset<const RANK: usize>(offset: &Offset<RANK>) -> bool {
    offset.iter().all(|step| (-1..=1).contains(step))
}

/// Steps from `indices` by `offset` within `shape`.
///
/// Returns `None` when the step leaves `shape`. This is how neighbours are addressed in the
/// partition grid: by index arithmetic, never through references between partitions.
pub fn neighbour<const RANK: usize>(
    indices: &Indices<RANK>,
    offset: &Offset<RANK>,
    shape: &Shape<RANK>,
) -> Option<Indices<RANK>> {
    let mut result = [0; RANK];
    for d in 0..RANK {
        let idx = indices[d].checked_add_signed(isize::from(offset[d]))?;
        if idx >= shape[d] {
            return None;
        }
        result[d] = idx;
    }
    Some(result)
}
