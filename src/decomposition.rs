// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Domain decomposition: dividing an array into partitions and partitions over compute nodes.
//!
//! An array of shape `array_shape` tiled with partitions of shape `partition_shape` yields a
//! grid of partitions whose shape is the per-dimension ceiling division of the two (the *shape
//! in partitions*). Every partition has the nominal partition shape, except the last one along
//! each dimension, which is clipped so that it does not extend past the array. Summing the
//! partition extents along a dimension therefore reproduces the array extent exactly.
//!
//! ```text
//!  array 5x7, partition 2x3 -> shape in partitions 3x3
//!
//!  +-----+-----+---+
//!  | 2x3 | 2x3 |2x1|
//!  +-----+-----+---+
//!  | 2x3 | 2x3 |2x1|
//!  +-----+-----+---+
//!  | 1x3 | 1x3 |1x1|
//!  +-----+-----+---+
//! ```
//!
//! Which compute node hosts a partition is decided by [`map_to_range`], applied to the position
//! of the partition along a traversal [curve](crate::curve).
use crate::{
    Error, Result,
    array::Array,
    shape::{self, Indices, Shape},
};

/// Number of cells a default partition holds along each dimension of a 2-D array.
pub const DEFAULT_PARTITION_EXTENT_2D: usize = 1000;

/// Start and (clipped) shape of one partition within its array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionDefinition<const RANK: usize> {
    pub start: Indices<RANK>,
    pub shape: Shape<RANK>,
}

/// Checks that `array_shape` and `partition_shape` describe a valid tiling.
pub fn validate<const RANK: usize>(
    array_shape: &Shape<RANK>,
    partition_shape: &Shape<RANK>,
) -> Result<()> {
    if shape::is_empty(array_shape) {
        return Err(Error::EmptyShape {
            what: "array",
            shape: array_shape.to_vec(),
        });
    }
    if shape::is_empty(partition_shape) {
        return Err(Error::EmptyShape {
            what: "partition",
            shape: partition_shape.to_vec(),
        });
    }
    if partition_shape
        .iter()
        .zip(array_shape)
        .any(|(partition_extent, array_extent)| partition_extent > array_extent)
    {
        return Err(Error::PartitionLargerThanArray {
            array_shape: array_shape.to_vec(),
            partition_shape: partition_shape.to_vec(),
        });
    }
    Ok(())
}

/// Per-dimension ceiling division of the array shape by the partition shape.
pub fn shape_in_partitions<const RANK: usize>(
    array_shape: &Shape<RANK>,
    partition_shape: &Shape<RANK>,
) -> Shape<RANK> {
    std::array::from_fn(|d| array_shape[d].div_ceil(partition_shape[d]))
}

/// Number of partitions needed to tile `array_shape` with `partition_shape`.
pub fn nr_partitions<const RANK: usize>(
    array_shape: &Shape<RANK>,
    partition_shape: &Shape<RANK>,
) -> usize {
    shape::nr_elements(&shape_in_partitions(array_shape, partition_shape))
}

/// Returns a partition shape that tiles `array_shape` into at least `min_nr_partitions`
/// partitions.
///
/// Each dimension is first divided by the `RANK`-th root of `min_nr_partitions` (rounded up).
/// Rounding can leave the induced partition count below the request, and small extents can
/// round a partition extent down to zero, so extents are kept at least one and the largest
/// partition extent is halved until the request is met.
///
/// # Panics
///
/// If `array_shape` is empty or `min_nr_partitions` is not in `1..=nr_elements(array_shape)`.
pub fn max_partition_shape<const RANK: usize>(
    array_shape: &Shape<RANK>,
    min_nr_partitions: usize,
) -> Shape<RANK> {
    const { assert!(RANK > 0, "arrays have at least one dimension") };
    let volume = shape::nr_elements(array_shape);
    assert!(volume > 0, "array shape {array_shape:?} is empty");
    assert!(
        (1..=volume).contains(&min_nr_partitions),
        "cannot split {volume} cells into {min_nr_partitions} partitions"
    );

    let per_dimension = nr_partitions_per_dimension(min_nr_partitions, RANK);
    let mut partition_shape: Shape<RANK> =
        std::array::from_fn(|d| (array_shape[d] / per_dimension).max(1));

    while nr_partitions(array_shape, &partition_shape) < min_nr_partitions {
        // since volume >= min_nr_partitions, some extent is still larger than one
        let Some(largest) = (0..RANK)
            .filter(|&d| partition_shape[d] > 1)
            .max_by_key(|&d| partition_shape[d])
        else {
            break;
        };
        partition_shape[largest] = partition_shape[largest].div_ceil(2);
    }

    debug_assert!(shape::nr_elements(&partition_shape) > 0);
    debug_assert!(nr_partitions(array_shape, &partition_shape) >= min_nr_partitions);
    partition_shape
}

/// Smallest `n` such that `n^rank >= nr_partitions`.
fn nr_partitions_per_dimension(nr_partitions: usize, rank: usize) -> usize {
    let exponent = u32::try_from(rank).unwrap_or(u32::MAX);
    let mut n = (nr_partitions as f64).powf(1.0 / rank as f64).floor() as usize;
    n = n.max(1);
    // floating point roots are off by one now and then in either direction
    while n > 1 && (n - 1).checked_pow(exponent).is_some_and(|p| p >= nr_partitions) {
        n -= 1;
    }
    while n.checked_pow(exponent).is_some_and(|p| p < nr_partitions) {
        n += 1;
    }
    n
}

/// A partition shape for callers that did not pick one.
///
/// Partitions hold about a million cells, split evenly over the dimensions, and are clipped to
/// the array shape.
pub fn default_partition_shape<const RANK: usize>(array_shape: &Shape<RANK>) -> Shape<RANK> {
    let nominal = match RANK {
        2 => DEFAULT_PARTITION_EXTENT_2D,
        rank => {
            let cells = DEFAULT_PARTITION_EXTENT_2D * DEFAULT_PARTITION_EXTENT_2D;
            ((cells as f64).powf(1.0 / rank as f64).round() as usize).max(1)
        }
    };
    std::array::from_fn(|d| array_shape[d].min(nominal))
}

/// Start and clipped shape of the partition at `linear_idx` (row-major) in the partition grid.
pub fn partition<const RANK: usize>(
    area_shape: &Shape<RANK>,
    partition_shape: &Shape<RANK>,
    shape_in_partitions: &Shape<RANK>,
    linear_idx: usize,
) -> PartitionDefinition<RANK> {
    partition_at(
        area_shape,
        partition_shape,
        &shape::linear_to_indices(shape_in_partitions, linear_idx),
    )
}

/// Start and clipped shape of the partition at `indices` in the partition grid.
pub fn partition_at<const RANK: usize>(
    area_shape: &Shape<RANK>,
    partition_shape: &Shape<RANK>,
    indices: &Indices<RANK>,
) -> PartitionDefinition<RANK> {
    let start: Indices<RANK> = std::array::from_fn(|d| indices[d] * partition_shape[d]);
    let shape = std::array::from_fn(|d| {
        let end = (start[d] + partition_shape[d]).min(area_shape[d]);
        end - start[d]
    });
    PartitionDefinition { start, shape }
}

/// The clipped shape of every partition, laid out as the partition grid.
pub fn partition_shapes<const RANK: usize>(
    array_shape: &Shape<RANK>,
    partition_shape: &Shape<RANK>,
) -> Array<Shape<RANK>, RANK> {
    Array::from_fn(
        shape_in_partitions(array_shape, partition_shape),
        |indices| partition_at(array_shape, partition_shape, &indices).shape,
    )
}

/// Maps `value` from `[from_min, from_max]` onto `[to_min, to_max]`, linearly and rounding to the
/// nearest integer.
///
/// A degenerate source range maps everything onto `to_min`.
pub fn map_to_range(
    from_min: usize,
    from_max: usize,
    to_min: usize,
    to_max: usize,
    value: usize,
) -> usize {
    debug_assert!(from_min <= value && value <= from_max);
    debug_assert!(to_min <= to_max);
    let from_extent = from_max - from_min;
    if from_extent == 0 {
        return to_min;
    }
    let scaled = (value - from_min) * (to_max - to_min);
    to_min + (2 * scaled + from_extent) / (2 * from_extent)
}

/// The partitions a compute node owns when `nr_nodes` split the partitions of `area_shape`
/// evenly, each taking a contiguous run of row-major partition indices.
///
/// When the partitions do not divide evenly, the last nodes get one partition less than the
/// first ones. With fewer partitions than nodes, the first nodes get one partition each and the
/// rest get none.
pub fn partitions_for_node<const RANK: usize>(
    area_shape: &Shape<RANK>,
    partition_shape: &Shape<RANK>,
    nr_nodes: usize,
    node_idx: usize,
) -> Vec<PartitionDefinition<RANK>> {
    assert!(nr_nodes > 0, "at least one compute node is required");
    assert!(node_idx < nr_nodes, "node {node_idx} out of {nr_nodes}");

    let grid = shape_in_partitions(area_shape, partition_shape);
    let nr_partitions = shape::nr_elements(&grid);

    let range = if nr_partitions <= nr_nodes {
        if node_idx < nr_partitions {
            node_idx..node_idx + 1
        } else {
            0..0
        }
    } else {
        let max_per_node = nr_partitions.div_ceil(nr_nodes);
        let nr_nodes_with_less = nr_nodes * max_per_node - nr_partitions;
        let first_node_with_less = nr_nodes - nr_nodes_with_less;
        if node_idx < first_node_with_less {
            let begin = node_idx * max_per_node;
            begin..begin + max_per_node
        } else {
            let begin = first_node_with_less * max_per_node
                + (node_idx - first_node_with_less) * (max_per_node - 1);
            begin..begin + max_per_node - 1
        }
    };

    range
        .map(|idx| partition(area_shape, partition_shape, &grid, idx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_division() {
        assert_eq!(shape_in_partitions(&[5, 7], &[2, 3]), [3, 3]);
        assert_eq!(shape_in_partitions(&[6, 6], &[2, 3]), [3, 2]);
        assert_eq!(nr_partitions(&[60, 40], &[10, 10]), 24);
    }

    #[test]
    fn last_partition_is_clipped() {
        let def = partition(&[5, 7], &[2, 3], &[3, 3], 8);
        assert_eq!(def.start, [4, 6]);
        assert_eq!(def.shape, [1, 1]);

        let def = partition(&[5, 7], &[2, 3], &[3, 3], 1);
        assert_eq!(def.start, [0, 3]);
        assert_eq!(def.shape, [2, 3]);
    }

    #[test]
    fn validation() {
        assert!(validate(&[5, 7], &[2, 3]).is_ok());
        assert!(matches!(
            validate(&[5, 0], &[2, 3]),
            Err(Error::EmptyShape { what: "array", .. })
        ));
        assert!(matches!(
            validate(&[5, 7], &[0, 3]),
            Err(Error::EmptyShape {
                what: "partition",
                ..
            })
        ));
        assert!(matches!(
            validate(&[5, 7], &[6, 3]),
            Err(Error::PartitionLargerThanArray { .. })
        ));
    }

    #[test]
    fn max_partition_shape_examples() {
        assert_eq!(max_partition_shape(&[60, 40], 4), [30, 20]);
        assert_eq!(max_partition_shape(&[60, 40], 1), [60, 40]);
        // a root that does not divide the extents
        let shape = max_partition_shape(&[3, 1000], 9);
        assert!(nr_partitions(&[3, 1000], &shape) >= 9);
        // every single cell
        assert_eq!(max_partition_shape(&[3, 3], 9), [1, 1]);
    }

    #[test]
    fn per_dimension_root() {
        assert_eq!(nr_partitions_per_dimension(1, 2), 1);
        assert_eq!(nr_partitions_per_dimension(4, 2), 2);
        assert_eq!(nr_partitions_per_dimension(5, 2), 3);
        assert_eq!(nr_partitions_per_dimension(27, 3), 3);
        assert_eq!(nr_partitions_per_dimension(28, 3), 4);
    }

    #[test]
    fn default_shape_is_clipped() {
        assert_eq!(default_partition_shape(&[300, 5000]), [300, 1000]);
        assert_eq!(default_partition_shape(&[10]), [10]);
    }

    #[test]
    fn map_to_range_spreads_evenly() {
        let nodes: Vec<_> = (0..10).map(|idx| map_to_range(0, 9, 0, 2, idx)).collect();
        assert_eq!(nodes, [0, 0, 0, 1, 1, 1, 1, 2, 2, 2]);
        assert_eq!(map_to_range(0, 0, 0, 3, 0), 0);
        assert_eq!(map_to_range(0, 4, 0, 4, 3), 3);
    }

    #[test]
    fn partitions_for_node_split() {
        let area = [4, 5];
        let partition_shape = [1, 5];
        let counts: Vec<_> = (0..3)
            .map(|node| partitions_for_node(&area, &partition_shape, 3, node).len())
            .collect();
        assert_eq!(counts, [2, 1, 1]);
        let last = partitions_for_node(&area, &partition_shape, 3, 2);
        assert_eq!(last[0].start, [3, 0]);

        let few = partitions_for_node(&[2, 2], &[2, 2], 3, 2);
        assert!(few.is_empty());
    }

    #[quickcheck]
    fn qc_clipped_shapes_sum_to_array(extents: (u8, u8), partition: (u8, u8)) -> bool {
        let array_shape = [usize::from(extents.0) + 1, usize::from(extents.1) + 1];
        let partition_shape = [
            usize::from(partition.0) % array_shape[0] + 1,
            usize::from(partition.1) % array_shape[1] + 1,
        ];
        let shapes = partition_shapes(&array_shape, &partition_shape);
        let grid = *shapes.shape();
        let rows: usize = (0..grid[0]).map(|r| shapes[[r, 0]][0]).sum();
        let cols: usize = (0..grid[1]).map(|c| shapes[[0, c]][1]).sum();
        rows == array_shape[0]
            && cols == array_shape[1]
            && shapes
                .iter()
                .all(|s| s[0] <= partition_shape[0] && s[1] <= partition_shape[1] && s[0] > 0)
    }

    #[quickcheck]
    fn qc_max_partition_shape_meets_minimum(extents: (u8, u8, u8), k: usize) -> bool {
        let array_shape = [
            usize::from(extents.0 % 40) + 1,
            usize::from(extents.1 % 40) + 1,
            usize::from(extents.2 % 40) + 1,
        ];
        let k = k % shape::nr_elements(&array_shape) + 1;
        let partition_shape = max_partition_shape(&array_shape, k);
        shape::nr_elements(&partition_shape) > 0
            && partition_shape
                .iter()
                .zip(&array_shape)
                .all(|(p, a)| p <= a)
            && nr_partitions(&array_shape, &partition_shape) >= k
    }
}
