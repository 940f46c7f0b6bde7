// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Halo partitions: stand-ins for the neighbours that border partitions do not have.
//!
//! A focal operation needs `radius` cells beyond each side of every partition. For partitions
//! on the border of the array some of those cells lie outside of it. Their values come from a
//! ring of small partitions around the array, filled with the values of the [`HaloPolicy`]:
//!
//! ```text
//!   NW |  N   N   N  | NE       corners: radius x radius
//!   ---+-------------+---      N / S:   radius x (width of the partition column)
//!   W  | p00 p01 p02 | E       W / E:   (height of the partition row) x radius
//!   W  | p10 p11 p12 | E
//!   ---+-------------+---
//!   SW |  S   S   S  | SE
//! ```
//!
//! Each halo partition is colocated with the real partition it borders (for corners, the
//! partition in the corresponding corner of the grid), so reading it never leaves that
//! partition's node.
use super::policy::HaloPolicy;
use crate::{
    partition::{Element, Partition},
    partitioned_array::PartitionedArray,
    shape::Offset,
};
use tracing::trace;

/// The ring of halo partitions around a two-dimensional partitioned array.
#[derive(Debug, Clone)]
pub struct Halo<T> {
    /// Indexed by `[north, south][west, east]`.
    corners: [[Partition<T, 2>; 2]; 2],
    /// One per partition column.
    north: Vec<Partition<T, 2>>,
    south: Vec<Partition<T, 2>>,
    /// One per partition row.
    west: Vec<Partition<T, 2>>,
    east: Vec<Partition<T, 2>>,
}

impl<T: Element> Halo<T> {
    /// Creates the halo partitions around `array` for a kernel of `radius`.
    pub fn new(array: &PartitionedArray<T, 2>, radius: usize, policy: &HaloPolicy<T>) -> Self {
        let cluster = array.cluster();
        let partitions = array.partitions();
        let [nr_rows, nr_cols] = *array.shape_in_partitions();
        let (last_row, last_col) = (nr_rows - 1, nr_cols - 1);

        let halo = |indices: [usize; 2], shape: [usize; 2], direction: Offset<2>| {
            let neighbour = &partitions[indices];
            Partition::filled(
                cluster,
                neighbour.node(),
                *neighbour.start(),
                shape,
                policy.fill_value(direction).clone(),
            )
        };
        let corner = [radius, radius];

        let corners = [
            [
                halo([0, 0], corner, [-1, -1]),
                halo([0, last_col], corner, [-1, 1]),
            ],
            [
                halo([last_row, 0], corner, [1, -1]),
                halo([last_row, last_col], corner, [1, 1]),
            ],
        ];
        let width = |col: usize| partitions[[0, col]].shape()[1];
        let height = |row: usize| partitions[[row, 0]].shape()[0];
        let north = (0..nr_cols)
            .map(|col| halo([0, col], [radius, width(col)], [-1, 0]))
            .collect();
        let south = (0..nr_cols)
            .map(|col| halo([last_row, col], [radius, width(col)], [1, 0]))
            .collect();
        let west = (0..nr_rows)
            .map(|row| halo([row, 0], [height(row), radius], [0, -1]))
            .collect();
        let east = (0..nr_rows)
            .map(|row| halo([row, last_col], [height(row), radius], [0, 1]))
            .collect();

        trace!(
            nr_rows,
            nr_cols,
            radius,
            nr_halo_partitions = 4 + 2 * (nr_rows + nr_cols),
            "created halo partitions"
        );

        Self {
            corners,
            north,
            south,
            west,
            east,
        }
    }
}

impl<T> Halo<T> {
    /// The corner halo partition diagonally outside of the array in direction `(north, west)`.
    pub fn corner(&self, north: bool, west: bool) -> &Partition<T, 2> {
        &self.corners[usize::from(!north)][usize::from(!west)]
    }

    /// The side halo partition north of partition column `col`.
    pub fn north(&self, col: usize) -> &Partition<T, 2> {
        &self.north[col]
    }

    pub fn south(&self, col: usize) -> &Partition<T, 2> {
        &self.south[col]
    }

    /// The side halo partition west of partition row `row`.
    pub fn west(&self, row: usize) -> &Partition<T, 2> {
        &self.west[row]
    }

    pub fn east(&self, row: usize) -> &Partition<T, 2> {
        &self.east[row]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cluster, EngineConfig, create_partitioned_array_filled};

    #[tokio::test(flavor = "multi_thread")]
    async fn halo_shapes_follow_the_partitions() {
        let cluster = Cluster::from_current(2, EngineConfig::for_testing()).unwrap();
        let array = create_partitioned_array_filled(&cluster, [7, 5], [3, 3], 0_i8).unwrap();
        let policy = HaloPolicy::uniform(-1).with_corners(-2);
        let halo = Halo::new(&array, 2, &policy);

        assert_eq!(halo.corner(true, false).shape(), &[2, 2]);
        assert_eq!(halo.north(1).shape(), &[2, 2]);
        assert_eq!(halo.south(0).shape(), &[2, 3]);
        assert_eq!(halo.west(2).shape(), &[1, 2]);
        assert_eq!(halo.east(0).shape(), &[3, 2]);

        assert_eq!(halo.east(2).node(), array.localities()[[2, 1]]);
        assert_eq!(halo.corner(false, false).node(), array.localities()[[2, 1]]);

        assert!(halo.north(0).data().await.unwrap().iter().all(|&v| v == -1));
        assert!(
            halo.corner(false, true)
                .data()
                .await
                .unwrap()
                .iter()
                .all(|&v| v == -2)
        );
    }
}
