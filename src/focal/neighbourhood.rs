// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The 3x3 neighbourhood of partitions around a partition, and the window of cells it provides.
//!
//! Neighbours are found by index arithmetic on the partition grid. A neighbour position outside
//! of the grid resolves to a halo partition: a corner halo when it is outside along both
//! dimensions, otherwise the side halo of the row or column it shares with the grid. This also
//! covers grids of a single row or column of partitions, where one halo partition fills
//! several neighbour slots.
use super::halo::Halo;
use crate::{
    Error, Result,
    array::Array,
    partition::{Element, Partition},
    partitioned_array::PartitionedArray,
    shape::{Indices, Offset, Shape},
};
use futures::future::BoxFuture;
use std::ops::Range;

/// Where the neighbour of a partition in some direction comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Partition(Indices<2>),
    Corner { north: bool, west: bool },
    North(usize),
    South(usize),
    West(usize),
    East(usize),
}

impl Slot {
    /// Resolves the neighbour at `offset` from the partition at `indices` in a grid of `grid`
    /// partitions.
    pub fn resolve(grid: &Shape<2>, indices: &Indices<2>, offset: &Offset<2>) -> Slot {
        let row = indices[0] as isize + isize::from(offset[0]);
        let col = indices[1] as isize + isize::from(offset[1]);
        let row_inside = (0..grid[0] as isize).contains(&row);
        let col_inside = (0..grid[1] as isize).contains(&col);
        match (row_inside, col_inside) {
            (true, true) => Slot::Partition([row as usize, col as usize]),
            (false, false) => Slot::Corner {
                north: row < 0,
                west: col < 0,
            },
            (false, true) if row < 0 => Slot::North(col as usize),
            (false, true) => Slot::South(col as usize),
            (true, false) if col < 0 => Slot::West(row as usize),
            (true, false) => Slot::East(row as usize),
        }
    }
}

/// The partitions surrounding one partition, halo partitions included.
pub struct Neighbourhood<'a, T> {
    /// Indexed by `[offset row + 1][offset col + 1]`.
    partitions: [[&'a Partition<T, 2>; 3]; 3],
}

impl<'a, T: Element> Neighbourhood<'a, T> {
    pub fn new(array: &'a PartitionedArray<T, 2>, halo: &'a Halo<T>, indices: &Indices<2>) -> Self {
        let grid = array.shape_in_partitions();
        let partitions = std::array::from_fn(|r| {
            std::array::from_fn(|c| {
                let offset = [r as i8 - 1, c as i8 - 1];
                match Slot::resolve(grid, indices, &offset) {
                    Slot::Partition(neighbour) => &array.partitions()[neighbour],
                    Slot::Corner { north, west } => halo.corner(north, west),
                    Slot::North(col) => halo.north(col),
                    Slot::South(col) => halo.south(col),
                    Slot::West(row) => halo.west(row),
                    Slot::East(row) => halo.east(row),
                }
            })
        });
        Self { partitions }
    }

    pub fn partition(&self, offset: &Offset<2>) -> &'a Partition<T, 2> {
        self.partitions[(offset[0] + 1) as usize][(offset[1] + 1) as usize]
    }

    /// Requests the cells of every neighbour that fall within `radius` of the centre partition,
    /// and all cells of the centre partition itself, in row-major neighbour order.
    ///
    /// Only slices cross node boundaries, never whole neighbours.
    pub fn slices(&self, radius: usize) -> Vec<BoxFuture<'static, Result<Array<T, 2>>>> {
        let mut result = Vec::with_capacity(9);
        for dr in -1..=1 {
            for dc in -1..=1 {
                let partition = self.partition(&[dr, dc]);
                let [height, width] = *partition.shape();
                result.push(partition.slice([
                    towards_centre(dr, height, radius),
                    towards_centre(dc, width, radius),
                ]));
            }
        }
        result
    }
}

/// Cells of a neighbour at `step` that lie within `radius` of the centre partition.
fn towards_centre(step: i8, extent: usize, radius: usize) -> Range<usize> {
    match step {
        -1 => extent - radius..extent,
        0 => 0..extent,
        _ => 0..radius,
    }
}

/// Cells around and within one partition, addressed relative to the partition's first cell.
///
/// Valid row indices range from `-radius` to `height + radius - 1`, and likewise for columns.
pub struct Window<T> {
    radius: usize,
    blocks: [[Array<T, 2>; 3]; 3],
}

impl<T> Window<T> {
    /// Assembles a window from the nine blocks returned by [`Neighbourhood::slices`].
    pub fn new(blocks: Vec<Array<T, 2>>, radius: usize) -> Result<Self> {
        let nr_blocks = blocks.len();
        let [north, centre_row, south]: [[Array<T, 2>; 3]; 3] = {
            let blocks: [Array<T, 2>; 9] = blocks.try_into().map_err(|_| Error::BatchSize {
                expected: 9,
                actual: nr_blocks,
            })?;
            let [nw, n, ne, w, c, e, sw, s, se] = blocks;
            [[nw, n, ne], [w, c, e], [sw, s, se]]
        };
        let window = Self {
            radius,
            blocks: [north, centre_row, south],
        };
        debug_assert!(window.is_consistent(), "window blocks do not line up");
        Ok(window)
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// The centre partition's cells.
    pub fn centre(&self) -> &Array<T, 2> {
        &self.blocks[1][1]
    }

    /// The cell at `(row, col)`, relative to the centre partition's first cell.
    pub fn value(&self, row: isize, col: isize) -> &T {
        let [height, width] = *self.centre().shape();
        let (block_row, local_row) = locate(row, height, self.radius);
        let (block_col, local_col) = locate(col, width, self.radius);
        &self.blocks[block_row][block_col][[local_row, local_col]]
    }

    fn is_consistent(&self) -> bool {
        let [height, width] = *self.centre().shape();
        let extents = [self.radius, 0, self.radius];
        (0..3).all(|r| {
            (0..3).all(|c| {
                let expected = [
                    if r == 1 { height } else { extents[r] },
                    if c == 1 { width } else { extents[c] },
                ];
                self.blocks[r][c].shape() == &expected
            })
        })
    }
}

fn locate(idx: isize, extent: usize, radius: usize) -> (usize, usize) {
    if idx < 0 {
        (0, (idx + radius as isize) as usize)
    } else if (idx as usize) < extent {
        (1, idx as usize)
    } else {
        (2, idx as usize - extent)
    }
}
