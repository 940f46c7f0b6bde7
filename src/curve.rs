// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Traversal orders over a partition grid.
//!
//! Partitions are handed out to compute nodes in the order in which a curve visits the partition
//! grid: consecutive positions along the curve are mapped onto the same node (see
//! [`map_to_range`](crate::decomposition::map_to_range)). A curve that keeps consecutive
//! positions spatially close therefore keeps neighbouring partitions on the same node, which is
//! what the focal engine wants when it gathers the 8 neighbours of a partition.
//!
//! The [`Curve::Hilbert`] traversal is a generalized Hilbert ("gilbert") curve, which handles
//! grids of arbitrary rectangular shape. It only exists for two-dimensional grids; other ranks
//! are traversed linearly.
//!
//! The Hilbert implementation follows the gilbert algorithm by Jakub Červený
//! (<https://github.com/jakubcerveny/gilbert>, BSD-2-Clause).
use crate::shape::{self, Indices, Shape};

/// The order in which the partition grid is traversed during instantiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Curve {
    /// Generalized Hilbert curve for two-dimensional grids, linear otherwise.
    #[default]
    Hilbert,
    /// Row-major order.
    Linear,
}

impl Curve {
    /// Calls `visitor` with the position along the curve and the indices of every cell of
    /// `shape`, in curve order.
    pub fn visit<const RANK: usize>(
        self,
        shape: &Shape<RANK>,
        mut visitor: impl FnMut(usize, Indices<RANK>),
    ) {
        if shape::is_empty(shape) {
            return;
        }
        match self {
            Curve::Hilbert if RANK == 2 => {
                let mut idx = 0;
                hilbert_2d(shape[0], shape[1], &mut |row, col| {
                    visitor(idx, std::array::from_fn(|d| [row, col][d]));
                    idx += 1;
                });
            }
            Curve::Hilbert | Curve::Linear => {
                for idx in 0..shape::nr_elements(shape) {
                    visitor(idx, shape::linear_to_indices(shape, idx));
                }
            }
        }
    }

    /// The indices of every cell of `shape`, in curve order.
    pub fn order<const RANK: usize>(self, shape: &Shape<RANK>) -> Vec<Indices<RANK>> {
        let mut result = Vec::with_capacity(shape::nr_elements(shape));
        self.visit(shape, |_, indices| result.push(indices));
        result
    }
}

fn hilbert_2d(nr_rows: usize, nr_cols: usize, visitor: &mut impl FnMut(usize, usize)) {
    let (rows, cols) = (nr_rows as isize, nr_cols as isize);
    // the major axis runs along the longest extent
    if cols >= rows {
        gilbert(visitor, 0, 0, cols, 0, 0, rows);
    } else {
        gilbert(visitor, 0, 0, 0, rows, cols, 0);
    }
}

/// Visits the rectangle spanned by major axis `(ax, ay)` and minor axis `(bx, by)` from `(x, y)`,
/// reporting cells as `(row, col) = (y, x)`.
#[allow(clippy::too_many_arguments)]
fn gilbert(
    visitor: &mut impl FnMut(usize, usize),
    mut x: isize,
    mut y: isize,
    ax: isize,
    ay: isize,
    bx: isize,
    by: isize,
) {
    let w = (ax + ay).abs();
    let h = (bx + by).abs();

    let (dax, day) = (ax.signum(), ay.signum());
    let (dbx, dby) = (bx.signum(), by.signum());

    if h == 1 {
        for _ in 0..w {
            visitor(y as usize, x as usize);
            x += dax;
            y += day;
        }
        return;
    }

    if w == 1 {
        for _ in 0..h {
            visitor(y as usize, x as usize);
            x += dbx;
            y += dby;
        }
        return;
    }

    let (mut ax2, mut ay2) = (ax / 2, ay / 2);
    let (mut bx2, mut by2) = (bx / 2, by / 2);

    let w2 = (ax2 + ay2).abs();
    let h2 = (bx2 + by2).abs();

    if 2 * w > 3 * h {
        if w2 % 2 != 0 && w > 2 {
            // prefer even steps
            ax2 += dax;
            ay2 += day;
        }
        // long case: split in two parts only
        gilbert(visitor, x, y, ax2, ay2, bx, by);
        gilbert(visitor, x + ax2, y + ay2, ax - ax2, ay - ay2, bx, by);
    } else {
        if h2 % 2 != 0 && h > 2 {
            bx2 += dbx;
            by2 += dby;
        }
        // standard case: one step up, one long horizontal, one step down
        gilbert(visitor, x, y, bx2, by2, ax2, ay2);
        gilbert(visitor, x + bx2, y + by2, ax, ay, bx - bx2, by - by2);
        gilbert(
            visitor,
            x + (ax - dax) + (bx2 - dbx),
            y + (ay - day) + (by2 - dby),
            -bx2,
            -by2,
            -(ax - ax2),
            -(ay - ay2),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_adjacent(a: [usize; 2], b: [usize; 2]) -> bool {
        a[0].abs_diff(b[0]) + a[1].abs_diff(b[1]) == 1
    }

    #[test]
    fn hilbert_on_a_square() {
        let order = Curve::Hilbert.order(&[2, 2]);
        assert_eq!(order, vec![[0, 0], [1, 0], [1, 1], [0, 1]]);
    }

    #[test]
    fn linear_is_row_major() {
        let order = Curve::Linear.order(&[2, 3]);
        assert_eq!(order, vec![[0, 0], [0, 1], [0, 2], [1, 0], [1, 1], [1, 2]]);
    }

    #[test]
    fn hilbert_falls_back_to_linear_for_other_ranks() {
        assert_eq!(Curve::Hilbert.order(&[3]), vec![[0], [1], [2]]);
        assert_eq!(Curve::Hilbert.order(&[1, 1, 2]).len(), 2);
    }

    #[test]
    fn positions_are_consecutive() {
        let mut positions = Vec::new();
        Curve::Hilbert.visit(&[5, 3], |idx, _| positions.push(idx));
        assert_eq!(positions, (0..15).collect::<Vec<_>>());
    }

    #[quickcheck]
    fn qc_hilbert_visits_every_cell_once_along_adjacent_steps(rows: u8, cols: u8) -> bool {
        let shape = [usize::from(rows % 24) + 1, usize::from(cols % 24) + 1];
        let order = Curve::Hilbert.order(&shape);
        let unique: HashSet<_> = order.iter().copied().collect();
        let within = order.iter().all(|indices| shape::is_within(indices, &shape));
        // gilbert only takes diagonal steps on grids with odd extents that it cannot avoid
        let mostly_adjacent = order
            .windows(2)
            .filter(|pair| !is_adjacent(pair[0], pair[1]))
            .count()
            <= 1;
        order.len() == shape::nr_elements(&shape)
            && unique.len() == order.len()
            && within
            && mostly_adjacent
    }
}
