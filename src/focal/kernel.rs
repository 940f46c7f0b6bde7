// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Square neighbourhood kernels.
use crate::{Error, Result, array::Array};

/// A kernel weight. Cells whose weight does not [participate](Weight::participates) are skipped.
pub trait Weight: Clone + Send + Sync + 'static {
    fn participates(&self) -> bool;
}

impl Weight for bool {
    fn participates(&self) -> bool {
        *self
    }
}

macro_rules! impl_numeric_weight {
    ($($t:ty),* $(,)?) => {
        $(
            impl Weight for $t {
                fn participates(&self) -> bool {
                    *self != (0 as $t)
                }
            }
        )*
    };
}

impl_numeric_weight!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// A square kernel of `2 * radius + 1` cells along each side, centred on the cell being
/// computed.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel<W> {
    radius: usize,
    weights: Array<W, 2>,
}

impl<W: Weight> Kernel<W> {
    /// A kernel with the same weight for every cell.
    pub fn box_kernel(radius: usize, weight: W) -> Self {
        let size = 2 * radius + 1;
        Self {
            radius,
            weights: Array::filled([size, size], weight),
        }
    }

    /// A kernel with explicit weights, which must be a square of `2 * radius + 1` cells.
    pub fn from_weights(radius: usize, weights: Array<W, 2>) -> Result<Self> {
        let size = 2 * radius + 1;
        if weights.shape() != &[size, size] {
            return Err(Error::Config(format!(
                "kernel of radius {radius} needs {size}x{size} weights, got {:?}",
                weights.shape()
            )));
        }
        Ok(Self { radius, weights })
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn size(&self) -> usize {
        2 * self.radius + 1
    }

    /// The weight of the cell `(row, col)` of the kernel, where `(radius, radius)` is the centre.
    pub fn weight(&self, row: usize, col: usize) -> &W {
        &self.weights[[row, col]]
    }

    pub fn weights(&self) -> &Array<W, 2> {
        &self.weights
    }

    /// Number of participating cells.
    pub fn nr_participating(&self) -> usize {
        self.weights.iter().filter(|w| w.participates()).count()
    }
}

impl Kernel<bool> {
    /// A kernel selecting the cells whose centre lies within `radius` cells of the kernel's
    /// centre.
    pub fn circle(radius: usize) -> Self {
        let size = 2 * radius + 1;
        let weights = Array::from_fn([size, size], |[row, col]| {
            let dr = row.abs_diff(radius);
            let dc = col.abs_diff(radius);
            dr * dr + dc * dc <= radius * radius
        });
        Self { radius, weights }
    }

    /// A kernel in which only the centre participates.
    pub fn center(radius: usize) -> Self {
        let size = 2 * radius + 1;
        let weights = Array::from_fn([size, size], |[row, col]| row == radius && col == radius);
        Self { radius, weights }
    }
}
