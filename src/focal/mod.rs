// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Focal (stencil) operations over two-dimensional partitioned arrays.
//!
//! A focal operation computes every output cell from the input cells within a fixed radius of
//! it. What "within" means is decided by a [`Kernel`], what is computed by a
//! [`FocalFunction`], and how no-data and cells outside of the array are treated by the
//! [`FocalPolicies`].
//!
//! ```rust
//! # use tessera::{Cluster, EngineConfig, create_partitioned_array_filled};
//! # use tessera::focal::{FocalPolicies, Kernel, focal_sum};
//! # #[tokio::main(flavor = "multi_thread")]
//! # async fn main() -> tessera::Result<()> {
//! let cluster = Cluster::from_current(2, EngineConfig::for_testing())?;
//! let ones = create_partitioned_array_filled(&cluster, [4, 4], [2, 2], 1_u32)?;
//!
//! // Count the cells within one step of every cell. Cells outside of the array count as 0.
//! let counts = focal_sum(&ones, &Kernel::box_kernel(1, true), FocalPolicies::with_fill_value(0))?;
//! let counts = counts.to_array().await?;
//! assert_eq!(counts[[0, 0]], 4);
//! assert_eq!(counts[[0, 1]], 6);
//! assert_eq!(counts[[1, 1]], 9);
//! # Ok(())
//! # }
//! ```
//!
//! Partitions exchange only the cells the kernel can reach: a partition receives `radius` rows
//! or columns from each of its direct neighbours, and `radius x radius` cells from each diagonal
//! neighbour. Partitions on the border of the array receive [halo](halo) cells in place of the
//! missing neighbours. The kernel's radius must therefore be smaller than every extent of every
//! partition.
mod engine;
mod function;
pub mod halo;
mod kernel;
pub mod neighbourhood;
mod policy;

pub use engine::{
    focal_center, focal_diversity, focal_majority, focal_maximum, focal_mean, focal_minimum,
    focal_operation, focal_sum,
};
pub use function::{
    Aggregator, Center, CenterAggregator, DiversityAggregator, Diversity, ExtremeAggregator,
    FocalFunction, Greater, Less, Majority, MajorityAggregator, Maximum, Mean, MeanAggregator,
    Minimum, Prefer, Sum, SumAggregator,
};
pub use kernel::{Kernel, Weight};
pub use policy::{FocalPolicies, HaloPolicy, NoDataPolicy};
