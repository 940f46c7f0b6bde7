// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Computes focal operations partition by partition.
//!
//! For every input partition, the engine gathers its 3x3 [`Neighbourhood`], requests the slices
//! of the neighbours that lie within the kernel's radius, and spawns the computation of the
//! output partition on the node of the input partition once all slices have arrived. No
//! partition waits for anything but its own neighbourhood, so the output partitions become
//! ready in whatever order their inputs do.
//!
//! Within a partition, cells whose kernel footprint lies entirely inside of the partition read
//! the partition's data directly. Only the ring of cells near the partition's border looks up
//! values through the [`Window`] of neighbour slices.
use super::{
    function::{Aggregator, Center, Diversity, FocalFunction, Majority, Maximum, Mean, Minimum, Sum},
    halo::Halo,
    kernel::{Kernel, Weight},
    neighbourhood::{Neighbourhood, Window},
    policy::FocalPolicies,
};
use crate::{
    Result,
    array::Array,
    partition::{Element, Partition},
    partitioned_array::PartitionedArray,
};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, trace};

/// Applies `function` over the footprint of `kernel` around every cell of `input`.
///
/// The output has the same shape, partitioning and partition placement as `input`. The
/// operation returns as soon as every output partition has been requested; awaiting the
/// partitions (e.g. through [`PartitionedArray::to_array`]) drives the computation.
///
/// # Panics
///
/// If the kernel's radius is not smaller than every extent of every partition. Partitions only
/// exchange data with their direct neighbours, which must hold the whole kernel footprint.
pub fn focal_operation<T, W, F>(
    input: &PartitionedArray<T, 2>,
    kernel: &Kernel<W>,
    function: F,
    policies: FocalPolicies<T, F::Output>,
) -> Result<PartitionedArray<F::Output, 2>>
where
    T: Element,
    W: Weight,
    F: FocalFunction<W, T>,
{
    let radius = kernel.radius();
    for (indices, partition) in input.partitions().indexed_iter() {
        assert!(
            partition.shape().iter().all(|extent| radius < *extent),
            "kernel radius {radius} does not fit partition {indices:?} of shape {:?}",
            partition.shape()
        );
    }
    debug!(
        shape = ?input.shape(),
        partition_shape = ?input.partition_shape(),
        radius,
        "starting focal operation"
    );

    let halo = Halo::new(input, radius, &policies.halo);
    let kernel = Arc::new(kernel.clone());
    let function = Arc::new(function);
    let policies = Arc::new(policies);

    let partitions = Array::from_fn(*input.shape_in_partitions(), |indices| {
        let centre = &input.partitions()[indices];
        let slices = Neighbourhood::new(input, &halo, &indices).slices(radius);
        let (kernel, function, policies) = (kernel.clone(), function.clone(), policies.clone());
        trace!(?indices, node = %centre.node(), "spawning focal partition");
        Partition::spawn(
            input.cluster(),
            centre.node(),
            *centre.start(),
            *centre.shape(),
            async move {
                let window = Window::new(try_join_all(slices).await?, radius)?;
                Ok(compute(&window, &kernel, &*function, &policies))
            },
        )
    });

    PartitionedArray::from_parts(
        input.cluster().clone(),
        *input.shape(),
        *input.partition_shape(),
        input.localities().clone(),
        partitions,
    )
}

/// Output cells of the partition at the centre of `window`.
fn compute<T, W, F>(
    window: &Window<T>,
    kernel: &Kernel<W>,
    function: &F,
    policies: &FocalPolicies<T, F::Output>,
) -> Array<F::Output, 2>
where
    W: Weight,
    F: FocalFunction<W, T>,
{
    let centre = window.centre();
    let [height, width] = *centre.shape();
    let radius = kernel.radius();
    let inner_rows = radius..height.saturating_sub(radius);
    let inner_cols = radius..width.saturating_sub(radius);

    Array::from_fn([height, width], |[row, col]| {
        if inner_rows.contains(&row) && inner_cols.contains(&col) {
            aggregate(kernel, function.aggregator(policies), |kr, kc| {
                &centre[[row + kr - radius, col + kc - radius]]
            })
        } else {
            let (row, col, radius) = (row as isize, col as isize, radius as isize);
            aggregate(kernel, function.aggregator(policies), |kr, kc| {
                window.value(row + kr as isize - radius, col + kc as isize - radius)
            })
        }
    })
}

/// Feeds every participating kernel cell to `aggregator`, in row-major kernel order.
///
/// `value(kr, kc)` is the input value under kernel cell `(kr, kc)`.
fn aggregate<'a, T: 'a, W, A>(
    kernel: &Kernel<W>,
    mut aggregator: A,
    value: impl Fn(usize, usize) -> &'a T,
) -> A::Output
where
    W: Weight,
    A: Aggregator<W, T>,
{
    let size = kernel.size();
    for kr in 0..size {
        for kc in 0..size {
            let weight = kernel.weight(kr, kc);
            if weight.participates() {
                aggregator.add(weight, value(kr, kc));
            }
        }
    }
    aggregator.finish()
}

macro_rules! focal_wrapper {
    ($(#[$meta:meta])* $name:ident, $function:ident, $output:ty) => {
        $(#[$meta])*
        pub fn $name<T, W>(
            input: &PartitionedArray<T, 2>,
            kernel: &Kernel<W>,
            policies: FocalPolicies<T, $output>,
        ) -> Result<PartitionedArray<$output, 2>>
        where
            T: Element,
            W: Weight,
            $function: FocalFunction<W, T, Output = $output>,
        {
            focal_operation(input, kernel, $function, policies)
        }
    };
}

focal_wrapper!(
    /// Sum of the valid values within the kernel footprint of every cell.
    focal_sum,
    Sum,
    T
);
focal_wrapper!(
    /// Mean of the valid values within the kernel footprint of every cell.
    focal_mean,
    Mean,
    f64
);
focal_wrapper!(focal_minimum, Minimum, T);
focal_wrapper!(focal_maximum, Maximum, T);
focal_wrapper!(
    /// Most frequent valid value within the kernel footprint of every cell.
    focal_majority,
    Majority,
    T
);
focal_wrapper!(
    /// Number of distinct valid values within the kernel footprint of every cell.
    focal_diversity,
    Diversity,
    u64
);
focal_wrapper!(focal_center, Center, T);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Cluster, EngineConfig, create_partitioned_array_filled,
        create_partitioned_array_from_buffer,
    };

    fn cluster(nr_nodes: usize) -> Cluster {
        Cluster::from_current(nr_nodes, EngineConfig::for_testing()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn box_sum_counts_cells_within_the_array() {
        crate::test_util::init_tracing();
        let cluster = cluster(3);
        for partition_shape in [[6, 6], [3, 3], [2, 4], [6, 2], [4, 3]] {
            let input = create_partitioned_array_filled(&cluster, [6, 6], partition_shape, 1_i32)
                .unwrap();
            let output = focal_sum(
                &input,
                &Kernel::box_kernel(1, true),
                FocalPolicies::with_fill_value(0),
            )
            .unwrap();
            let result = output.to_array().await.unwrap();
            let expected = Array::from_fn([6, 6], |[row, col]| {
                let rows = if row == 0 || row == 5 { 2 } else { 3 };
                let cols = if col == 0 || col == 5 { 2 } else { 3 };
                rows * cols
            });
            assert_eq!(result, expected, "partition shape {partition_shape:?}");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn center_kernel_is_identity() {
        let cluster = cluster(2);
        let buffer: Vec<i64> = (0..48).collect();
        let input = create_partitioned_array_from_buffer(&cluster, [6, 8], [3, 4], buffer.clone())
            .unwrap();
        let output = focal_center(
            &input,
            &Kernel::center(2),
            FocalPolicies::with_fill_value(-1),
        )
        .unwrap();
        assert_eq!(output.to_array().await.unwrap().into_vec(), buffer);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn halo_values_reach_the_border() {
        let cluster = cluster(1);
        let input = create_partitioned_array_filled(&cluster, [4, 4], [2, 2], 0_i32).unwrap();
        let policies = FocalPolicies::with_fill_value(0).with_halo(
            crate::focal::HaloPolicy::uniform(1).with_corners(100),
        );
        let output = focal_sum(&input, &Kernel::box_kernel(1, true), policies).unwrap();
        let result = output.to_array().await.unwrap();
        assert_eq!(result[[0, 0]], 104);
        assert_eq!(result[[0, 1]], 3);
        assert_eq!(result[[1, 1]], 0);
        assert_eq!(result[[3, 3]], 104);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn output_keeps_the_placement() {
        let cluster = cluster(4);
        let input = create_partitioned_array_filled(&cluster, [9, 9], [3, 3], 1.5_f64).unwrap();
        let output = focal_mean(
            &input,
            &Kernel::circle(1),
            FocalPolicies::with_fill_value(1.5),
        )
        .unwrap();
        assert_eq!(output.localities(), input.localities());
        assert_eq!(output.partition_shape(), input.partition_shape());
        let result = output.to_array().await.unwrap();
        assert!(result.iter().all(|&v| v == 1.5));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[should_panic(expected = "kernel radius")]
    async fn radius_must_fit_the_partitions() {
        let cluster = cluster(1);
        let input = create_partitioned_array_filled(&cluster, [5, 5], [3, 3], 0_u8).unwrap();
        let _ = focal_maximum(
            &input,
            &Kernel::box_kernel(2, true),
            FocalPolicies::with_fill_value(0),
        );
    }
}
