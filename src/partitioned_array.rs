// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Arrays split into partitions that live on compute nodes.
//!
//! A [`PartitionedArray`] owns a grid of [`Partition`] proxies and a parallel grid recording
//! the compute node each partition lives on. Both grids have the array's *shape in partitions*.
//! Partitions are addressed by their indices in that grid; a partition's neighbours are found
//! through index arithmetic (`(row ± 1, col ± 1)`) rather than through references between
//! partitions.
//!
//! The grids are populated once, during instantiation (see
//! [`create_partitioned_array`](crate::create_partitioned_array)), and never change afterwards.
//! Operations that produce new partition data produce a new array.
use crate::{
    Error, Result,
    array::Array,
    cluster::{Cluster, NodeId},
    decomposition,
    partition::{Element, Partition},
    shape::{self, Indices, Shape},
};
use futures::future::try_join_all;
use std::collections::BTreeMap;

pub struct PartitionedArray<T, const RANK: usize> {
    cluster: Cluster,
    shape: Shape<RANK>,
    partition_shape: Shape<RANK>,
    localities: Array<NodeId, RANK>,
    partitions: Array<Partition<T, RANK>, RANK>,
}

impl<T, const RANK: usize> Clone for PartitionedArray<T, RANK> {
    fn clone(&self) -> Self {
        Self {
            cluster: self.cluster.clone(),
            shape: self.shape,
            partition_shape: self.partition_shape,
            localities: self.localities.clone(),
            partitions: self.partitions.clone(),
        }
    }
}

impl<T: Element, const RANK: usize> PartitionedArray<T, RANK> {
    /// Assembles an array from grids that were populated elsewhere.
    ///
    /// `partition_shape` is the nominal partition shape. The two grids must have the shape in
    /// partitions of `shape` and `partition_shape`, and every partition must sit at its place in
    /// the tiling, clipped at the array's border.
    pub fn from_parts(
        cluster: Cluster,
        shape: Shape<RANK>,
        partition_shape: Shape<RANK>,
        localities: Array<NodeId, RANK>,
        partitions: Array<Partition<T, RANK>, RANK>,
    ) -> Result<Self> {
        decomposition::validate(&shape, &partition_shape)?;
        let grid = decomposition::shape_in_partitions(&shape, &partition_shape);
        if localities.shape() != &grid || partitions.shape() != &grid {
            return Err(Error::BatchSize {
                expected: shape::nr_elements(&grid),
                actual: partitions.len().min(localities.len()),
            });
        }
        for (indices, partition) in partitions.indexed_iter() {
            let definition = decomposition::partition_at(&shape, &partition_shape, &indices);
            if partition.start() != &definition.start || partition.shape() != &definition.shape {
                return Err(Error::Config(format!(
                    "partition {indices:?} covers {:?}+{:?}, expected {:?}+{:?}",
                    partition.start(),
                    partition.shape(),
                    definition.start,
                    definition.shape
                )));
            }
            if partition.node() != localities[indices] {
                return Err(Error::Config(format!(
                    "partition {indices:?} lives on {}, but is recorded on {}",
                    partition.node(),
                    localities[indices]
                )));
            }
        }
        Ok(Self {
            cluster,
            shape,
            partition_shape,
            localities,
            partitions,
        })
    }

    /// Shape of the logical array.
    pub fn shape(&self) -> &Shape<RANK> {
        &self.shape
    }

    /// Nominal partition shape. Partitions at the end of a dimension may be smaller.
    pub fn partition_shape(&self) -> &Shape<RANK> {
        &self.partition_shape
    }

    pub fn shape_in_partitions(&self) -> &Shape<RANK> {
        self.partitions.shape()
    }

    pub fn nr_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn nr_elements(&self) -> usize {
        shape::nr_elements(&self.shape)
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn partitions(&self) -> &Array<Partition<T, RANK>, RANK> {
        &self.partitions
    }

    /// Which compute node each partition lives on.
    pub fn localities(&self) -> &Array<NodeId, RANK> {
        &self.localities
    }

    pub fn partition(&self, indices: &Indices<RANK>) -> Option<&Partition<T, RANK>> {
        self.partitions.get(indices)
    }

    /// For each compute node hosting at least one partition, the partitions it hosts, in
    /// row-major order. Nodes are ordered by identity.
    pub fn partitions_per_node(&self) -> Vec<(NodeId, Vec<Indices<RANK>>)> {
        let mut per_node: BTreeMap<NodeId, Vec<Indices<RANK>>> = BTreeMap::new();
        for (indices, node) in self.localities.indexed_iter() {
            per_node.entry(*node).or_default().push(indices);
        }
        per_node.into_iter().collect()
    }

    /// Waits until every partition exists. Fails with the first creation failure observed.
    pub async fn wait_all(&self) -> Result<()> {
        try_join_all(self.partitions.iter().map(Partition::wait)).await?;
        Ok(())
    }

    /// Gathers the whole array into a single dense array.
    pub async fn to_array(&self) -> Result<Array<T, RANK>> {
        let blocks = try_join_all(self.partitions.iter().map(Partition::data)).await?;
        let mut iter = self.partitions.iter().zip(blocks);
        let Some((first, first_block)) = iter.next() else {
            return Err(Error::EmptyShape {
                what: "array",
                shape: self.shape.to_vec(),
            });
        };
        let element = first_block.as_slice().first().cloned().ok_or_else(|| Error::EmptyShape {
            what: "partition",
            shape: first.shape().to_vec(),
        })?;
        let mut result = Array::filled(self.shape, element);
        result.copy_from(first.start(), &first_block);
        for (partition, block) in iter {
            result.copy_from(partition.start(), &block);
        }
        Ok(result)
    }
}

impl<T, const RANK: usize> std::fmt::Debug for PartitionedArray<T, RANK> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedArray")
            .field("shape", &self.shape)
            .field("partition_shape", &self.partition_shape)
            .field("shape_in_partitions", self.partitions.shape())
            .field("localities", &self.localities)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn hand_built(cluster: &Cluster) -> PartitionedArray<i32, 2> {
        let shape = [3, 5];
        let partition_shape = [2, 3];
        let grid = decomposition::shape_in_partitions(&shape, &partition_shape);
        let localities = Array::from_fn(grid, |[r, _]| NodeId(r as u32));
        let partitions = Array::from_fn(grid, |indices| {
            let def = decomposition::partition_at(&shape, &partition_shape, &indices);
            let data = Array::from_fn(def.shape, |[r, c]| {
                ((def.start[0] + r) * 10 + def.start[1] + c) as i32
            });
            Partition::from_array(cluster, localities[indices], def.start, data)
        });
        PartitionedArray::from_parts(cluster.clone(), shape, partition_shape, localities, partitions)
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gather_into_one_array() {
        let cluster = Cluster::from_current(2, EngineConfig::for_testing()).unwrap();
        let array = hand_built(&cluster);
        assert_eq!(array.nr_partitions(), 4);
        assert_eq!(array.shape_in_partitions(), &[2, 2]);
        array.wait_all().await.unwrap();
        let dense = array.to_array().await.unwrap();
        assert_eq!(dense, Array::from_fn([3, 5], |[r, c]| (r * 10 + c) as i32));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn partitions_grouped_per_node() {
        let cluster = Cluster::from_current(2, EngineConfig::for_testing()).unwrap();
        let array = hand_built(&cluster);
        assert_eq!(
            array.partitions_per_node(),
            vec![
                (NodeId(0), vec![[0, 0], [0, 1]]),
                (NodeId(1), vec![[1, 0], [1, 1]]),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn misplaced_partitions_are_rejected() {
        let cluster = Cluster::from_current(1, EngineConfig::for_testing()).unwrap();
        let localities = Array::filled([1, 2], NodeId(0));
        let partitions = Array::from_fn([1, 2], |[_, c]| {
            Partition::filled(&cluster, NodeId(0), [0, 0], [2, 2 - c], 0_u8)
        });
        let result =
            PartitionedArray::from_parts(cluster.clone(), [2, 3], [2, 2], localities, partitions);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
