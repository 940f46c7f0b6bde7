// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Tessera: Distributed Partitioned Arrays
//!
//! This crate provides the core of a distributed array-processing engine: large
//! multi-dimensional arrays are split into rectangular **partitions** that live on the compute
//! nodes of a cluster, and whole-array operations are expressed as asynchronous per-partition
//! work that only waits for the data it actually depends on.
//!
//! The goal is to keep every node busy without global synchronization points. No operation
//! waits for "all partitions of the previous step"; each output partition becomes ready as soon
//! as its own inputs are.
//!
//! ## Core Concepts
//!
//! - [`Cluster`]: an explicit snapshot of the compute nodes taking part in a computation,
//!   together with the node the caller runs on, the coordinating root node and the
//!   [`EngineConfig`]. Work is sent to a node with [`Cluster::invoke`].
//! - [`Partition`]: a handle to one rectangular block of an array, hosted by one node. The
//!   handle is cheap to clone and may be held before the block has been computed. Every access
//!   runs on the hosting node and yields a future.
//! - [`PartitionedArray`]: the logical array. It holds a grid of partition handles and a
//!   parallel grid recording which node hosts each partition.
//!
//! Shapes, indices and offsets are fixed-length arrays ([`Shape`], [`Indices`], [`Offset`]), so
//! the rank of an array is part of its type.
//!
//! ## Creating Arrays
//!
//! [`create_partitioned_array`] tiles an array shape with partitions of a given shape (clipped
//! at the array's border), walks the partition grid along a locality-preserving curve and asks
//! a [`PartitionCreator`] to produce each partition on the node the walk assigns it to.
//! Creators either produce one partition at a time ([`Strategy::PerPartition`]) or all
//! partitions destined for one node in a single request ([`Strategy::PerLocality`]).
//!
//! ```rust
//! use tessera::{Cluster, EngineConfig, create_partitioned_array_filled};
//!
//! # #[tokio::main(flavor = "multi_thread")]
//! # async fn main() -> tessera::Result<()> {
//! // four simulated compute nodes sharing the current runtime
//! let cluster = Cluster::from_current(4, EngineConfig::default())?;
//!
//! let array = create_partitioned_array_filled(&cluster, [600, 400], [100, 100], 0.5_f32)?;
//! assert_eq!(array.shape_in_partitions(), &[6, 4]);
//! assert_eq!(array.partitions_per_node().len(), 4);
//!
//! let dense = array.to_array().await?;
//! assert!(dense.iter().all(|&v| v == 0.5));
//! # Ok(())
//! # }
//! ```
//!
//! Creating an array never blocks: the call returns once every partition has been requested.
//! Failures of the computations producing partitions travel through the partition futures and
//! surface wherever those are awaited.
//!
//! ## Focal Operations
//!
//! The [`focal`] module computes stencil operations: every output cell is derived from the
//! input cells within a fixed radius. Each output partition depends only on its own input
//! partition and thin slices of its eight neighbours. Partitions on the border of the array are
//! completed with halo cells whose values come from the operation's policies.
//!
//! ## Ordering Work
//!
//! Two utilities impose order where data dependencies alone do not:
//!
//! - [`StepGate`] bounds the number of time steps an iterative algorithm has in flight.
//! - [`Serializer`] makes tasks touching the same shared resource (say, a file) run in the
//!   order they were issued in, even if they are scheduled in another order.
//!
//! ## Flow Accumulation
//!
//! [`ArrayPartitionIO`] keeps track of the material that crosses partition borders while an
//! accumulation algorithm routes material downstream through a flow-direction network.
//!
//! ## Scope of this Crate
//!
//! This crate provides the partitioning, placement and scheduling core. It does not discover
//! compute nodes, talk to the network, or read and write array files. A cluster is assembled
//! from one [`tokio::runtime::Handle`] per node; whether those runtimes live in one process or
//! in many is up to the caller.
//!
//! The crate does not install a `tracing` subscriber. It logs partition placement, bulk
//! creation batches and halo construction at `debug` and `trace` level.

// for quickcheck tests
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

pub mod accumulation;
pub use accumulation::ArrayPartitionIO;
pub mod array;
pub use array::Array;
pub mod cluster;
pub use cluster::{Cluster, ComputeNode, NodeId};
pub mod config;
pub use config::EngineConfig;
pub mod curve;
pub use curve::Curve;
pub mod decomposition;
pub use decomposition::PartitionDefinition;
mod error;
pub use error::{Error, Result};
pub mod focal;
mod gate;
pub use gate::{StepGate, StepPermit};
pub mod instantiate;
pub use instantiate::{
    InstantiateDefault, InstantiateFilled, InstantiateFilledPerNode, InstantiateFromBuffer,
    PartitionCreator, Strategy, create_partitioned_array, create_partitioned_array_filled,
    create_partitioned_array_from_buffer, create_partitioned_array_like,
    create_partitioned_array_with_default_shape,
};
pub mod macros;
pub mod partition;
pub use partition::{Element, Partition, PartitionServer};
mod partitioned_array;
pub use partitioned_array::PartitionedArray;
pub mod serializer;
pub use serializer::{Generation, Promise, Serializer};
pub mod shape;
pub use shape::{Indices, Offset, Shape};
