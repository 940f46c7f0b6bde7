// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Creating partitioned arrays.
//!
//! [`create_partitioned_array`] tiles an array shape with partitions, decides which compute node
//! hosts each partition and asks a [`PartitionCreator`] for the contents of every partition. All
//! of this happens without waiting for any partition to exist: the returned array holds proxies
//! whose data is produced asynchronously on the partitions' nodes.
//!
//! # Placement
//!
//! The partition grid is traversed along the cluster's configured [`Curve`]. The position of a
//! partition along the curve is mapped proportionally onto the nodes of the cluster snapshot
//! ([`map_to_range`]), so runs of consecutive positions end up on the same node. With the
//! Hilbert curve, those runs are spatially compact.
//!
//! # Strategies
//!
//! A creator declares which of two strategies it supports through
//! [`PartitionCreator::STRATEGY`]:
//!
//! - [`Strategy::PerPartition`]: one creation request per partition, issued while the grid is
//!   traversed.
//! - [`Strategy::PerLocality`]: partitions are batched while consecutive positions along the curve
//!   map onto the same node. When the node changes, or the traversal ends, the batch is handed to
//!   [`PartitionCreator::instantiate_bulk`] in one request, and the resulting partitions are
//!   scattered back into their grid cells. Every partition ends up in exactly one batch.
use crate::{
    Error, Result,
    array::Array,
    cluster::{Cluster, NodeId},
    curve::Curve,
    decomposition::{self, PartitionDefinition, map_to_range},
    focal::NoDataPolicy,
    partition::{Element, Partition, PartitionServer, check_shape},
    partitioned_array::PartitionedArray,
    shape::{self, Indices, Shape},
};
use futures::{
    FutureExt,
    future::{BoxFuture, try_join_all},
};
use std::{marker::PhantomData, sync::Arc};
use tracing::{debug, trace};

/// How a [`PartitionCreator`] wants to be called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    PerPartition,
    PerLocality,
}

/// Produces the contents of new partitions.
///
/// The futures returned by a creator run on the node the partitions are placed on. A creator
/// is called once per partition (or batch) from the thread driving the instantiation, and must
/// never produce more than one partition for the same definition.
pub trait PartitionCreator<T: Element, const RANK: usize>: Send + Sync + 'static {
    const STRATEGY: Strategy = Strategy::PerPartition;

    /// Creates the data of one partition of an array of `array_shape`.
    fn instantiate(
        &self,
        node: NodeId,
        array_shape: &Shape<RANK>,
        definition: PartitionDefinition<RANK>,
    ) -> BoxFuture<'static, Result<Array<T, RANK>>>;

    /// Creates the data of all partitions in `definitions`, in the same order.
    ///
    /// Called with [`Strategy::PerLocality`] only. The default creates every partition on its
    /// own.
    fn instantiate_bulk(
        &self,
        node: NodeId,
        array_shape: &Shape<RANK>,
        definitions: Vec<PartitionDefinition<RANK>>,
    ) -> BoxFuture<'static, Result<Vec<Array<T, RANK>>>> {
        try_join_all(
            definitions
                .into_iter()
                .map(|definition| self.instantiate(node, array_shape, definition)),
        )
        .boxed()
    }
}

/// Creates the partitions of an array of `array_shape`, tiled with `partition_shape`, using
/// `creator`, and places them on the nodes of `cluster`.
///
/// Fails before scheduling anything if the shapes are invalid, or if there are fewer partitions
/// than nodes and the cluster's configuration does not allow oversubscription.
pub fn create_partitioned_array<T, C, const RANK: usize>(
    cluster: &Cluster,
    array_shape: Shape<RANK>,
    partition_shape: Shape<RANK>,
    creator: C,
) -> Result<PartitionedArray<T, RANK>>
where
    T: Element,
    C: PartitionCreator<T, RANK>,
{
    decomposition::validate(&array_shape, &partition_shape)?;
    let grid = decomposition::shape_in_partitions(&array_shape, &partition_shape);
    let nr_partitions = shape::nr_elements(&grid);
    let nr_nodes = cluster.nr_nodes();

    if nr_partitions < nr_nodes && !cluster.config().allow_oversubscription {
        return Err(Error::InsufficientPartitions {
            nr_partitions,
            nr_nodes,
        });
    }

    let curve = cluster.config().locality_curve;
    debug!(
        ?array_shape,
        ?partition_shape,
        ?grid,
        nr_partitions,
        nr_nodes,
        ?curve,
        strategy = ?C::STRATEGY,
        "instantiating partitions"
    );

    let placement = Placement::new(cluster, array_shape, partition_shape, Arc::new(creator));
    let (localities, partitions) = match C::STRATEGY {
        Strategy::PerPartition => traverse(curve, PerPartitionInstantiator { placement }),
        Strategy::PerLocality => traverse(
            curve,
            PerLocalityInstantiator {
                placement,
                batch: None,
            },
        ),
    }?;

    PartitionedArray::from_parts(
        cluster.clone(),
        array_shape,
        partition_shape,
        localities,
        partitions,
    )
}

/// Like [`create_partitioned_array`], with a
/// [default partition shape](decomposition::default_partition_shape).
pub fn create_partitioned_array_with_default_shape<T, C, const RANK: usize>(
    cluster: &Cluster,
    array_shape: Shape<RANK>,
    creator: C,
) -> Result<PartitionedArray<T, RANK>>
where
    T: Element,
    C: PartitionCreator<T, RANK>,
{
    let partition_shape = decomposition::default_partition_shape(&array_shape);
    create_partitioned_array(cluster, array_shape, partition_shape, creator)
}

/// Creates an array with the same shape, partitioning and placement as `like`, using `creator`
/// for the contents.
///
/// Partitions are created one by one, next to their counterpart in `like`.
pub fn create_partitioned_array_like<T, U, C, const RANK: usize>(
    like: &PartitionedArray<U, RANK>,
    creator: C,
) -> Result<PartitionedArray<T, RANK>>
where
    T: Element,
    U: Element,
    C: PartitionCreator<T, RANK>,
{
    let cluster = like.cluster();
    let array_shape = *like.shape();
    let partitions = Array::from_fn(*like.shape_in_partitions(), |indices| {
        let input = &like.partitions()[indices];
        let definition = PartitionDefinition {
            start: *input.start(),
            shape: *input.shape(),
        };
        let data = creator.instantiate(input.node(), &array_shape, definition);
        Partition::spawn(cluster, input.node(), definition.start, definition.shape, data)
    });
    PartitionedArray::from_parts(
        cluster.clone(),
        array_shape,
        *like.partition_shape(),
        like.localities().clone(),
        partitions,
    )
}

/// An array with every element set to `value`.
pub fn create_partitioned_array_filled<T: Element, const RANK: usize>(
    cluster: &Cluster,
    array_shape: Shape<RANK>,
    partition_shape: Shape<RANK>,
    value: T,
) -> Result<PartitionedArray<T, RANK>> {
    create_partitioned_array(
        cluster,
        array_shape,
        partition_shape,
        InstantiateFilled::new(value),
    )
}

/// An array holding the contents of a row-major `buffer`.
pub fn create_partitioned_array_from_buffer<T: Element + PartialEq, const RANK: usize>(
    cluster: &Cluster,
    array_shape: Shape<RANK>,
    partition_shape: Shape<RANK>,
    buffer: impl Into<Arc<[T]>>,
) -> Result<PartitionedArray<T, RANK>> {
    let creator = InstantiateFromBuffer::new(buffer);
    creator.check_len(&array_shape)?;
    create_partitioned_array(cluster, array_shape, partition_shape, creator)
}

/// What both strategies share: the grids being populated and the information needed to place
/// and create a partition.
struct Placement<'a, T, C, const RANK: usize> {
    cluster: &'a Cluster,
    creator: Arc<C>,
    array_shape: Shape<RANK>,
    partition_shape: Shape<RANK>,
    grid: Shape<RANK>,
    nr_partitions: usize,
    slots: Vec<Option<Partition<T, RANK>>>,
}

impl<'a, T, C, const RANK: usize> Placement<'a, T, C, RANK>
where
    T: Element,
    C: PartitionCreator<T, RANK>,
{
    fn new(
        cluster: &'a Cluster,
        array_shape: Shape<RANK>,
        partition_shape: Shape<RANK>,
        creator: Arc<C>,
    ) -> Self {
        let grid = decomposition::shape_in_partitions(&array_shape, &partition_shape);
        let nr_partitions = shape::nr_elements(&grid);
        Self {
            cluster,
            creator,
            array_shape,
            partition_shape,
            grid,
            nr_partitions,
            slots: vec![None; nr_partitions],
        }
    }

    /// The node hosting the partition at `position` along the curve.
    fn node(&self, position: usize) -> NodeId {
        let node_idx = map_to_range(
            0,
            self.nr_partitions - 1,
            0,
            self.cluster.nr_nodes() - 1,
            position,
        );
        self.cluster.node_at(node_idx)
    }

    fn definition(&self, indices: &Indices<RANK>) -> PartitionDefinition<RANK> {
        decomposition::partition_at(&self.array_shape, &self.partition_shape, indices)
    }

    fn place(&mut self, indices: &Indices<RANK>, partition: Partition<T, RANK>) {
        let slot = &mut self.slots[shape::linear_index(&self.grid, indices)];
        debug_assert!(slot.is_none(), "partition {indices:?} placed twice");
        *slot = Some(partition);
    }

    fn into_grids(self) -> Result<(Array<NodeId, RANK>, Array<Partition<T, RANK>, RANK>)> {
        let nr_placed = self.slots.iter().filter(|slot| slot.is_some()).count();
        let partitions: Vec<_> = self.slots.into_iter().flatten().collect();
        if nr_placed != self.nr_partitions {
            return Err(Error::BatchSize {
                expected: self.nr_partitions,
                actual: nr_placed,
            });
        }
        let localities = partitions.iter().map(Partition::node).collect();
        let localities = Array::from_vec(self.grid, localities);
        let partitions = Array::from_vec(self.grid, partitions);
        localities.zip(partitions).ok_or(Error::BatchSize {
            expected: self.nr_partitions,
            actual: nr_placed,
        })
    }
}

/// One of the two instantiation strategies.
trait Instantiator<T, const RANK: usize> {
    /// Shape of the partition grid being populated.
    fn grid(&self) -> Shape<RANK>;

    /// Called for every partition, in curve order.
    fn visit(&mut self, position: usize, indices: Indices<RANK>);

    /// Called once the traversal has ended.
    fn finish(self) -> Result<(Array<NodeId, RANK>, Array<Partition<T, RANK>, RANK>)>;
}

fn traverse<T, I, const RANK: usize>(
    curve: Curve,
    mut instantiator: I,
) -> Result<(Array<NodeId, RANK>, Array<Partition<T, RANK>, RANK>)>
where
    I: Instantiator<T, RANK>,
{
    let grid = instantiator.grid();
    curve.visit(&grid, |position, indices| {
        instantiator.visit(position, indices);
    });
    instantiator.finish()
}

/// Creates every partition with its own request.
struct PerPartitionInstantiator<'a, T, C, const RANK: usize> {
    placement: Placement<'a, T, C, RANK>,
}

impl<T, C, const RANK: usize> Instantiator<T, RANK> for PerPartitionInstantiator<'_, T, C, RANK>
where
    T: Element,
    C: PartitionCreator<T, RANK>,
{
    fn grid(&self) -> Shape<RANK> {
        self.placement.grid
    }

    fn visit(&mut self, position: usize, indices: Indices<RANK>) {
        let placement = &mut self.placement;
        let node = placement.node(position);
        let definition = placement.definition(&indices);
        let data = placement
            .creator
            .instantiate(node, &placement.array_shape, definition);
        let partition = Partition::spawn(
            placement.cluster,
            node,
            definition.start,
            definition.shape,
            data,
        );
        placement.place(&indices, partition);
    }

    fn finish(self) -> Result<(Array<NodeId, RANK>, Array<Partition<T, RANK>, RANK>)> {
        self.placement.into_grids()
    }
}

struct Batch<const RANK: usize> {
    node: NodeId,
    members: Vec<(Indices<RANK>, PartitionDefinition<RANK>)>,
}

/// Creates all consecutive partitions that go to the same node with one request.
struct PerLocalityInstantiator<'a, T, C, const RANK: usize> {
    placement: Placement<'a, T, C, RANK>,
    batch: Option<Batch<RANK>>,
}

impl<T, C, const RANK: usize> PerLocalityInstantiator<'_, T, C, RANK>
where
    T: Element,
    C: PartitionCreator<T, RANK>,
{
    fn flush(&mut self) {
        let Some(Batch { node, members }) = self.batch.take() else {
            return;
        };
        let placement = &mut self.placement;
        let expected = members.len();
        trace!(%node, nr_partitions = expected, "bulk instantiation");

        let definitions: Vec<_> = members.iter().map(|(_, definition)| *definition).collect();
        let shapes: Vec<_> = definitions.iter().map(|definition| definition.shape).collect();
        let data = placement
            .creator
            .instantiate_bulk(node, &placement.array_shape, definitions);
        let servers = placement
            .cluster
            .invoke(node, data)
            .map(
                move |result| -> Result<Arc<Vec<Arc<PartitionServer<T, RANK>>>>> {
                    let arrays = result??;
                    if arrays.len() != expected {
                        return Err(Error::BatchSize {
                            expected,
                            actual: arrays.len(),
                        });
                    }
                    arrays
                        .into_iter()
                        .zip(&shapes)
                        .map(|(array, shape)| {
                            check_shape(shape, array.shape())?;
                            Ok(Arc::new(PartitionServer::new(array)))
                        })
                        .collect::<Result<Vec<_>>>()
                        .map(Arc::new)
                },
            )
            .boxed()
            .shared();

        for (idx, (indices, definition)) in members.into_iter().enumerate() {
            let server = servers
                .clone()
                .map(move |result| {
                    result.and_then(|batch| {
                        batch.get(idx).cloned().ok_or(Error::BatchSize {
                            expected,
                            actual: batch.len(),
                        })
                    })
                })
                .boxed();
            let partition = Partition::new(
                placement.cluster.clone(),
                node,
                definition.start,
                definition.shape,
                server,
            );
            placement.place(&indices, partition);
        }
    }
}

impl<T, C, const RANK: usize> Instantiator<T, RANK> for PerLocalityInstantiator<'_, T, C, RANK>
where
    T: Element,
    C: PartitionCreator<T, RANK>,
{
    fn grid(&self) -> Shape<RANK> {
        self.placement.grid
    }

    fn visit(&mut self, position: usize, indices: Indices<RANK>) {
        let node = self.placement.node(position);
        let definition = self.placement.definition(&indices);
        if self.batch.as_ref().is_some_and(|batch| batch.node != node) {
            self.flush();
        }
        self.batch
            .get_or_insert_with(|| Batch {
                node,
                members: Vec::new(),
            })
            .members
            .push((indices, definition));
    }

    fn finish(mut self) -> Result<(Array<NodeId, RANK>, Array<Partition<T, RANK>, RANK>)> {
        self.flush();
        self.placement.into_grids()
    }
}

/// Partitions with default-initialized elements.
pub struct InstantiateDefault<T>(PhantomData<fn() -> T>);

impl<T> InstantiateDefault<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for InstantiateDefault<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element + Default, const RANK: usize> PartitionCreator<T, RANK> for InstantiateDefault<T> {
    fn instantiate(
        &self,
        _node: NodeId,
        _array_shape: &Shape<RANK>,
        definition: PartitionDefinition<RANK>,
    ) -> BoxFuture<'static, Result<Array<T, RANK>>> {
        async move { Ok(Array::new(definition.shape)) }.boxed()
    }
}

/// Partitions with every element set to the same value.
#[derive(Debug, Clone)]
pub struct InstantiateFilled<T> {
    value: T,
}

impl<T> InstantiateFilled<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Element, const RANK: usize> PartitionCreator<T, RANK> for InstantiateFilled<T> {
    fn instantiate(
        &self,
        _node: NodeId,
        _array_shape: &Shape<RANK>,
        definition: PartitionDefinition<RANK>,
    ) -> BoxFuture<'static, Result<Array<T, RANK>>> {
        let value = self.value.clone();
        async move { Ok(Array::filled(definition.shape, value)) }.boxed()
    }
}

/// Like [`InstantiateFilled`], creating all partitions of a node with one request.
#[derive(Debug, Clone)]
pub struct InstantiateFilledPerNode<T> {
    value: T,
}

impl<T> InstantiateFilledPerNode<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Element, const RANK: usize> PartitionCreator<T, RANK> for InstantiateFilledPerNode<T> {
    const STRATEGY: Strategy = Strategy::PerLocality;

    fn instantiate(
        &self,
        _node: NodeId,
        _array_shape: &Shape<RANK>,
        definition: PartitionDefinition<RANK>,
    ) -> BoxFuture<'static, Result<Array<T, RANK>>> {
        let value = self.value.clone();
        async move { Ok(Array::filled(definition.shape, value)) }.boxed()
    }

    fn instantiate_bulk(
        &self,
        _node: NodeId,
        _array_shape: &Shape<RANK>,
        definitions: Vec<PartitionDefinition<RANK>>,
    ) -> BoxFuture<'static, Result<Vec<Array<T, RANK>>>> {
        let value = self.value.clone();
        async move {
            Ok(definitions
                .into_iter()
                .map(|definition| Array::filled(definition.shape, value.clone()))
                .collect())
        }
        .boxed()
    }
}

/// Partitions holding a copy of the matching cells of a row-major buffer spanning the whole
/// array.
///
/// Optionally, cells holding a sentinel value in the buffer are marked as no-data in the
/// partitions.
#[derive(Debug, Clone)]
pub struct InstantiateFromBuffer<T> {
    buffer: Arc<[T]>,
    no_data: Option<(T, NoDataPolicy<T>)>,
}

impl<T: Element> InstantiateFromBuffer<T> {
    pub fn new(buffer: impl Into<Arc<[T]>>) -> Self {
        Self {
            buffer: buffer.into(),
            no_data: None,
        }
    }

    /// Marks cells equal to `sentinel` as no-data, according to `policy`.
    pub fn with_no_data(mut self, sentinel: T, policy: NoDataPolicy<T>) -> Self {
        self.no_data = Some((sentinel, policy));
        self
    }

    fn check_len<const RANK: usize>(&self, array_shape: &Shape<RANK>) -> Result<()> {
        let expected = shape::nr_elements(array_shape);
        if self.buffer.len() == expected {
            Ok(())
        } else {
            Err(Error::BufferSize {
                expected,
                actual: self.buffer.len(),
            })
        }
    }
}

impl<T: Element + PartialEq, const RANK: usize> PartitionCreator<T, RANK>
    for InstantiateFromBuffer<T>
{
    fn instantiate(
        &self,
        _node: NodeId,
        array_shape: &Shape<RANK>,
        definition: PartitionDefinition<RANK>,
    ) -> BoxFuture<'static, Result<Array<T, RANK>>> {
        if let Err(err) = self.check_len(array_shape) {
            return futures::future::ready(Err(err)).boxed();
        }
        let buffer = Arc::clone(&self.buffer);
        let no_data = self.no_data.clone();
        let array_shape = *array_shape;
        async move {
            let mut data = Array::from_fn(definition.shape, |indices| {
                let cell: Indices<RANK> =
                    std::array::from_fn(|d| definition.start[d] + indices[d]);
                buffer[shape::linear_index(&array_shape, &cell)].clone()
            });
            if let Some((sentinel, policy)) = no_data {
                for value in data.as_mut_slice() {
                    if *value == sentinel {
                        policy.mark_no_data(value);
                    }
                }
            }
            Ok(data)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cluster(nr_nodes: usize) -> Cluster {
        Cluster::from_current(nr_nodes, EngineConfig::for_testing()).unwrap()
    }

    /// Counts bulk requests, and the partitions requested in total.
    #[derive(Default)]
    struct CountingBulk {
        nr_requests: Arc<AtomicUsize>,
        nr_partitions: Arc<AtomicUsize>,
    }

    impl PartitionCreator<u32, 2> for CountingBulk {
        const STRATEGY: Strategy = Strategy::PerLocality;

        fn instantiate(
            &self,
            _node: NodeId,
            _array_shape: &Shape<2>,
            _definition: PartitionDefinition<2>,
        ) -> BoxFuture<'static, Result<Array<u32, 2>>> {
            unreachable!("bulk creators are called per node")
        }

        fn instantiate_bulk(
            &self,
            node: NodeId,
            _array_shape: &Shape<2>,
            definitions: Vec<PartitionDefinition<2>>,
        ) -> BoxFuture<'static, Result<Vec<Array<u32, 2>>>> {
            self.nr_requests.fetch_add(1, Ordering::SeqCst);
            self.nr_partitions
                .fetch_add(definitions.len(), Ordering::SeqCst);
            async move {
                Ok(definitions
                    .into_iter()
                    .map(|definition| Array::filled(definition.shape, node.0))
                    .collect())
            }
            .boxed()
        }
    }

    struct ShortBulk;

    impl PartitionCreator<u8, 1> for ShortBulk {
        const STRATEGY: Strategy = Strategy::PerLocality;

        fn instantiate(
            &self,
            _node: NodeId,
            _array_shape: &Shape<1>,
            definition: PartitionDefinition<1>,
        ) -> BoxFuture<'static, Result<Array<u8, 1>>> {
            async move { Ok(Array::new(definition.shape)) }.boxed()
        }

        fn instantiate_bulk(
            &self,
            _node: NodeId,
            _array_shape: &Shape<1>,
            _definitions: Vec<PartitionDefinition<1>>,
        ) -> BoxFuture<'static, Result<Vec<Array<u8, 1>>>> {
            async { Ok(Vec::new()) }.boxed()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn filled_round_trip() {
        let cluster = cluster(3);
        let array = create_partitioned_array_filled(&cluster, [10, 7], [3, 3], 5_i64).unwrap();
        assert_eq!(array.shape_in_partitions(), &[4, 3]);
        let dense = array.to_array().await.unwrap();
        assert!(dense.iter().all(|&value| value == 5));
        assert_eq!(dense.shape(), &[10, 7]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn buffer_round_trip() {
        let cluster = cluster(2);
        let buffer: Vec<i32> = (0..35).collect();
        let array =
            create_partitioned_array_from_buffer(&cluster, [5, 7], [2, 3], buffer.clone()).unwrap();
        let dense = array.to_array().await.unwrap();
        assert_eq!(dense.as_slice(), buffer.as_slice());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn buffer_sentinels_become_no_data() {
        let cluster = cluster(1);
        let creator = InstantiateFromBuffer::new(vec![1, -1, 3, -1])
            .with_no_data(-1, NoDataPolicy::Value(i32::MIN));
        let array = create_partitioned_array(&cluster, [2, 2], [1, 2], creator).unwrap();
        let dense = array.to_array().await.unwrap();
        assert_eq!(dense.as_slice(), &[1, i32::MIN, 3, i32::MIN]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn buffer_of_the_wrong_size() {
        let cluster = cluster(1);
        let err = create_partitioned_array_from_buffer(&cluster, [2, 2], [1, 1], vec![0_u8; 3])
            .unwrap_err();
        assert_eq!(
            err,
            Error::BufferSize {
                expected: 4,
                actual: 3
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn insufficient_partitions() {
        let cluster = Cluster::from_current(4, EngineConfig::default()).unwrap();
        let err = create_partitioned_array_filled(&cluster, [4, 4], [2, 4], 0_u8).unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientPartitions {
                nr_partitions: 2,
                nr_nodes: 4
            }
        );

        // allowed when oversubscription is configured
        let cluster = cluster.with_config(EngineConfig::for_testing());
        let array = create_partitioned_array_filled(&cluster, [4, 4], [2, 4], 0_u8).unwrap();
        array.wait_all().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_shapes_are_reported_synchronously() {
        let cluster = cluster(1);
        assert!(matches!(
            create_partitioned_array_filled(&cluster, [4, 0], [2, 2], 0_u8),
            Err(Error::EmptyShape { .. })
        ));
        assert!(matches!(
            create_partitioned_array_filled(&cluster, [4, 4], [5, 2], 0_u8),
            Err(Error::PartitionLargerThanArray { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_partition_ends_up_in_exactly_one_batch() {
        crate::test_util::init_tracing();
        for (nr_nodes, array_shape, partition_shape, curve) in [
            (1, [6, 6], [2, 2], Curve::Hilbert),
            (3, [6, 6], [2, 2], Curve::Hilbert),
            (4, [7, 5], [2, 2], Curve::Linear),
            (5, [3, 3], [1, 1], Curve::Hilbert),
            (9, [3, 3], [1, 1], Curve::Linear),
        ] {
            let config = EngineConfig {
                locality_curve: curve,
                ..EngineConfig::for_testing()
            };
            let cluster = Cluster::from_current(nr_nodes, config).unwrap();
            let creator = CountingBulk::default();
            let nr_requests = Arc::clone(&creator.nr_requests);
            let nr_partitions = Arc::clone(&creator.nr_partitions);

            let array =
                create_partitioned_array(&cluster, array_shape, partition_shape, creator).unwrap();
            assert_eq!(nr_partitions.load(Ordering::SeqCst), array.nr_partitions());
            // one batch per run of consecutive positions on the same node
            assert_eq!(nr_requests.load(Ordering::SeqCst), nr_nodes.min(array.nr_partitions()));

            // each partition holds the identity of the node it was placed on
            for (indices, node) in array.localities().indexed_iter() {
                let data = array.partitions()[indices].data().await.unwrap();
                assert!(data.iter().all(|&value| value == node.0));
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn per_partition_and_bulk_place_alike() {
        let cluster = cluster(3);
        let single = create_partitioned_array_filled(&cluster, [8, 8], [2, 2], 1_u8).unwrap();
        let bulk = create_partitioned_array(
            &cluster,
            [8, 8],
            [2, 2],
            InstantiateFilledPerNode::new(1_u8),
        )
        .unwrap();
        assert_eq!(single.localities(), bulk.localities());
        assert_eq!(single.to_array().await.unwrap(), bulk.to_array().await.unwrap());
        let per_node = bulk.partitions_per_node();
        assert_eq!(per_node.len(), 3);
        assert_eq!(
            per_node.iter().map(|(_, members)| members.len()).sum::<usize>(),
            16
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn short_batches_fail_every_member() {
        let cluster = cluster(1);
        let array = create_partitioned_array(&cluster, [4], [2], ShortBulk).unwrap();
        let err = array.wait_all().await.unwrap_err();
        assert_eq!(
            err,
            Error::BatchSize {
                expected: 2,
                actual: 0
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn like_keeps_the_layout() {
        let cluster = cluster(2);
        let input = create_partitioned_array_filled(&cluster, [5, 5], [2, 3], 1.5_f64).unwrap();
        let output: PartitionedArray<u16, 2> =
            create_partitioned_array_like(&input, InstantiateDefault::new()).unwrap();
        assert_eq!(output.localities(), input.localities());
        assert_eq!(output.partition_shape(), input.partition_shape());
        let dense = output.to_array().await.unwrap();
        assert_eq!(dense, Array::filled([5, 5], 0));
    }
}
