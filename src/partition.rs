// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Partition proxies.
//!
//! A [`Partition`] is a handle to one block of array data that lives on some compute node. The
//! data itself is owned by a [`PartitionServer`] on that node. The proxy knows which node that
//! is, and where the block sits in its array, from the moment it is created. The server may
//! still be under construction at that point: the proxy holds a shared future of the server,
//! and every operation on the data waits for it before running on the partition's node.
//!
//! Proxies are cheap to clone. All clones refer to the same server, so a mutation through one
//! of them is observed by all. A failure while creating the server is observed by every
//! operation on every clone.
use crate::{
    Error, Result,
    array::Array,
    cluster::{Cluster, NodeId},
    shape::{self, Indices, Shape},
};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use std::{
    fmt,
    ops::Range,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Requirements on the element type of partitioned arrays.
pub trait Element: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Element for T {}

/// Node-side owner of a partition's data.
pub struct PartitionServer<T, const RANK: usize> {
    data: RwLock<Array<T, RANK>>,
}

impl<T, const RANK: usize> PartitionServer<T, RANK> {
    pub fn new(data: Array<T, RANK>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    // Writers never change the shape, so a poisoned lock still guards a consistent array.
    pub fn read(&self) -> RwLockReadGuard<'_, Array<T, RANK>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Array<T, RANK>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

type ServerFuture<T, const RANK: usize> =
    Shared<BoxFuture<'static, Result<Arc<PartitionServer<T, RANK>>>>>;

/// Handle to a block of array data hosted by a compute node.
pub struct Partition<T, const RANK: usize> {
    cluster: Cluster,
    node: NodeId,
    start: Indices<RANK>,
    shape: Shape<RANK>,
    server: ServerFuture<T, RANK>,
}

impl<T, const RANK: usize> Clone for Partition<T, RANK> {
    fn clone(&self) -> Self {
        Self {
            cluster: self.cluster.clone(),
            node: self.node,
            start: self.start,
            shape: self.shape,
            server: self.server.clone(),
        }
    }
}

impl<T: Element, const RANK: usize> Partition<T, RANK> {
    /// Creates a proxy for the server `server` will resolve to.
    ///
    /// `server` is expected to already be running on `node`.
    pub fn new(
        cluster: Cluster,
        node: NodeId,
        start: Indices<RANK>,
        shape: Shape<RANK>,
        server: BoxFuture<'static, Result<Arc<PartitionServer<T, RANK>>>>,
    ) -> Self {
        Self {
            cluster,
            node,
            start,
            shape,
            server: server.shared(),
        }
    }

    /// Creates a partition on `node` from data produced by `data`, which runs on that node.
    pub fn spawn<F>(
        cluster: &Cluster,
        node: NodeId,
        start: Indices<RANK>,
        shape: Shape<RANK>,
        data: F,
    ) -> Self
    where
        F: Future<Output = Result<Array<T, RANK>>> + Send + 'static,
    {
        let server = cluster
            .invoke(node, data)
            .map(move |result| -> Result<Arc<PartitionServer<T, RANK>>> {
                let data = result??;
                check_shape(&shape, data.shape())?;
                Ok(Arc::new(PartitionServer::new(data)))
            })
            .boxed();
        Self::new(cluster.clone(), node, start, shape, server)
    }

    /// Creates a partition on `node` that holds `data`.
    pub fn from_array(
        cluster: &Cluster,
        node: NodeId,
        start: Indices<RANK>,
        data: Array<T, RANK>,
    ) -> Self {
        let shape = *data.shape();
        Self::spawn(cluster, node, start, shape, async move { Ok(data) })
    }

    /// Creates a partition on `node` with every element set to `value`.
    pub fn filled(
        cluster: &Cluster,
        node: NodeId,
        start: Indices<RANK>,
        shape: Shape<RANK>,
        value: T,
    ) -> Self {
        Self::spawn(cluster, node, start, shape, async move {
            Ok(Array::filled(shape, value))
        })
    }

    /// The node hosting this partition.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Position of the partition's first cell in its array.
    pub fn start(&self) -> &Indices<RANK> {
        &self.start
    }

    pub fn shape(&self) -> &Shape<RANK> {
        &self.shape
    }

    pub fn nr_elements(&self) -> usize {
        shape::nr_elements(&self.shape)
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Whether the partition's server exists already, successfully or not.
    pub fn is_ready(&self) -> bool {
        self.server.peek().is_some()
    }

    /// Waits until the partition's server exists.
    pub async fn wait(&self) -> Result<()> {
        self.server.clone().await.map(|_| ())
    }

    /// The partition's server, once it exists.
    ///
    /// Only code already running on [`node`](Self::node) should touch the server directly.
    pub async fn server(&self) -> Result<Arc<PartitionServer<T, RANK>>> {
        self.server.clone().await
    }

    /// Runs `op` against the server on the partition's node.
    pub fn on_server<R, F>(&self, op: F) -> BoxFuture<'static, Result<R>>
    where
        F: FnOnce(&PartitionServer<T, RANK>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let server = self.server.clone();
        self.cluster
            .invoke(self.node, async move { op(&*server.await?) })
            .map(|result| result.and_then(|output| output))
            .boxed()
    }

    /// A copy of the partition's data.
    pub fn data(&self) -> BoxFuture<'static, Result<Array<T, RANK>>> {
        self.on_server(|server| Ok(server.read().clone()))
    }

    /// A copy of the hyperslab of the partition's data selected by `ranges`, in partition-local
    /// coordinates.
    pub fn slice(
        &self,
        ranges: [Range<usize>; RANK],
    ) -> BoxFuture<'static, Result<Array<T, RANK>>> {
        let shape = self.shape;
        if ranges
            .iter()
            .zip(&shape)
            .any(|(range, extent)| range.start > range.end || range.end > *extent)
        {
            return futures::future::ready(Err(Error::Config(format!(
                "slice {ranges:?} does not fit partition shape {shape:?}"
            ))))
            .boxed();
        }
        self.on_server(move |server| Ok(server.read().slice(&ranges)))
    }

    /// Sets every element to `value`.
    pub fn fill(&self, value: T) -> BoxFuture<'static, Result<()>> {
        self.on_server(move |server| {
            server.write().fill(value);
            Ok(())
        })
    }

    /// Replaces the partition's data. The shape must stay the same.
    pub fn set_data(&self, data: Array<T, RANK>) -> BoxFuture<'static, Result<()>> {
        if let Err(err) = check_shape(&self.shape, data.shape()) {
            return futures::future::ready(Err(err)).boxed();
        }
        self.on_server(move |server| {
            *server.write() = data;
            Ok(())
        })
    }

    /// Mutates the partition's data in place, on the partition's node.
    pub fn update<F>(&self, op: F) -> BoxFuture<'static, Result<()>>
    where
        F: FnOnce(&mut Array<T, RANK>) + Send + 'static,
    {
        self.on_server(move |server| {
            op(&mut server.write());
            Ok(())
        })
    }
}

pub(crate) fn check_shape<const RANK: usize>(
    expected: &Shape<RANK>,
    actual: &Shape<RANK>,
) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

impl<T, const RANK: usize> fmt::Debug for Partition<T, RANK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("node", &self.node)
            .field("start", &self.start)
            .field("shape", &self.shape)
            .field("ready", &self.server.peek().is_some())
            .finish()
    }
}
