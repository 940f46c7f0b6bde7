// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Cluster membership and remote invocation.
//!
//! A [`Cluster`] is a snapshot of the compute nodes that partitions may be placed on, captured
//! once when an operation starts. Placement decisions only depend on the snapshot, so they are
//! deterministic and can be tested without a real cluster.
//!
//! Each [`ComputeNode`] is backed by a [`tokio`] runtime [`Handle`]. Running work "on a node"
//! means spawning it on that node's runtime through [`Cluster::invoke`], which returns a future
//! of the result. Calling code is written identically whether a node is a separate runtime (or
//! process behind a runtime) or one of several simulated nodes sharing a single multi-threaded
//! runtime, as in tests.
//!
//! ```no_run
//! # async fn example() -> tessera::Result<()> {
//! use tessera::{Cluster, EngineConfig};
//!
//! let cluster = Cluster::from_current(4, EngineConfig::default())?;
//! let node = cluster.node_at(2);
//! let answer = cluster.invoke(node, async { 6 * 7 }).await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```
use crate::{Error, Result, config::EngineConfig};
use futures::{FutureExt, future::BoxFuture};
use std::{fmt, future::Future, sync::Arc};
use tokio::runtime::Handle;
use tracing::trace;

/// Identity of a compute node within a cluster snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// A location that can host partitions and run work.
#[derive(Debug, Clone)]
pub struct ComputeNode {
    id: NodeId,
    handle: Handle,
}

impl ComputeNode {
    pub fn new(id: NodeId, handle: Handle) -> Self {
        Self { id, handle }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// A snapshot of cluster membership plus the configuration operations should run with.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

struct ClusterInner {
    nodes: Vec<ComputeNode>,
    here: NodeId,
    root: NodeId,
    config: EngineConfig,
}

impl Cluster {
    /// Creates a snapshot of `nodes`.
    ///
    /// `here` is the node the caller runs on, `root` the node coordinating the computation. Both
    /// must be members of `nodes`, and node identities must be unique.
    pub fn new(
        nodes: Vec<ComputeNode>,
        here: NodeId,
        root: NodeId,
        config: EngineConfig,
    ) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::NoNodes);
        }
        for (idx, node) in nodes.iter().enumerate() {
            if nodes[..idx].iter().any(|other| other.id == node.id) {
                return Err(Error::Config(format!(
                    "compute node {} is listed twice",
                    node.id
                )));
            }
        }
        for id in [here, root] {
            if !nodes.iter().any(|node| node.id == id) {
                return Err(Error::UnknownNode(id.0));
            }
        }
        Ok(Self {
            inner: Arc::new(ClusterInner {
                nodes,
                here,
                root,
                config,
            }),
        })
    }

    /// A cluster of `nr_nodes` simulated nodes that all run on `handle`.
    ///
    /// Nodes are numbered from zero, and node zero is both `here` and `root`.
    pub fn local(handle: Handle, nr_nodes: usize, config: EngineConfig) -> Result<Self> {
        let nr_nodes = u32::try_from(nr_nodes)
            .map_err(|_| Error::Config(format!("{nr_nodes} compute nodes is too many")))?;
        let nodes = (0..nr_nodes)
            .map(|id| ComputeNode::new(NodeId(id), handle.clone()))
            .collect();
        Self::new(nodes, NodeId(0), NodeId(0), config)
    }

    /// Like [`Cluster::local`], on the runtime the caller is running on.
    pub fn from_current(nr_nodes: usize, config: EngineConfig) -> Result<Self> {
        let handle = Handle::try_current().map_err(|err| Error::Config(err.to_string()))?;
        Self::local(handle, nr_nodes, config)
    }

    pub fn nr_nodes(&self) -> usize {
        self.inner.nodes.len()
    }

    pub fn nodes(&self) -> &[ComputeNode] {
        &self.inner.nodes
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inner.nodes.iter().map(ComputeNode::id)
    }

    /// The identity of the `idx`-th node of the snapshot.
    ///
    /// # Panics
    ///
    /// If `idx >= self.nr_nodes()`.
    pub fn node_at(&self, idx: usize) -> NodeId {
        self.inner.nodes[idx].id
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.find(node).is_some()
    }

    /// The node the caller runs on.
    pub fn here(&self) -> NodeId {
        self.inner.here
    }

    /// The node coordinating the computation.
    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The same membership with a different configuration.
    pub fn with_config(&self, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(ClusterInner {
                nodes: self.inner.nodes.clone(),
                here: self.inner.here,
                root: self.inner.root,
                config,
            }),
        }
    }

    fn find(&self, node: NodeId) -> Option<&ComputeNode> {
        self.inner.nodes.iter().find(|candidate| candidate.id == node)
    }

    /// Runs `task` on `node` and returns a future of its output.
    ///
    /// The task starts running right away, whether or not the returned future is polled. A task
    /// that panics or is cancelled resolves to [`Error::RemoteTask`].
    pub fn invoke<F>(&self, node: NodeId, task: F) -> BoxFuture<'static, Result<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let Some(target) = self.find(node) else {
            return futures::future::ready(Err(Error::UnknownNode(node.0))).boxed();
        };
        trace!(%node, "invoke");
        let join = target.handle.spawn(task);
        join.map(|result| result.map_err(Error::from)).boxed()
    }

    /// Runs the blocking closure `f` on `node`'s blocking thread pool.
    pub fn invoke_blocking<F, R>(&self, node: NodeId, f: F) -> BoxFuture<'static, Result<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let Some(target) = self.find(node) else {
            return futures::future::ready(Err(Error::UnknownNode(node.0))).boxed();
        };
        trace!(%node, "invoke blocking");
        let join = target.handle.spawn_blocking(f);
        join.map(|result| result.map_err(Error::from)).boxed()
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("nodes", &self.node_ids().collect::<Vec<_>>())
            .field("here", &self.inner.here)
            .field("root", &self.inner.root)
            .field("config", &self.inner.config)
            .finish()
    }
}
