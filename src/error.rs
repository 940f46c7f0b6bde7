// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Errors reported by partitioned-array operations.
//!
//! Configuration problems (shapes that cannot be partitioned, a cluster that is too large for
//! the requested array) are reported synchronously, before any partition work is scheduled.
//! Failures of remote computations travel through the partition futures instead and are
//! re-raised by whoever awaits them, which is why [`Error`] is [`Clone`].
//!
//! Structural invariants of the algorithms themselves (for example a flow-accumulation offset
//! that does not point out of its partition) are not represented here. Those are checked with
//! debug assertions.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{what} shape must not be empty: {shape:?}")]
    EmptyShape { what: &'static str, shape: Vec<usize> },

    #[error("partition shape {partition_shape:?} does not fit in array shape {array_shape:?}")]
    PartitionLargerThanArray {
        array_shape: Vec<usize>,
        partition_shape: Vec<usize>,
    },

    #[error("not enough partitions to use all compute nodes ({nr_partitions} < {nr_nodes})")]
    InsufficientPartitions { nr_partitions: usize, nr_nodes: usize },

    #[error("cluster snapshot does not contain any compute nodes")]
    NoNodes,

    #[error("compute node {0} is not part of the cluster snapshot")]
    UnknownNode(u32),

    #[error("buffer holds {actual} elements, but the array needs {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("expected an array of shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("expected {expected} partitions, got {actual}")]
    BatchSize { expected: usize, actual: usize },

    #[error("remote task failed: {0}")]
    RemoteTask(String),

    #[error("predecessor generation was dropped without being signalled")]
    PredecessorAbandoned,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Error::RemoteTask("task was cancelled".to_string())
        } else {
            Error::RemoteTask(err.to_string())
        }
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
