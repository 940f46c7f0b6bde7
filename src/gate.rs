// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Bounds the number of time steps an iterative algorithm has in flight.
//!
//! Requesting the partitions of a time step is cheap compared to computing them, so a loop
//! issuing time steps quickly runs far ahead of the computation, growing the graph of pending
//! tasks without bound. A [`StepGate`] lets at most `max_in_flight_steps` steps be pending at
//! once: the loop [enters](StepGate::enter) the gate before issuing a step, and hands the
//! permit to [`StepPermit::release_when_ready`] with the step's output.
//!
//! ```rust
//! # use tessera::{Cluster, EngineConfig, StepGate, create_partitioned_array_filled};
//! # use tessera::focal::{FocalPolicies, Kernel, focal_sum};
//! # #[tokio::main(flavor = "multi_thread")]
//! # async fn main() -> tessera::Result<()> {
//! let cluster = Cluster::from_current(2, EngineConfig::for_testing())?;
//! let gate = StepGate::from_config(cluster.config())?;
//!
//! let mut state = create_partitioned_array_filled(&cluster, [8, 8], [4, 4], 1_u64)?;
//! for _ in 0..10 {
//!     let permit = gate.enter().await?;
//!     state = focal_sum(&state, &Kernel::box_kernel(1, true), FocalPolicies::with_fill_value(0))?;
//!     permit.release_when_ready(&state);
//! }
//! state.wait_all().await?;
//! # Ok(())
//! # }
//! ```
use crate::{
    Error, Result, config::EngineConfig, partition::Element, partitioned_array::PartitionedArray,
};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Counting gate for time steps.
#[derive(Debug, Clone)]
pub struct StepGate {
    semaphore: Arc<Semaphore>,
    max_in_flight_steps: usize,
}

impl StepGate {
    pub fn new(max_in_flight_steps: usize) -> Result<Self> {
        if max_in_flight_steps == 0 {
            return Err(Error::Config(
                "a step gate needs room for at least one step".to_string(),
            ));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight_steps)),
            max_in_flight_steps,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(config.max_in_flight_steps)
    }

    /// Waits until fewer than `max_in_flight_steps` steps are in flight.
    pub async fn enter(&self) -> Result<StepPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Config("step gate closed".to_string()))?;
        Ok(StepPermit { permit })
    }

    /// Number of steps currently in flight.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight_steps - self.semaphore.available_permits()
    }

    pub fn max_in_flight_steps(&self) -> usize {
        self.max_in_flight_steps
    }
}

/// One in-flight step. Dropping the permit retires the step.
#[derive(Debug)]
#[must_use = "the step retires as soon as the permit is dropped"]
pub struct StepPermit {
    permit: OwnedSemaphorePermit,
}

impl StepPermit {
    /// Retires the step once every partition of `array`, the step's output, exists.
    ///
    /// The wait runs on the array's root node. A failed partition retires the step as well; the
    /// failure itself surfaces wherever the partition is awaited.
    pub fn release_when_ready<T: Element, const RANK: usize>(self, array: &PartitionedArray<T, RANK>) {
        let cluster = array.cluster().clone();
        let array = array.clone();
        let _detached = cluster.invoke(cluster.root(), async move {
            match array.wait_all().await {
                Ok(()) => debug!(nr_partitions = array.nr_partitions(), "step retired"),
                Err(err) => warn!(%err, "step retired with failed partitions"),
            }
            drop(self.permit);
        });
    }
}
