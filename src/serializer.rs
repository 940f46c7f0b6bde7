// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Orders concurrent accesses to a shared resource by generation.
//!
//! Tasks touching the same resource (e.g. collectively opening the same file on every node) may
//! be scheduled in any order, but must run in the order in which they were issued. The issuer
//! numbers them per resource, starting at 1, and every task
//!
//! 1. obtains the [`Promise`] for its own generation through [`Serializer::promise_for`],
//! 2. waits for [`Serializer::when_predecessor_done`] before touching the resource,
//! 3. [signals](Promise::signal) its promise once done.
//!
//! ```rust
//! # use tessera::Serializer;
//! # use futures::FutureExt;
//! # #[tokio::main]
//! # async fn main() -> tessera::Result<()> {
//! let mut serializer = Serializer::<&str, u32>::new();
//!
//! // generation 2 is issued before generation 1
//! let second = serializer.promise_for("dataset.h5", 2).unwrap();
//! let after_first = serializer.when_predecessor_done("dataset.h5", 2);
//! let first = serializer.promise_for("dataset.h5", 1).unwrap();
//! let after_nothing = serializer.when_predecessor_done("dataset.h5", 1);
//!
//! assert!(after_first.clone().now_or_never().is_none());
//! after_nothing.await?;
//! first.signal();
//! after_first.await?;
//! second.signal();
//! # Ok(())
//! # }
//! ```
//!
//! A task that never signals its promise blocks all later generations of its key, unless the
//! promise is dropped: then the later generations fail with [`Error::PredecessorAbandoned`].
//!
//! A [`Serializer`] is not synchronized. All calls for one process have to come from a single
//! task, typically the one issuing the ordered operations. The futures it hands out can be
//! awaited anywhere.
use crate::{Error, Result};
use ahash::RandomState;
use futures::{
    FutureExt,
    channel::oneshot,
    future::{BoxFuture, Shared},
};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    hash::Hash,
};
use tracing::trace;

/// A sequence number. The first issued generation is the successor of [`Generation::ZERO`].
pub trait Generation: Copy + Ord + fmt::Debug {
    const ZERO: Self;

    fn next(self) -> Self;

    /// The preceding generation, `None` for [`ZERO`](Generation::ZERO).
    fn previous(self) -> Option<Self>;
}

crate::impl_generation!(u32, u64, usize);

/// Resolves once a generation has signalled its promise.
pub type Done = Shared<BoxFuture<'static, Result<()>>>;

/// Completion handle of one generation.
#[must_use = "later generations wait until the promise is signalled or dropped"]
#[derive(Debug)]
pub struct Promise {
    sender: oneshot::Sender<()>,
}

impl Promise {
    /// Allows the next generation to proceed.
    pub fn signal(self) {
        // nobody waiting for the next generation is fine
        let _ = self.sender.send(());
    }
}

struct Slot {
    /// Taken once handed out.
    promise: Option<Promise>,
    done: Done,
}

impl Slot {
    fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        let done = receiver
            .map(|signalled| signalled.map_err(|_| Error::PredecessorAbandoned))
            .boxed()
            .shared();
        Self {
            promise: Some(Promise { sender }),
            done,
        }
    }

    fn completed() -> Self {
        let slot = Self::new();
        if let Some(promise) = slot.promise {
            promise.signal();
        }
        Self {
            promise: None,
            done: slot.done,
        }
    }
}

/// Generations per key.
pub struct Serializer<K, G> {
    generations: HashMap<K, BTreeMap<G, Slot>, RandomState>,
}

impl<K, G> Serializer<K, G>
where
    K: Hash + Eq + Clone + fmt::Debug,
    G: Generation,
{
    pub fn new() -> Self {
        Self {
            generations: HashMap::default(),
        }
    }

    /// The promise of `generation` under `key`.
    ///
    /// Generations may be requested in any order; missing generations in between are created
    /// on the fly. Returns `None` if the promise was handed out before.
    ///
    /// # Panics
    ///
    /// If `generation` is [`Generation::ZERO`], which is reserved for the completed generation
    /// preceding the first one.
    pub fn promise_for(&mut self, key: K, generation: G) -> Option<Promise> {
        assert!(
            generation > G::ZERO,
            "generation {generation:?} is reserved"
        );
        self.slots(key, generation)
            .get_mut(&generation)
            .and_then(|slot| slot.promise.take())
    }

    /// Resolves once the generation preceding `generation` under `key` is done.
    ///
    /// Can be called any number of times.
    ///
    /// # Panics
    ///
    /// If `generation` is [`Generation::ZERO`].
    pub fn when_predecessor_done(&mut self, key: K, generation: G) -> Done {
        let Some(predecessor) = generation.previous() else {
            panic!("generation {generation:?} has no predecessor");
        };
        let slots = self.slots(key, generation);
        match slots.get(&predecessor) {
            Some(slot) => slot.done.clone(),
            // slots() creates every generation up to `generation`
            None => unreachable!("generation {predecessor:?} missing"),
        }
    }

    /// Number of generations known for `key`, including the synthetic first one.
    pub fn nr_generations(&self, key: &K) -> usize {
        self.generations.get(key).map_or(0, BTreeMap::len)
    }

    /// The slots of `key`, with every generation up to `generation` present.
    fn slots(&mut self, key: K, generation: G) -> &mut BTreeMap<G, Slot> {
        let slots = self.generations.entry(key.clone()).or_default();
        if slots.is_empty() {
            slots.insert(G::ZERO, Slot::completed());
        }
        let last = slots.keys().next_back().copied().unwrap_or(G::ZERO);
        if last < generation {
            trace!(?key, from = ?last.next(), to = ?generation, "adding generations");
            let mut new = last;
            while new < generation {
                new = new.next();
                slots.insert(new, Slot::new());
            }
        }
        slots
    }
}

impl<K, G> Default for Serializer<K, G>
where
    K: Hash + Eq + Clone + fmt::Debug,
    G: Generation,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, G: fmt::Debug> fmt::Debug for Serializer<K, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.generations
                    .iter()
                    .map(|(key, slots)| (key, slots.keys().collect::<Vec<_>>())),
            )
            .finish()
    }
}
