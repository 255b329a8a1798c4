//! Pipeline builder: assembles the middleware chain, configuration-time only.
//!
//! The chain grows head-first: each `with_*` call wraps the current head, so
//! stages added later sit closer to the caller and execute first on the way
//! in. The builder also collects every stage owning background work, in
//! registration order, for the facade's lifecycle handling.

use std::sync::Arc;

use crate::dispatch::OperationDispatch;
use crate::invoke::{InvokeStage, MethodMap};
use crate::middleware::logging::LoggingStage;
use crate::middleware::partition::{PartitionKeyMap, PartitionStage};
use crate::middleware::queue::QueueStage;
use crate::stage::DispatchStage;

/// Accumulates prepended stages over an invocation stage.
pub struct DispatchBuilder {
    head: Arc<dyn DispatchStage>,
    background: Vec<Arc<dyn DispatchStage>>,
}

impl DispatchBuilder {
    /// Starts a chain whose tail invokes the handlers in `methods`.
    #[must_use]
    pub fn new(methods: MethodMap) -> Self {
        Self {
            head: Arc::new(InvokeStage::new(methods)),
            background: Vec::new(),
        }
    }

    /// Prepend an arbitrary middleware built from the current head.
    ///
    /// For stages without background work; a custom stage owning a worker
    /// must be started by the host itself.
    #[must_use]
    pub fn with_stage<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(Arc<dyn DispatchStage>) -> Arc<dyn DispatchStage>,
    {
        self.head = wrap(self.head);
        self
    }

    /// Prepend request/outcome logging.
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.with_stage(|next| Arc::new(LoggingStage::new(next)))
    }

    /// Prepend a bounded queue stage with the given capacity.
    #[must_use]
    pub fn with_queue(mut self, capacity: usize) -> Self {
        let stage = Arc::new(QueueStage::new(Arc::clone(&self.head), capacity));
        self.background.push(stage.clone());
        self.head = stage;
        self
    }

    /// Prepend a partition stage whose backends each serialize their slice of
    /// the key space through an independent bounded queue over the chain
    /// built so far.
    #[must_use]
    pub fn with_partitions(
        mut self,
        partition_count: usize,
        queue_capacity: usize,
        keys: PartitionKeyMap,
    ) -> Self {
        let next = Arc::clone(&self.head);
        let stage = Arc::new(PartitionStage::new(partition_count, keys, move |_index| {
            Arc::new(QueueStage::new(Arc::clone(&next), queue_capacity)) as Arc<dyn DispatchStage>
        }));
        self.background.push(stage.clone());
        self.head = stage;
        self
    }

    /// Prepend a partition stage with caller-built backends. The factory
    /// receives the partition index and the chain built so far.
    #[must_use]
    pub fn with_partition_backends<F>(
        mut self,
        partition_count: usize,
        keys: PartitionKeyMap,
        make_backend: F,
    ) -> Self
    where
        F: Fn(usize, &Arc<dyn DispatchStage>) -> Arc<dyn DispatchStage>,
    {
        let next = Arc::clone(&self.head);
        let stage = Arc::new(PartitionStage::new(partition_count, keys, move |index| {
            make_backend(index, &next)
        }));
        self.background.push(stage.clone());
        self.head = stage;
        self
    }

    /// Publish the chain behind a facade. The chain's shape is immutable from
    /// here on.
    #[must_use]
    pub fn build(self) -> OperationDispatch {
        OperationDispatch::new(self.head, self.background)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
