//! Partition middleware: fans requests out to independent backend chains by a
//! deterministic key, giving per-key ordering without locking shared state.
//!
//! Each backend is typically a queue stage wrapping the rest of the chain, so
//! all requests that hash to the same partition are serialized through that
//! partition's single worker. Requests on different partitions interleave
//! freely; no ordering is guaranteed between them.

use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;

use crate::hash::fnv1a_hash;
use crate::operation::{DispatchError, OpaqueResponse, OperationRequest};
use crate::stage::DispatchStage;

/// Key assigned to request types with no registered key function.
///
/// Deterministic, so all unmapped traffic lands on one partition instead of
/// failing; after normalization it indexes the last partition.
pub const FALLBACK_PARTITION_KEY: i64 = -1;

type KeyExtractor = Box<dyn Fn(&(dyn Any + Send)) -> Option<i64> + Send + Sync>;

// ---------------------------------------------------------------------------
// PartitionKeyMap
// ---------------------------------------------------------------------------

/// Per-request-type partition key functions.
///
/// Like the handler table, this is populated during setup and read-only
/// afterwards. Key values may be negative (hash-derived keys often are); the
/// partition stage normalizes them with a non-negative modulo before
/// indexing.
#[derive(Default)]
pub struct PartitionKeyMap {
    entries: HashMap<TypeId, KeyExtractor>,
}

impl PartitionKeyMap {
    /// Creates an empty key map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the partition key function for request type `Req`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DuplicateRegistration`] if a key function is
    /// already registered for `Req`.
    pub fn map_key<Req, F>(&mut self, key: F) -> Result<(), DispatchError>
    where
        Req: Any,
        F: Fn(&Req) -> i64 + Send + Sync + 'static,
    {
        match self.entries.entry(TypeId::of::<Req>()) {
            Entry::Occupied(_) => Err(DispatchError::DuplicateRegistration {
                request_type: std::any::type_name::<Req>(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(Box::new(move |payload| {
                    payload.downcast_ref::<Req>().map(|request| key(request))
                }));
                Ok(())
            }
        }
    }

    /// Register a string-field key for `Req`, routed through the fixed
    /// FNV-1a hash so the derived key is reproducible across runs.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DuplicateRegistration`] if a key function is
    /// already registered for `Req`.
    pub fn map_string_key<Req, F>(&mut self, field: F) -> Result<(), DispatchError>
    where
        Req: Any,
        F: Fn(&Req) -> &str + Send + Sync + 'static,
    {
        self.map_key::<Req, _>(move |request| i64::from(fnv1a_hash(field(request))))
    }

    /// Partition key for the given payload; [`FALLBACK_PARTITION_KEY`] when
    /// the request type has no registered key function.
    fn key_for(&self, type_id: TypeId, payload: &(dyn Any + Send)) -> i64 {
        self.entries
            .get(&type_id)
            .and_then(|extract| extract(payload))
            .unwrap_or(FALLBACK_PARTITION_KEY)
    }
}

impl std::fmt::Debug for PartitionKeyMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionKeyMap")
            .field("mapped_types", &self.entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PartitionStage
// ---------------------------------------------------------------------------

/// Routes each request to one of a fixed set of independent backends.
///
/// The backend set is built once at construction and never resized.
pub struct PartitionStage {
    partitions: Vec<Arc<dyn DispatchStage>>,
    keys: PartitionKeyMap,
}

impl PartitionStage {
    /// Builds `partition_count` backends via `make_backend` and routes with
    /// the given key map.
    ///
    /// # Panics
    ///
    /// Panics if `partition_count` is zero.
    #[must_use]
    pub fn new<F>(partition_count: usize, keys: PartitionKeyMap, make_backend: F) -> Self
    where
        F: Fn(usize) -> Arc<dyn DispatchStage>,
    {
        assert!(partition_count > 0, "partition_count must be positive");
        Self {
            partitions: (0..partition_count).map(make_backend).collect(),
            keys,
        }
    }

    /// Number of partitions, fixed at construction.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

#[async_trait]
impl DispatchStage for PartitionStage {
    async fn execute(&self, request: OperationRequest) -> Result<OpaqueResponse, DispatchError> {
        let key = self.keys.key_for(request.payload_type(), request.payload());
        #[allow(clippy::cast_possible_wrap)] // partition counts are tiny
        let index = key.rem_euclid(self.partitions.len() as i64);
        let partition = usize::try_from(index)
            .ok()
            .and_then(|i| self.partitions.get(i))
            .ok_or(DispatchError::InvalidPartitionIndex {
                index,
                partition_count: self.partitions.len(),
            })?;
        partition.execute(request).await
    }

    async fn start(&self) -> anyhow::Result<()> {
        // All partitions start in parallel.
        try_join_all(self.partitions.iter().map(|p| p.start())).await?;
        Ok(())
    }

    fn signal_stop(&self) {
        for partition in &self.partitions {
            partition.signal_stop();
        }
    }

    async fn stop(&self) -> anyhow::Result<()> {
        // Two-phase stop: signal every partition before awaiting any drain,
        // so one slow partition does not delay the others from starting theirs.
        self.signal_stop();
        try_join_all(self.partitions.iter().map(|p| p.stop())).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
