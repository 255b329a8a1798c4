//! The stage contract every link of the dispatch chain implements.

use async_trait::async_trait;

use crate::operation::{DispatchError, OpaqueResponse, OperationRequest};

/// A composable unit of the dispatch chain.
///
/// Every stage exposes exactly one request-path capability: execute an opaque
/// request and return an opaque response, or fail. Middleware stages hold a
/// reference to their "next" stage, fixed at construction, so the chain forms
/// an immutable forward-only linked structure assembled once by the builder.
///
/// Stages that own background work (a queue stage's worker task, a partition
/// stage's backends) additionally override the lifecycle methods. The host
/// calls `start` once before routing traffic and `stop` exactly once during
/// shutdown; the `signal_stop`/`stop` split lets a supervisor signal several
/// stages first and then await all of their drains concurrently, so one slow
/// drain does not delay the others from beginning theirs.
#[async_trait]
pub trait DispatchStage: Send + Sync {
    /// Process one request and return its response.
    async fn execute(&self, request: OperationRequest) -> Result<OpaqueResponse, DispatchError>;

    /// Start background work owned by this stage. No-op by default.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage was already started.
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Signal shutdown without waiting for it to complete. No-op by default.
    fn signal_stop(&self) {}

    /// Signal shutdown (if not already signalled) and wait for background
    /// work to finish. No-op by default.
    ///
    /// # Errors
    ///
    /// Returns an error if a background task panicked or was aborted.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
