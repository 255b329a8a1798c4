//! Dispatch facade: the externally visible entry point of a built pipeline.

use std::any::Any;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::operation::{DispatchError, OperationRequest};
use crate::stage::DispatchStage;

/// Typed entry point over the head of a configured middleware chain.
///
/// Also the host's lifecycle surface: [`OperationDispatch::start`] must run
/// once before traffic, [`OperationDispatch::stop`] exactly once at shutdown,
/// and no operation may be executed after `stop` returns.
pub struct OperationDispatch {
    head: Arc<dyn DispatchStage>,
    /// Stages owning background work, in builder registration order
    /// (innermost first).
    background: Vec<Arc<dyn DispatchStage>>,
}

impl OperationDispatch {
    pub(crate) fn new(head: Arc<dyn DispatchStage>, background: Vec<Arc<dyn DispatchStage>>) -> Self {
        Self { head, background }
    }

    /// Execute a typed operation with a fresh, never-cancelled token.
    ///
    /// # Errors
    ///
    /// Any [`DispatchError`] raised along the chain, including the bound
    /// handler's own failure.
    pub async fn execute_operation<Req, Resp>(&self, request: Req) -> Result<Resp, DispatchError>
    where
        Req: Any + Send,
        Resp: Any + Send,
    {
        self.execute_operation_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Execute a typed operation, threading an external cancellation token
    /// into the submission. Cancellation unblocks the waiting side only; a
    /// handler already running is never aborted.
    ///
    /// # Errors
    ///
    /// Any [`DispatchError`] raised along the chain;
    /// [`DispatchError::ResponseTypeMismatch`] if the registration bound a
    /// different response type for `Req` than the caller expects.
    pub async fn execute_operation_with_cancellation<Req, Resp>(
        &self,
        request: Req,
        cancellation: CancellationToken,
    ) -> Result<Resp, DispatchError>
    where
        Req: Any + Send,
        Resp: Any + Send,
    {
        let request = OperationRequest::with_cancellation(request, cancellation);
        let response = self.head.execute(request).await?;
        response
            .downcast::<Resp>()
            .map(|boxed| *boxed)
            .map_err(|_| DispatchError::ResponseTypeMismatch {
                expected: std::any::type_name::<Resp>(),
            })
    }

    /// Start every stage owning background work, in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first stage's start failure (e.g. started twice).
    pub async fn start(&self) -> anyhow::Result<()> {
        for stage in &self.background {
            stage.start().await?;
        }
        Ok(())
    }

    /// Stop every stage owning background work: signal all of them first
    /// (outermost first), then await each drain.
    ///
    /// # Errors
    ///
    /// Returns the first stage's stop failure (e.g. a panicked worker).
    pub async fn stop(&self) -> anyhow::Result<()> {
        for stage in self.background.iter().rev() {
            stage.signal_stop();
        }
        for stage in self.background.iter().rev() {
            stage.stop().await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
