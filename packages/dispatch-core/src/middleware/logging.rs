//! Logging middleware: records each operation's request type, outcome, and
//! elapsed time around the rest of the chain.
//!
//! Only the envelope's type name is observed; payload and response contents
//! stay opaque.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::operation::{DispatchError, OpaqueResponse, OperationRequest};
use crate::stage::DispatchStage;

/// Middleware wrapping `next` with request/response logging.
pub struct LoggingStage {
    next: Arc<dyn DispatchStage>,
}

impl LoggingStage {
    /// Wraps the given next stage.
    #[must_use]
    pub fn new(next: Arc<dyn DispatchStage>) -> Self {
        Self { next }
    }
}

#[async_trait]
impl DispatchStage for LoggingStage {
    async fn execute(&self, request: OperationRequest) -> Result<OpaqueResponse, DispatchError> {
        let request_type = request.payload_type_name();
        debug!(request_type, "dispatching operation");

        let started = Instant::now();
        let result = self.next.execute(request).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &result {
            Ok(_) => debug!(request_type, elapsed_ms, "operation completed"),
            Err(error) => warn!(request_type, elapsed_ms, %error, "operation failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;

    struct EchoStage;

    #[async_trait]
    impl DispatchStage for EchoStage {
        async fn execute(&self, request: OperationRequest) -> Result<OpaqueResponse, DispatchError> {
            Ok(request.into_payload())
        }
    }

    #[tokio::test]
    async fn forwards_requests_and_responses_unchanged() {
        let stage = LoggingStage::new(Arc::new(EchoStage));
        let response = stage.execute(OperationRequest::new(Ping)).await.unwrap();
        assert!(response.downcast::<Ping>().is_ok());
    }

    #[tokio::test]
    async fn forwards_failures_unchanged() {
        struct FailStage;

        #[async_trait]
        impl DispatchStage for FailStage {
            async fn execute(&self, _request: OperationRequest) -> Result<OpaqueResponse, DispatchError> {
                Err(DispatchError::Handler(anyhow::anyhow!("boom")))
            }
        }

        let stage = LoggingStage::new(Arc::new(FailStage));
        let err = stage.execute(OperationRequest::new(Ping)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
    }
}
