//! Request/response envelope types and the dispatch error taxonomy.
//!
//! A request travels the middleware chain as an [`OperationRequest`]: the
//! typed payload boxed behind `Any`, plus a per-request cancellation token.
//! Stages route on the payload's *type*, never its contents; the payload is
//! only unboxed by the invocation stage at the tail of the chain.

use std::any::{Any, TypeId};

use tokio_util::sync::CancellationToken;

/// Opaque response value carried back up the chain.
///
/// The facade downcasts it to the caller's expected response type; every
/// request type has exactly one response type, bound at registration time.
pub type OpaqueResponse = Box<dyn Any + Send>;

// ---------------------------------------------------------------------------
// OperationRequest
// ---------------------------------------------------------------------------

/// Opaque request envelope flowing through the dispatch chain.
///
/// Carries the payload, the payload's type name (diagnostics only), and the
/// request's own cancellation token. The token cancels the *waiting* side of
/// a queued submission; it never aborts a handler that is already running.
pub struct OperationRequest {
    payload: Box<dyn Any + Send>,
    payload_type_name: &'static str,
    cancellation: CancellationToken,
}

impl OperationRequest {
    /// Wraps a typed request with a fresh, never-cancelled token.
    #[must_use]
    pub fn new<T: Any + Send>(payload: T) -> Self {
        Self::with_cancellation(payload, CancellationToken::new())
    }

    /// Wraps a typed request with an externally supplied cancellation token.
    #[must_use]
    pub fn with_cancellation<T: Any + Send>(payload: T, cancellation: CancellationToken) -> Self {
        Self {
            payload: Box::new(payload),
            payload_type_name: std::any::type_name::<T>(),
            cancellation,
        }
    }

    /// `TypeId` of the concrete payload -- the sole routing key for dispatch.
    #[must_use]
    pub fn payload_type(&self) -> TypeId {
        self.payload.as_ref().type_id()
    }

    /// Name of the concrete payload type, for logs and error messages.
    #[must_use]
    pub fn payload_type_name(&self) -> &'static str {
        self.payload_type_name
    }

    /// The request's own cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Borrow the payload for type-directed inspection (partition key lookup).
    #[must_use]
    pub fn payload(&self) -> &(dyn Any + Send) {
        self.payload.as_ref()
    }

    /// Consume the envelope, yielding the boxed payload for handler invocation.
    #[must_use]
    pub fn into_payload(self) -> Box<dyn Any + Send> {
        self.payload
    }
}

impl std::fmt::Debug for OperationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRequest")
            .field("payload_type", &self.payload_type_name)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// Errors surfaced by the dispatch pipeline.
///
/// All variants are request-scoped: no error processing one request may
/// terminate a queue worker or affect other in-flight requests.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No handler bound for the request's runtime type.
    #[error("no handler registered for request type {request_type}")]
    UnregisteredRequestType { request_type: &'static str },

    /// A handler or partition key was registered twice for the same type.
    #[error("registration already exists for request type {request_type}")]
    DuplicateRegistration { request_type: &'static str },

    /// The caller's own cancellation fired while waiting for queue space or
    /// for the completion slot.
    #[error("submission cancelled by the caller")]
    SubmissionCancelled,

    /// The queue stage stopped before the request was processed. Raised when
    /// the completion slot is dropped unresolved (request abandoned at
    /// shutdown) or when submitting to a stopped stage.
    #[error("queue stage stopped before the request completed")]
    QueueStopped,

    /// Computed partition index has no backing partition.
    #[error("partition index {index} out of range for {partition_count} partitions")]
    InvalidPartitionIndex { index: i64, partition_count: usize },

    /// The opaque response did not downcast to the caller's expected type.
    /// A programming defect: the registration table bound a different
    /// response type for this request.
    #[error("response type mismatch: expected {expected}")]
    ResponseTypeMismatch { expected: &'static str },

    /// Failure raised by the handler itself, propagated unchanged to the
    /// original caller. Never retried by the pipeline.
    #[error("handler failed: {0}")]
    Handler(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn payload_type_is_concrete_type() {
        let request = OperationRequest::new(Ping { seq: 7 });
        assert_eq!(request.payload_type(), TypeId::of::<Ping>());
        assert!(request.payload_type_name().ends_with("Ping"));
    }

    #[test]
    fn payload_downcasts_by_reference_and_by_value() {
        let request = OperationRequest::new(Ping { seq: 7 });
        assert_eq!(request.payload().downcast_ref::<Ping>(), Some(&Ping { seq: 7 }));

        let boxed = request.into_payload();
        let ping = boxed.downcast::<Ping>().expect("payload is a Ping");
        assert_eq!(*ping, Ping { seq: 7 });
    }

    #[test]
    fn external_token_is_threaded_through() {
        let token = CancellationToken::new();
        let request = OperationRequest::with_cancellation(Ping { seq: 1 }, token.clone());
        assert!(!request.cancellation().is_cancelled());
        token.cancel();
        assert!(request.cancellation().is_cancelled());
    }

    #[test]
    fn error_messages_name_the_request_type() {
        let err = DispatchError::UnregisteredRequestType { request_type: "Ping" };
        assert_eq!(err.to_string(), "no handler registered for request type Ping");

        let err = DispatchError::InvalidPartitionIndex { index: -1, partition_count: 4 };
        assert_eq!(err.to_string(), "partition index -1 out of range for 4 partitions");
    }
}
