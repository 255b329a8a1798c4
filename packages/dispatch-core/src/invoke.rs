//! Invocation stage: maps a request, by its runtime type, to the registered
//! handler and invokes it.
//!
//! The registration table is built once during setup and is read-only
//! afterwards, so the hot path is a single lock-free `HashMap` lookup keyed
//! by `TypeId`.

use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::operation::{DispatchError, OpaqueResponse, OperationRequest};
use crate::stage::DispatchStage;

type BoxedHandlerFuture = Pin<Box<dyn Future<Output = Result<OpaqueResponse, DispatchError>> + Send>>;

/// Type-erased asynchronous handler: opaque request in, opaque response out.
type BoxedHandler = Box<dyn Fn(Box<dyn Any + Send>) -> BoxedHandlerFuture + Send + Sync>;

struct HandlerEntry {
    request_type: &'static str,
    handler: BoxedHandler,
}

// ---------------------------------------------------------------------------
// MethodMap
// ---------------------------------------------------------------------------

/// Registration table binding each request type to exactly one handler.
///
/// Populated during setup via [`MethodMap::map_method`], then moved into an
/// [`InvokeStage`]; no registration is possible after construction.
#[derive(Default)]
pub struct MethodMap {
    entries: HashMap<TypeId, HandlerEntry>,
}

impl MethodMap {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `method` as the handler for request type `Req`.
    ///
    /// The response type `Resp` is fixed here; the facade later downcasts the
    /// opaque result back to it. Handler failures propagate unchanged to the
    /// original caller as [`DispatchError::Handler`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DuplicateRegistration`] if a handler is
    /// already bound for `Req`.
    pub fn map_method<Req, Resp, F, Fut>(&mut self, method: F) -> Result<(), DispatchError>
    where
        Req: Any + Send,
        Resp: Any + Send,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Resp>> + Send + 'static,
    {
        let entry = match self.entries.entry(TypeId::of::<Req>()) {
            Entry::Occupied(_) => {
                return Err(DispatchError::DuplicateRegistration {
                    request_type: std::any::type_name::<Req>(),
                });
            }
            Entry::Vacant(vacant) => vacant,
        };

        let handler: BoxedHandler = Box::new(move |payload| {
            match payload.downcast::<Req>() {
                Ok(request) => {
                    let response = method(*request);
                    Box::pin(async move {
                        let response = response.await.map_err(DispatchError::Handler)?;
                        Ok(Box::new(response) as OpaqueResponse)
                    })
                }
                // Unreachable when routed by TypeId; fail rather than panic.
                Err(_) => Box::pin(async {
                    Err(DispatchError::Handler(anyhow::anyhow!(
                        "payload does not match the registered request type"
                    )))
                }),
            }
        });

        entry.insert(HandlerEntry {
            request_type: std::any::type_name::<Req>(),
            handler,
        });
        Ok(())
    }

    fn get(&self, type_id: TypeId) -> Option<&HandlerEntry> {
        self.entries.get(&type_id)
    }
}

impl std::fmt::Debug for MethodMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types: Vec<&str> = self.entries.values().map(|e| e.request_type).collect();
        f.debug_struct("MethodMap").field("request_types", &types).finish()
    }
}

// ---------------------------------------------------------------------------
// InvokeStage
// ---------------------------------------------------------------------------

/// Terminal stage of every chain: looks up the handler bound to the request's
/// runtime type and awaits it.
///
/// Has no side effects of its own; handlers are black boxes to the pipeline.
pub struct InvokeStage {
    methods: MethodMap,
}

impl InvokeStage {
    /// Wraps a finished registration table.
    #[must_use]
    pub fn new(methods: MethodMap) -> Self {
        Self { methods }
    }
}

#[async_trait]
impl DispatchStage for InvokeStage {
    async fn execute(&self, request: OperationRequest) -> Result<OpaqueResponse, DispatchError> {
        let Some(entry) = self.methods.get(request.payload_type()) else {
            return Err(DispatchError::UnregisteredRequestType {
                request_type: request.payload_type_name(),
            });
        };
        (entry.handler)(request.into_payload()).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Echo {
        value: String,
    }

    struct EchoResponse {
        value: String,
    }

    struct Unmapped;

    #[tokio::test]
    async fn invokes_the_registered_handler() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();

        let mut methods = MethodMap::new();
        methods
            .map_method(move |request: Echo| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(EchoResponse { value: request.value })
                }
            })
            .unwrap();

        let stage = InvokeStage::new(methods);
        let response = stage
            .execute(OperationRequest::new(Echo { value: "a".into() }))
            .await
            .unwrap();

        let response = response.downcast::<EchoResponse>().unwrap();
        assert_eq!(response.value, "a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregistered_type_fails_without_invoking_anything() {
        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();

        let mut methods = MethodMap::new();
        methods
            .map_method(move |request: Echo| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(EchoResponse { value: request.value })
                }
            })
            .unwrap();

        let stage = InvokeStage::new(methods);
        let err = stage.execute(OperationRequest::new(Unmapped)).await.unwrap_err();

        assert!(matches!(err, DispatchError::UnregisteredRequestType { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let mut methods = MethodMap::new();
        methods
            .map_method(|request: Echo| async move { Ok(EchoResponse { value: request.value }) })
            .unwrap();

        let err = methods
            .map_method(|request: Echo| async move { Ok(EchoResponse { value: request.value }) })
            .unwrap_err();

        assert!(matches!(err, DispatchError::DuplicateRegistration { .. }));
    }

    #[tokio::test]
    async fn handler_failure_propagates_unchanged() {
        let mut methods = MethodMap::new();
        methods
            .map_method(|_request: Echo| async move {
                Err::<EchoResponse, _>(anyhow::anyhow!("ledger unavailable"))
            })
            .unwrap();

        let stage = InvokeStage::new(methods);
        let err = stage
            .execute(OperationRequest::new(Echo { value: "a".into() }))
            .await
            .unwrap_err();

        match err {
            DispatchError::Handler(source) => {
                assert_eq!(source.to_string(), "ledger unavailable");
            }
            other => panic!("expected Handler error, got {other:?}"),
        }
    }
}
