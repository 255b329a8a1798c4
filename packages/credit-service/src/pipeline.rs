//! Wires the credit service's methods into a partitioned dispatch pipeline.

use std::sync::Arc;

use dispatch_core::{
    DispatchBuilder, DispatchConfig, DispatchError, MethodMap, OperationDispatch, PartitionKeyMap,
};

use crate::contracts::{GetCreditsRequest, IncrementCreditsRequest};
use crate::service::CreditService;

/// Build the service's pipeline: per-customer partitions, each draining a
/// bounded queue over the method invocation, with logging outermost.
///
/// Both methods key their partition by customer id, so all traffic for one
/// customer flows through one single-worker queue in submission order.
///
/// # Errors
///
/// Returns [`DispatchError::DuplicateRegistration`] if wiring registers a
/// request type twice (a programming defect in this module).
pub fn build_dispatch(
    service: Arc<CreditService>,
    config: &DispatchConfig,
) -> Result<OperationDispatch, DispatchError> {
    let mut methods = MethodMap::new();

    let get = Arc::clone(&service);
    methods.map_method(move |request: GetCreditsRequest| {
        let service = Arc::clone(&get);
        async move { service.get_credits(request).await }
    })?;

    let increment = Arc::clone(&service);
    methods.map_method(move |request: IncrementCreditsRequest| {
        let service = Arc::clone(&increment);
        async move { service.increment_credits(request).await }
    })?;

    let mut keys = PartitionKeyMap::new();
    keys.map_key(|request: &GetCreditsRequest| i64::from(request.customer_id))?;
    keys.map_key(|request: &IncrementCreditsRequest| i64::from(request.customer_id))?;

    Ok(DispatchBuilder::new(methods)
        .with_partitions(config.partition_count, config.queue_capacity, keys)
        .with_logging()
        .build())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{GetCreditsResponse, IncrementCreditsResponse};

    struct UnmappedRequest;

    fn test_config() -> DispatchConfig {
        DispatchConfig { queue_capacity: 32, partition_count: 4 }
    }

    async fn started_dispatch() -> OperationDispatch {
        let dispatch = build_dispatch(Arc::new(CreditService::new()), &test_config()).unwrap();
        dispatch.start().await.unwrap();
        dispatch
    }

    #[tokio::test]
    async fn reads_a_seeded_balance_end_to_end() {
        let dispatch = started_dispatch().await;

        let response: GetCreditsResponse = dispatch
            .execute_operation(GetCreditsRequest { customer_id: 2 })
            .await
            .unwrap();
        assert!(response.customer_found);
        assert!((response.credits - 23.4).abs() < f64::EPSILON);

        dispatch.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_increments_for_one_customer_are_all_applied() {
        let dispatch = Arc::new(started_dispatch().await);

        let writers: Vec<_> = (0..100)
            .map(|_| {
                let dispatch = Arc::clone(&dispatch);
                tokio::spawn(async move {
                    dispatch
                        .execute_operation::<IncrementCreditsRequest, IncrementCreditsResponse>(
                            IncrementCreditsRequest { customer_id: 7, credits: 1.0 },
                        )
                        .await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let response: GetCreditsResponse = dispatch
            .execute_operation(GetCreditsRequest { customer_id: 7 })
            .await
            .unwrap();
        assert!((response.credits - 100.0).abs() < f64::EPSILON);

        dispatch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unmapped_request_type_surfaces_through_the_whole_chain() {
        let dispatch = started_dispatch().await;

        let err = dispatch
            .execute_operation::<UnmappedRequest, GetCreditsResponse>(UnmappedRequest)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnregisteredRequestType { .. }));

        dispatch.stop().await.unwrap();
    }

    #[tokio::test]
    async fn operations_after_stop_are_rejected() {
        let dispatch = started_dispatch().await;
        dispatch.stop().await.unwrap();

        let err = dispatch
            .execute_operation::<GetCreditsRequest, GetCreditsResponse>(GetCreditsRequest {
                customer_id: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::QueueStopped));
    }
}
