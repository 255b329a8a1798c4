//! In-memory credit ledger.
//!
//! The business methods are ordinary async functions; the pipeline invokes
//! them as opaque handlers. When hosted behind a partitioned chain, all
//! requests for one customer are serialized by the partition's queue, so the
//! ledger mutex only guards against cross-partition lookups.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::contracts::{
    GetCreditsRequest, GetCreditsResponse, IncrementCreditsRequest, IncrementCreditsResponse,
};

/// Credit balances keyed by customer id.
pub struct CreditService {
    ledger: Mutex<HashMap<u32, f64>>,
}

impl CreditService {
    /// Creates a ledger seeded with a few demo customers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ledger: Mutex::new(HashMap::from([(1, 12.5), (2, 23.4), (3, 15.0)])),
        }
    }

    /// Current balance for a customer.
    ///
    /// # Errors
    ///
    /// Infallible today; the signature matches the pipeline's handler
    /// contract.
    pub async fn get_credits(&self, request: GetCreditsRequest) -> anyhow::Result<GetCreditsResponse> {
        let (credits, customer_found) = {
            let ledger = self.ledger.lock();
            ledger
                .get(&request.customer_id)
                .map_or((0.0, false), |&credits| (credits, true))
        };

        // Stand-in for datastore latency.
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(GetCreditsResponse { credits, customer_found })
    }

    /// Add credits to a customer, creating the entry if absent.
    ///
    /// # Errors
    ///
    /// Infallible today; the signature matches the pipeline's handler
    /// contract.
    pub async fn increment_credits(
        &self,
        request: IncrementCreditsRequest,
    ) -> anyhow::Result<IncrementCreditsResponse> {
        let mut ledger = self.ledger.lock();
        *ledger.entry(request.customer_id).or_insert(0.0) += request.credits;
        Ok(IncrementCreditsResponse)
    }
}

impl Default for CreditService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_customer_is_found() {
        let service = CreditService::new();
        let response = service.get_credits(GetCreditsRequest { customer_id: 1 }).await.unwrap();
        assert!(response.customer_found);
        assert!((response.credits - 12.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unknown_customer_is_reported_not_found() {
        let service = CreditService::new();
        let response = service.get_credits(GetCreditsRequest { customer_id: 99 }).await.unwrap();
        assert!(!response.customer_found);
        assert!((response.credits - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn increment_creates_missing_entries() {
        let service = CreditService::new();
        service
            .increment_credits(IncrementCreditsRequest { customer_id: 42, credits: 5.0 })
            .await
            .unwrap();
        let response = service.get_credits(GetCreditsRequest { customer_id: 42 }).await.unwrap();
        assert!(response.customer_found);
        assert!((response.credits - 5.0).abs() < f64::EPSILON);
    }
}
