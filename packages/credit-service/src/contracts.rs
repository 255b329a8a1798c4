//! Request/response contracts for the credit service.
//!
//! Plain immutable value pairs; each request type has exactly one response
//! type, bound when the service's methods are mapped into the pipeline.

/// Look up a customer's credit balance.
#[derive(Debug, Clone, PartialEq)]
pub struct GetCreditsRequest {
    pub customer_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetCreditsResponse {
    pub credits: f64,
    /// False when the customer has no ledger entry; `credits` is then zero.
    pub customer_found: bool,
}

/// Add credits to a customer's balance, creating the entry if absent.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementCreditsRequest {
    pub customer_id: u32,
    pub credits: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementCreditsResponse;
