//! Sample credit-ledger service hosted on the operation dispatch pipeline.
//!
//! Demonstrates the full consumer surface: typed request/response contracts,
//! plain async business methods, pipeline wiring with per-customer
//! partitioning, and (in the binary) host lifecycle handling.

pub mod contracts;
pub mod pipeline;
pub mod service;

pub use contracts::{
    GetCreditsRequest, GetCreditsResponse, IncrementCreditsRequest, IncrementCreditsResponse,
};
pub use pipeline::build_dispatch;
pub use service::CreditService;
