//! Operation dispatch pipeline: a composable chain of request-processing
//! stages terminating in a typed method invocation.
//!
//! The moving parts, innermost first:
//!
//! 1. **Invocation** ([`invoke`]): routes a request, by its runtime type, to
//!    the one handler registered for it.
//! 2. **Middleware** ([`middleware`]): queueing, partitioning, and logging
//!    stages, each wrapping a "next" stage fixed at construction.
//! 3. **Builder** ([`builder`]): assembles the chain head-first; stages added
//!    later execute first.
//! 4. **Facade** ([`dispatch`]): the typed `execute_operation` entry point
//!    plus start/stop lifecycle over the chain's background workers.
//!
//! The pipeline is purely in-process: no wire protocol, no persistence, and
//! no business semantics — handlers are opaque asynchronous functions bound
//! at startup.

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod hash;
pub mod invoke;
pub mod middleware;
pub mod operation;
pub mod stage;

pub use builder::DispatchBuilder;
pub use config::DispatchConfig;
pub use dispatch::OperationDispatch;
pub use invoke::{InvokeStage, MethodMap};
pub use middleware::{LoggingStage, PartitionKeyMap, PartitionStage, QueueStage, StageState};
pub use operation::{DispatchError, OpaqueResponse, OperationRequest};
pub use stage::DispatchStage;

// Submission cancellation is part of the public execute contract.
pub use tokio_util::sync::CancellationToken;
