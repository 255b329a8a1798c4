//! Middleware stages composable around the invocation stage.
//!
//! Each middleware wraps a "next" stage fixed at construction:
//!
//! - `logging`: request type / outcome / timing logs
//! - `queue`: bounded FIFO queue drained by a single worker
//! - `partition`: deterministic fan-out to independent backend chains

pub mod logging;
pub mod partition;
pub mod queue;

pub use logging::LoggingStage;
pub use partition::{PartitionKeyMap, PartitionStage, FALLBACK_PARTITION_KEY};
pub use queue::{QueueStage, StageState};
