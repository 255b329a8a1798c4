use std::num::NonZeroUsize;

/// Tuning knobs for assembling a dispatch pipeline.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Capacity of each queue stage's bounded queue. Submitters suspend when
    /// the queue is full.
    pub queue_capacity: usize,
    /// Number of independent backends in a partitioned chain. Defaults to
    /// the host's available parallelism.
    pub partition_count: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            partition_count: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_positive() {
        let config = DispatchConfig::default();
        assert_eq!(config.queue_capacity, 1000);
        assert!(config.partition_count >= 1);
    }
}
