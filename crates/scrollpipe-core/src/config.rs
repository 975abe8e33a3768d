//! Pipeline tuning passed to the coordinator at construction

use std::num::NonZeroUsize;

use crate::aggregator::DEFAULT_PROGRESS_INTERVAL;

/// Default handoff channel capacity (records)
pub const DEFAULT_CHANNEL_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => unreachable!(),
};

/// Runtime configuration for one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Records buffered between fetcher and aggregator before the fetcher stalls
    pub channel_capacity: NonZeroUsize,
    /// Progress refresh interval in records
    pub progress_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl PipelineConfig {
    pub fn with_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}
