use std::time::Duration;

pub const DEFAULT_CHUNK_CAPACITY: usize = 128 * 1024;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bytes per chunk buffer.
    pub chunk_capacity: usize,
    /// How often the coordinating thread drains the queues.
    pub poll_interval: Duration,
    pub workers: usize,
    /// Recycled buffers a worker keeps around instead of freeing.
    pub recycle_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            workers: 1,
            recycle_limit: 4,
        }
    }
}

impl EngineConfig {
    pub fn with_chunk_capacity(mut self, bytes: usize) -> Self {
        self.chunk_capacity = bytes.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_recycle_limit(mut self, limit: usize) -> Self {
        self.recycle_limit = limit;
        self
    }
}
