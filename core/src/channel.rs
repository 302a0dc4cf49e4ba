//! Channel configuration for worker to observer communication

/// Buffer sizes for the channels an orchestrator creates
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Call record channel buffer size (workers -> record consumer)
    pub record_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            record_buffer: 10_000,
        }
    }
}

impl ChannelConfig {
    /// Set the call record buffer size
    pub fn with_record_buffer(mut self, size: usize) -> Self {
        self.record_buffer = size.max(1);
        self
    }
}
