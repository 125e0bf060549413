/// Memory core configuration

use crate::error::{Error, Result};

/// Default staging buffer size (8 MiB)
pub const DEFAULT_STAGING_BUFFER_SIZE: u64 = 8 * 1024 * 1024;

/// Default number of pending transfers drained per flush
pub const DEFAULT_TRANSFER_BATCH_LIMIT: usize = 128;

/// Default growth multiplier applied when a buffer runs out of space
pub const DEFAULT_GROWTH_FACTOR: u64 = 2;

/// Configuration for a [`MemoryContext`](crate::context::MemoryContext)
/// and its transfer manager
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Initial size of the host-visible staging buffer in bytes
    pub staging_buffer_size: u64,
    /// Maximum number of pending transfers staged per `submit_now`
    pub transfer_batch_limit: usize,
    /// Growth multiplier for exhausted buffers (the grown size also always fits the request)
    pub growth_factor: u64,
    /// Grow the staging buffer when it is idle and still too small for a single transfer
    pub auto_grow_staging: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            staging_buffer_size: DEFAULT_STAGING_BUFFER_SIZE,
            transfer_batch_limit: DEFAULT_TRANSFER_BATCH_LIMIT,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            auto_grow_staging: true,
        }
    }
}

impl MemoryConfig {
    /// Set the initial staging buffer size
    pub fn with_staging_buffer_size(mut self, size: u64) -> Self {
        self.staging_buffer_size = size;
        self
    }

    /// Set the per-flush transfer batch limit
    pub fn with_transfer_batch_limit(mut self, limit: usize) -> Self {
        self.transfer_batch_limit = limit;
        self
    }

    /// Set the growth factor
    pub fn with_growth_factor(mut self, factor: u64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Enable or disable staging auto-growth
    pub fn with_auto_grow_staging(mut self, enabled: bool) -> Self {
        self.auto_grow_staging = enabled;
        self
    }

    /// Check the configuration before any GPU object is created
    pub fn validate(&self) -> Result<()> {
        if self.staging_buffer_size == 0 {
            return Err(Error::InitializationFailed(
                "staging_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.transfer_batch_limit == 0 {
            return Err(Error::InitializationFailed(
                "transfer_batch_limit must be greater than zero".to_string(),
            ));
        }
        if self.growth_factor < 2 {
            return Err(Error::InitializationFailed(format!(
                "growth_factor must be at least 2 (got {})",
                self.growth_factor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
