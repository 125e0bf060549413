/// MemoryDevice trait - factory for raw GPU memory objects

use std::sync::Arc;
use crate::error::Result;
use crate::device::{BufferDesc, ImageDesc, RawBuffer, RawImage, TransferCommandList};

/// Alignment limits reported by the physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub min_uniform_buffer_offset_alignment: u64,
    pub min_storage_buffer_offset_alignment: u64,
    /// Flush granularity of non-coherent host-visible memory
    pub non_coherent_atom_size: u64,
    pub optimal_buffer_copy_offset_alignment: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 16,
            non_coherent_atom_size: 64,
            optimal_buffer_copy_offset_alignment: 4,
        }
    }
}

/// Queue family indices used by the transfer pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Family consuming uploaded data (vertex, shader and compute stages)
    pub graphics: u32,
    /// Family executing the copies (equals `graphics` without a dedicated transfer queue)
    pub transfer: u32,
}

impl QueueFamilies {
    /// Whether copies run on a different family than rendering
    pub fn needs_ownership_transfer(&self) -> bool {
        self.graphics != self.transfer
    }
}

/// Memory device trait
///
/// Implemented by backend-specific devices (e.g., VulkanMemoryDevice).
pub trait MemoryDevice: Send + Sync {
    /// Create a raw buffer
    ///
    /// Backends add transfer-src/transfer-dst usage so any buffer can take
    /// part in migrations. Device memory exhaustion maps to `Error::OutOfMemory`.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn RawBuffer>>;

    /// Create a raw image in `Undefined` layout
    fn create_image(&self, desc: &ImageDesc) -> Result<Arc<dyn RawImage>>;

    /// Create a command list recording on the transfer queue family
    fn create_transfer_command_list(&self) -> Result<Box<dyn TransferCommandList>>;

    /// Alignment limits
    fn limits(&self) -> DeviceLimits;

    /// Graphics and transfer queue families
    fn queue_families(&self) -> QueueFamilies;
}
