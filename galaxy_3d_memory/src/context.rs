/// MemoryContext - one device, its transfer manager and descriptor rebinding
///
/// Buffers created through the context share the context's transfer queue,
/// so growth migrations and vector copies flow into the same per-frame
/// submission.

use std::sync::Arc;
use crate::config::MemoryConfig;
use crate::device::{BufferDesc, ImageDesc, MemoryDevice};
use crate::error::Result;
use crate::memory::{BufferHandle, DescriptorBindingRegistry, ImageHandle};
use crate::transfer::{TransferManager, TransferQueue};
use crate::engine_info;

const LOG_SOURCE: &str = "galaxy3d::memory::Context";

pub struct MemoryContext {
    device: Arc<dyn MemoryDevice>,
    config: MemoryConfig,
    transfer: TransferManager,
    bindings: Arc<DescriptorBindingRegistry>,
}

impl MemoryContext {
    pub fn new(device: Arc<dyn MemoryDevice>, config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        let transfer = TransferManager::new(device.clone(), &config)?;
        let limits = device.limits();

        engine_info!(LOG_SOURCE, "Memory context created (uniform align {}, storage align {}, atom {}, copy align {})",
            limits.min_uniform_buffer_offset_alignment,
            limits.min_storage_buffer_offset_alignment,
            limits.non_coherent_atom_size,
            limits.optimal_buffer_copy_offset_alignment);

        Ok(Self {
            device,
            config,
            transfer,
            bindings: DescriptorBindingRegistry::new(),
        })
    }

    /// Create a growable buffer wired to this context's transfer queue
    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<BufferHandle>> {
        BufferHandle::with_growth_factor(
            self.device.clone(),
            desc,
            Some(self.transfer.queue()),
            self.config.growth_factor,
        )
    }

    pub fn create_image(&self, desc: &ImageDesc) -> Result<Arc<ImageHandle>> {
        Ok(ImageHandle::new(self.device.create_image(desc)?))
    }

    /// Record and submit this frame's transfers
    pub fn submit_now(&mut self) -> Result<bool> {
        self.transfer.submit_now()
    }

    /// Wait for the last submission and release what it used
    pub fn dump(&mut self) -> Result<()> {
        self.transfer.dump()
    }

    pub fn device(&self) -> &Arc<dyn MemoryDevice> {
        &self.device
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn transfer(&self) -> &TransferManager {
        &self.transfer
    }

    pub fn transfer_mut(&mut self) -> &mut TransferManager {
        &mut self.transfer
    }

    pub fn transfer_queue(&self) -> &Arc<TransferQueue> {
        self.transfer.queue()
    }

    /// Registry to bind descriptor sets through
    pub fn bindings(&self) -> &Arc<DescriptorBindingRegistry> {
        &self.bindings
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
