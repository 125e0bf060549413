/// VulkanRawBuffer - Vulkan implementation of the RawBuffer trait

use galaxy_3d_memory::galaxy3d::{Result, Error};
use galaxy_3d_memory::galaxy3d::device::{BufferDesc, BufferUsage, MemoryProperties, RawBuffer};
use galaxy_3d_memory::{engine_err, engine_error};
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::AllocationError;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::{buffer_usage_to_vk, memory_location, memory_properties_from_vk};

/// One `VkBuffer` bound to its own gpu-allocator allocation
pub struct VulkanRawBuffer {
    /// Shared GPU context (device, allocator, atom size)
    ctx: Arc<GpuContext>,
    /// Vulkan buffer
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation
    pub(crate) allocation: Option<Allocation>,
    size: u64,
    usage: BufferUsage,
    properties: MemoryProperties,
}

impl VulkanRawBuffer {
    /// Create and bind a buffer
    ///
    /// Host-visible requests are placed in `CpuToGpu` memory and stay
    /// persistently mapped. Allocation failure maps to `Error::OutOfMemory`.
    pub fn create(ctx: &Arc<GpuContext>, desc: &BufferDesc) -> Result<Arc<Self>> {
        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| engine_err!("galaxy3d::vulkan", "Failed to create buffer '{}' of size {} bytes: {:?}", desc.name, desc.size, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = {
                let mut allocator = match ctx.allocator.lock() {
                    Ok(allocator) => allocator,
                    Err(_) => {
                        ctx.device.destroy_buffer(buffer, None);
                        return Err(engine_err!("galaxy3d::vulkan", "GPU allocator lock poisoned"));
                    }
                };
                allocator.allocate(&AllocationCreateDesc {
                    name: &desc.name,
                    requirements,
                    location: memory_location(desc.memory),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
            };

            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(match e {
                        AllocationError::OutOfMemory => {
                            let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                            engine_error!("galaxy3d::vulkan", "Out of GPU memory for buffer '{}' (required: {:.2} MB)", desc.name, size_mb);
                            Error::OutOfMemory
                        }
                        other => engine_err!("galaxy3d::vulkan", "Failed to allocate memory for buffer '{}': {:?}", desc.name, other),
                    });
                }
            };

            if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                if let Ok(mut allocator) = ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
                ctx.device.destroy_buffer(buffer, None);
                return Err(engine_err!("galaxy3d::vulkan", "Failed to bind buffer memory: {:?}", e));
            }

            let properties = memory_properties_from_vk(allocation.memory_properties());
            ctx.set_object_name(buffer, &desc.name);

            Ok(Arc::new(Self {
                ctx: Arc::clone(ctx),
                buffer,
                allocation: Some(allocation),
                size: desc.size,
                usage: desc.usage,
                properties,
            }))
        }
    }
}

impl RawBuffer for VulkanRawBuffer {
    fn native(&self) -> u64 {
        self.buffer.as_raw()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn properties(&self) -> MemoryProperties {
        self.properties
    }

    fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .map(|ptr| ptr.as_ptr() as *mut u8)
    }

    fn flush(&self, offset: u64, size: u64) -> Result<()> {
        if !self.properties.needs_flush() || size == 0 {
            return Ok(());
        }
        let Some(allocation) = &self.allocation else {
            engine_error!("galaxy3d::vulkan", "Buffer flush failed: no GPU allocation");
            return Err(Error::BackendError("Buffer has no allocation".to_string()));
        };

        // Flush ranges are relative to the VkDeviceMemory block and must be atom aligned
        let atom = self.ctx.non_coherent_atom_size.max(1);
        let start = allocation.offset() + offset;
        let aligned_start = start - start % atom;
        let end = start + size;
        let allocation_end = allocation.offset() + allocation.size();
        let aligned_size = if end.div_ceil(atom) * atom > allocation_end {
            vk::WHOLE_SIZE
        } else {
            end.div_ceil(atom) * atom - aligned_start
        };

        unsafe {
            let range = vk::MappedMemoryRange::default()
                .memory(allocation.memory())
                .offset(aligned_start)
                .size(aligned_size);
            self.ctx.device.flush_mapped_memory_ranges(&[range])
                .map_err(|e| engine_err!("galaxy3d::vulkan", "Failed to flush mapped memory: {:?}", e))
        }
    }

    fn set_debug_name(&self, name: &str) {
        self.ctx.set_object_name(self.buffer, name);
    }
}

impl Drop for VulkanRawBuffer {
    fn drop(&mut self) {
        unsafe {
            // Free GPU memory
            if let Some(allocation) = self.allocation.take() {
                // Don't panic if lock fails - we still need to destroy the buffer
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }

            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
