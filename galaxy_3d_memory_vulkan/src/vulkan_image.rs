/// VulkanRawImage - Vulkan implementation of the RawImage trait

use galaxy_3d_memory::galaxy3d::{Result, Error};
use galaxy_3d_memory::galaxy3d::device::{ImageDesc, RawImage};
use galaxy_3d_memory::{engine_err, engine_error};
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::{AllocationError, MemoryLocation};
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::image_format_to_vk;

/// 2D optimal-tiling image, transfer destination and sampled
pub struct VulkanRawImage {
    ctx: Arc<GpuContext>,
    pub(crate) image: vk::Image,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl VulkanRawImage {
    pub fn create(ctx: &Arc<GpuContext>, desc: &ImageDesc) -> Result<Arc<Self>> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidResource(format!(
                "Image '{}' has a zero extent ({}x{})", desc.name, desc.width, desc.height
            )));
        }

        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(image_format_to_vk(desc.format))
                .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!("galaxy3d::vulkan", "Failed to create image '{}' ({}x{}): {:?}", desc.name, desc.width, desc.height, e))?;

            let requirements = ctx.device.get_image_memory_requirements(image);

            let allocation = match ctx.allocator.lock() {
                Ok(mut allocator) => allocator.allocate(&AllocationCreateDesc {
                    name: &desc.name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                }),
                Err(_) => {
                    ctx.device.destroy_image(image, None);
                    return Err(engine_err!("galaxy3d::vulkan", "GPU allocator lock poisoned"));
                }
            };

            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(AllocationError::OutOfMemory) => {
                    ctx.device.destroy_image(image, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!("galaxy3d::vulkan", "Out of GPU memory for image '{}' (required: {:.2} MB)", desc.name, size_mb);
                    return Err(Error::OutOfMemory);
                }
                Err(e) => {
                    ctx.device.destroy_image(image, None);
                    return Err(engine_err!("galaxy3d::vulkan", "Failed to allocate memory for image '{}': {:?}", desc.name, e));
                }
            };

            if let Err(e) = ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                if let Ok(mut allocator) = ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
                ctx.device.destroy_image(image, None);
                return Err(engine_err!("galaxy3d::vulkan", "Failed to bind image memory: {:?}", e));
            }

            ctx.set_object_name(image, &desc.name);

            Ok(Arc::new(Self {
                ctx: Arc::clone(ctx),
                image,
                allocation: Some(allocation),
                desc: desc.clone(),
            }))
        }
    }
}

impl RawImage for VulkanRawImage {
    fn native(&self) -> u64 {
        self.image.as_raw()
    }

    fn desc(&self) -> &ImageDesc {
        &self.desc
    }
}

impl Drop for VulkanRawImage {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_image(self.image, None);
        }
    }
}
