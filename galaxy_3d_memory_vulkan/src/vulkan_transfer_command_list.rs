/// VulkanTransferCommandList - Vulkan implementation of the TransferCommandList trait
///
/// One primary command buffer allocated from a pool on the transfer queue
/// family, re-recorded every frame. Each submission signals a binary
/// semaphore (the graphics submission must wait on it exactly once) and a
/// fence used by `wait`.

use galaxy_3d_memory::galaxy3d::{Result, Error};
use galaxy_3d_memory::galaxy3d::device::{
    TransferCommandList, PipelineStages, BufferBarrier, ImageBarrier, CopyRegion,
};
use galaxy_3d_memory::{engine_err, engine_error, engine_warn};
use ash::vk;
use ash::vk::Handle;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::{access_flags_to_vk, image_layout_to_vk, pipeline_stages_to_vk, queue_family_to_vk};

const COLOR_SUBRESOURCE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

pub struct VulkanTransferCommandList {
    ctx: Arc<GpuContext>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    /// Signaled by every submission, waited on by the graphics queue
    semaphore: vk::Semaphore,
    /// Signaled when the last submission completed
    fence: vk::Fence,
    is_recording: bool,
    /// A submission is in flight and `wait` has not observed it yet
    submitted: bool,
}

impl VulkanTransferCommandList {
    pub fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        unsafe {
            let command_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.transfer_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = ctx.device.create_command_pool(&command_pool_create_info, None)
                .map_err(|e| {
                    engine_error!("galaxy3d::vulkan", "Failed to create transfer command pool: {:?}", e);
                    Error::BackendError(format!("Failed to create transfer command pool: {:?}", e))
                })?;

            let command_buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = match ctx.device.allocate_command_buffers(&command_buffer_allocate_info) {
                Ok(buffers) => buffers[0],
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    return Err(engine_err!("galaxy3d::vulkan", "Failed to allocate transfer command buffer: {:?}", e));
                }
            };

            let semaphore = match ctx.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    return Err(engine_err!("galaxy3d::vulkan", "Failed to create transfer semaphore: {:?}", e));
                }
            };

            let fence = match ctx.device.create_fence(&vk::FenceCreateInfo::default(), None) {
                Ok(fence) => fence,
                Err(e) => {
                    ctx.device.destroy_semaphore(semaphore, None);
                    ctx.device.destroy_command_pool(command_pool, None);
                    return Err(engine_err!("galaxy3d::vulkan", "Failed to create transfer fence: {:?}", e));
                }
            };

            ctx.set_object_name(command_buffer, "galaxy3d_transfer_commands");
            ctx.set_object_name(semaphore, "galaxy3d_transfer_done");

            Ok(Self {
                ctx,
                command_pool,
                command_buffer,
                semaphore,
                fence,
                is_recording: false,
                submitted: false,
            })
        }
    }

    /// Get the Vulkan command buffer
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    fn ensure_recording(&self, command: &str) -> Result<()> {
        if !self.is_recording {
            engine_error!("galaxy3d::vulkan", "{} recorded outside begin/end", command);
            return Err(Error::BackendError(format!("{} recorded outside begin/end", command)));
        }
        Ok(())
    }
}

impl TransferCommandList for VulkanTransferCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.submitted {
            // The command buffer may still be executing
            self.wait()?;
        }
        unsafe {
            self.ctx.device.reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| engine_err!("galaxy3d::vulkan", "Failed to reset transfer command buffer: {:?}", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            self.ctx.device.begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| engine_err!("galaxy3d::vulkan", "Failed to begin transfer command buffer: {:?}", e))?;
        }
        self.is_recording = true;
        Ok(())
    }

    fn buffer_barriers(
        &mut self,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barriers: &[BufferBarrier],
    ) -> Result<()> {
        self.ensure_recording("Buffer barrier")?;
        if barriers.is_empty() {
            return Ok(());
        }

        let vk_barriers: Vec<vk::BufferMemoryBarrier> = barriers
            .iter()
            .map(|barrier| {
                vk::BufferMemoryBarrier::default()
                    .buffer(vk::Buffer::from_raw(barrier.buffer))
                    .offset(barrier.offset)
                    .size(barrier.size)
                    .src_access_mask(access_flags_to_vk(barrier.src_access))
                    .dst_access_mask(access_flags_to_vk(barrier.dst_access))
                    .src_queue_family_index(queue_family_to_vk(barrier.src_queue_family))
                    .dst_queue_family_index(queue_family_to_vk(barrier.dst_queue_family))
            })
            .collect();

        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                self.command_buffer,
                pipeline_stages_to_vk(src_stages),
                pipeline_stages_to_vk(dst_stages),
                vk::DependencyFlags::empty(),
                &[],
                &vk_barriers,
                &[],
            );
        }
        Ok(())
    }

    fn image_barrier(
        &mut self,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barrier: ImageBarrier,
    ) -> Result<()> {
        self.ensure_recording("Image barrier")?;

        let vk_barrier = vk::ImageMemoryBarrier::default()
            .old_layout(image_layout_to_vk(barrier.old_layout))
            .new_layout(image_layout_to_vk(barrier.new_layout))
            .src_queue_family_index(queue_family_to_vk(barrier.src_queue_family))
            .dst_queue_family_index(queue_family_to_vk(barrier.dst_queue_family))
            .image(vk::Image::from_raw(barrier.image))
            .subresource_range(COLOR_SUBRESOURCE)
            .src_access_mask(access_flags_to_vk(barrier.src_access))
            .dst_access_mask(access_flags_to_vk(barrier.dst_access));

        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                self.command_buffer,
                pipeline_stages_to_vk(src_stages),
                pipeline_stages_to_vk(dst_stages),
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[vk_barrier],
            );
        }
        Ok(())
    }

    fn copy_buffer(&mut self, src: u64, dst: u64, regions: &[CopyRegion]) -> Result<()> {
        self.ensure_recording("Buffer copy")?;
        if regions.is_empty() {
            return Ok(());
        }

        let vk_regions: Vec<vk::BufferCopy> = regions
            .iter()
            .map(|region| vk::BufferCopy {
                src_offset: region.src_offset,
                dst_offset: region.dst_offset,
                size: region.size,
            })
            .collect();

        unsafe {
            self.ctx.device.cmd_copy_buffer(
                self.command_buffer,
                vk::Buffer::from_raw(src),
                vk::Buffer::from_raw(dst),
                &vk_regions,
            );
        }
        Ok(())
    }

    fn copy_buffer_to_image(
        &mut self,
        src: u64,
        src_offset: u64,
        image: u64,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.ensure_recording("Buffer to image copy")?;

        let region = vk::BufferImageCopy {
            buffer_offset: src_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D { width, height, depth: 1 },
        };

        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                vk::Buffer::from_raw(src),
                vk::Image::from_raw(image),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.ensure_recording("End")?;
        unsafe {
            self.ctx.device.end_command_buffer(self.command_buffer)
                .map_err(|e| engine_err!("galaxy3d::vulkan", "Failed to end transfer command buffer: {:?}", e))?;
        }
        self.is_recording = false;
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        if self.is_recording {
            engine_error!("galaxy3d::vulkan", "Transfer command buffer submitted while still recording");
            return Err(Error::BackendError("Transfer command buffer is still recording".to_string()));
        }
        unsafe {
            self.ctx.device.reset_fences(&[self.fence])
                .map_err(|e| engine_err!("galaxy3d::vulkan", "Failed to reset transfer fence: {:?}", e))?;

            let command_buffers = [self.command_buffer];
            let signal_semaphores = [self.semaphore];
            let submit_info = vk::SubmitInfo::default()
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);

            self.ctx.device.queue_submit(self.ctx.transfer_queue, &[submit_info], self.fence)
                .map_err(|e| engine_err!("galaxy3d::vulkan", "Failed to submit transfer commands: {:?}", e))?;
        }
        self.submitted = true;
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        if !self.submitted {
            return Ok(());
        }
        unsafe {
            self.ctx.device.wait_for_fences(&[self.fence], true, u64::MAX)
                .map_err(|e| engine_err!("galaxy3d::vulkan", "Failed to wait for transfer fence: {:?}", e))?;
        }
        self.submitted = false;
        Ok(())
    }

    fn signal_semaphore(&self) -> u64 {
        self.semaphore.as_raw()
    }
}

impl Drop for VulkanTransferCommandList {
    fn drop(&mut self) {
        if let Err(e) = self.wait() {
            engine_warn!("galaxy3d::vulkan", "Transfer command list dropped while its submission failed to complete: {}", e);
        }
        unsafe {
            self.ctx.device.destroy_fence(self.fence, None);
            self.ctx.device.destroy_semaphore(self.semaphore, None);
            // Frees the command buffer with it
            self.ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
