/// Conversions between the core crate's backend-neutral flags and Vulkan types

use ash::vk;
use galaxy_3d_memory::galaxy3d::device::{
    AccessFlags, BufferUsage, ImageFormat, ImageLayout, MemoryProperties, PipelineStages,
    QUEUE_FAMILY_IGNORED,
};
use galaxy_3d_memory::galaxy3d::memory::DescriptorKind;
use gpu_allocator::MemoryLocation;

/// Buffer usage flags. Every buffer also gets transfer src/dst so it can be migrated.
pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    flags
}

/// Where gpu-allocator should place a buffer
pub(crate) fn memory_location(memory: MemoryProperties) -> MemoryLocation {
    if memory.contains(MemoryProperties::HOST_VISIBLE) {
        MemoryLocation::CpuToGpu
    } else {
        MemoryLocation::GpuOnly
    }
}

/// Memory properties actually granted by the driver
pub(crate) fn memory_properties_from_vk(flags: vk::MemoryPropertyFlags) -> MemoryProperties {
    let mut properties = MemoryProperties::empty();
    if flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL) {
        properties |= MemoryProperties::DEVICE_LOCAL;
    }
    if flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        properties |= MemoryProperties::HOST_VISIBLE;
    }
    if flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
        properties |= MemoryProperties::HOST_COHERENT;
    }
    properties
}

pub(crate) fn pipeline_stages_to_vk(stages: PipelineStages) -> vk::PipelineStageFlags {
    let mut flags = vk::PipelineStageFlags::empty();
    if stages.contains(PipelineStages::TOP_OF_PIPE) {
        flags |= vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    if stages.contains(PipelineStages::BOTTOM_OF_PIPE) {
        flags |= vk::PipelineStageFlags::BOTTOM_OF_PIPE;
    }
    if stages.contains(PipelineStages::TRANSFER) {
        flags |= vk::PipelineStageFlags::TRANSFER;
    }
    if stages.contains(PipelineStages::VERTEX_INPUT) {
        flags |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if stages.contains(PipelineStages::VERTEX_SHADER) {
        flags |= vk::PipelineStageFlags::VERTEX_SHADER;
    }
    if stages.contains(PipelineStages::FRAGMENT_SHADER) {
        flags |= vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if stages.contains(PipelineStages::COMPUTE_SHADER) {
        flags |= vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    flags
}

pub(crate) fn access_flags_to_vk(access: AccessFlags) -> vk::AccessFlags {
    let mut flags = vk::AccessFlags::empty();
    if access.contains(AccessFlags::TRANSFER_READ) {
        flags |= vk::AccessFlags::TRANSFER_READ;
    }
    if access.contains(AccessFlags::TRANSFER_WRITE) {
        flags |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if access.contains(AccessFlags::SHADER_READ) {
        flags |= vk::AccessFlags::SHADER_READ;
    }
    if access.contains(AccessFlags::VERTEX_ATTRIBUTE_READ) {
        flags |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if access.contains(AccessFlags::INDEX_READ) {
        flags |= vk::AccessFlags::INDEX_READ;
    }
    if access.contains(AccessFlags::UNIFORM_READ) {
        flags |= vk::AccessFlags::UNIFORM_READ;
    }
    flags
}

pub(crate) fn image_layout_to_vk(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::TransferDstOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

pub(crate) fn image_format_to_vk(format: ImageFormat) -> vk::Format {
    match format {
        ImageFormat::R8_UNORM => vk::Format::R8_UNORM,
        ImageFormat::R8G8_UNORM => vk::Format::R8G8_UNORM,
        ImageFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        ImageFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        ImageFormat::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        ImageFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
    }
}

pub(crate) fn descriptor_type_to_vk(kind: DescriptorKind) -> vk::DescriptorType {
    match kind {
        DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
    }
}

/// Queue family index in a barrier (the core's ignored marker maps onto Vulkan's)
pub(crate) fn queue_family_to_vk(family: u32) -> u32 {
    if family == QUEUE_FAMILY_IGNORED {
        vk::QUEUE_FAMILY_IGNORED
    } else {
        family
    }
}

#[cfg(test)]
#[path = "vulkan_convert_tests.rs"]
mod tests;
