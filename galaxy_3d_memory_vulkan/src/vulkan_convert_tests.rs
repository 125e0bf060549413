//! Unit tests for flag and format conversions
//!
//! Pure mappings, no GPU required.

use super::*;

// ============================================================================
// BUFFERS AND MEMORY
// ============================================================================

#[test]
fn test_buffer_usage_always_allows_transfers() {
    let flags = buffer_usage_to_vk(BufferUsage::VERTEX);
    assert!(flags.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
    assert!(flags.contains(vk::BufferUsageFlags::TRANSFER_SRC));
    assert!(flags.contains(vk::BufferUsageFlags::TRANSFER_DST));
    assert!(!flags.contains(vk::BufferUsageFlags::INDEX_BUFFER));

    let empty = buffer_usage_to_vk(BufferUsage::empty());
    assert_eq!(empty, vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST);
}

#[test]
fn test_buffer_usage_combined_flags() {
    let flags = buffer_usage_to_vk(BufferUsage::UNIFORM | BufferUsage::STORAGE | BufferUsage::INDEX);
    assert!(flags.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
    assert!(flags.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
    assert!(flags.contains(vk::BufferUsageFlags::INDEX_BUFFER));
    assert!(!flags.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
}

#[test]
fn test_memory_location() {
    assert_eq!(memory_location(MemoryProperties::DEVICE_LOCAL), MemoryLocation::GpuOnly);
    assert_eq!(
        memory_location(MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT),
        MemoryLocation::CpuToGpu
    );
}

#[test]
fn test_memory_properties_from_vk() {
    let properties = memory_properties_from_vk(
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED,
    );
    assert_eq!(properties, MemoryProperties::HOST_VISIBLE);
    assert!(properties.needs_flush());

    let resizable_bar = memory_properties_from_vk(
        vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT,
    );
    assert!(resizable_bar.contains(MemoryProperties::DEVICE_LOCAL));
    assert!(!resizable_bar.needs_flush());
}

// ============================================================================
// BARRIERS
// ============================================================================

#[test]
fn test_pipeline_stages_to_vk() {
    assert_eq!(pipeline_stages_to_vk(PipelineStages::TRANSFER), vk::PipelineStageFlags::TRANSFER);
    assert_eq!(
        pipeline_stages_to_vk(
            PipelineStages::VERTEX_INPUT | PipelineStages::VERTEX_SHADER | PipelineStages::COMPUTE_SHADER
        ),
        vk::PipelineStageFlags::VERTEX_INPUT
            | vk::PipelineStageFlags::VERTEX_SHADER
            | vk::PipelineStageFlags::COMPUTE_SHADER
    );
    assert_eq!(pipeline_stages_to_vk(PipelineStages::empty()), vk::PipelineStageFlags::empty());
}

#[test]
fn test_access_flags_to_vk() {
    assert_eq!(
        access_flags_to_vk(AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE),
        vk::AccessFlags::TRANSFER_READ | vk::AccessFlags::TRANSFER_WRITE
    );
    assert_eq!(
        access_flags_to_vk(AccessFlags::VERTEX_ATTRIBUTE_READ | AccessFlags::INDEX_READ | AccessFlags::UNIFORM_READ),
        vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::INDEX_READ | vk::AccessFlags::UNIFORM_READ
    );
    assert_eq!(access_flags_to_vk(AccessFlags::SHADER_READ), vk::AccessFlags::SHADER_READ);
}

#[test]
fn test_queue_family_ignored_matches_vulkan() {
    assert_eq!(QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED);
    assert_eq!(queue_family_to_vk(QUEUE_FAMILY_IGNORED), vk::QUEUE_FAMILY_IGNORED);
    assert_eq!(queue_family_to_vk(2), 2);
}

// ============================================================================
// IMAGES AND DESCRIPTORS
// ============================================================================

#[test]
fn test_image_layout_to_vk() {
    assert_eq!(image_layout_to_vk(ImageLayout::Undefined), vk::ImageLayout::UNDEFINED);
    assert_eq!(image_layout_to_vk(ImageLayout::TransferDstOptimal), vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(
        image_layout_to_vk(ImageLayout::ShaderReadOnlyOptimal),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    );
}

#[test]
fn test_image_format_to_vk() {
    assert_eq!(image_format_to_vk(ImageFormat::R8_UNORM), vk::Format::R8_UNORM);
    assert_eq!(image_format_to_vk(ImageFormat::R8G8_UNORM), vk::Format::R8G8_UNORM);
    assert_eq!(image_format_to_vk(ImageFormat::R8G8B8A8_UNORM), vk::Format::R8G8B8A8_UNORM);
    assert_eq!(image_format_to_vk(ImageFormat::R8G8B8A8_SRGB), vk::Format::R8G8B8A8_SRGB);
    assert_eq!(image_format_to_vk(ImageFormat::R16G16B16A16_SFLOAT), vk::Format::R16G16B16A16_SFLOAT);
    assert_eq!(image_format_to_vk(ImageFormat::R32G32B32A32_SFLOAT), vk::Format::R32G32B32A32_SFLOAT);
}

#[test]
fn test_descriptor_type_to_vk() {
    assert_eq!(descriptor_type_to_vk(DescriptorKind::UniformBuffer), vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(descriptor_type_to_vk(DescriptorKind::StorageBuffer), vk::DescriptorType::STORAGE_BUFFER);
}
