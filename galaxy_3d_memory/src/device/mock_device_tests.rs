use super::*;

fn host_desc(size: u64) -> BufferDesc {
    BufferDesc::host_visible("host", size, BufferUsage::UNIFORM)
}

fn device_desc(size: u64) -> BufferDesc {
    BufferDesc::device_local("device", size, BufferUsage::VERTEX)
}

// ============================================================================
// Buffers
// ============================================================================

#[test]
fn test_create_buffer_properties() {
    let device = MockDevice::new();
    let buffer = device.create_buffer(&host_desc(128)).unwrap();

    assert_eq!(buffer.size(), 128);
    assert!(buffer.usage().contains(BufferUsage::UNIFORM | BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST));
    assert!(buffer.properties().contains(MemoryProperties::HOST_VISIBLE));
    assert!(buffer.mapped_ptr().is_some());
    assert_eq!(device.live_buffer_count(), 1);
}

#[test]
fn test_device_local_buffer_is_not_mapped() {
    let device = MockDevice::new();
    let buffer = device.create_buffer(&device_desc(64)).unwrap();
    assert!(buffer.mapped_ptr().is_none());
    assert_eq!(device.read_buffer(buffer.native(), 0, 4), vec![0, 0, 0, 0]);
}

#[test]
fn test_native_handles_are_unique() {
    let device = MockDevice::new();
    let a = device.create_buffer(&device_desc(64)).unwrap();
    let b = device.create_buffer(&device_desc(64)).unwrap();
    assert_ne!(a.native(), b.native());
}

#[test]
fn test_zero_size_buffer_rejected() {
    let device = MockDevice::new();
    assert!(matches!(device.create_buffer(&device_desc(0)), Err(Error::InvalidResource(_))));
}

#[test]
fn test_memory_budget_out_of_memory() {
    let device = MockDevice::new().with_memory_budget(100);
    let first = device.create_buffer(&device_desc(60)).unwrap();
    assert!(matches!(device.create_buffer(&device_desc(60)), Err(Error::OutOfMemory)));

    // Dropping returns the memory to the budget
    drop(first);
    assert!(device.create_buffer(&device_desc(60)).is_ok());
}

#[test]
fn test_dropped_buffer_leaves_registry() {
    let device = MockDevice::new();
    let buffer = device.create_buffer(&device_desc(32)).unwrap();
    let handle = buffer.native();
    drop(buffer);
    assert!(device.buffer(handle).is_none());
    assert_eq!(device.live_buffer_count(), 0);
}

#[test]
fn test_flush_counts_and_bounds() {
    let device = MockDevice::new();
    let buffer = device.create_buffer(&host_desc(64)).unwrap();
    buffer.flush(0, 64).unwrap();
    assert!(buffer.flush(32, 64).is_err());
    assert_eq!(device.buffer(buffer.native()).unwrap().flush_count.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Command lists
// ============================================================================

#[test]
fn test_copy_executes_at_submit() {
    let device = MockDevice::new();
    let src = device.create_buffer(&host_desc(16)).unwrap();
    let dst = device.create_buffer(&device_desc(16)).unwrap();
    device.buffer(src.native()).unwrap().write(0, &[9, 8, 7, 6]).unwrap();

    let mut list = device.create_transfer_command_list().unwrap();
    list.begin().unwrap();
    list.copy_buffer(src.native(), dst.native(), &[CopyRegion { src_offset: 0, dst_offset: 4, size: 4 }]).unwrap();
    list.end().unwrap();
    assert_eq!(device.read_buffer(dst.native(), 4, 4), vec![0, 0, 0, 0]);

    list.submit().unwrap();
    assert_eq!(device.read_buffer(dst.native(), 4, 4), vec![9, 8, 7, 6]);

    let log = device.log.lock().unwrap();
    assert_eq!(log.submissions.len(), 1);
    assert!(log.pending);
    assert_eq!(log.total_copy_regions(), 1);
}

#[test]
fn test_copy_from_destroyed_buffer_fails() {
    let device = MockDevice::new();
    let src = device.create_buffer(&host_desc(16)).unwrap();
    let dst = device.create_buffer(&device_desc(16)).unwrap();
    let src_handle = src.native();
    drop(src);

    let mut list = device.create_transfer_command_list().unwrap();
    list.begin().unwrap();
    list.copy_buffer(src_handle, dst.native(), &[CopyRegion { src_offset: 0, dst_offset: 0, size: 4 }]).unwrap();
    list.end().unwrap();
    assert!(list.submit().is_err());
}

#[test]
fn test_begin_while_pending_fails() {
    let device = MockDevice::new();
    let mut list = device.create_transfer_command_list().unwrap();
    list.begin().unwrap();
    list.end().unwrap();
    list.submit().unwrap();

    assert!(list.begin().is_err());
    list.wait().unwrap();
    assert!(list.begin().is_ok());
    assert_eq!(device.log.lock().unwrap().waits, 1);
}

#[test]
fn test_wait_without_submission_fails() {
    let device = MockDevice::new();
    let mut list = device.create_transfer_command_list().unwrap();
    assert!(list.wait().is_err());
}

#[test]
fn test_record_outside_begin_fails() {
    let device = MockDevice::new();
    let mut list = device.create_transfer_command_list().unwrap();
    assert!(list.copy_buffer(1, 2, &[]).is_err());
    assert!(list.end().is_err());
}

#[test]
fn test_image_upload_layouts() {
    let device = MockDevice::new();
    let src = device.create_buffer(&host_desc(16)).unwrap();
    device.buffer(src.native()).unwrap().write(0, &[1; 16]).unwrap();
    let image = device
        .create_image(&ImageDesc {
            name: "tex".to_string(),
            width: 2,
            height: 2,
            format: crate::device::ImageFormat::R8G8B8A8_UNORM,
        })
        .unwrap();

    let barrier = |old_layout, new_layout| ImageBarrier {
        image: image.native(),
        old_layout,
        new_layout,
        src_access: crate::device::AccessFlags::empty(),
        dst_access: crate::device::AccessFlags::TRANSFER_WRITE,
        src_queue_family: crate::device::QUEUE_FAMILY_IGNORED,
        dst_queue_family: crate::device::QUEUE_FAMILY_IGNORED,
    };

    let mut list = device.create_transfer_command_list().unwrap();
    list.begin().unwrap();
    list.image_barrier(PipelineStages::TOP_OF_PIPE, PipelineStages::TRANSFER,
        barrier(ImageLayout::Undefined, ImageLayout::TransferDstOptimal)).unwrap();
    list.copy_buffer_to_image(src.native(), 0, image.native(), 2, 2).unwrap();
    list.image_barrier(PipelineStages::TRANSFER, PipelineStages::FRAGMENT_SHADER,
        barrier(ImageLayout::TransferDstOptimal, ImageLayout::ShaderReadOnlyOptimal)).unwrap();
    list.end().unwrap();
    list.submit().unwrap();

    let mock_image = device.image(image.native()).unwrap();
    assert_eq!(*mock_image.data.lock().unwrap(), vec![1; 16]);
    assert_eq!(*mock_image.layout.lock().unwrap(), ImageLayout::ShaderReadOnlyOptimal);
}
