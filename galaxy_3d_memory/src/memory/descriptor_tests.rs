use super::*;
use crate::device::mock_device::MockDevice;
use crate::device::{BufferDesc, BufferUsage};
use crate::memory::BufferHandle;

fn uniform_buffer(size: u64) -> Arc<BufferHandle> {
    let device = Arc::new(MockDevice::new());
    BufferHandle::new(device, &BufferDesc::host_visible("uniforms", size, BufferUsage::UNIFORM), None).unwrap()
}

#[test]
fn test_new_binding_is_dirty_once() {
    let buffer = uniform_buffer(1024);
    let registry = DescriptorBindingRegistry::new();
    let handle = buffer.allocate(64, 1).unwrap();

    let key = registry.bind(0xabc, 2, 0, DescriptorKind::UniformBuffer, handle.clone()).unwrap();
    assert!(registry.is_dirty(key));

    let updates = registry.take_updates();
    assert_eq!(updates, vec![DescriptorUpdate {
        set: 0xabc,
        binding: 2,
        array_element: 0,
        kind: DescriptorKind::UniformBuffer,
        buffer: buffer.native(),
        offset: handle.offset(),
        range: 256,
    }]);
    assert!(!registry.is_dirty(key));
    assert!(registry.take_updates().is_empty());
}

#[test]
fn test_growth_marks_bindings_dirty() {
    let buffer = uniform_buffer(512);
    let registry = DescriptorBindingRegistry::new();
    let first = buffer.allocate(256, 1).unwrap();
    let second = buffer.allocate(256, 1).unwrap();
    registry.bind(1, 0, 0, DescriptorKind::UniformBuffer, first).unwrap();
    registry.bind(1, 1, 0, DescriptorKind::UniformBuffer, second.clone()).unwrap();
    registry.take_updates();

    // Full buffer: this allocation grows it onto new storage
    let _third = buffer.allocate(256, 1).unwrap();

    let updates = registry.take_updates();
    assert_eq!(updates.len(), 2);
    assert!(updates.iter().all(|update| update.buffer == buffer.native()));
    assert!(updates.iter().any(|update| update.binding == 1 && update.offset == second.offset()));
}

#[test]
fn test_other_buffers_stay_clean() {
    let grown = uniform_buffer(256);
    let untouched = uniform_buffer(1024);
    let registry = DescriptorBindingRegistry::new();
    let a = grown.allocate(256, 1).unwrap();
    let b = untouched.allocate(256, 1).unwrap();
    registry.bind(0, 0, 0, DescriptorKind::UniformBuffer, a).unwrap();
    let key_b = registry.bind(0, 1, 0, DescriptorKind::StorageBuffer, b).unwrap();
    registry.take_updates();

    grown.resize(1024).unwrap();

    assert!(!registry.is_dirty(key_b));
    let updates = registry.take_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].binding, 0);
}

#[test]
fn test_unbind_releases_suballocation() {
    let buffer = uniform_buffer(1024);
    let registry = DescriptorBindingRegistry::new();
    let key = registry.bind(0, 0, 0, DescriptorKind::StorageBuffer, buffer.allocate(64, 1).unwrap()).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(buffer.allocation_count(), 1);

    assert!(registry.unbind(key));
    assert!(!registry.unbind(key));
    assert!(registry.is_empty());
    assert_eq!(buffer.allocation_count(), 0);
    assert!(!registry.is_dirty(key));
}
