//! Unit tests for queue family selection and device configuration
//!
//! Family tables are built by hand, no GPU required.

use super::*;

fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties { queue_flags: flags, queue_count: 1, ..Default::default() }
}

// ============================================================================
// QUEUE FAMILY SELECTION
// ============================================================================

#[test]
fn test_dedicated_transfer_family_preferred() {
    let families = [
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::TRANSFER | vk::QueueFlags::SPARSE_BINDING),
    ];

    let selected = select_queue_families(&families, true).unwrap();
    assert_eq!(selected, QueueFamilies { graphics: 0, transfer: 2 });
    assert!(selected.needs_ownership_transfer());
}

#[test]
fn test_async_compute_family_as_fallback() {
    let families = [
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::COMPUTE),
    ];

    let selected = select_queue_families(&families, true).unwrap();
    assert_eq!(selected, QueueFamilies { graphics: 0, transfer: 1 });
}

#[test]
fn test_single_family_shared() {
    let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];

    let selected = select_queue_families(&families, true).unwrap();
    assert_eq!(selected, QueueFamilies { graphics: 0, transfer: 0 });
    assert!(!selected.needs_ownership_transfer());
}

#[test]
fn test_dedicated_transfer_not_requested() {
    let families = [
        family(vk::QueueFlags::TRANSFER),
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
    ];

    let selected = select_queue_families(&families, false).unwrap();
    assert_eq!(selected, QueueFamilies { graphics: 1, transfer: 1 });
}

#[test]
fn test_empty_families_skipped() {
    let families = [
        vk::QueueFamilyProperties { queue_flags: vk::QueueFlags::GRAPHICS, queue_count: 0, ..Default::default() },
        family(vk::QueueFlags::GRAPHICS),
        vk::QueueFamilyProperties { queue_flags: vk::QueueFlags::TRANSFER, queue_count: 0, ..Default::default() },
    ];

    let selected = select_queue_families(&families, true).unwrap();
    assert_eq!(selected, QueueFamilies { graphics: 1, transfer: 1 });
}

#[test]
fn test_no_graphics_family() {
    let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::TRANSFER)];
    assert!(select_queue_families(&families, true).is_none());
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[test]
fn test_default_config() {
    let config = VulkanConfig::default();
    assert!(!config.enable_validation);
    assert!(config.prefer_dedicated_transfer_queue);
    assert_eq!(config.debug_severity, DebugSeverity::ErrorsAndWarnings);
    assert_eq!(config.app_version, vk::make_api_version(0, 1, 0, 0));
}
