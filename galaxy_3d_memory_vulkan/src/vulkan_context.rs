/// GpuContext - Shared GPU state for every raw buffer, image and command list
///
/// Contains everything a resource needs after creation:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Transfer queue and queue families
/// - Flush granularity for non-coherent memory
/// - Debug-utils loader for object names

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

/// Shared GPU context for all Vulkan memory objects.
///
/// Shared (via `Arc`) by every resource so each one can release itself on drop.
///
/// Note: Device and instance destruction is handled by VulkanMemoryDevice::drop()
/// so the allocator can be torn down first.
pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator (shared, requires mutex for thread safety)
    /// Wrapped in ManuallyDrop to ensure it's dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    /// Queue the transfer command list submits to
    pub transfer_queue: vk::Queue,

    /// Transfer queue family index
    pub transfer_queue_family: u32,

    /// Graphics queue family index (receives ownership after copies)
    pub graphics_queue_family: u32,

    /// `nonCoherentAtomSize` of the physical device
    pub non_coherent_atom_size: u64,

    /// Vulkan instance (kept for reference, destroyed by VulkanMemoryDevice)
    #[allow(dead_code)]
    instance: ash::Instance,

    /// Debug utils loader (for validation layers)
    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,

    /// Device-level debug utils (object names)
    pub(crate) debug_utils_device: Option<ash::ext::debug_utils::Device>,

    /// Debug messenger handle
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: ash::Device,
        allocator: Arc<Mutex<Allocator>>,
        transfer_queue: vk::Queue,
        transfer_queue_family: u32,
        graphics_queue_family: u32,
        non_coherent_atom_size: u64,
        instance: ash::Instance,
        debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
        debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    ) -> Self {
        let debug_utils_device = debug_utils_loader
            .as_ref()
            .map(|_| ash::ext::debug_utils::Device::new(&instance, &device));

        Self {
            device,
            allocator: ManuallyDrop::new(allocator),
            transfer_queue,
            transfer_queue_family,
            graphics_queue_family,
            non_coherent_atom_size,
            instance,
            debug_utils_loader,
            debug_utils_device,
            debug_messenger,
        }
    }

    /// Name a Vulkan object for validation messages and capture tools
    ///
    /// No-op when debug utils are not loaded.
    pub fn set_object_name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(debug_utils) = &self.debug_utils_device else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let name_info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        unsafe {
            // Names are diagnostics only
            debug_utils.set_debug_utils_object_name(&name_info).ok();
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // Device and instance destruction is handled by VulkanMemoryDevice::drop()
    }
}
