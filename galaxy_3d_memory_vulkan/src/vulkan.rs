/// VulkanMemoryDevice - Vulkan implementation of the MemoryDevice trait
///
/// Headless: no surface or swapchain. The device exposes the graphics queue
/// family (for ownership barriers) and a transfer queue, dedicated when the
/// hardware has one.

use galaxy_3d_memory::galaxy3d::{Result, Error};
use galaxy_3d_memory::galaxy3d::device::{
    MemoryDevice, RawBuffer, RawImage, TransferCommandList,
    BufferDesc, ImageDesc, DeviceLimits, QueueFamilies,
};
use galaxy_3d_memory::galaxy3d::memory::DescriptorUpdate;
use galaxy_3d_memory::{engine_err, engine_error, engine_info, engine_warn};
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::VulkanRawBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::descriptor_type_to_vk;
use crate::vulkan_image::VulkanRawImage;
use crate::vulkan_transfer_command_list::VulkanTransferCommandList;

/// Which validation messages reach the engine log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

/// Vulkan memory device configuration
#[derive(Debug, Clone)]
pub struct VulkanConfig {
    /// Enable `VK_LAYER_KHRONOS_validation` and object names
    /// (requires the `vulkan-validation` feature)
    pub enable_validation: bool,
    pub app_name: String,
    /// Packed with `vk::make_api_version`
    pub app_version: u32,
    pub debug_severity: DebugSeverity,
    /// Use a transfer-only queue family when the device exposes one
    pub prefer_dedicated_transfer_queue: bool,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            enable_validation: false,
            app_name: "Galaxy3D Application".to_string(),
            app_version: vk::make_api_version(0, 1, 0, 0),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            prefer_dedicated_transfer_queue: true,
        }
    }
}

/// Pick the graphics family and the family copies run on
///
/// Transfer family preference: transfer-only, then any non-graphics family
/// able to copy, then the graphics family itself.
pub(crate) fn select_queue_families(
    families: &[vk::QueueFamilyProperties],
    prefer_dedicated_transfer: bool,
) -> Option<QueueFamilies> {
    let usable = |qf: &vk::QueueFamilyProperties| qf.queue_count > 0;

    let graphics = families
        .iter()
        .position(|qf| usable(qf) && qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))? as u32;

    if !prefer_dedicated_transfer {
        return Some(QueueFamilies { graphics, transfer: graphics });
    }

    let dedicated = families.iter().position(|qf| {
        usable(qf)
            && qf.queue_flags.contains(vk::QueueFlags::TRANSFER)
            && !qf.queue_flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
    });
    // Compute queues support transfers implicitly
    let async_compute = families.iter().position(|qf| {
        usable(qf)
            && qf.queue_flags.intersects(vk::QueueFlags::TRANSFER | vk::QueueFlags::COMPUTE)
            && !qf.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    });

    let transfer = dedicated.or(async_compute).map(|i| i as u32).unwrap_or(graphics);
    Some(QueueFamilies { graphics, transfer })
}

/// Vulkan memory device
pub struct VulkanMemoryDevice {
    /// Vulkan entry (keeps the loader alive)
    _entry: ash::Entry,
    /// Vulkan instance (destroyed last)
    _instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    /// Logical device reference (stored in GpuContext, kept here for convenience)
    device: Arc<ash::Device>,

    /// GPU memory allocator reference (stored in GpuContext)
    allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    limits: DeviceLimits,
    families: QueueFamilies,

    /// Shared GPU context for all resources (buffers, images, command lists)
    gpu_context: Arc<GpuContext>,
}

impl VulkanMemoryDevice {
    /// Create a headless Vulkan device
    pub fn new(config: VulkanConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!("galaxy3d::vulkan", "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| Error::InitializationFailed(format!("Invalid application name: {}", e)))?;

            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(config.app_version)
                .engine_name(c"Galaxy3D")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let validation = cfg!(feature = "vulkan-validation") && config.enable_validation;
            if config.enable_validation && !validation {
                engine_warn!("galaxy3d::vulkan", "Validation requested but the vulkan-validation feature is disabled");
            }

            let mut extension_names = Vec::new();
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!("galaxy3d::vulkan", "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            let (debug_utils_loader, debug_messenger) = Self::create_debug_messenger(&entry, &instance, &config, validation)?;

            // Pick Physical Device
            let physical_devices = instance
                .enumerate_physical_devices()
                .map_err(|e| {
                    engine_error!("galaxy3d::vulkan", "Failed to enumerate physical devices: {:?}", e);
                    Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
                })?;

            let physical_device = physical_devices
                .into_iter()
                .next()
                .ok_or_else(|| {
                    engine_error!("galaxy3d::vulkan", "No Vulkan-capable GPU found");
                    Error::InitializationFailed("No Vulkan-capable GPU found".to_string())
                })?;

            let properties = instance.get_physical_device_properties(physical_device);
            let limits = DeviceLimits {
                min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment,
                min_storage_buffer_offset_alignment: properties.limits.min_storage_buffer_offset_alignment,
                non_coherent_atom_size: properties.limits.non_coherent_atom_size,
                optimal_buffer_copy_offset_alignment: properties.limits.optimal_buffer_copy_offset_alignment,
            };

            // Find Queue Families
            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
            let families = select_queue_families(&queue_families, config.prefer_dedicated_transfer_queue)
                .ok_or_else(|| {
                    engine_error!("galaxy3d::vulkan", "No graphics queue family found");
                    Error::InitializationFailed("No graphics queue family found".to_string())
                })?;

            // Create Logical Device
            let queue_priorities = [1.0];
            let mut queue_create_infos = vec![
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(families.graphics)
                    .queue_priorities(&queue_priorities),
            ];
            if families.needs_ownership_transfer() {
                queue_create_infos.push(
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(families.transfer)
                        .queue_priorities(&queue_priorities),
                );
            }

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos);

            let device = Arc::new(
                instance
                    .create_device(physical_device, &device_create_info, None)
                    .map_err(|e| {
                        engine_error!("galaxy3d::vulkan", "Failed to create logical device: {:?}", e);
                        Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                    })?,
            );

            let transfer_queue = device.get_device_queue(families.transfer, 0);

            // Create GPU allocator
            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: (*device).clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("galaxy3d::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "Unknown".to_string());
            engine_info!("galaxy3d::vulkan", "Vulkan memory device on '{}' (graphics family {}, transfer family {}{})",
                device_name, families.graphics, families.transfer,
                if families.needs_ownership_transfer() { ", dedicated" } else { "" });

            let allocator_arc = Arc::new(Mutex::new(allocator));
            let gpu_context = Arc::new(GpuContext::new(
                (*device).clone(),
                Arc::clone(&allocator_arc),
                transfer_queue,
                families.transfer,
                families.graphics,
                limits.non_coherent_atom_size,
                instance.clone(),
                debug_utils_loader,
                debug_messenger,
            ));

            Ok(Self {
                _entry: entry,
                _instance: instance,
                physical_device,
                device,
                allocator: ManuallyDrop::new(allocator_arc),
                limits,
                families,
                gpu_context,
            })
        }
    }

    #[cfg(feature = "vulkan-validation")]
    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &VulkanConfig,
        validation: bool,
    ) -> Result<(Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>)> {
        if !validation {
            return Ok((None, None));
        }

        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        crate::debug::init_debug_config(crate::debug::Config {
            severity: config.debug_severity,
            break_on_error: false,
        });

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::severity_flags(config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = debug_utils
            .create_debug_utils_messenger(&debug_info, None)
            .map_err(|e| {
                engine_error!("galaxy3d::vulkan", "Failed to create debug messenger: {:?}", e);
                Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
            })?;

        Ok((Some(debug_utils), Some(messenger)))
    }

    #[cfg(not(feature = "vulkan-validation"))]
    unsafe fn create_debug_messenger(
        _entry: &ash::Entry,
        _instance: &ash::Instance,
        _config: &VulkanConfig,
        _validation: bool,
    ) -> Result<(Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>)> {
        Ok((None, None))
    }

    /// Rewrite buffer descriptors after their buffers grew
    ///
    /// Feed it `DescriptorBindingRegistry::take_updates()` once per frame,
    /// before recording draws that use the affected sets.
    pub fn update_descriptor_sets(&self, updates: &[DescriptorUpdate]) {
        if updates.is_empty() {
            return;
        }

        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = updates
            .iter()
            .map(|update| [vk::DescriptorBufferInfo {
                buffer: vk::Buffer::from_raw(update.buffer),
                offset: update.offset,
                range: update.range,
            }])
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = updates
            .iter()
            .zip(&buffer_infos)
            .map(|(update, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(vk::DescriptorSet::from_raw(update.set))
                    .dst_binding(update.binding)
                    .dst_array_element(update.array_element)
                    .descriptor_type(descriptor_type_to_vk(update.kind))
                    .buffer_info(info)
            })
            .collect();

        unsafe {
            self.device.update_descriptor_sets(&writes, &[]);
        }
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| engine_err!("galaxy3d::vulkan", "Failed to wait idle: {:?}", e))
        }
    }

    /// Logical device, for the renderer sharing it
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }
}

impl MemoryDevice for VulkanMemoryDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn RawBuffer>> {
        let buffer: Arc<dyn RawBuffer> = VulkanRawBuffer::create(&self.gpu_context, desc)?;
        Ok(buffer)
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<Arc<dyn RawImage>> {
        let image: Arc<dyn RawImage> = VulkanRawImage::create(&self.gpu_context, desc)?;
        Ok(image)
    }

    fn create_transfer_command_list(&self) -> Result<Box<dyn TransferCommandList>> {
        Ok(Box::new(VulkanTransferCommandList::new(Arc::clone(&self.gpu_context))?))
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn queue_families(&self) -> QueueFamilies {
        self.families
    }
}

impl Drop for VulkanMemoryDevice {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.device.device_wait_idle().ok();

            // 1. Drop allocator: free VkDeviceMemory pages BEFORE destroying device.
            //    First drop VulkanMemoryDevice's Arc, then GpuContext's ManuallyDrop Arc.
            ManuallyDrop::drop(&mut self.allocator);
            if let Some(ctx) = Arc::get_mut(&mut self.gpu_context) {
                ManuallyDrop::drop(&mut ctx.allocator);
            } else {
                engine_error!("galaxy3d::vulkan", "Vulkan memory device dropped while GPU resources are still alive");
            }

            // 2. Cleanup debug config to prevent callbacks during destruction
            #[cfg(feature = "vulkan-validation")]
            crate::debug::cleanup_debug_config();

            // 3. Destroy debug messenger BEFORE device and instance
            if let (Some(debug_utils), Some(messenger)) = (
                &self.gpu_context.debug_utils_loader,
                &self.gpu_context.debug_messenger,
            ) {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            // 4. Destroy device and instance
            self.device.destroy_device(None);
            self._instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_tests.rs"]
mod tests;
