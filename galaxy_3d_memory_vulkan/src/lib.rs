/*!
# Galaxy 3D Memory - Vulkan Backend

Vulkan implementation of the `galaxy_3d_memory` backend seam.

This crate provides a headless Vulkan device that implements the
`MemoryDevice` trait using the Ash library for Vulkan bindings and
gpu-allocator for memory management. Copies run on a dedicated transfer
queue when the hardware exposes one.

```no_run
use galaxy_3d_memory::galaxy3d::{MemoryConfig, MemoryContext};
use galaxy_3d_memory_vulkan::{VulkanConfig, VulkanMemoryDevice};
use std::sync::Arc;

let device = Arc::new(VulkanMemoryDevice::new(VulkanConfig::default())?);
let mut context = MemoryContext::new(device, MemoryConfig::default())?;
context.submit_now()?;
context.dump()?;
# Ok::<(), galaxy_3d_memory::galaxy3d::Error>(())
```
*/

// Vulkan implementation modules
mod vulkan;
mod vulkan_context;
mod vulkan_convert;
mod vulkan_buffer;
mod vulkan_image;
mod vulkan_transfer_command_list;
#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan::{VulkanMemoryDevice, VulkanConfig, DebugSeverity};
pub use vulkan_buffer::VulkanRawBuffer;
pub use vulkan_image::VulkanRawImage;
pub use vulkan_transfer_command_list::VulkanTransferCommandList;

// Re-export debug utilities
#[cfg(feature = "vulkan-validation")]
pub use debug::{get_validation_stats, print_validation_stats_report, ValidationStats};
