/// RawBuffer trait and buffer descriptor
///
/// A RawBuffer is one native GPU buffer object plus its backing memory, as
/// created by a [`MemoryDevice`](crate::device::MemoryDevice). It knows nothing
/// about sub-allocation: that is layered on top by
/// [`BufferHandle`](crate::memory::BufferHandle).

use crate::error::Result;

bitflags::bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

bitflags::bitflags! {
    /// Memory property flags of a buffer's backing allocation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryProperties: u32 {
        const DEVICE_LOCAL = 1 << 0;
        const HOST_VISIBLE = 1 << 1;
        const HOST_COHERENT = 1 << 2;
    }
}

impl MemoryProperties {
    /// Host-visible memory that needs explicit flushes after CPU writes
    pub fn needs_flush(self) -> bool {
        self.contains(MemoryProperties::HOST_VISIBLE) && !self.contains(MemoryProperties::HOST_COHERENT)
    }
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Debug name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
    /// Requested memory properties
    pub memory: MemoryProperties,
}

impl BufferDesc {
    /// Device-local buffer (vertex, index, storage data)
    pub fn device_local(name: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self {
            name: name.into(),
            size,
            usage,
            memory: MemoryProperties::DEVICE_LOCAL,
        }
    }

    /// Host-visible, host-coherent buffer (per-frame uniforms, staging)
    pub fn host_visible(name: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self {
            name: name.into(),
            size,
            usage,
            memory: MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT,
        }
    }
}

/// Raw GPU buffer trait
///
/// Implemented by backend-specific buffer types (e.g., VulkanRawBuffer).
/// The native buffer and its memory are released when dropped.
pub trait RawBuffer: Send + Sync {
    /// Native handle (e.g. `vk::Buffer` as raw u64), unique while the buffer lives
    fn native(&self) -> u64;

    /// Size in bytes
    fn size(&self) -> u64;

    /// Usage flags the buffer was created with
    fn usage(&self) -> BufferUsage;

    /// Memory properties of the actual backing allocation
    fn properties(&self) -> MemoryProperties;

    /// Persistently mapped pointer to byte 0, if the memory is host-visible
    fn mapped_ptr(&self) -> Option<*mut u8>;

    /// Make host writes in `[offset, offset + size)` visible to the device
    ///
    /// No-op for host-coherent memory.
    fn flush(&self, offset: u64, size: u64) -> Result<()>;

    /// Attach a debug name to the native object (profilers, validation layers)
    fn set_debug_name(&self, name: &str);
}
