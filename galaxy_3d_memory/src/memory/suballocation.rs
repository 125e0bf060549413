/// Suballocation handle and buffer range snapshot

use std::sync::Arc;
use crate::device::RawBuffer;
use crate::error::{Error, Result};
use crate::memory::{BufferHandle, Readiness};

/// A byte range inside one specific native buffer.
///
/// Holding a range keeps the native buffer alive, even if the owning
/// [`BufferHandle`] has since been resized onto new storage.
#[derive(Clone)]
pub struct BufferRange {
    pub raw: Arc<dyn RawBuffer>,
    pub offset: u64,
    pub size: u64,
}

impl BufferRange {
    pub fn native(&self) -> u64 {
        self.raw.native()
    }

    /// Copy `data` through the mapped pointer at `offset` (relative to the range)
    ///
    /// Flushes afterwards when the memory is not host-coherent.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self.mapped_at(offset, data.len() as u64)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
        }
        if self.raw.properties().needs_flush() {
            self.raw.flush(self.offset + offset, data.len() as u64)?;
        }
        Ok(())
    }

    /// Copy `len` bytes out through the mapped pointer
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let ptr = self.mapped_at(offset, len)?;
        let mut out = vec![0u8; len as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr as *const u8, out.as_mut_ptr(), len as usize);
        }
        Ok(out)
    }

    fn mapped_at(&self, offset: u64, len: u64) -> Result<*mut u8> {
        if offset + len > self.size {
            return Err(Error::InvalidResource(format!(
                "Access [{}, {}) exceeds range of {} bytes",
                offset,
                offset + len,
                self.size
            )));
        }
        match self.raw.mapped_ptr() {
            // In bounds of the native buffer, checked above against the range
            Some(base) => Ok(unsafe { base.add((self.offset + offset) as usize) }),
            None => Err(Error::InvalidResource(
                "Buffer memory is not host-visible".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for BufferRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRange")
            .field("buffer", &format_args!("{:#x}", self.raw.native()))
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

/// One live allocation inside a [`BufferHandle`].
///
/// The handle keeps its buffer alive; the buffer only tracks the handle
/// weakly. Dropping the last reference returns the region to the buffer's
/// free list. Offset and size never change, even across a buffer resize.
pub struct SuballocationHandle {
    buffer: Arc<BufferHandle>,
    offset: u64,
    size: u64,
    alignment: u64,
    readiness: Readiness,
}

impl SuballocationHandle {
    pub(crate) fn new(buffer: Arc<BufferHandle>, offset: u64, size: u64, alignment: u64) -> Self {
        Self {
            buffer,
            offset,
            size,
            alignment,
            readiness: Readiness::new(),
        }
    }

    pub fn buffer(&self) -> &Arc<BufferHandle> {
        &self.buffer
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Allocated size in bytes (request rounded up to the alignment)
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Snapshot of the region in the buffer's current storage
    pub fn range(&self) -> BufferRange {
        BufferRange {
            raw: self.buffer.raw(),
            offset: self.offset,
            size: self.size,
        }
    }

    /// Native handle of the buffer's current storage
    pub fn native_buffer(&self) -> u64 {
        self.buffer.native()
    }

    /// Host pointer to the first byte, if the buffer is host-visible
    ///
    /// Only valid until the next resize of the buffer.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.buffer
            .raw()
            .mapped_ptr()
            .map(|base| unsafe { base.add(self.offset as usize) })
    }

    /// Write bytes directly (host-visible buffers only)
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.range().write(offset, data)
    }

    /// Read bytes directly (host-visible buffers only)
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.range().read(offset, len)
    }

    /// Whether every transfer enqueued into this allocation has been submitted
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub(crate) fn readiness(&self) -> &Readiness {
        &self.readiness
    }
}

impl std::fmt::Debug for SuballocationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuballocationHandle")
            .field("buffer", &self.buffer.name())
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Drop for SuballocationHandle {
    fn drop(&mut self) {
        self.buffer.free(self.offset, self.size);
    }
}
