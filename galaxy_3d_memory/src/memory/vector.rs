/// Resizable arrays living in a suballocation
///
/// [`BufferVector`] is the untyped core: a suballocation plus a count and a
/// stride. [`DeviceVector`] and [`HostVector`] add an element type on top.
///
/// Growing past the capacity allocates new storage from the same buffer
/// (capacity grows by the buffer's growth factor) and moves the existing
/// elements:
///
/// - on the CPU when the buffer is host-visible and the old storage has no
///   pending writes,
/// - otherwise through a suballocation-to-suballocation transfer on the
///   buffer's transfer queue, which keeps the old storage alive until the
///   copy has been submitted and its frame completed.

use std::marker::PhantomData;
use std::sync::Arc;
use bytemuck::Pod;
use crate::error::{Error, Result};
use crate::memory::{BufferHandle, SuballocationHandle};
use crate::transfer::TransferData;
use crate::engine_debug;

const LOG_SOURCE: &str = "galaxy3d::memory::Vector";

pub struct BufferVector {
    suballocation: Arc<SuballocationHandle>,
    count: u64,
    stride: u64,
}

impl BufferVector {
    /// Allocate room for `count` elements of `stride` bytes (at least one)
    pub fn new(buffer: &Arc<BufferHandle>, count: u64, stride: u64) -> Result<Self> {
        if stride == 0 {
            return Err(Error::InvalidResource("Vector stride must be greater than zero".to_string()));
        }
        let suballocation = buffer.allocate(count.max(1) * stride, 1)?;
        Ok(Self { suballocation, count, stride })
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Elements that fit without reallocating
    pub fn capacity(&self) -> u64 {
        self.suballocation.size() / self.stride
    }

    /// Size of the logical contents in bytes
    pub fn byte_len(&self) -> u64 {
        self.count * self.stride
    }

    pub fn suballocation(&self) -> &Arc<SuballocationHandle> {
        &self.suballocation
    }

    pub fn buffer(&self) -> &Arc<BufferHandle> {
        self.suballocation.buffer()
    }

    pub fn offset(&self) -> u64 {
        self.suballocation.offset()
    }

    pub fn is_ready(&self) -> bool {
        self.suballocation.is_ready()
    }

    /// Change the element count, keeping the existing elements
    pub fn resize(&mut self, new_count: u64) -> Result<()> {
        self.resize_impl(new_count, true)
    }

    /// Change the element count; contents are undefined after a reallocation
    pub fn resize_discard(&mut self, new_count: u64) -> Result<()> {
        self.resize_impl(new_count, false)
    }

    fn resize_impl(&mut self, new_count: u64, keep_contents: bool) -> Result<()> {
        if new_count <= self.capacity() {
            self.count = new_count;
            return Ok(());
        }

        let buffer = self.buffer().clone();
        let queue = buffer.transfer_queue();
        let copy_bytes = if keep_contents { self.byte_len() } else { 0 };
        let direct = buffer.is_host_visible() && self.suballocation.is_ready();
        if copy_bytes > 0 && !direct && queue.is_none() {
            return Err(Error::InvalidResource(format!(
                "Vector in '{}' cannot keep its contents without a transfer queue",
                buffer.name()
            )));
        }

        let new_capacity = new_count.max(self.capacity() * buffer.growth_factor());
        let storage = buffer.allocate(new_capacity * self.stride, 1)?;
        let old = std::mem::replace(&mut self.suballocation, storage);

        if copy_bytes > 0 {
            if direct {
                self.suballocation.write(0, &old.read(0, copy_bytes)?)?;
            } else if let Some(queue) = queue.as_ref() {
                queue.enqueue(TransferData::suballocation_to_suballocation(
                    queue,
                    old.clone(),
                    self.suballocation.clone(),
                    0,
                    0,
                    Some(copy_bytes),
                )?);
            }
        } else if let Some(queue) = queue.as_ref() {
            queue.retire(old.clone());
        }

        engine_debug!(LOG_SOURCE, "Vector in '{}' grew from {} to {} elements ({} bytes {})",
            buffer.name(), old.size() / self.stride, new_capacity, copy_bytes,
            if direct { "copied on the host" } else { "queued" });
        self.count = new_count;
        Ok(())
    }
}

impl std::fmt::Debug for BufferVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferVector")
            .field("offset", &self.offset())
            .field("len", &self.count)
            .field("capacity", &self.capacity())
            .field("stride", &self.stride)
            .finish()
    }
}

/// Typed vector in any buffer, filled through the transfer manager
pub struct DeviceVector<T: Pod> {
    vector: BufferVector,
    _marker: PhantomData<T>,
}

impl<T: Pod> DeviceVector<T> {
    pub fn new(buffer: &Arc<BufferHandle>, count: u64) -> Result<Self> {
        Ok(Self {
            vector: BufferVector::new(buffer, count, std::mem::size_of::<T>() as u64)?,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> u64 {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        self.vector.capacity()
    }

    pub fn resize(&mut self, new_count: u64) -> Result<()> {
        self.vector.resize(new_count)
    }

    pub fn resize_discard(&mut self, new_count: u64) -> Result<()> {
        self.vector.resize_discard(new_count)
    }

    pub fn vector(&self) -> &BufferVector {
        &self.vector
    }
}

/// Typed vector in a host-visible buffer, readable and writable in place
pub struct HostVector<T: Pod> {
    vector: BufferVector,
    _marker: PhantomData<T>,
}

impl<T: Pod> HostVector<T> {
    pub fn new(buffer: &Arc<BufferHandle>, count: u64) -> Result<Self> {
        if !buffer.is_host_visible() {
            return Err(Error::InvalidResource(format!(
                "HostVector requires a host-visible buffer ('{}' is not)",
                buffer.name()
            )));
        }
        Ok(Self {
            vector: BufferVector::new(buffer, count, std::mem::size_of::<T>() as u64)?,
            _marker: PhantomData,
        })
    }

    /// Vector holding a copy of `values`
    pub fn from_slice(buffer: &Arc<BufferHandle>, values: &[T]) -> Result<Self> {
        let vector = Self::new(buffer, values.len() as u64)?;
        vector.write(0, values)?;
        Ok(vector)
    }

    pub fn len(&self) -> u64 {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        self.vector.capacity()
    }

    pub fn get(&self, index: u64) -> Result<T> {
        self.check_index(index, 1)?;
        let bytes = self.vector.suballocation().read(index * self.vector.stride(), self.vector.stride())?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    pub fn set(&self, index: u64, value: T) -> Result<()> {
        self.check_index(index, 1)?;
        self.vector.suballocation().write(index * self.vector.stride(), bytemuck::bytes_of(&value))
    }

    /// Overwrite `values.len()` elements starting at `start`
    pub fn write(&self, start: u64, values: &[T]) -> Result<()> {
        self.check_index(start, values.len() as u64)?;
        self.vector.suballocation().write(start * self.vector.stride(), bytemuck::cast_slice(values))
    }

    /// Copy all elements out
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let bytes = self.vector.suballocation().read(0, self.vector.byte_len())?;
        Ok(bytes
            .chunks_exact(self.vector.stride() as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    pub fn push(&mut self, value: T) -> Result<()> {
        let index = self.vector.len();
        self.vector.resize(index + 1)?;
        self.set(index, value)
    }

    pub fn resize(&mut self, new_count: u64) -> Result<()> {
        self.vector.resize(new_count)
    }

    pub fn vector(&self) -> &BufferVector {
        &self.vector
    }

    fn check_index(&self, start: u64, count: u64) -> Result<()> {
        if start + count > self.vector.len() {
            return Err(Error::InvalidResource(format!(
                "Elements [{}, {}) out of bounds (len {})",
                start,
                start + count,
                self.vector.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "vector_tests.rs"]
mod tests;
