/// BufferHandle - a growable GPU buffer with a first-fit sub-allocator
///
/// A `BufferHandle` is the stable front door of a GPU buffer. Its backing
/// store (native buffer, free list, allocation records) lives behind a
/// mutex and is replaced wholesale when the buffer grows, so every
/// [`SuballocationHandle`] handed out earlier stays valid: it keeps the
/// same offset and size and simply resolves to the new native buffer.
///
/// # Growth
///
/// When `allocate` cannot find room, even after coalescing, the buffer is
/// resized to `max(size * growth_factor, size + 2 * request)`. Live
/// allocations keep their offsets. Their contents are migrated:
///
/// - host-visible buffers copy on the CPU, immediately;
/// - device-local buffers leave a *predecessor* behind (a retired
///   `BufferHandle` owning the old native buffer) and enqueue one migration
///   transfer per live allocation on the transfer queue. The predecessor
///   dies once those copies have been submitted and their frame completed.
///
/// Registered [`MigrationListener`]s are notified after every resize so
/// descriptor sets can be rewritten.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use crate::config::DEFAULT_GROWTH_FACTOR;
use crate::device::{BufferDesc, BufferUsage, MemoryDevice, MemoryProperties, RawBuffer};
use crate::error::{Error, Result};
use crate::memory::{BufferMigration, BufferRange, FreeBlock, FreeList, MigrationListener, SuballocationHandle};
use crate::transfer::{TransferData, TransferQueue};
use crate::utils::{align, lcm};
use crate::{engine_debug, engine_error, engine_info, engine_trace};

const LOG_SOURCE: &str = "galaxy3d::memory::Buffer";

/// Allocation statistics of one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStats {
    pub size: u64,
    pub used: u64,
    pub free: u64,
    pub allocation_count: usize,
    pub free_block_count: usize,
    pub largest_free_block: u64,
}

struct AllocationRecord {
    size: u64,
    alignment: u64,
    handle: Weak<SuballocationHandle>,
}

struct BufferState {
    raw: Arc<dyn RawBuffer>,
    free_list: FreeList,
    allocations: BTreeMap<u64, AllocationRecord>,
    predecessor: Option<Weak<BufferHandle>>,
    name: String,
}

/// What a resize left behind for the caller to finish outside the lock
struct SwapOutcome {
    old_raw: Arc<dyn RawBuffer>,
    new_raw: Arc<dyn RawBuffer>,
    old_size: u64,
    name: String,
    migrations: Vec<(Arc<SuballocationHandle>, Arc<SuballocationHandle>)>,
}

pub struct BufferHandle {
    device: Arc<dyn MemoryDevice>,
    usage: BufferUsage,
    memory: MemoryProperties,
    alignment: u64,
    growth_factor: u64,
    transfer: Option<Weak<TransferQueue>>,
    state: Mutex<BufferState>,
    listeners: Mutex<Vec<Weak<dyn MigrationListener>>>,
}

impl BufferHandle {
    /// Create a buffer with the default growth factor
    ///
    /// `transfer` is the queue that receives migration copies when the buffer
    /// grows. Without one, only host-visible buffers (or buffers with no live
    /// allocations) can be resized.
    pub fn new(
        device: Arc<dyn MemoryDevice>,
        desc: &BufferDesc,
        transfer: Option<&Arc<TransferQueue>>,
    ) -> Result<Arc<Self>> {
        Self::with_growth_factor(device, desc, transfer, DEFAULT_GROWTH_FACTOR)
    }

    /// Create a buffer with an explicit growth factor (at least 2)
    pub fn with_growth_factor(
        device: Arc<dyn MemoryDevice>,
        desc: &BufferDesc,
        transfer: Option<&Arc<TransferQueue>>,
        growth_factor: u64,
    ) -> Result<Arc<Self>> {
        if desc.size == 0 {
            return Err(Error::InvalidResource(format!("Buffer '{}' has zero size", desc.name)));
        }
        if growth_factor < 2 {
            return Err(Error::InvalidResource(format!(
                "Buffer '{}' growth factor must be at least 2 (got {})",
                desc.name, growth_factor
            )));
        }

        let raw = device.create_buffer(desc)?;
        raw.set_debug_name(&desc.name);
        let memory = raw.properties();
        let alignment = intrinsic_alignment(device.as_ref(), desc.usage, memory);

        engine_debug!(LOG_SOURCE, "Created buffer '{}' ({} bytes, {:?}, {:?}, alignment {})",
            desc.name, desc.size, desc.usage, memory, alignment);

        Ok(Arc::new(Self {
            device,
            usage: desc.usage,
            memory,
            alignment,
            growth_factor,
            transfer: transfer.map(Arc::downgrade),
            state: Mutex::new(BufferState {
                free_list: FreeList::new(raw.size()),
                raw,
                allocations: BTreeMap::new(),
                predecessor: None,
                name: desc.name.clone(),
            }),
            listeners: Mutex::new(Vec::new()),
        }))
    }

    // ===== ALLOCATION =====

    /// Allocate `size` bytes, growing the buffer if needed
    ///
    /// `alignment` is combined with the buffer's intrinsic alignment (pass 1
    /// for none). Fails with `Error::OutOfMemory` only when the device cannot
    /// provide the grown storage.
    pub fn allocate(self: &Arc<Self>, size: u64, alignment: u64) -> Result<Arc<SuballocationHandle>> {
        if let Some(handle) = self.try_allocate(size, alignment)? {
            return Ok(handle);
        }

        let alignment = self.effective_alignment(alignment);
        let new_size = self.grown_size(align(size, alignment), alignment);
        self.resize(new_size)?;

        match self.try_allocate(size, alignment)? {
            Some(handle) => Ok(handle),
            None => {
                let name = self.name();
                engine_error!(LOG_SOURCE, "Buffer '{}' grown to {} bytes still cannot fit {} bytes", name, new_size, size);
                debug_assert!(false, "resize of '{}' produced insufficient capacity", name);
                Err(Error::InvariantViolation(format!(
                    "Buffer '{}' resize to {} bytes cannot fit {} bytes",
                    name, new_size, size
                )))
            }
        }
    }

    /// Allocate without growing; `Ok(None)` when no free block fits
    pub fn try_allocate(self: &Arc<Self>, size: u64, alignment: u64) -> Result<Option<Arc<SuballocationHandle>>> {
        if size == 0 {
            return Err(Error::InvalidResource("Cannot allocate zero bytes".to_string()));
        }
        let alignment = self.effective_alignment(alignment);
        let aligned_size = align(size, alignment);

        let mut state = self.lock_state()?;
        let placement = match state.free_list.find_first_fit(aligned_size, alignment) {
            Some(placement) => placement,
            None => {
                state.free_list.merge();
                match state.free_list.find_first_fit(aligned_size, alignment) {
                    Some(placement) => placement,
                    None => return Ok(None),
                }
            }
        };

        let offset = state.free_list.take(placement, aligned_size);
        let handle = Arc::new(SuballocationHandle::new(self.clone(), offset, aligned_size, alignment));
        state.allocations.insert(offset, AllocationRecord {
            size: aligned_size,
            alignment,
            handle: Arc::downgrade(&handle),
        });
        debug_assert!(audit(&state).is_ok(), "{:?}", audit(&state));

        engine_trace!(LOG_SOURCE, "'{}': allocated [{}, {})", state.name, offset, offset + aligned_size);
        Ok(Some(handle))
    }

    /// Whether `allocate(size, alignment)` would succeed without growing
    pub fn can_allocate(&self, size: u64, alignment: u64) -> bool {
        if size == 0 {
            return false;
        }
        let alignment = self.effective_alignment(alignment);
        let aligned_size = align(size, alignment);
        let Ok(state) = self.state.lock() else {
            return false;
        };
        if state.free_list.find_first_fit(aligned_size, alignment).is_some() {
            return true;
        }
        let mut speculative = state.free_list.clone();
        speculative.merge();
        speculative.find_first_fit(aligned_size, alignment).is_some()
    }

    /// Return a region to the free list (called when a handle drops)
    pub(crate) fn free(&self, offset: u64, size: u64) {
        let Ok(mut state) = self.state.lock() else {
            engine_error!(LOG_SOURCE, "Buffer state poisoned while freeing [{}, {})", offset, offset + size);
            return;
        };
        match state.allocations.remove(&offset) {
            Some(record) if record.size == size => {
                state.free_list.push(FreeBlock { offset, size });
                state.free_list.merge();
                debug_assert!(audit(&state).is_ok(), "{:?}", audit(&state));
                engine_trace!(LOG_SOURCE, "'{}': freed [{}, {})", state.name, offset, offset + size);
            }
            Some(record) => {
                engine_error!(LOG_SOURCE, "'{}': freeing [{}, {}) but {} bytes are recorded at that offset",
                    state.name, offset, offset + size, record.size);
                debug_assert!(false, "free size mismatch");
            }
            None => {
                engine_error!(LOG_SOURCE, "'{}': freeing unknown offset {}", state.name, offset);
                debug_assert!(false, "free of unknown offset {}", offset);
            }
        }
    }

    // ===== GROWTH =====

    /// Size to grow to so that `aligned_size` bytes fit at `alignment`
    pub fn grown_size(&self, aligned_size: u64, alignment: u64) -> u64 {
        let current = self.size();
        let by_factor = current.saturating_mul(self.growth_factor);
        let to_fit = current + 2 * (aligned_size + alignment.max(1) - 1);
        by_factor.max(to_fit)
    }

    /// Grow the buffer to `new_size` bytes, keeping every live allocation
    pub fn resize(self: &Arc<Self>, new_size: u64) -> Result<()> {
        let queue = self.transfer_queue();
        let mut live: Vec<Arc<SuballocationHandle>> = Vec::new();
        // `live` is declared first so handles drop after the state lock
        let outcome = self.swap_storage(new_size, queue.as_ref(), &mut live)?;
        let migrated = live.len();

        if let Some(queue) = queue.as_ref() {
            let mut transfers = Vec::with_capacity(outcome.migrations.len());
            for (retired, current) in &outcome.migrations {
                let pinned = BufferRange {
                    raw: outcome.new_raw.clone(),
                    offset: current.offset(),
                    size: current.size(),
                };
                transfers.push(TransferData::migration(queue, retired.clone(), current.clone(), pinned)?);
            }
            queue.enqueue_migrations(transfers);
        }

        engine_info!(LOG_SOURCE, "Resized buffer '{}' from {} to {} bytes ({} allocations migrated)",
            outcome.name, outcome.old_size, new_size, migrated);

        self.notify_listeners(&BufferMigration {
            buffer_name: outcome.name,
            old_buffer: outcome.old_raw.native(),
            new_buffer: outcome.new_raw.native(),
            old_size: outcome.old_size,
            new_size,
        });
        Ok(())
    }

    fn swap_storage(
        &self,
        new_size: u64,
        queue: Option<&Arc<TransferQueue>>,
        live: &mut Vec<Arc<SuballocationHandle>>,
    ) -> Result<SwapOutcome> {
        let mut state = self.lock_state()?;
        let old_size = state.raw.size();
        if new_size <= old_size {
            return Err(Error::InvalidResource(format!(
                "Buffer '{}' can only grow ({} -> {} requested)",
                state.name, old_size, new_size
            )));
        }

        live.extend(state.allocations.values().filter_map(|record| record.handle.upgrade()));
        let host_visible = self.is_host_visible();
        if !host_visible && queue.is_none() && !live.is_empty() {
            return Err(Error::InvalidResource(format!(
                "Buffer '{}' is device-local with {} live allocations and no transfer queue to migrate them",
                state.name,
                live.len()
            )));
        }

        let new_raw = self.device.create_buffer(&BufferDesc {
            name: state.name.clone(),
            size: new_size,
            usage: self.usage,
            memory: self.memory,
        })?;
        new_raw.set_debug_name(&state.name);

        let mut migrations = Vec::new();
        let mut predecessor = state.predecessor.clone();
        if host_visible {
            for handle in live.iter() {
                copy_mapped(&state.raw, &new_raw, handle.offset(), handle.size())?;
            }
        } else if !live.is_empty() {
            let retired = self.retire_storage(&state)?;
            for handle in live.iter() {
                let shadow = retired.adopt(handle.offset(), handle.size(), handle.alignment())?;
                migrations.push((shadow, handle.clone()));
            }
            predecessor = Some(Arc::downgrade(&retired));
        }

        let old_raw = std::mem::replace(&mut state.raw, new_raw.clone());
        state.free_list.push(FreeBlock { offset: old_size, size: new_size - old_size });
        state.free_list.merge();
        state.predecessor = predecessor;
        debug_assert!(audit(&state).is_ok(), "{:?}", audit(&state));

        Ok(SwapOutcome {
            old_raw,
            new_raw,
            old_size,
            name: state.name.clone(),
            migrations,
        })
    }

    /// Predecessor owning the current storage, with the current free list.
    /// Live allocations are re-created in it by `adopt`.
    fn retire_storage(&self, state: &BufferState) -> Result<Arc<BufferHandle>> {
        Ok(Arc::new(BufferHandle {
            device: self.device.clone(),
            usage: self.usage,
            memory: self.memory,
            alignment: self.alignment,
            growth_factor: self.growth_factor,
            transfer: None,
            state: Mutex::new(BufferState {
                raw: state.raw.clone(),
                free_list: {
                    let mut list = state.free_list.clone();
                    for (offset, record) in &state.allocations {
                        if record.handle.strong_count() == 0 {
                            list.push(FreeBlock { offset: *offset, size: record.size });
                        }
                    }
                    list.merge();
                    list
                },
                allocations: BTreeMap::new(),
                predecessor: state.predecessor.clone(),
                name: format!("{} (retired {} bytes)", state.name, state.raw.size()),
            }),
            listeners: Mutex::new(Vec::new()),
        }))
    }

    /// Record an allocation at a fixed offset (retired storage only)
    fn adopt(self: &Arc<Self>, offset: u64, size: u64, alignment: u64) -> Result<Arc<SuballocationHandle>> {
        let mut state = self.lock_state()?;
        let handle = Arc::new(SuballocationHandle::new(self.clone(), offset, size, alignment));
        state.allocations.insert(offset, AllocationRecord {
            size,
            alignment,
            handle: Arc::downgrade(&handle),
        });
        Ok(handle)
    }

    // ===== LISTENERS =====

    /// Register a listener notified after every resize (held weakly)
    pub fn add_migration_listener(&self, listener: &Arc<dyn MigrationListener>) {
        let Ok(mut listeners) = self.listeners.lock() else {
            return;
        };
        listeners.retain(|weak| weak.strong_count() > 0);
        let weak = Arc::downgrade(listener);
        if !listeners.iter().any(|existing| Weak::ptr_eq(existing, &weak)) {
            listeners.push(weak);
        }
    }

    fn notify_listeners(&self, migration: &BufferMigration) {
        let listeners: Vec<Arc<dyn MigrationListener>> = match self.listeners.lock() {
            Ok(listeners) => listeners.iter().filter_map(Weak::upgrade).collect(),
            Err(_) => return,
        };
        for listener in listeners {
            listener.on_buffer_migrated(migration);
        }
    }

    // ===== INTROSPECTION =====

    /// Verify conservation, coalescing and non-overlap of the allocator state
    pub fn check_invariants(&self) -> Result<()> {
        let state = self.lock_state()?;
        audit(&state)
    }

    pub fn stats(&self) -> BufferStats {
        match self.state.lock() {
            Ok(state) => {
                let used: u64 = state.allocations.values().map(|record| record.size).sum();
                BufferStats {
                    size: state.raw.size(),
                    used,
                    free: state.free_list.total_free(),
                    allocation_count: state.allocations.len(),
                    free_block_count: state.free_list.len(),
                    largest_free_block: state.free_list.largest_block(),
                }
            }
            Err(_) => BufferStats::default(),
        }
    }

    /// Rename the buffer and its native object
    pub fn set_debug_name(&self, name: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.name = name.to_string();
            state.raw.set_debug_name(name);
        }
    }

    pub fn name(&self) -> String {
        self.state.lock().map(|state| state.name.clone()).unwrap_or_default()
    }

    /// Current backing storage
    pub fn raw(&self) -> Arc<dyn RawBuffer> {
        match self.state.lock() {
            Ok(state) => state.raw.clone(),
            Err(poisoned) => poisoned.into_inner().raw.clone(),
        }
    }

    /// Native handle of the current backing storage
    pub fn native(&self) -> u64 {
        self.raw().native()
    }

    pub fn size(&self) -> u64 {
        self.raw().size()
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn properties(&self) -> MemoryProperties {
        self.memory
    }

    pub fn is_host_visible(&self) -> bool {
        self.memory.contains(MemoryProperties::HOST_VISIBLE)
    }

    /// Alignment applied to every allocation of this buffer
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn growth_factor(&self) -> u64 {
        self.growth_factor
    }

    pub fn allocation_count(&self) -> usize {
        self.state.lock().map(|state| state.allocations.len()).unwrap_or(0)
    }

    /// Retired storage still waiting for its migration copies, if any
    pub fn predecessor(&self) -> Option<Arc<BufferHandle>> {
        self.state.lock().ok()?.predecessor.as_ref()?.upgrade()
    }

    pub fn transfer_queue(&self) -> Option<Arc<TransferQueue>> {
        self.transfer.as_ref()?.upgrade()
    }

    fn effective_alignment(&self, alignment: u64) -> u64 {
        lcm(self.alignment, alignment)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, BufferState>> {
        self.state
            .lock()
            .map_err(|_| Error::BackendError("Buffer state mutex poisoned".to_string()))
    }
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            if !state.allocations.is_empty() {
                engine_error!(LOG_SOURCE, "Buffer '{}' destroyed with {} live allocations",
                    state.name, state.allocations.len());
                debug_assert!(false, "buffer destroyed with live allocations");
            }
        }
    }
}

/// Alignment every allocation in a buffer must honour
pub fn intrinsic_alignment(device: &dyn MemoryDevice, usage: BufferUsage, memory: MemoryProperties) -> u64 {
    let limits = device.limits();
    let mut alignment = 1;
    if usage.contains(BufferUsage::UNIFORM) {
        alignment = lcm(alignment, limits.min_uniform_buffer_offset_alignment);
    }
    if usage.contains(BufferUsage::STORAGE) {
        alignment = lcm(alignment, limits.min_storage_buffer_offset_alignment);
    }
    if memory.contains(MemoryProperties::HOST_VISIBLE) {
        alignment = lcm(alignment, limits.non_coherent_atom_size);
    }
    alignment
}

fn copy_mapped(source: &Arc<dyn RawBuffer>, target: &Arc<dyn RawBuffer>, offset: u64, size: u64) -> Result<()> {
    let source = BufferRange { raw: source.clone(), offset, size };
    let target = BufferRange { raw: target.clone(), offset, size };
    target.write(0, &source.read(0, size)?)
}

fn audit(state: &BufferState) -> Result<()> {
    let size = state.raw.size();
    let free = state.free_list.total_free();
    let used: u64 = state.allocations.values().map(|record| record.size).sum();
    if free + used != size {
        return Err(Error::InvariantViolation(format!(
            "'{}': free {} + used {} != size {}",
            state.name, free, used, size
        )));
    }
    if state.free_list.has_adjacent_blocks() {
        return Err(Error::InvariantViolation(format!("'{}': adjacent free blocks", state.name)));
    }

    let mut ranges: Vec<(u64, u64)> = state
        .free_list
        .blocks()
        .iter()
        .map(|block| (block.offset, block.end()))
        .chain(state.allocations.iter().map(|(offset, record)| (*offset, offset + record.size)))
        .collect();
    ranges.sort_unstable();
    if let Some(pair) = ranges.windows(2).find(|pair| pair[0].1 > pair[1].0) {
        return Err(Error::InvariantViolation(format!(
            "'{}': ranges [{}, {}) and [{}, {}) overlap",
            state.name, pair[0].0, pair[0].1, pair[1].0, pair[1].1
        )));
    }
    if let Some((offset, record)) = state.allocations.iter().find(|(offset, record)| *offset % record.alignment != 0) {
        return Err(Error::InvariantViolation(format!(
            "'{}': allocation at {} violates alignment {}",
            state.name, offset, record.alignment
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
