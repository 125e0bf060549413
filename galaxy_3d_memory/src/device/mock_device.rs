/// Mock memory device for unit tests (no GPU required)
///
/// Buffers are plain host allocations whose address doubles as the mapped
/// pointer. Command lists record commands and execute every copy on host
/// memory at submit time, so the whole transfer pipeline can be checked
/// byte for byte.

#[cfg(test)]
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
#[cfg(test)]
use std::sync::{Arc, Mutex, Weak};
#[cfg(test)]
use rustc_hash::FxHashMap;

#[cfg(test)]
use crate::device::{
    MemoryDevice, RawBuffer, RawImage, TransferCommandList,
    BufferDesc, BufferUsage, MemoryProperties, ImageDesc, ImageLayout,
    DeviceLimits, QueueFamilies, PipelineStages, BufferBarrier, ImageBarrier, CopyRegion,
};
#[cfg(test)]
use crate::error::{Error, Result};
#[cfg(test)]
use crate::engine_bail;

// ============================================================================
// Shared registries
// ============================================================================

#[cfg(test)]
type BufferRegistry = Arc<Mutex<FxHashMap<u64, Weak<MockRawBuffer>>>>;
#[cfg(test)]
type ImageRegistry = Arc<Mutex<FxHashMap<u64, Weak<MockImage>>>>;

/// Every command list submission, in order
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockCommandLog {
    pub submissions: Vec<Vec<MockCommand>>,
    pub waits: usize,
    pub pending: bool,
}

#[cfg(test)]
impl MockCommandLog {
    /// All copy_buffer commands of one submission
    pub fn copies(&self, submission: usize) -> Vec<(u64, u64, Vec<CopyRegion>)> {
        self.submissions
            .get(submission)
            .map(|commands| {
                commands
                    .iter()
                    .filter_map(|command| match command {
                        MockCommand::CopyBuffer { src, dst, regions } => {
                            Some((*src, *dst, regions.clone()))
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of copy regions recorded across all submissions
    pub fn total_copy_regions(&self) -> usize {
        (0..self.submissions.len())
            .map(|i| self.copies(i).iter().map(|(_, _, regions)| regions.len()).sum::<usize>())
            .sum()
    }
}

/// Recorded command
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    BufferBarriers {
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barriers: Vec<BufferBarrier>,
    },
    ImageBarrier {
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barrier: ImageBarrier,
    },
    CopyBuffer {
        src: u64,
        dst: u64,
        regions: Vec<CopyRegion>,
    },
    CopyBufferToImage {
        src: u64,
        src_offset: u64,
        image: u64,
        width: u32,
        height: u32,
    },
}

// ============================================================================
// Mock Buffer
// ============================================================================

#[cfg(test)]
pub struct MockRawBuffer {
    handle: u64,
    size: u64,
    usage: BufferUsage,
    properties: MemoryProperties,
    storage: *mut u8,
    budget: Arc<Mutex<Option<u64>>>,
    pub flush_count: AtomicUsize,
    pub debug_name: Mutex<String>,
}

// The storage pointer is owned by the buffer and only accessed through
// byte copies, like mapped GPU memory.
#[cfg(test)]
unsafe impl Send for MockRawBuffer {}
#[cfg(test)]
unsafe impl Sync for MockRawBuffer {}

#[cfg(test)]
impl MockRawBuffer {
    /// Copy `len` bytes out of the buffer
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        if offset + len > self.size {
            engine_bail!("galaxy3d::mock", "Read [{}, {}) out of bounds (size {})", offset, offset + len, self.size);
        }
        let mut out = vec![0u8; len as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(self.storage.add(offset as usize), out.as_mut_ptr(), len as usize);
        }
        Ok(out)
    }

    /// Copy bytes into the buffer (device-side write)
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if offset + data.len() as u64 > self.size {
            engine_bail!("galaxy3d::mock", "Write [{}, {}) out of bounds (size {})", offset, offset + data.len() as u64, self.size);
        }
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.storage.add(offset as usize), data.len());
        }
        Ok(())
    }
}

#[cfg(test)]
impl RawBuffer for MockRawBuffer {
    fn native(&self) -> u64 {
        self.handle
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn properties(&self) -> MemoryProperties {
        self.properties
    }

    fn mapped_ptr(&self) -> Option<*mut u8> {
        if self.properties.contains(MemoryProperties::HOST_VISIBLE) {
            Some(self.storage)
        } else {
            None
        }
    }

    fn flush(&self, offset: u64, size: u64) -> Result<()> {
        if offset + size > self.size {
            engine_bail!("galaxy3d::mock", "Flush [{}, {}) out of bounds (size {})", offset, offset + size, self.size);
        }
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_debug_name(&self, name: &str) {
        if let Ok(mut debug_name) = self.debug_name.lock() {
            *debug_name = name.to_string();
        }
    }
}

#[cfg(test)]
impl Drop for MockRawBuffer {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.storage, self.size as usize)));
        }
        if let Ok(mut budget) = self.budget.lock() {
            if let Some(remaining) = budget.as_mut() {
                *remaining += self.size;
            }
        }
    }
}

// ============================================================================
// Mock Image
// ============================================================================

#[cfg(test)]
pub struct MockImage {
    handle: u64,
    desc: ImageDesc,
    pub data: Mutex<Vec<u8>>,
    pub layout: Mutex<ImageLayout>,
}

#[cfg(test)]
impl RawImage for MockImage {
    fn native(&self) -> u64 {
        self.handle
    }

    fn desc(&self) -> &ImageDesc {
        &self.desc
    }
}

// ============================================================================
// Mock Command List
// ============================================================================

#[cfg(test)]
pub struct MockCommandList {
    buffers: BufferRegistry,
    images: ImageRegistry,
    log: Arc<Mutex<MockCommandLog>>,
    recording: Option<Vec<MockCommand>>,
    recorded: Option<Vec<MockCommand>>,
    semaphore: u64,
}

#[cfg(test)]
impl MockCommandList {
    fn buffer(&self, handle: u64) -> Result<Arc<MockRawBuffer>> {
        let buffers = self.buffers.lock().map_err(|_| Error::BackendError("registry poisoned".to_string()))?;
        match buffers.get(&handle).and_then(|weak| weak.upgrade()) {
            Some(buffer) => Ok(buffer),
            None => engine_bail!("galaxy3d::mock", "Command references destroyed buffer {:#x}", handle),
        }
    }

    fn image(&self, handle: u64) -> Result<Arc<MockImage>> {
        let images = self.images.lock().map_err(|_| Error::BackendError("registry poisoned".to_string()))?;
        match images.get(&handle).and_then(|weak| weak.upgrade()) {
            Some(image) => Ok(image),
            None => engine_bail!("galaxy3d::mock", "Command references destroyed image {:#x}", handle),
        }
    }

    fn push(&mut self, command: MockCommand) -> Result<()> {
        match self.recording.as_mut() {
            Some(commands) => {
                commands.push(command);
                Ok(())
            }
            None => engine_bail!("galaxy3d::mock", "Command recorded outside begin/end"),
        }
    }

    fn execute(&self, command: &MockCommand) -> Result<()> {
        match command {
            MockCommand::BufferBarriers { barriers, .. } => {
                for barrier in barriers {
                    self.buffer(barrier.buffer)?;
                }
            }
            MockCommand::ImageBarrier { barrier, .. } => {
                let image = self.image(barrier.image)?;
                let mut layout = image.layout.lock().map_err(|_| Error::BackendError("image poisoned".to_string()))?;
                if barrier.old_layout != ImageLayout::Undefined && barrier.old_layout != *layout {
                    engine_bail!("galaxy3d::mock", "Image barrier old layout {:?} does not match {:?}", barrier.old_layout, *layout);
                }
                *layout = barrier.new_layout;
            }
            MockCommand::CopyBuffer { src, dst, regions } => {
                let src = self.buffer(*src)?;
                let dst = self.buffer(*dst)?;
                for region in regions {
                    let bytes = src.read(region.src_offset, region.size)?;
                    dst.write(region.dst_offset, &bytes)?;
                }
            }
            MockCommand::CopyBufferToImage { src, src_offset, image, width, height } => {
                let src = self.buffer(*src)?;
                let image = self.image(*image)?;
                if *image.layout.lock().map_err(|_| Error::BackendError("image poisoned".to_string()))?
                    != ImageLayout::TransferDstOptimal
                {
                    engine_bail!("galaxy3d::mock", "Copy into image not in TransferDstOptimal layout");
                }
                let len = *width as u64 * *height as u64 * image.desc.format.bytes_per_pixel() as u64;
                let bytes = src.read(*src_offset, len)?;
                let mut data = image.data.lock().map_err(|_| Error::BackendError("image poisoned".to_string()))?;
                *data = bytes;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl TransferCommandList for MockCommandList {
    fn begin(&mut self) -> Result<()> {
        let pending = self.log.lock().map(|log| log.pending).unwrap_or(false);
        if pending {
            engine_bail!("galaxy3d::mock", "Command list reset while its submission is still pending");
        }
        self.recording = Some(Vec::new());
        self.recorded = None;
        Ok(())
    }

    fn buffer_barriers(
        &mut self,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barriers: &[BufferBarrier],
    ) -> Result<()> {
        if barriers.is_empty() {
            return Ok(());
        }
        self.push(MockCommand::BufferBarriers {
            src_stages,
            dst_stages,
            barriers: barriers.to_vec(),
        })
    }

    fn image_barrier(
        &mut self,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barrier: ImageBarrier,
    ) -> Result<()> {
        self.push(MockCommand::ImageBarrier { src_stages, dst_stages, barrier })
    }

    fn copy_buffer(&mut self, src: u64, dst: u64, regions: &[CopyRegion]) -> Result<()> {
        self.push(MockCommand::CopyBuffer {
            src,
            dst,
            regions: regions.to_vec(),
        })
    }

    fn copy_buffer_to_image(
        &mut self,
        src: u64,
        src_offset: u64,
        image: u64,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.push(MockCommand::CopyBufferToImage { src, src_offset, image, width, height })
    }

    fn end(&mut self) -> Result<()> {
        match self.recording.take() {
            Some(commands) => {
                self.recorded = Some(commands);
                Ok(())
            }
            None => engine_bail!("galaxy3d::mock", "end() without begin()"),
        }
    }

    fn submit(&mut self) -> Result<()> {
        let commands = match self.recorded.take() {
            Some(commands) => commands,
            None => engine_bail!("galaxy3d::mock", "submit() of a command list that was not ended"),
        };
        for command in &commands {
            self.execute(command)?;
        }
        let mut log = self.log.lock().map_err(|_| Error::BackendError("log poisoned".to_string()))?;
        log.submissions.push(commands);
        log.pending = true;
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        let mut log = self.log.lock().map_err(|_| Error::BackendError("log poisoned".to_string()))?;
        if !log.pending {
            engine_bail!("galaxy3d::mock", "wait() without a pending submission");
        }
        log.pending = false;
        log.waits += 1;
        Ok(())
    }

    fn signal_semaphore(&self) -> u64 {
        self.semaphore
    }
}

// ============================================================================
// Mock Device
// ============================================================================

#[cfg(test)]
pub struct MockDevice {
    limits: DeviceLimits,
    families: QueueFamilies,
    next_handle: AtomicU64,
    budget: Arc<Mutex<Option<u64>>>,
    buffers: BufferRegistry,
    images: ImageRegistry,
    pub log: Arc<Mutex<MockCommandLog>>,
    pub created_buffers: AtomicUsize,
}

#[cfg(test)]
impl MockDevice {
    /// Mock device with dedicated transfer family 1 and graphics family 0
    pub fn new() -> Self {
        Self {
            limits: DeviceLimits {
                min_uniform_buffer_offset_alignment: 256,
                min_storage_buffer_offset_alignment: 16,
                non_coherent_atom_size: 64,
                optimal_buffer_copy_offset_alignment: 4,
            },
            families: QueueFamilies { graphics: 0, transfer: 1 },
            next_handle: AtomicU64::new(0x1000),
            budget: Arc::new(Mutex::new(None)),
            buffers: Arc::new(Mutex::new(FxHashMap::default())),
            images: Arc::new(Mutex::new(FxHashMap::default())),
            log: Arc::new(Mutex::new(MockCommandLog::default())),
            created_buffers: AtomicUsize::new(0),
        }
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_queue_families(mut self, families: QueueFamilies) -> Self {
        self.families = families;
        self
    }

    /// Fail buffer creation with `OutOfMemory` once `bytes` are in use
    pub fn with_memory_budget(self, bytes: u64) -> Self {
        if let Ok(mut budget) = self.budget.lock() {
            *budget = Some(bytes);
        }
        self
    }

    /// Look up a live buffer by native handle
    pub fn buffer(&self, handle: u64) -> Option<Arc<MockRawBuffer>> {
        self.buffers.lock().ok()?.get(&handle)?.upgrade()
    }

    /// Look up a live image by native handle
    pub fn image(&self, handle: u64) -> Option<Arc<MockImage>> {
        self.images.lock().ok()?.get(&handle)?.upgrade()
    }

    /// Read bytes from any live buffer (device-local included)
    pub fn read_buffer(&self, handle: u64, offset: u64, len: u64) -> Vec<u8> {
        self.buffer(handle)
            .and_then(|buffer| buffer.read(offset, len).ok())
            .unwrap_or_default()
    }

    /// Number of raw buffers still alive
    pub fn live_buffer_count(&self) -> usize {
        self.buffers
            .lock()
            .map(|buffers| buffers.values().filter(|weak| weak.strong_count() > 0).count())
            .unwrap_or(0)
    }

    fn allocate_handle(&self) -> u64 {
        self.next_handle.fetch_add(0x10, Ordering::SeqCst)
    }
}

#[cfg(test)]
impl MemoryDevice for MockDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn RawBuffer>> {
        if desc.size == 0 {
            return Err(Error::InvalidResource(format!("Buffer '{}' has zero size", desc.name)));
        }
        {
            let mut budget = self.budget.lock().map_err(|_| Error::BackendError("budget poisoned".to_string()))?;
            if let Some(remaining) = budget.as_mut() {
                if desc.size > *remaining {
                    return Err(Error::OutOfMemory);
                }
                *remaining -= desc.size;
            }
        }

        let storage = Box::into_raw(vec![0u8; desc.size as usize].into_boxed_slice()) as *mut u8;
        let buffer = Arc::new(MockRawBuffer {
            handle: self.allocate_handle(),
            size: desc.size,
            usage: desc.usage | BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
            properties: desc.memory,
            storage,
            budget: self.budget.clone(),
            flush_count: AtomicUsize::new(0),
            debug_name: Mutex::new(desc.name.clone()),
        });

        self.buffers
            .lock()
            .map_err(|_| Error::BackendError("registry poisoned".to_string()))?
            .insert(buffer.handle, Arc::downgrade(&buffer));
        self.created_buffers.fetch_add(1, Ordering::SeqCst);
        Ok(buffer)
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<Arc<dyn RawImage>> {
        let image = Arc::new(MockImage {
            handle: self.allocate_handle(),
            desc: desc.clone(),
            data: Mutex::new(Vec::new()),
            layout: Mutex::new(ImageLayout::Undefined),
        });
        self.images
            .lock()
            .map_err(|_| Error::BackendError("registry poisoned".to_string()))?
            .insert(image.handle, Arc::downgrade(&image));
        Ok(image)
    }

    fn create_transfer_command_list(&self) -> Result<Box<dyn TransferCommandList>> {
        Ok(Box::new(MockCommandList {
            buffers: self.buffers.clone(),
            images: self.images.clone(),
            log: self.log.clone(),
            recording: None,
            recorded: None,
            semaphore: self.allocate_handle(),
        }))
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn queue_families(&self) -> QueueFamilies {
        self.families
    }
}

#[cfg(test)]
#[path = "mock_device_tests.rs"]
mod tests;
