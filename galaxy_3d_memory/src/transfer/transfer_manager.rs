/// TransferManager - per-frame batched uploads on the transfer queue
///
/// Producers enqueue copies at any point of the frame (`copy_to_vector`,
/// `copy_to_image`, ...). Once per frame the render loop calls
/// [`submit_now`](TransferManager::submit_now) before the graphics
/// submission that consumes the uploads (waiting on
/// [`signal_semaphore`](TransferManager::signal_semaphore)), and
/// [`dump`](TransferManager::dump) after it, before the next frame's
/// enqueues. `dump` is the only blocking call.
///
/// # Recording
///
/// 1. Drain up to `transfer_batch_limit` transfers (migrations first).
///    Raw data bound for device memory goes through the staging buffer;
///    when it is full the transfer goes back to the front of the queue and
///    draining stops for this frame. Nothing enqueued after a deferred
///    transfer is staged before it.
/// 2. Acquire barrier on every destination region (graphics -> transfer family).
/// 3. The frame's copy steps in staging order: one `copy_buffer` per batch,
///    each preceded by a barrier ordering it after earlier copies touching
///    its source or target bytes, and image uploads at their position.
/// 4. Release barrier on every destination region (transfer -> graphics family).

use std::sync::Arc;
use bytemuck::Pod;
use crate::config::MemoryConfig;
use crate::device::{
    AccessFlags, BufferBarrier, BufferDesc, BufferUsage, DeviceLimits, MemoryDevice,
    PipelineStages, QueueFamilies, TransferCommandList, QUEUE_FAMILY_IGNORED,
};
use crate::error::{Error, Result};
use crate::memory::{BufferHandle, BufferVector, DeviceVector, ImageHandle, SuballocationHandle};
use crate::transfer::{CopyRegionMap, CopyStep, StageContext, TransferData, TransferId, TransferQueue};
use crate::utils::{align, lcm};
use crate::{engine_debug, engine_info, engine_trace, engine_warn};

const LOG_SOURCE: &str = "galaxy3d::memory::Transfer";

/// Counters accumulated over the manager's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Command list submissions
    pub submissions: u64,
    /// Transfers recorded (or written directly)
    pub staged_transfers: u64,
    /// Bytes written into the staging buffer
    pub staged_bytes: u64,
    /// Raw writes into host-visible targets that skipped the GPU
    pub direct_writes: u64,
    /// Frames in which draining stopped on a full staging buffer
    pub deferrals: u64,
    /// Staging buffer growths
    pub staging_growths: u64,
    /// Buffer copy regions recorded
    pub copy_regions: u64,
}

pub struct TransferManager {
    device: Arc<dyn MemoryDevice>,
    queue: Arc<TransferQueue>,
    staging: Arc<BufferHandle>,
    command_list: Box<dyn TransferCommandList>,
    in_flight: Vec<TransferData>,
    copy_regions: CopyRegionMap,
    families: QueueFamilies,
    limits: DeviceLimits,
    batch_limit: usize,
    auto_grow_staging: bool,
    transfers_enabled: bool,
    submitted: bool,
    stats: TransferStats,
}

impl TransferManager {
    pub fn new(device: Arc<dyn MemoryDevice>, config: &MemoryConfig) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(TransferQueue::new());
        let staging = BufferHandle::with_growth_factor(
            device.clone(),
            &BufferDesc::host_visible("galaxy3d_staging", config.staging_buffer_size, BufferUsage::TRANSFER_SRC),
            None,
            config.growth_factor,
        )?;
        let command_list = device.create_transfer_command_list()?;
        let families = device.queue_families();
        let limits = device.limits();

        engine_info!(LOG_SOURCE, "Transfer manager ready (staging {} bytes, batch limit {}, families graphics={} transfer={})",
            config.staging_buffer_size, config.transfer_batch_limit, families.graphics, families.transfer);

        Ok(Self {
            device,
            queue,
            staging,
            command_list,
            in_flight: Vec::new(),
            copy_regions: CopyRegionMap::new(),
            families,
            limits,
            batch_limit: config.transfer_batch_limit,
            auto_grow_staging: config.auto_grow_staging,
            transfers_enabled: true,
            submitted: false,
            stats: TransferStats::default(),
        })
    }

    // ===== ENQUEUE =====

    /// Upload raw bytes to the start of a vector
    pub fn copy_to_vector(&self, data: &[u8], target: &BufferVector) -> Result<TransferId> {
        self.copy_to_suballocation(data, target.suballocation(), 0)
    }

    /// Copy a vector's contents into another vector at `target_offset` bytes
    pub fn copy_vector_to_vector(
        &self,
        source: &BufferVector,
        target: &BufferVector,
        target_offset: u64,
    ) -> Result<TransferId> {
        let size = source.byte_len().min(target.suballocation().size().saturating_sub(target_offset));
        self.push(TransferData::suballocation_to_suballocation(
            &self.queue,
            source.suballocation().clone(),
            target.suballocation().clone(),
            0,
            target_offset,
            Some(size),
        )?)
    }

    /// Upload raw bytes into a suballocation at `target_offset`
    pub fn copy_to_suballocation(
        &self,
        data: &[u8],
        target: &Arc<SuballocationHandle>,
        target_offset: u64,
    ) -> Result<TransferId> {
        self.push(TransferData::raw_to_suballocation(
            &self.queue,
            data.to_vec(),
            target.clone(),
            target_offset,
        )?)
    }

    /// Upload typed elements to the start of a device vector
    pub fn upload<T: Pod>(&self, data: &[T], target: &DeviceVector<T>) -> Result<TransferId> {
        self.copy_to_vector(bytemuck::cast_slice(data), target.vector())
    }

    /// Upload tightly packed texels covering the whole image
    pub fn copy_to_image(&self, data: &[u8], image: &Arc<ImageHandle>) -> Result<TransferId> {
        self.push(TransferData::raw_to_image(&self.queue, data.to_vec(), image.clone())?)
    }

    /// Upload an image from texels already in GPU memory
    pub fn copy_vector_to_image(&self, source: &BufferVector, image: &Arc<ImageHandle>) -> Result<TransferId> {
        self.push(TransferData::suballocation_to_image(
            &self.queue,
            source.suballocation().clone(),
            0,
            image.clone(),
        )?)
    }

    fn push(&self, data: TransferData) -> Result<TransferId> {
        let id = data.id();
        engine_trace!(LOG_SOURCE, "Enqueued {:?}", data);
        self.queue.enqueue(data);
        Ok(id)
    }

    // ===== FRAME =====

    /// Record and submit this frame's transfers
    ///
    /// Returns `Ok(false)` without doing anything if the previous submission
    /// has not been `dump`ed yet.
    pub fn submit_now(&mut self) -> Result<bool> {
        if !self.transfers_enabled {
            engine_debug!(LOG_SOURCE, "submit_now skipped: previous frame not dumped");
            return Ok(false);
        }

        let stats_before = self.stats;
        self.command_list.begin()?;
        let staged = match self.record_and_submit() {
            Ok(staged) => staged,
            Err(e) => {
                self.abandon_frame(stats_before);
                return Err(e);
            }
        };
        self.submitted = true;
        self.transfers_enabled = false;
        self.stats.submissions += 1;

        for data in self.in_flight.iter_mut() {
            data.mark_good();
            data.cleanup_source(&self.queue);
        }
        let frame = self.queue.advance_frame();

        if staged > 0 {
            engine_debug!(LOG_SOURCE, "Submitted {} transfers ({} copy batches, {} image uploads), next frame {}",
                staged, self.copy_regions.len(), self.copy_regions.image_copies().len(), frame);
        }
        Ok(true)
    }

    /// Wait for the last submission, then release everything it used
    pub fn dump(&mut self) -> Result<()> {
        if self.submitted {
            self.command_list.wait()?;
            self.submitted = false;
        }
        self.in_flight.clear();
        self.copy_regions.clear();
        let released = self.queue.collect_retired_before(self.queue.frame());
        if released > 0 {
            engine_trace!(LOG_SOURCE, "Released {} retired suballocations", released);
        }
        self.transfers_enabled = true;
        Ok(())
    }

    fn record_and_submit(&mut self) -> Result<usize> {
        let staged = self.record_commands()?;
        self.command_list.end()?;
        self.command_list.submit()?;
        Ok(staged)
    }

    /// Drain the queue into the open command list; returns how many transfers were staged
    fn record_commands(&mut self) -> Result<usize> {
        let mut staged_count = 0;
        let mut drained = 0;

        while drained < self.batch_limit {
            let Some(mut data) = self.queue.pop_front() else {
                break;
            };
            drained += 1;

            if !data.is_ready(&self.queue) {
                engine_debug!(LOG_SOURCE, "Source of {:?} still has unstaged writers, deferring", data);
                self.queue.requeue_front(vec![data]);
                break;
            }

            let staged = match self.stage_or_grow(&mut data) {
                Ok(staged) => staged,
                Err(e) => {
                    self.queue.requeue_front(vec![data]);
                    return Err(e);
                }
            };

            if staged {
                self.queue.mark_staged(data.id());
                self.stats.staged_transfers += 1;
                self.in_flight.push(data);
                staged_count += 1;
            } else {
                engine_debug!(LOG_SOURCE, "Staging buffer full, deferring {:?} to a later frame", data);
                self.stats.deferrals += 1;
                self.queue.requeue_front(vec![data]);
                break;
            }
        }

        self.record_steps()?;
        self.record_release()?;
        Ok(staged_count)
    }

    /// Put this frame's transfers back at the front of the queue, unstaged
    ///
    /// Writes already made into host-visible memory are made again when the
    /// transfers are staged next. The next `begin` resets the command list.
    fn abandon_frame(&mut self, stats_before: TransferStats) {
        let mut restore: Vec<TransferData> = self.in_flight.drain(..).collect();
        for data in restore.iter_mut() {
            data.unstage(&self.queue);
        }
        engine_warn!(LOG_SOURCE, "Frame not submitted, {} staged transfers returned to the queue", restore.len());
        self.queue.requeue_front(restore);
        self.copy_regions.clear();
        self.stats = TransferStats {
            staging_growths: self.stats.staging_growths,
            ..stats_before
        };
    }

    fn stage(&mut self, data: &mut TransferData) -> Result<bool> {
        let mut ctx = StageContext {
            staging: &self.staging,
            copy_regions: &mut self.copy_regions,
            limits: self.limits,
            stats: &mut self.stats,
        };
        data.stage(&mut ctx)
    }

    /// Stage; if the idle staging buffer is too small, grow it once and retry
    fn stage_or_grow(&mut self, data: &mut TransferData) -> Result<bool> {
        if self.stage(data)? {
            return Ok(true);
        }
        match data.staging_requirement() {
            Some(required) if self.auto_grow_staging && self.staging.allocation_count() == 0 => {
                self.grow_staging(required)?;
                self.stage(data)
            }
            _ => Ok(false),
        }
    }

    fn grow_staging(&mut self, required: u64) -> Result<()> {
        let alignment = lcm(self.staging.alignment(), lcm(16, self.limits.optimal_buffer_copy_offset_alignment));
        let new_size = self.staging.grown_size(align(required, alignment), alignment);
        engine_info!(LOG_SOURCE, "Growing idle staging buffer from {} to {} bytes for a {} byte transfer",
            self.staging.size(), new_size, required);
        self.staging.resize(new_size)?;
        self.stats.staging_growths += 1;
        Ok(())
    }

    fn record_steps(&mut self) -> Result<()> {
        if self.copy_regions.is_empty() {
            return Ok(());
        }
        let (acquire_src, acquire_dst) = self.ownership(self.families.graphics, self.families.transfer);

        // Take ownership of every destination region
        let acquire: Vec<BufferBarrier> = self
            .copy_regions
            .batches()
            .iter()
            .flat_map(|batch| {
                let target = batch.target_native();
                batch.regions.iter().map(move |region| BufferBarrier {
                    buffer: target,
                    offset: region.dst_offset,
                    size: region.size,
                    src_access: AccessFlags::empty(),
                    dst_access: AccessFlags::TRANSFER_WRITE,
                    src_queue_family: acquire_src,
                    dst_queue_family: acquire_dst,
                })
            })
            .collect();
        self.command_list.buffer_barriers(PipelineStages::BOTTOM_OF_PIPE, PipelineStages::TRANSFER, &acquire)?;

        for step in self.copy_regions.steps() {
            match *step {
                CopyStep::Buffer(slot) => {
                    let batch = &self.copy_regions.batches()[slot];
                    let (source, target) = (batch.source_native(), batch.target_native());
                    // After earlier writes of the source and earlier accesses of the target
                    let ordering: Vec<BufferBarrier> = batch
                        .regions
                        .iter()
                        .flat_map(|region| {
                            [
                                BufferBarrier {
                                    buffer: source,
                                    offset: region.src_offset,
                                    size: region.size,
                                    src_access: AccessFlags::TRANSFER_WRITE,
                                    dst_access: AccessFlags::TRANSFER_READ,
                                    src_queue_family: QUEUE_FAMILY_IGNORED,
                                    dst_queue_family: QUEUE_FAMILY_IGNORED,
                                },
                                BufferBarrier {
                                    buffer: target,
                                    offset: region.dst_offset,
                                    size: region.size,
                                    src_access: AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE,
                                    dst_access: AccessFlags::TRANSFER_WRITE,
                                    src_queue_family: QUEUE_FAMILY_IGNORED,
                                    dst_queue_family: QUEUE_FAMILY_IGNORED,
                                },
                            ]
                        })
                        .collect();
                    self.command_list.buffer_barriers(PipelineStages::TRANSFER, PipelineStages::TRANSFER, &ordering)?;
                    self.command_list.copy_buffer(source, target, &batch.regions)?;
                    self.stats.copy_regions += batch.regions.len() as u64;
                }
                CopyStep::Image(slot) => {
                    let copy = &self.copy_regions.image_copies()[slot];
                    // The texels may have been written by an earlier copy
                    let source = BufferBarrier {
                        buffer: copy.source.native(),
                        offset: copy.source.offset,
                        size: copy.source.size,
                        src_access: AccessFlags::TRANSFER_WRITE,
                        dst_access: AccessFlags::TRANSFER_READ,
                        src_queue_family: QUEUE_FAMILY_IGNORED,
                        dst_queue_family: QUEUE_FAMILY_IGNORED,
                    };
                    self.command_list.buffer_barriers(PipelineStages::TRANSFER, PipelineStages::TRANSFER, &[source])?;
                    copy.record(self.command_list.as_mut(), self.families)?;
                }
            }
        }
        Ok(())
    }

    /// Hand every destination region to the graphics family
    ///
    /// A release to another family only uses stages the transfer queue
    /// supports; the graphics side's acquire names the consuming stages.
    fn record_release(&mut self) -> Result<()> {
        let (release_src, release_dst) = self.ownership(self.families.transfer, self.families.graphics);
        let (dst_stages, dst_access) = if self.families.needs_ownership_transfer() {
            (PipelineStages::BOTTOM_OF_PIPE, AccessFlags::empty())
        } else {
            (
                PipelineStages::VERTEX_INPUT | PipelineStages::VERTEX_SHADER | PipelineStages::COMPUTE_SHADER,
                AccessFlags::VERTEX_ATTRIBUTE_READ
                    | AccessFlags::INDEX_READ
                    | AccessFlags::UNIFORM_READ
                    | AccessFlags::SHADER_READ,
            )
        };
        let release: Vec<BufferBarrier> = self
            .copy_regions
            .batches()
            .iter()
            .flat_map(|batch| {
                let target = batch.target_native();
                batch.regions.iter().map(move |region| BufferBarrier {
                    buffer: target,
                    offset: region.dst_offset,
                    size: region.size,
                    src_access: AccessFlags::TRANSFER_WRITE,
                    dst_access,
                    src_queue_family: release_src,
                    dst_queue_family: release_dst,
                })
            })
            .collect();
        self.command_list.buffer_barriers(PipelineStages::TRANSFER, dst_stages, &release)
    }
    fn ownership(&self, from: u32, to: u32) -> (u32, u32) {
        if self.families.needs_ownership_transfer() {
            (from, to)
        } else {
            (QUEUE_FAMILY_IGNORED, QUEUE_FAMILY_IGNORED)
        }
    }

    // ===== STAGING =====

    /// Grow the staging buffer; only allowed while no staging slot is in use
    pub fn resize_buffer(&mut self, new_size: u64) -> Result<()> {
        let in_use = self.staging.allocation_count();
        if in_use > 0 {
            return Err(Error::InvalidResource(format!(
                "Staging buffer has {} slots in flight; dump() before resizing",
                in_use
            )));
        }
        self.staging.resize(new_size)
    }

    // ===== ACCESSORS =====

    /// Queue shared with buffers created for this manager
    pub fn queue(&self) -> &Arc<TransferQueue> {
        &self.queue
    }

    pub fn staging(&self) -> &Arc<BufferHandle> {
        &self.staging
    }

    pub fn device(&self) -> &Arc<dyn MemoryDevice> {
        &self.device
    }

    /// Semaphore the graphics submission must wait on
    pub fn signal_semaphore(&self) -> u64 {
        self.command_list.signal_semaphore()
    }

    pub fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    /// Copy batches recorded since the last `dump`
    pub fn copy_regions(&self) -> &CopyRegionMap {
        &self.copy_regions
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether `submit_now` would record a new frame
    pub fn is_enabled(&self) -> bool {
        self.transfers_enabled
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }
}

impl Drop for TransferManager {
    fn drop(&mut self) {
        if self.submitted {
            if let Err(e) = self.command_list.wait() {
                engine_warn!(LOG_SOURCE, "Waiting for the last transfer submission failed: {}", e);
            }
        }
        self.in_flight.clear();
        self.copy_regions.clear();
        self.queue.collect_retired_before(u64::MAX);
    }
}

#[cfg(test)]
#[path = "transfer_manager_tests.rs"]
mod tests;
