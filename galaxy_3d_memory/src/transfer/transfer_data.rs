/// TransferData - one pending copy and its staging state machine
///
/// A transfer moves bytes from a source (raw host bytes or a suballocation)
/// into a target (a suballocation or an image). Construction marks the
/// target not-ready; `stage` records the copy for the current frame;
/// `mark_good` and `cleanup_source` run once the frame is submitted.
///
/// ```text
///   Bad ──stage()──▶ Staged ──submit──▶ Good
///    ▲      │           │
///    └──────┘           │ staging buffer full: stays Bad, retried next frame
///    ▲                  │
///    └──unstage()───────┘ frame abandoned before submission
/// ```

use std::sync::Arc;
use crate::device::{
    AccessFlags, CopyRegion, DeviceLimits, ImageBarrier, ImageLayout, PipelineStages,
    QueueFamilies, TransferCommandList, QUEUE_FAMILY_IGNORED,
};
use crate::error::{Error, Result};
use crate::memory::{BufferHandle, BufferRange, ImageHandle, SuballocationHandle};
use crate::transfer::{CopyRegionMap, TransferId, TransferQueue, TransferStats};
use crate::utils::lcm;

/// The four transfer shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    ImageFromRaw,
    ImageFromSuballocation,
    SuballocationFromSuballocation,
    SuballocationFromRaw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Enqueued, target contents not valid yet
    Bad,
    /// Recorded into this frame's command list (or written directly)
    Staged,
    /// Submitted; the target is ready for consumers of the frame
    Good,
}

pub enum TransferSource {
    Raw {
        data: Vec<u8>,
        /// Staging slot holding `data` once staged
        staged: Option<Arc<SuballocationHandle>>,
    },
    Suballocation(Arc<SuballocationHandle>),
}

pub enum TransferTarget {
    Suballocation {
        handle: Arc<SuballocationHandle>,
        /// Storage fixed at enqueue time (migrations); `None` follows the
        /// buffer's current storage
        pinned: Option<BufferRange>,
    },
    Image(Arc<ImageHandle>),
}

/// A buffer-to-image upload recorded after this frame's buffer copies
pub struct ImageCopy {
    pub source: BufferRange,
    pub image: Arc<ImageHandle>,
}

impl ImageCopy {
    /// Layout transition, copy, then release to the graphics family
    ///
    /// A release to another family only uses stages the transfer queue
    /// supports; the graphics side's acquire names the shader stages.
    pub fn record(&self, command_list: &mut dyn TransferCommandList, families: QueueFamilies) -> Result<()> {
        let desc = self.image.desc();
        let (release_src, release_dst, release_stages, release_access) = if families.needs_ownership_transfer() {
            (families.transfer, families.graphics, PipelineStages::BOTTOM_OF_PIPE, AccessFlags::empty())
        } else {
            (
                QUEUE_FAMILY_IGNORED,
                QUEUE_FAMILY_IGNORED,
                PipelineStages::FRAGMENT_SHADER | PipelineStages::COMPUTE_SHADER,
                AccessFlags::SHADER_READ,
            )
        };

        command_list.image_barrier(
            PipelineStages::TOP_OF_PIPE,
            PipelineStages::TRANSFER,
            ImageBarrier {
                image: self.image.native(),
                old_layout: ImageLayout::Undefined,
                new_layout: ImageLayout::TransferDstOptimal,
                src_access: AccessFlags::empty(),
                dst_access: AccessFlags::TRANSFER_WRITE,
                src_queue_family: QUEUE_FAMILY_IGNORED,
                dst_queue_family: QUEUE_FAMILY_IGNORED,
            },
        )?;
        command_list.copy_buffer_to_image(
            self.source.native(),
            self.source.offset,
            self.image.native(),
            desc.width,
            desc.height,
        )?;
        command_list.image_barrier(
            PipelineStages::TRANSFER,
            release_stages,
            ImageBarrier {
                image: self.image.native(),
                old_layout: ImageLayout::TransferDstOptimal,
                new_layout: ImageLayout::ShaderReadOnlyOptimal,
                src_access: AccessFlags::TRANSFER_WRITE,
                dst_access: release_access,
                src_queue_family: release_src,
                dst_queue_family: release_dst,
            },
        )
    }
}

/// Everything `stage` may touch
pub(crate) struct StageContext<'a> {
    pub staging: &'a Arc<BufferHandle>,
    pub copy_regions: &'a mut CopyRegionMap,
    pub limits: DeviceLimits,
    pub stats: &'a mut TransferStats,
}

pub struct TransferData {
    id: TransferId,
    source: TransferSource,
    target: TransferTarget,
    source_offset: u64,
    target_offset: u64,
    size: u64,
    state: TransferState,
    migration: bool,
}

impl TransferData {
    /// Raw bytes into a suballocation at `target_offset`
    pub fn raw_to_suballocation(
        queue: &TransferQueue,
        data: Vec<u8>,
        target: Arc<SuballocationHandle>,
        target_offset: u64,
    ) -> Result<Self> {
        let size = data.len() as u64;
        if size == 0 {
            return Err(Error::InvalidResource("Transfer of zero bytes".to_string()));
        }
        check_fits("target", size, target_offset, target.size())?;
        Ok(Self::new(
            queue,
            TransferSource::Raw { data, staged: None },
            TransferTarget::Suballocation { handle: target, pinned: None },
            0,
            target_offset,
            size,
            false,
        ))
    }

    /// Suballocation into suballocation
    ///
    /// Without an explicit `size`, copies as much as both sides hold past
    /// their offsets.
    pub fn suballocation_to_suballocation(
        queue: &TransferQueue,
        source: Arc<SuballocationHandle>,
        target: Arc<SuballocationHandle>,
        source_offset: u64,
        target_offset: u64,
        size: Option<u64>,
    ) -> Result<Self> {
        let available = source.size().saturating_sub(source_offset)
            .min(target.size().saturating_sub(target_offset));
        let size = size.unwrap_or(available);
        if size == 0 {
            return Err(Error::InvalidResource("Transfer of zero bytes".to_string()));
        }
        check_fits("source", size, source_offset, source.size())?;
        check_fits("target", size, target_offset, target.size())?;
        Ok(Self::new(
            queue,
            TransferSource::Suballocation(source),
            TransferTarget::Suballocation { handle: target, pinned: None },
            source_offset,
            target_offset,
            size,
            false,
        ))
    }

    /// Move a live allocation out of retired storage into `pinned`
    pub(crate) fn migration(
        queue: &TransferQueue,
        source: Arc<SuballocationHandle>,
        target: Arc<SuballocationHandle>,
        pinned: BufferRange,
    ) -> Result<Self> {
        let size = source.size().min(pinned.size);
        check_fits("target", size, 0, target.size())?;
        Ok(Self::new(
            queue,
            TransferSource::Suballocation(source),
            TransferTarget::Suballocation { handle: target, pinned: Some(pinned) },
            0,
            0,
            size,
            true,
        ))
    }

    /// Raw texels filling a whole image
    pub fn raw_to_image(queue: &TransferQueue, data: Vec<u8>, image: Arc<ImageHandle>) -> Result<Self> {
        let size = image.desc().byte_size();
        if data.len() as u64 != size {
            return Err(Error::InvalidResource(format!(
                "Image '{}' needs {} bytes, got {}",
                image.desc().name,
                size,
                data.len()
            )));
        }
        Ok(Self::new(
            queue,
            TransferSource::Raw { data, staged: None },
            TransferTarget::Image(image),
            0,
            0,
            size,
            false,
        ))
    }

    /// Tightly packed texels read from a suballocation at `source_offset`
    pub fn suballocation_to_image(
        queue: &TransferQueue,
        source: Arc<SuballocationHandle>,
        source_offset: u64,
        image: Arc<ImageHandle>,
    ) -> Result<Self> {
        let size = image.desc().byte_size();
        check_fits("source", size, source_offset, source.size())?;
        Ok(Self::new(
            queue,
            TransferSource::Suballocation(source),
            TransferTarget::Image(image),
            source_offset,
            0,
            size,
            false,
        ))
    }

    fn new(
        queue: &TransferQueue,
        source: TransferSource,
        target: TransferTarget,
        source_offset: u64,
        target_offset: u64,
        size: u64,
        migration: bool,
    ) -> Self {
        let mut data = Self {
            id: queue.allocate_id(),
            source,
            target,
            source_offset,
            target_offset,
            size,
            state: TransferState::Bad,
            migration,
        };
        data.mark_bad();
        data
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn kind(&self) -> TransferKind {
        match (&self.source, &self.target) {
            (TransferSource::Raw { .. }, TransferTarget::Image(_)) => TransferKind::ImageFromRaw,
            (TransferSource::Suballocation(_), TransferTarget::Image(_)) => TransferKind::ImageFromSuballocation,
            (TransferSource::Suballocation(_), TransferTarget::Suballocation { .. }) => {
                TransferKind::SuballocationFromSuballocation
            }
            (TransferSource::Raw { .. }, TransferTarget::Suballocation { .. }) => TransferKind::SuballocationFromRaw,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Bytes copied
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_migration(&self) -> bool {
        self.migration
    }

    /// Bytes this transfer needs in the staging buffer (raw sources bound for device memory)
    ///
    /// A raw write into host-visible memory only goes through staging when
    /// a copy of the same frame touches its bytes; it then waits for a
    /// frame where it can be written directly rather than growing staging.
    pub fn staging_requirement(&self) -> Option<u64> {
        match (&self.source, &self.target) {
            (TransferSource::Raw { .. }, TransferTarget::Suballocation { handle, pinned }) => {
                let host_visible = match pinned {
                    Some(range) => range.raw.mapped_ptr().is_some(),
                    None => handle.buffer().is_host_visible(),
                };
                if host_visible { None } else { Some(self.size) }
            }
            (TransferSource::Raw { .. }, TransferTarget::Image(_)) => Some(self.size),
            (TransferSource::Suballocation(_), _) => None,
        }
    }

    /// Target became invalid: record this transfer as one of its writers
    pub fn mark_bad(&mut self) {
        self.state = TransferState::Bad;
        match &self.target {
            TransferTarget::Suballocation { handle, .. } => handle.readiness().mark_bad(self.id),
            TransferTarget::Image(image) => image.readiness().mark_bad(self.id),
        }
    }

    /// Submitted: this transfer no longer blocks the target's readiness
    pub fn mark_good(&mut self) {
        self.state = TransferState::Good;
        match &self.target {
            TransferTarget::Suballocation { handle, .. } => handle.readiness().mark_good(self.id),
            TransferTarget::Image(image) => image.readiness().mark_good(self.id),
        }
    }

    /// Whether every writer of the source enqueued before this transfer has been staged
    pub fn is_ready(&self, queue: &TransferQueue) -> bool {
        match &self.source {
            TransferSource::Raw { .. } => true,
            TransferSource::Suballocation(source) => {
                !source.readiness().has_unstaged_writers_before(self.id, queue)
            }
        }
    }

    /// Record this transfer into the current frame.
    ///
    /// `Ok(false)` means the staging buffer is full: nothing was changed and
    /// the transfer must be retried on a later frame.
    ///
    /// Raw bytes bound for host-visible memory are written at once, unless a
    /// copy already staged this frame reads or writes the same bytes: the
    /// copy only runs at submission, so the write is staged behind it.
    pub(crate) fn stage(&mut self, ctx: &mut StageContext<'_>) -> Result<bool> {
        let copy_alignment = ctx.limits.optimal_buffer_copy_offset_alignment;
        let staged = match (&mut self.source, &self.target) {
            (TransferSource::Raw { data, staged }, TransferTarget::Suballocation { handle, pinned }) => {
                let target = pinned.clone().unwrap_or_else(|| handle.range());
                let direct = target.raw.mapped_ptr().is_some()
                    && !ctx.copy_regions.touches(target.raw.native(), target.offset + self.target_offset, self.size);
                if direct {
                    target.write(self.target_offset, data)?;
                    ctx.stats.direct_writes += 1;
                    true
                } else {
                    match ctx.staging.try_allocate(self.size, copy_alignment)? {
                        Some(slot) => {
                            slot.write(0, data)?;
                            ctx.copy_regions.insert(
                                &slot.range().raw,
                                &target.raw,
                                CopyRegion {
                                    src_offset: slot.offset(),
                                    dst_offset: target.offset + self.target_offset,
                                    size: self.size,
                                },
                                self.migration,
                            );
                            ctx.stats.staged_bytes += self.size;
                            *staged = Some(slot);
                            true
                        }
                        None => false,
                    }
                }
            }
            (TransferSource::Suballocation(source), TransferTarget::Suballocation { handle, pinned }) => {
                let source = source.range();
                let target = pinned.clone().unwrap_or_else(|| handle.range());
                ctx.copy_regions.insert(
                    &source.raw,
                    &target.raw,
                    CopyRegion {
                        src_offset: source.offset + self.source_offset,
                        dst_offset: target.offset + self.target_offset,
                        size: self.size,
                    },
                    self.migration,
                );
                true
            }
            (TransferSource::Raw { data, staged }, TransferTarget::Image(image)) => {
                let alignment = lcm(
                    lcm(4, image.desc().format.bytes_per_pixel() as u64),
                    copy_alignment,
                );
                match ctx.staging.try_allocate(self.size, alignment)? {
                    Some(slot) => {
                        slot.write(0, data)?;
                        let mut source = slot.range();
                        source.size = self.size;
                        ctx.copy_regions.push_image(ImageCopy { source, image: image.clone() });
                        ctx.stats.staged_bytes += self.size;
                        *staged = Some(slot);
                        true
                    }
                    None => false,
                }
            }
            (TransferSource::Suballocation(source), TransferTarget::Image(image)) => {
                let mut range = source.range();
                range.offset += self.source_offset;
                range.size = self.size;
                ctx.copy_regions.push_image(ImageCopy { source: range, image: image.clone() });
                true
            }
        };

        if staged {
            self.state = TransferState::Staged;
        }
        Ok(staged)
    }

    /// Undo `stage` for a frame that will not be submitted
    ///
    /// The staging slot is freed at once since no command ever read it.
    pub(crate) fn unstage(&mut self, queue: &TransferQueue) {
        self.state = TransferState::Bad;
        if let TransferSource::Raw { staged, .. } = &mut self.source {
            *staged = None;
        }
        queue.mark_unstaged(self.id);
    }

    /// Release what the source holds once the frame is submitted.
    ///
    /// Suballocations (staging slots and copy sources) are retired on the
    /// queue rather than dropped: the submitted command list still reads them.
    pub fn cleanup_source(&mut self, queue: &TransferQueue) {
        match &mut self.source {
            TransferSource::Raw { data, staged } => {
                *data = Vec::new();
                if let Some(slot) = staged.take() {
                    queue.retire(slot);
                }
            }
            TransferSource::Suballocation(source) => queue.retire(source.clone()),
        }
    }
}

impl std::fmt::Debug for TransferData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferData")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("state", &self.state)
            .field("size", &self.size)
            .field("migration", &self.migration)
            .finish()
    }
}

fn check_fits(side: &str, size: u64, offset: u64, capacity: u64) -> Result<()> {
    if offset + size > capacity {
        return Err(Error::InvalidResource(format!(
            "Transfer of {} bytes at {} overflows {} of {} bytes",
            size, offset, side, capacity
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "transfer_data_tests.rs"]
mod tests;
