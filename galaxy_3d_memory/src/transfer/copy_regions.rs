/// Copy batching and recording order
///
/// Every copy staged in a frame becomes a step of one sequence, recorded in
/// the order the copies were staged. Buffer-to-buffer copies between the
/// same (source native buffer, target native buffer) pair share a batch, so
/// they become a single `copy_buffer` call.
///
/// A region joins the latest batch of its pair only when no step from that
/// batch onwards touches the same bytes in a conflicting way:
///
/// - it writes bytes another step writes (write after write);
/// - it reads bytes another step writes (read after write);
/// - it writes bytes another step reads (write after read).
///
/// Otherwise it opens a new batch at the end of the sequence. Recording the
/// steps in sequence order therefore applies every copy in staging order.

use std::sync::Arc;
use rustc_hash::FxHashMap;
use crate::device::{CopyRegion, RawBuffer};
use crate::transfer::ImageCopy;

/// All regions copied from one buffer into another by one `copy_buffer`
pub struct CopyBatch {
    pub source: Arc<dyn RawBuffer>,
    pub target: Arc<dyn RawBuffer>,
    pub regions: Vec<CopyRegion>,
    /// Copies moving live allocations out of a retired buffer
    pub migration: bool,
    step: usize,
}

impl CopyBatch {
    pub fn source_native(&self) -> u64 {
        self.source.native()
    }

    pub fn target_native(&self) -> u64 {
        self.target.native()
    }

    pub fn byte_count(&self) -> u64 {
        self.regions.iter().map(|region| region.size).sum()
    }
}

/// One entry of the recording sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStep {
    /// Index into [`CopyRegionMap::batches`]
    Buffer(usize),
    /// Index into [`CopyRegionMap::image_copies`]
    Image(usize),
}

#[derive(Default)]
pub struct CopyRegionMap {
    /// Latest batch of each (source, target) native pair
    index: FxHashMap<(u64, u64), usize>,
    batches: Vec<CopyBatch>,
    images: Vec<ImageCopy>,
    steps: Vec<CopyStep>,
}

fn overlaps(a_offset: u64, a_size: u64, b_offset: u64, b_size: u64) -> bool {
    a_offset < b_offset + b_size && b_offset < a_offset + a_size
}

impl CopyRegionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one buffer region, merging it into its pair's batch when that
    /// keeps the staging order
    pub fn insert(
        &mut self,
        source: &Arc<dyn RawBuffer>,
        target: &Arc<dyn RawBuffer>,
        region: CopyRegion,
        migration: bool,
    ) {
        let key = (source.native(), target.native());
        if let Some(&slot) = self.index.get(&key) {
            let from = self.batches[slot].step;
            if !self.conflicts_from(from, key.0, key.1, &region) {
                let batch = &mut self.batches[slot];
                batch.regions.push(region);
                batch.migration |= migration;
                return;
            }
        }

        let slot = self.batches.len();
        self.index.insert(key, slot);
        self.batches.push(CopyBatch {
            source: source.clone(),
            target: target.clone(),
            regions: vec![region],
            migration,
            step: self.steps.len(),
        });
        self.steps.push(CopyStep::Buffer(slot));
    }

    /// Append a buffer-to-image upload
    pub fn push_image(&mut self, copy: ImageCopy) {
        self.steps.push(CopyStep::Image(self.images.len()));
        self.images.push(copy);
    }

    /// Whether a step from `from` onwards conflicts with copying `region`
    /// from `source` into `target`
    fn conflicts_from(&self, from: usize, source: u64, target: u64, region: &CopyRegion) -> bool {
        self.steps[from..].iter().any(|step| match *step {
            CopyStep::Buffer(slot) => {
                let batch = &self.batches[slot];
                let (batch_source, batch_target) = (batch.source_native(), batch.target_native());
                batch.regions.iter().any(|other| {
                    let write_after_write = batch_target == target
                        && overlaps(other.dst_offset, other.size, region.dst_offset, region.size);
                    let read_after_write = batch_target == source
                        && overlaps(other.dst_offset, other.size, region.src_offset, region.size);
                    let write_after_read = batch_source == target
                        && overlaps(other.src_offset, other.size, region.dst_offset, region.size);
                    write_after_write || read_after_write || write_after_read
                })
            }
            CopyStep::Image(slot) => {
                let copy = &self.images[slot];
                copy.source.native() == target
                    && overlaps(copy.source.offset, copy.source.size, region.dst_offset, region.size)
            }
        })
    }

    /// Whether any step of this frame reads or writes `[offset, offset + size)` of `native`
    pub fn touches(&self, native: u64, offset: u64, size: u64) -> bool {
        let buffers = self.batches.iter().any(|batch| {
            batch.regions.iter().any(|region| {
                (batch.target_native() == native && overlaps(region.dst_offset, region.size, offset, size))
                    || (batch.source_native() == native && overlaps(region.src_offset, region.size, offset, size))
            })
        });
        buffers
            || self.images.iter().any(|copy| {
                copy.source.native() == native && overlaps(copy.source.offset, copy.source.size, offset, size)
            })
    }

    /// Latest batch of a (source, target) native pair
    pub fn get(&self, source: u64, target: u64) -> Option<&CopyBatch> {
        self.index.get(&(source, target)).map(|&slot| &self.batches[slot])
    }

    /// Buffer batches in recording order
    pub fn batches(&self) -> &[CopyBatch] {
        &self.batches
    }

    /// Image uploads in recording order
    pub fn image_copies(&self) -> &[ImageCopy] {
        &self.images
    }

    /// Buffer batches and image uploads, interleaved in recording order
    pub fn steps(&self) -> &[CopyStep] {
        &self.steps
    }

    /// Number of buffer batches
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn region_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.regions.len()).sum()
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.batches.clear();
        self.images.clear();
        self.steps.clear();
    }
}

#[cfg(test)]
#[path = "copy_regions_tests.rs"]
mod tests;
