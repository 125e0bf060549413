/// TransferCommandList trait - for recording copy and barrier commands
///
/// The transfer manager owns exactly one command list. Each frame it is
/// begun, filled with ownership barriers and copies, ended and submitted to
/// the transfer queue. Submission signals both a semaphore (for the graphics
/// queue to wait on) and a fence (for [`wait`](TransferCommandList::wait)).

use crate::error::Result;

/// Value meaning "no queue family ownership transfer" in a barrier
pub const QUEUE_FAMILY_IGNORED: u32 = u32::MAX;

bitflags::bitflags! {
    /// Pipeline stages referenced by barriers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const BOTTOM_OF_PIPE = 1 << 1;
        const TRANSFER = 1 << 2;
        const VERTEX_INPUT = 1 << 3;
        const VERTEX_SHADER = 1 << 4;
        const FRAGMENT_SHADER = 1 << 5;
        const COMPUTE_SHADER = 1 << 6;
    }
}

bitflags::bitflags! {
    /// Memory access types referenced by barriers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const TRANSFER_READ = 1 << 0;
        const TRANSFER_WRITE = 1 << 1;
        const SHADER_READ = 1 << 2;
        const VERTEX_ATTRIBUTE_READ = 1 << 3;
        const INDEX_READ = 1 << 4;
        const UNIFORM_READ = 1 << 5;
    }
}

/// Image layouts used by uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    TransferDstOptimal,
    ShaderReadOnlyOptimal,
}

/// One buffer-to-buffer copy range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRegion {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

impl CopyRegion {
    /// End of the destination range (exclusive)
    pub fn dst_end(&self) -> u64 {
        self.dst_offset + self.size
    }
}

/// Buffer memory barrier, optionally transferring queue family ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    /// Native buffer handle
    pub buffer: u64,
    pub offset: u64,
    pub size: u64,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub src_queue_family: u32,
    pub dst_queue_family: u32,
}

/// Image memory barrier (whole image, color aspect, single mip)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    /// Native image handle
    pub image: u64,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub src_queue_family: u32,
    pub dst_queue_family: u32,
}

/// Command list for recording transfer commands
pub trait TransferCommandList: Send {
    /// Reset and begin recording
    fn begin(&mut self) -> Result<()>;

    /// Record buffer memory barriers between two stage masks
    ///
    /// An empty barrier slice records nothing.
    fn buffer_barriers(
        &mut self,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barriers: &[BufferBarrier],
    ) -> Result<()>;

    /// Record one image memory barrier between two stage masks
    fn image_barrier(
        &mut self,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barrier: ImageBarrier,
    ) -> Result<()>;

    /// Record one buffer-to-buffer copy with any number of regions
    fn copy_buffer(&mut self, src: u64, dst: u64, regions: &[CopyRegion]) -> Result<()>;

    /// Record a tightly packed buffer-to-image copy of a whole image
    ///
    /// The image must be in `TransferDstOptimal` layout.
    fn copy_buffer_to_image(
        &mut self,
        src: u64,
        src_offset: u64,
        image: u64,
        width: u32,
        height: u32,
    ) -> Result<()>;

    /// End recording
    fn end(&mut self) -> Result<()>;

    /// Submit to the transfer queue, signaling the semaphore and the fence
    fn submit(&mut self) -> Result<()>;

    /// Block until the last submission completed (unbounded wait)
    fn wait(&mut self) -> Result<()>;

    /// Semaphore signaled by each submission (native handle as raw u64)
    fn signal_semaphore(&self) -> u64;
}
