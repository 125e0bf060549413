/// Shared queue of not-yet-staged transfers
///
/// Enqueueing only needs a `&TransferQueue`, so buffers (migrations) and
/// vectors (growth copies) can enqueue without reaching the
/// [`TransferManager`](crate::transfer::TransferManager) that owns the command
/// list. Migrations sit in their own FIFO and are always drained first.
///
/// The queue also owns the frame-keyed retire list for suballocations that
/// in-flight command buffers may still read.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use rustc_hash::FxHashSet;
use crate::memory::SuballocationHandle;
use crate::transfer::TransferData;
use crate::utils::RetireQueue;

/// Identifier of one enqueued transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(pub u64);

#[derive(Default)]
pub struct TransferQueue {
    migrations: Mutex<VecDeque<TransferData>>,
    pending: Mutex<VecDeque<TransferData>>,
    unstaged: Mutex<FxHashSet<TransferId>>,
    retired: Mutex<RetireQueue<Arc<SuballocationHandle>>>,
    next_id: AtomicU64,
    frame: AtomicU64,
}

impl TransferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id; it counts as unstaged until `mark_staged`
    pub(crate) fn allocate_id(&self) -> TransferId {
        let id = TransferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut unstaged) = self.unstaged.lock() {
            unstaged.insert(id);
        }
        id
    }

    pub(crate) fn is_unstaged(&self, id: TransferId) -> bool {
        self.unstaged.lock().map(|unstaged| unstaged.contains(&id)).unwrap_or(true)
    }

    pub(crate) fn mark_staged(&self, id: TransferId) {
        if let Ok(mut unstaged) = self.unstaged.lock() {
            unstaged.remove(&id);
        }
    }

    /// The transfer `id` was staged into a frame that got abandoned
    pub(crate) fn mark_unstaged(&self, id: TransferId) {
        if let Ok(mut unstaged) = self.unstaged.lock() {
            unstaged.insert(id);
        }
    }

    /// Append a user transfer
    pub fn enqueue(&self, data: TransferData) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(data);
        }
    }

    /// Append migration transfers (drained before any user transfer)
    pub(crate) fn enqueue_migrations(&self, data: Vec<TransferData>) {
        if let Ok(mut migrations) = self.migrations.lock() {
            migrations.extend(data);
        }
    }

    /// Next transfer to stage: migrations first, then user transfers
    pub(crate) fn pop_front(&self) -> Option<TransferData> {
        if let Some(data) = self.migrations.lock().ok()?.pop_front() {
            return Some(data);
        }
        self.pending.lock().ok()?.pop_front()
    }

    /// Put transfers back at the front of their FIFO, keeping their order
    pub(crate) fn requeue_front(&self, items: Vec<TransferData>) {
        for data in items.into_iter().rev() {
            let fifo = if data.is_migration() { &self.migrations } else { &self.pending };
            if let Ok(mut fifo) = fifo.lock() {
                fifo.push_front(data);
            }
        }
    }

    /// Number of transfers waiting to be staged
    pub fn len(&self) -> usize {
        self.migration_count() + self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn migration_count(&self) -> usize {
        self.migrations.lock().map(|migrations| migrations.len()).unwrap_or(0)
    }

    // ===== FRAMES & RETIREMENT =====

    /// Index of the frame currently being recorded
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    pub(crate) fn advance_frame(&self) -> u64 {
        self.frame.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Keep a suballocation alive until the current frame has completed
    pub fn retire(&self, handle: Arc<SuballocationHandle>) {
        let frame = self.frame();
        if let Ok(mut retired) = self.retired.lock() {
            retired.retire(frame, handle);
        }
    }

    /// Release everything retired before `frame`; returns the count
    pub(crate) fn collect_retired_before(&self, frame: u64) -> usize {
        let expired = match self.retired.lock() {
            Ok(mut retired) => retired.take_before(frame),
            Err(_) => Vec::new(),
        };
        // Dropped here, outside the retire lock
        expired.len()
    }

    pub fn retired_count(&self) -> usize {
        self.retired.lock().map(|retired| retired.len()).unwrap_or(0)
    }
}
