/// Readiness tracking shared by suballocations and images
///
/// A resource is "ready" when no enqueued transfer targeting it is still
/// outstanding. The ids of those transfers are kept in FIFO order so a
/// transfer that reads the resource can tell whether the writers enqueued
/// before it have been staged yet.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use crate::transfer::{TransferId, TransferQueue};

pub(crate) struct Readiness {
    ready: AtomicBool,
    pending: Mutex<VecDeque<TransferId>>,
}

impl Readiness {
    pub(crate) fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// A transfer writing this resource was enqueued
    pub(crate) fn mark_bad(&self, id: TransferId) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(id);
        }
        self.ready.store(false, Ordering::Release);
    }

    /// The transfer `id` was submitted
    pub(crate) fn mark_good(&self, id: TransferId) {
        let empty = match self.pending.lock() {
            Ok(mut pending) => {
                pending.retain(|pending_id| *pending_id != id);
                pending.is_empty()
            }
            Err(_) => false,
        };
        if empty {
            self.ready.store(true, Ordering::Release);
        }
    }

    /// Whether a writer enqueued before `reader` has not been staged yet
    pub(crate) fn has_unstaged_writers_before(&self, reader: TransferId, queue: &TransferQueue) -> bool {
        match self.pending.lock() {
            Ok(pending) => pending.iter().any(|id| *id < reader && queue.is_unstaged(*id)),
            Err(_) => true,
        }
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}
