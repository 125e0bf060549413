/// Frame-keyed deferred destruction.
///
/// GPU-referenced objects (staging slots, sources of copies, storage replaced
/// by a discarding resize) must outlive the command buffer that reads them.
/// They are parked here with the frame index in which they were retired and
/// dropped only once that frame's fence has signaled.
///
/// # Example
///
/// ```ignore
/// let mut retired = RetireQueue::new();
/// retired.retire(3, staging_slot);
/// // ... fence for frame 3 signaled ...
/// let dropped = retired.collect_before(4);  // staging_slot dropped here
/// ```

use std::collections::VecDeque;

pub struct RetireQueue<T> {
    entries: VecDeque<(u64, T)>,
}

impl<T> RetireQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Park `item` until frame `frame` has completed
    pub fn retire(&mut self, frame: u64, item: T) {
        debug_assert!(
            self.entries.back().map_or(true, |(last, _)| *last <= frame),
            "retire frames must be non-decreasing"
        );
        self.entries.push_back((frame, item));
    }

    /// Remove every entry retired strictly before `frame`.
    ///
    /// The removed items are returned so the caller controls where they are
    /// dropped (outside of any lock).
    pub fn take_before(&mut self, frame: u64) -> Vec<T> {
        let mut expired = Vec::new();
        while let Some((retired_at, _)) = self.entries.front() {
            if *retired_at >= frame {
                break;
            }
            if let Some((_, item)) = self.entries.pop_front() {
                expired.push(item);
            }
        }
        expired
    }

    /// Drop every entry retired strictly before `frame`, returning how many were dropped
    pub fn collect_before(&mut self, frame: u64) -> usize {
        self.take_before(frame).len()
    }

    /// Number of parked items
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is parked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for RetireQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "retire_queue_tests.rs"]
mod tests;
