//! Claim handle: a queue entry this worker currently owns.

use crate::models::QueueEntry;

/// A claimed queue entry. Consumed by `mark_finished()` or `release()`.
///
/// If dropped without being consumed, logs a warning. The claim TTL is the
/// real safety net; the warning is for debugging only.
#[derive(Debug)]
pub struct ClaimHandle {
    entry: QueueEntry,
    consumed: bool,
}

impl ClaimHandle {
    pub(crate) fn new(entry: QueueEntry) -> Self {
        Self {
            entry,
            consumed: false,
        }
    }

    pub fn entry(&self) -> &QueueEntry {
        &self.entry
    }

    pub fn target_id(&self) -> &str {
        &self.entry.target_id
    }

    pub fn host(&self) -> &str {
        &self.entry.host
    }

    /// Take the entry out, disarming the drop warning.
    pub(crate) fn consume(mut self) -> QueueEntry {
        self.consumed = true;
        std::mem::replace(&mut self.entry, QueueEntry::new("", ""))
    }
}

impl Drop for ClaimHandle {
    fn drop(&mut self) {
        if !self.consumed {
            tracing::warn!(
                "ClaimHandle for {} dropped without being finished or released; \
                 claim will expire after the claim TTL",
                self.entry.target_id
            );
        }
    }
}
