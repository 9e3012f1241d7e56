//! RAII guard that releases an active slot when dropped.

use std::sync::Arc;

use super::dispatch::Shared;

/// Held by a dispatched task for as long as it occupies the active set.
/// Dropping it (normal completion or a panicking operation) frees the slot
/// and lets the dispatcher start the next queued task.
pub(super) struct ActiveSlot<T: Send + 'static> {
    pub(super) shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Drop for ActiveSlot<T> {
    fn drop(&mut self) {
        self.shared.release_slot();
    }
}
