//! Single-slot, last-writer-wins exchange between two threads.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Holds at most one value. `put` replaces whatever is there, `take` empties the slot.
///
/// Both sides are a single atomic swap; neither ever blocks.
pub struct Mailbox<T> {
    slot: ArcSwapOption<T>,
}

impl<T: Clone> Mailbox<T> {
    pub fn new() -> Self {
        Mailbox {
            slot: ArcSwapOption::empty(),
        }
    }

    /// Stores `value`, dropping any value not yet taken.
    pub fn put(&self, value: T) {
        self.slot.store(Some(Arc::new(value)));
    }

    /// A concurrent `is_occupied` may still hold a reference; the value is cloned then.
    pub fn take(&self) -> Option<T> {
        self.slot.swap(None).map(Arc::unwrap_or_clone)
    }

    pub fn is_occupied(&self) -> bool {
        self.slot.load().is_some()
    }

    pub fn clear(&self) {
        self.slot.store(None);
    }
}

impl<T: Clone> Default for Mailbox<T> {
    fn default() -> Self {
        Mailbox::new()
    }
}
