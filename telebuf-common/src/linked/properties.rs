use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::mailbox::Mailbox;
use crate::properties::BufferProperties;

pub(crate) struct LinkedPropertiesState {
    pub(crate) snapshot: Mailbox<BufferProperties>,
    disposed: AtomicBool,
}

impl LinkedPropertiesState {
    pub(crate) fn new() -> Self {
        LinkedPropertiesState {
            snapshot: Mailbox::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.snapshot.clear();
    }
}

/// Receives the buffer geometry published at the end of every manager cycle.
///
/// Dropping the handle disposes it.
pub struct LinkedProperties {
    state: Arc<LinkedPropertiesState>,
    local: Mutex<BufferProperties>,
}

impl LinkedProperties {
    pub(crate) fn new(state: Arc<LinkedPropertiesState>, initial: BufferProperties) -> Self {
        LinkedProperties {
            state,
            local: Mutex::new(initial),
        }
    }

    /// Replaces the local copy with the latest snapshot; returns whether one was waiting.
    pub fn pull(&self) -> bool {
        if self.state.is_disposed() {
            return false;
        }
        match self.state.snapshot.take() {
            Some(snapshot) => {
                *self.local.lock() = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn is_update_available(&self) -> bool {
        self.state.snapshot.is_occupied()
    }

    /// The copy from the last successful `pull`.
    pub fn properties(&self) -> BufferProperties {
        *self.local.lock()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }

    pub fn dispose(&self) {
        self.state.dispose();
    }
}

impl Drop for LinkedProperties {
    fn drop(&mut self) {
        self.dispose();
    }
}
