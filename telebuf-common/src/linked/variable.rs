use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::{LinkedId, UserId};
use crate::mailbox::Mailbox;
use crate::requests::{PullRequest, PushRequest, WindowRequest};
use crate::sample::BufferSample;
use crate::variable::Variable;

/// Slots shared between one consumer handle and the buffer manager.
pub(crate) struct LinkedVariableState {
    pub(crate) id: LinkedId,
    pub(crate) full_name: String,
    pub(crate) push_request: Mailbox<PushRequest>,
    pub(crate) pull_request: Mailbox<PullRequest>,
    pub(crate) window_request: Mailbox<WindowRequest>,
    pub(crate) sample: Mailbox<BufferSample>,
    /// Set while `id` sits in the pending-push channel.
    pub(crate) queued: AtomicBool,
    users: Mutex<HashSet<UserId>>,
    disposed: AtomicBool,
    pending: Sender<LinkedId>,
}

impl LinkedVariableState {
    pub(crate) fn new(id: LinkedId, full_name: String, user: UserId, pending: Sender<LinkedId>) -> Self {
        LinkedVariableState {
            id,
            full_name,
            push_request: Mailbox::new(),
            pull_request: Mailbox::new(),
            window_request: Mailbox::new(),
            sample: Mailbox::new(),
            queued: AtomicBool::new(false),
            users: Mutex::new(HashSet::from([user])),
            disposed: AtomicBool::new(false),
            pending,
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.is_disposed() && !self.users.lock().is_empty()
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.users.lock().clear();
        self.push_request.clear();
        self.pull_request.clear();
        self.window_request.clear();
        self.sample.clear();
    }
}

/// Shared by every clone of one handle. Once the last clone is gone nobody can pull or
/// push through the slots any more, so the state is disposed and swept on the next cycle.
struct HandleOwner {
    state: Arc<LinkedVariableState>,
    local: Arc<Variable>,
}

impl Drop for HandleOwner {
    fn drop(&mut self) {
        self.state.dispose();
    }
}

/// A consumer's view of one buffered variable.
///
/// Clones share the same slots. Every method is safe to call from any thread and never
/// blocks on the buffer manager. Dropping the last clone releases the handle.
#[derive(Clone)]
pub struct LinkedVariable {
    owner: Arc<HandleOwner>,
}

impl LinkedVariable {
    pub(crate) fn new(state: Arc<LinkedVariableState>, local: Arc<Variable>) -> Self {
        LinkedVariable {
            owner: Arc::new(HandleOwner { state, local }),
        }
    }

    fn state(&self) -> &LinkedVariableState {
        &self.owner.state
    }

    /// The consumer-side variable this handle reads into and pushes from.
    pub fn variable(&self) -> &Arc<Variable> {
        &self.owner.local
    }

    pub fn full_name(&self) -> &str {
        &self.state().full_name
    }

    /// Stages the consumer variable's value for the next push cycle.
    pub fn push(&self) {
        if self.state().is_disposed() {
            return;
        }
        self.state().push_request.put(PushRequest::capture(&self.owner.local));
        if !self.state().queued.swap(true, Ordering::SeqCst) {
            // The hub owns the receiver for as long as it can process pushes.
            let _ = self.state().pending.send(self.state().id);
        }
    }

    /// Applies the value staged by the last manager cycle, if any.
    pub fn pull(&self) -> bool {
        if self.state().is_disposed() {
            return false;
        }
        match self.state().pull_request.take() {
            Some(request) => {
                request.apply(&self.owner.local);
                true
            }
            None => false,
        }
    }

    /// Replaces any unresolved window request.
    pub fn request_window(&self, request: WindowRequest) {
        if self.state().is_disposed() {
            return;
        }
        self.state().window_request.put(request);
    }

    pub fn request_entire_buffer(&self) {
        self.request_window(WindowRequest::EntireBuffer);
    }

    pub fn request_active_buffer_only(&self) {
        self.request_window(WindowRequest::ActiveWindowOnly);
    }

    pub fn request_buffer_starting_from(&self, from: usize) {
        self.request_window(WindowRequest::FromIndexToOut(from));
    }

    pub fn request_buffer_window(&self, from: usize, length: usize) {
        self.request_window(WindowRequest::Explicit { from, length });
    }

    pub fn has_request_pending(&self) -> bool {
        self.state().window_request.is_occupied()
    }

    pub fn is_sample_available(&self) -> bool {
        self.state().sample.is_occupied()
    }

    /// Takes the most recent resolved sample.
    pub fn poll_sample(&self) -> Option<BufferSample> {
        if self.state().is_disposed() {
            return None;
        }
        self.state().sample.take()
    }

    pub fn add_user(&self, user: UserId) {
        if self.state().is_disposed() {
            return;
        }
        self.state().users.lock().insert(user);
    }

    pub fn remove_user(&self, user: UserId) -> bool {
        self.state().users.lock().remove(&user)
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn is_disposed(&self) -> bool {
        self.state().is_disposed()
    }

    /// Detaches the handle; the manager drops it on its next sweep.
    pub fn dispose(&self) {
        self.state().dispose();
    }
}
