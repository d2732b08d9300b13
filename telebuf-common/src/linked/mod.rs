//! Consumer handles onto a shared buffer.
//!
//! Handles stage requests from any thread through lock-free mailboxes. The buffer manager
//! commits them during its tick through the [`LinkedHub`](hub::LinkedHub), reaching buffers
//! by identifier only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) mod hub;
mod properties;
mod registry;
mod variable;

pub use properties::LinkedProperties;
pub use registry::LinkedRegistry;
pub use variable::LinkedVariable;

use crate::error::Result;
use crate::registry::Registry;
use crate::variable::Variable;
use hub::LinkedHub;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkedId(u64);

/// Identifies one holder of a linked handle. A handle with no users left is swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(u64);

static NEXT_USER: AtomicU64 = AtomicU64::new(1);

impl UserId {
    pub fn new() -> Self {
        UserId(NEXT_USER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for UserId {
    fn default() -> Self {
        UserId::new()
    }
}

/// What a consumer needs to attach to a shared buffer.
pub trait LinkedVariableFactory: Send + Sync {
    /// Links a consumer variable to the buffered variable with the same full name.
    ///
    /// Without an initial user the handle is held by an anonymous user and stays
    /// active until it is disposed or its last clone is dropped. `Ok(None)` once the
    /// buffer is disposed.
    fn new_linked_variable(
        &self,
        variable: &Arc<Variable>,
        user: Option<UserId>,
    ) -> Result<Option<LinkedVariable>>;

    /// Mirrors the buffered registry with the same namespace into `registry`, or into a
    /// fresh copy of the buffer's root registry when `None`.
    fn new_linked_registry(&self, registry: Option<Registry>) -> Result<Option<LinkedRegistry>>;

    fn new_linked_properties(&self) -> Option<LinkedProperties>;
}

/// Cloneable handle to a shared buffer's linking service, safe to hand to any thread.
#[derive(Clone)]
pub struct LinkedBufferFactory {
    hub: Arc<LinkedHub>,
}

impl LinkedBufferFactory {
    pub(crate) fn new(hub: Arc<LinkedHub>) -> Self {
        LinkedBufferFactory { hub }
    }
}

impl LinkedVariableFactory for LinkedBufferFactory {
    fn new_linked_variable(
        &self,
        variable: &Arc<Variable>,
        user: Option<UserId>,
    ) -> Result<Option<LinkedVariable>> {
        self.hub.new_linked_variable(variable, user)
    }

    fn new_linked_registry(&self, registry: Option<Registry>) -> Result<Option<LinkedRegistry>> {
        LinkedHub::new_linked_registry(&self.hub, registry)
    }

    fn new_linked_properties(&self) -> Option<LinkedProperties> {
        self.hub.new_linked_properties()
    }
}
