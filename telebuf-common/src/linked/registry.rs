use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use log::warn;
use parking_lot::Mutex;

use super::hub::LinkedHub;
use super::{LinkedVariable, UserId};
use crate::error::Result;
use crate::registry::{Registry, RegistryChange};
use crate::variable::Variable;

pub(crate) struct LinkedRegistryState {
    disposed: AtomicBool,
}

impl LinkedRegistryState {
    pub(crate) fn new() -> Self {
        LinkedRegistryState {
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::SeqCst)
    }
}

/// A consumer-side registry kept in step with its counterpart in the buffer.
///
/// Variables the buffer gains are copied into the consumer registry on `pull`. Variables
/// the consumer adds are copied into the buffer by the manager on its next cycle.
/// Dropping the registry disposes it.
pub struct LinkedRegistry {
    hub: Arc<LinkedHub>,
    state: Arc<LinkedRegistryState>,
    user: UserId,
    local_root: Registry,
    buffer_changes: Receiver<RegistryChange>,
    linked: Mutex<HashMap<String, LinkedVariable>>,
}

impl LinkedRegistry {
    pub(crate) fn new(
        hub: Arc<LinkedHub>,
        state: Arc<LinkedRegistryState>,
        local_root: Registry,
        buffer_changes: Receiver<RegistryChange>,
    ) -> Self {
        LinkedRegistry {
            hub,
            state,
            user: UserId::new(),
            local_root,
            buffer_changes,
            linked: Mutex::new(HashMap::new()),
        }
    }

    /// The consumer-side registry.
    pub fn root(&self) -> &Registry {
        &self.local_root
    }

    /// Returns the handle for `variable`, creating it on first use.
    pub fn link_variable(&self, variable: &Arc<Variable>) -> Result<Option<LinkedVariable>> {
        if self.is_disposed() {
            return Ok(None);
        }
        let full_name = variable.full_name();
        let mut linked = self.linked.lock();
        if let Some(existing) = linked.get(&full_name) {
            if !existing.is_disposed() {
                return Ok(Some(existing.clone()));
            }
        }

        let Some(handle) = self.hub.new_linked_variable(variable, Some(self.user))? else {
            return Ok(None);
        };
        linked.insert(full_name, handle.clone());
        Ok(Some(handle))
    }

    pub fn linked_variables(&self) -> Vec<LinkedVariable> {
        self.linked.lock().values().cloned().collect()
    }

    pub fn push(&self) {
        if self.is_disposed() {
            return;
        }
        for handle in self.linked.lock().values() {
            handle.push();
        }
    }

    /// Mirrors new buffer variables, then pulls every linked variable.
    ///
    /// Returns whether any linked variable received a value.
    pub fn pull(&self) -> bool {
        if self.is_disposed() {
            return false;
        }
        if let Err(e) = self.sync_schema() {
            warn!("linked registry `{}`: {e}", self.local_root.namespace());
        }

        let mut pulled = false;
        for handle in self.linked.lock().values() {
            pulled |= handle.pull();
        }
        pulled
    }

    /// Copies the variables added to the buffer since the last call into the consumer registry.
    ///
    /// Returns how many variables were created.
    pub fn sync_schema(&self) -> Result<usize> {
        let mut created = 0;
        for change in self.buffer_changes.try_iter() {
            let variables = match change {
                RegistryChange::VariableAdded(variable) => vec![variable],
                RegistryChange::RegistryAdded(registry) => registry.collect_subtree_variables(),
            };
            for variable in variables {
                if self.local_root.find_variable(&variable.full_name()).is_none() {
                    self.local_root.duplicate_variable(&variable)?;
                    created += 1;
                }
            }
        }
        Ok(created)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed() || self.hub.is_disposed()
    }

    /// Releases every variable linked through this registry.
    pub fn dispose(&self) {
        if !self.state.dispose() {
            return;
        }
        for (_, handle) in self.linked.lock().drain() {
            handle.remove_user(self.user);
        }
    }
}

impl Drop for LinkedRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}
