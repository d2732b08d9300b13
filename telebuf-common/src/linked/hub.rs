//! Manager-side bookkeeping for every live handle of one shared buffer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;

use super::properties::LinkedPropertiesState;
use super::registry::LinkedRegistryState;
use super::variable::LinkedVariableState;
use super::{LinkedId, LinkedProperties, LinkedRegistry, LinkedVariable, UserId};
use crate::error::{BufferError, Result};
use crate::properties::BufferProperties;
use crate::registry::{Registry, RegistryChange};
use crate::registry_buffer::{BufferId, VariableRegistryBuffer};
use crate::requests::PullRequest;
use crate::variable::{Variable, VariableKind};

struct VariableLink {
    state: Arc<LinkedVariableState>,
    /// Resolved lazily: the buffer may be created after the handle.
    buffer: Option<BufferId>,
}

impl VariableLink {
    fn resolve(&mut self, registry_buffer: &mut VariableRegistryBuffer) -> Option<BufferId> {
        if self.buffer.is_none() {
            self.buffer = registry_buffer.find_or_create_buffer(&self.state.full_name);
        }
        self.buffer
    }
}

struct RegistryLink {
    state: Arc<LinkedRegistryState>,
    local_root: Registry,
    local_changes: Receiver<RegistryChange>,
}

#[derive(Default)]
struct LinkedCollection {
    variables: BTreeMap<LinkedId, VariableLink>,
    registries: BTreeMap<LinkedId, RegistryLink>,
    properties: Vec<Arc<LinkedPropertiesState>>,
}

pub(crate) struct LinkedHub {
    collection: Mutex<LinkedCollection>,
    pending_tx: Sender<LinkedId>,
    pending_rx: Receiver<LinkedId>,
    next_id: AtomicU64,
    disposed: AtomicBool,
    buffer_root: Registry,
    latest_properties: Mutex<BufferProperties>,
}

impl LinkedHub {
    pub(crate) fn new(buffer_root: Registry, properties: BufferProperties) -> Self {
        let (pending_tx, pending_rx) = unbounded();
        LinkedHub {
            collection: Mutex::new(LinkedCollection::default()),
            pending_tx,
            pending_rx,
            next_id: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            buffer_root,
            latest_properties: Mutex::new(properties),
        }
    }

    fn next_id(&self) -> LinkedId {
        LinkedId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn new_linked_variable(
        &self,
        variable: &Arc<Variable>,
        user: Option<UserId>,
    ) -> Result<Option<LinkedVariable>> {
        if self.is_disposed() {
            return Ok(None);
        }

        let full_name = variable.full_name();
        let buffered = self
            .buffer_root
            .find_variable(&full_name)
            .ok_or_else(|| BufferError::UnknownVariable(full_name.clone()))?;
        check_compatible(&full_name, buffered.kind(), variable.kind())?;

        let id = self.next_id();
        let state = Arc::new(LinkedVariableState::new(
            id,
            full_name,
            user.unwrap_or_default(),
            self.pending_tx.clone(),
        ));

        let mut collection = self.collection.lock();
        // Checked again under the lock so nothing is added after disposal.
        if self.is_disposed() {
            return Ok(None);
        }
        collection.variables.insert(
            id,
            VariableLink {
                state: state.clone(),
                buffer: None,
            },
        );
        debug!("linked variable `{}` as {:?}", state.full_name, id);
        Ok(Some(LinkedVariable::new(state, variable.clone())))
    }

    pub(crate) fn new_linked_registry(
        hub: &Arc<LinkedHub>,
        registry: Option<Registry>,
    ) -> Result<Option<LinkedRegistry>> {
        if hub.is_disposed() {
            return Ok(None);
        }

        let local_root = match registry {
            Some(registry) => registry,
            None => Registry::new(hub.buffer_root.name())?,
        };
        let counterpart = hub
            .buffer_root
            .find_registry(local_root.namespace())
            .ok_or_else(|| BufferError::UnknownRegistry(local_root.namespace().to_string()))?;

        // Subscribe before copying so nothing added in between is lost.
        let buffer_changes = counterpart.subscribe();
        let local_changes = local_root.subscribe();
        local_root.duplicate_missing(&counterpart)?;

        let state = Arc::new(LinkedRegistryState::new());
        let mut collection = hub.collection.lock();
        if hub.is_disposed() {
            return Ok(None);
        }
        collection.registries.insert(
            hub.next_id(),
            RegistryLink {
                state: state.clone(),
                local_root: local_root.clone(),
                local_changes,
            },
        );
        debug!("linked registry `{}`", local_root.namespace());
        Ok(Some(LinkedRegistry::new(
            hub.clone(),
            state,
            local_root,
            buffer_changes,
        )))
    }

    pub(crate) fn new_linked_properties(&self) -> Option<LinkedProperties> {
        if self.is_disposed() {
            return None;
        }
        let state = Arc::new(LinkedPropertiesState::new());
        let mut collection = self.collection.lock();
        if self.is_disposed() {
            return None;
        }
        collection.properties.push(state.clone());
        Some(LinkedProperties::new(state, *self.latest_properties.lock()))
    }

    /// Copies variables that consumers added to their linked registries into the buffer tree.
    fn sync_consumer_schema(&self, collection: &LinkedCollection) {
        for link in collection.registries.values() {
            if link.state.is_disposed() {
                continue;
            }
            for change in link.local_changes.try_iter() {
                let variables = match change {
                    RegistryChange::VariableAdded(variable) => vec![variable],
                    RegistryChange::RegistryAdded(registry) => registry.collect_subtree_variables(),
                };
                for variable in variables {
                    if self.buffer_root.find_variable(&variable.full_name()).is_some() {
                        continue;
                    }
                    if let Err(e) = self.buffer_root.duplicate_variable(&variable) {
                        warn!(
                            "could not mirror `{}` from linked registry `{}`: {e}",
                            variable.full_name(),
                            link.local_root.namespace()
                        );
                    }
                }
            }
        }
    }

    /// Applies every staged push. With `write_index` each changed variable is also
    /// written into its buffer at that slot.
    pub(crate) fn process_push_requests(
        &self,
        registry_buffer: &mut VariableRegistryBuffer,
        write_index: Option<usize>,
    ) -> bool {
        if self.is_disposed() {
            return false;
        }
        let mut collection = self.collection.lock();
        let mut changed = false;

        for id in self.pending_rx.try_iter() {
            let Some(link) = collection.variables.get_mut(&id) else {
                continue;
            };
            // Cleared before taking so a push racing with us is queued again.
            link.state.queued.store(false, Ordering::SeqCst);
            let Some(request) = link.state.push_request.take() else {
                continue;
            };
            if link.state.is_disposed() {
                continue;
            }
            let Some(buffer_id) = link.resolve(registry_buffer) else {
                continue;
            };

            let buffer = registry_buffer.buffer_mut(buffer_id);
            if request.apply(buffer.variable()) {
                changed = true;
                if let Some(index) = write_index {
                    buffer.write_at(index);
                }
            }
        }
        changed
    }

    /// Discards every staged push.
    pub(crate) fn flush_push_requests(&self) {
        let collection = self.collection.lock();
        for id in self.pending_rx.try_iter() {
            if let Some(link) = collection.variables.get(&id) {
                link.state.queued.store(false, Ordering::SeqCst);
                link.state.push_request.clear();
            }
        }
    }

    /// Sweeps inactive handles, stages a pull for every handle, resolves window requests
    /// and publishes `properties` to every linked properties handle.
    pub(crate) fn prepare_for_pull(
        &self,
        registry_buffer: &mut VariableRegistryBuffer,
        properties: BufferProperties,
    ) {
        if self.is_disposed() {
            return;
        }
        let mut collection = self.collection.lock();

        self.sync_consumer_schema(&collection);
        registry_buffer.sync();

        let before = collection.variables.len();
        collection.variables.retain(|_, link| {
            let active = link.state.is_active();
            if !active {
                link.state.dispose();
            }
            active
        });
        let swept = before - collection.variables.len();
        if swept > 0 {
            debug!("swept {swept} inactive linked variables");
        }
        collection.registries.retain(|_, link| !link.state.is_disposed());
        collection.properties.retain(|state| !state.is_disposed());

        for link in collection.variables.values_mut() {
            let Some(buffer_id) = link.resolve(registry_buffer) else {
                continue;
            };
            let buffer = registry_buffer.buffer(buffer_id);
            link.state
                .pull_request
                .put(PullRequest::capture(buffer.variable()));

            if let Some(request) = link.state.window_request.take() {
                if let Some((from, length)) = request.resolve(&properties) {
                    link.state.sample.put(buffer.copy(from, length, properties));
                }
            }
        }

        for state in &collection.properties {
            state.snapshot.put(properties);
        }
        *self.latest_properties.lock() = properties;
    }

    pub(crate) fn has_request_pending(&self) -> bool {
        self.collection
            .lock()
            .variables
            .values()
            .any(|link| link.state.window_request.is_occupied())
    }

    pub(crate) fn linked_variable_count(&self) -> usize {
        self.collection.lock().variables.len()
    }

    /// Disposes every linked variable and registry. Further factory calls return nothing.
    pub(crate) fn dispose_linked(&self) {
        let mut collection = self.collection.lock();
        self.disposed.store(true, Ordering::SeqCst);
        let count = collection.variables.len();
        for (_, link) in std::mem::take(&mut collection.variables) {
            link.state.dispose();
        }
        for (_, link) in std::mem::take(&mut collection.registries) {
            link.state.dispose();
        }
        while self.pending_rx.try_recv().is_ok() {}
        info!("disposed {count} linked variables");
    }

    pub(crate) fn dispose_properties(&self) {
        let mut collection = self.collection.lock();
        for state in collection.properties.drain(..) {
            state.dispose();
        }
    }
}

fn check_compatible(full_name: &str, buffered: &VariableKind, consumer: &VariableKind) -> Result<()> {
    if buffered.value_type() != consumer.value_type() {
        return Err(BufferError::TypeMismatch {
            name: full_name.to_owned(),
            expected: consumer.value_type(),
            actual: buffered.value_type(),
        });
    }
    if buffered.enum_constants() != consumer.enum_constants() {
        return Err(BufferError::EnumMismatch {
            name: full_name.to_owned(),
        });
    }
    Ok(())
}
