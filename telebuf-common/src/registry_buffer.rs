//! Arena of variable buffers mirroring one registry tree.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, info};

use crate::registry::{Registry, RegistryChange};
use crate::variable::Variable;
use crate::variable_buffer::VariableBuffer;

/// Index of a buffer inside its `VariableRegistryBuffer`. Stable for the buffer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(usize);

pub struct VariableRegistryBuffer {
    root: Registry,
    size: usize,
    buffers: Vec<VariableBuffer>,
    index: HashMap<String, BufferId>,
    changes: Receiver<RegistryChange>,
    disposed: bool,
}

impl VariableRegistryBuffer {
    pub fn new(root: Registry, size: usize) -> Self {
        // Subscribe first so nothing added during the initial walk is missed.
        let changes = root.subscribe();
        let mut registry_buffer = VariableRegistryBuffer {
            root,
            size,
            buffers: Vec::new(),
            index: HashMap::new(),
            changes,
            disposed: false,
        };
        for variable in registry_buffer.root.collect_subtree_variables() {
            registry_buffer.register(variable);
        }
        info!(
            "registry buffer for `{}`: {} variables, {} slots each",
            registry_buffer.root.namespace(),
            registry_buffer.buffers.len(),
            size
        );
        registry_buffer
    }

    pub fn root(&self) -> &Registry {
        &self.root
    }

    /// Number of slots in every buffer.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    fn register(&mut self, variable: Arc<Variable>) -> BufferId {
        let full_name = variable.full_name();
        if let Some(id) = self.index.get(&full_name) {
            return *id;
        }
        let id = BufferId(self.buffers.len());
        debug!("new {} buffer for `{}`", variable.value_type(), full_name);
        self.buffers.push(VariableBuffer::new(variable, self.size));
        self.index.insert(full_name, id);
        id
    }

    /// Creates buffers for every variable added to the tree since the last call.
    ///
    /// Returns the number of buffers created.
    pub fn sync(&mut self) -> usize {
        if self.disposed {
            return 0;
        }
        let before = self.buffers.len();
        loop {
            match self.changes.try_recv() {
                Ok(RegistryChange::VariableAdded(variable)) => {
                    self.register(variable);
                }
                Ok(RegistryChange::RegistryAdded(registry)) => {
                    for variable in registry.collect_subtree_variables() {
                        self.register(variable);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        let created = self.buffers.len() - before;
        if created > 0 {
            debug!("schema sync created {created} buffers");
        }
        created
    }

    pub fn find_buffer(&self, full_name: &str) -> Option<BufferId> {
        self.index.get(full_name).copied()
    }

    /// Finds the buffer holding `full_name`, picking up variables the tree gained since the last sync.
    pub fn find_or_create_buffer(&mut self, full_name: &str) -> Option<BufferId> {
        if self.disposed {
            return None;
        }
        if let Some(id) = self.find_buffer(full_name) {
            return Some(id);
        }
        self.sync();
        if let Some(id) = self.find_buffer(full_name) {
            return Some(id);
        }
        let variable = self.root.find_variable(full_name)?;
        Some(self.register(variable))
    }

    pub fn buffer(&self, id: BufferId) -> &VariableBuffer {
        &self.buffers[id.0]
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> &mut VariableBuffer {
        &mut self.buffers[id.0]
    }

    pub fn buffers(&self) -> &[VariableBuffer] {
        &self.buffers
    }

    pub fn resize(&mut self, copy_from: usize, new_length: usize) {
        for buffer in &mut self.buffers {
            buffer.resize(copy_from, new_length);
        }
        self.size = new_length;
    }

    pub fn fill(&mut self, zero: bool, from: usize, length: usize) {
        for buffer in &mut self.buffers {
            buffer.fill(zero, from, length);
        }
    }

    pub fn write_at(&mut self, index: usize) {
        for buffer in &mut self.buffers {
            buffer.write_at(index);
        }
    }

    /// Loads slot `index` into every live variable; returns whether any changed.
    pub fn read_at(&self, index: usize) -> bool {
        let mut changed = false;
        for buffer in &self.buffers {
            changed |= buffer.read_at(index);
        }
        changed
    }

    /// Bytes one tick of every buffered variable occupies.
    pub fn frame_memory_size(&self) -> usize {
        self.buffers.iter().map(VariableBuffer::frame_memory_size).sum()
    }

    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.buffers.clear();
        self.index.clear();
        self.changes = crossbeam_channel::never();
    }
}
