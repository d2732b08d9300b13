//! Hierarchical, thread-safe namespace of variables.
//!
//! Structural changes are published on crossbeam channels to subscribers of the node
//! where the change happened and of every ancestor. Nothing is delivered as a callback:
//! whoever holds a receiver drains it on its own thread.

use std::fmt;
use std::sync::{Arc, Weak};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{BufferError, Result};
use crate::variable::{split_full_name, validate_name, Namespace, Variable, VariableKind};

#[derive(Debug, Clone)]
pub enum RegistryChange {
    VariableAdded(Arc<Variable>),
    RegistryAdded(Registry),
}

#[derive(Clone)]
pub struct Registry(Arc<RegistryNode>);

struct RegistryNode {
    name: String,
    namespace: Namespace,
    parent: Weak<RegistryNode>,
    state: RwLock<RegistryState>,
    listeners: Mutex<Vec<Sender<RegistryChange>>>,
}

#[derive(Default)]
struct RegistryState {
    variables: Vec<Arc<Variable>>,
    children: Vec<Registry>,
}

impl Registry {
    pub fn new(name: &str) -> Result<Registry> {
        validate_name(name)?;
        Ok(Registry::node(name, Namespace::new([name]), Weak::new()))
    }

    fn node(name: &str, namespace: Namespace, parent: Weak<RegistryNode>) -> Registry {
        Registry(Arc::new(RegistryNode {
            name: name.to_owned(),
            namespace,
            parent,
            state: RwLock::new(RegistryState::default()),
            listeners: Mutex::new(Vec::new()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn namespace(&self) -> &Namespace {
        &self.0.namespace
    }

    pub fn parent(&self) -> Option<Registry> {
        self.0.parent.upgrade().map(Registry)
    }

    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn add_variable(&self, name: &str, kind: VariableKind) -> Result<Arc<Variable>> {
        let variable = {
            let mut state = self.0.state.write();
            if state.variables.iter().any(|v| v.name() == name) {
                return Err(BufferError::DuplicateVariable {
                    registry: self.namespace().to_string(),
                    name: name.to_owned(),
                });
            }
            let variable = Variable::with_namespace(name, self.namespace().clone(), kind)?;
            state.variables.push(variable.clone());
            variable
        };

        self.notify(RegistryChange::VariableAdded(variable.clone()));
        Ok(variable)
    }

    pub fn add_child(&self, name: &str) -> Result<Registry> {
        validate_name(name)?;
        let child = {
            let mut state = self.0.state.write();
            if state.children.iter().any(|c| c.name() == name) {
                return Err(BufferError::DuplicateRegistry {
                    registry: self.namespace().to_string(),
                    name: name.to_owned(),
                });
            }
            let child = Registry::node(name, self.namespace().child(name), Arc::downgrade(&self.0));
            state.children.push(child.clone());
            child
        };

        self.notify(RegistryChange::RegistryAdded(child.clone()));
        Ok(child)
    }

    pub fn variable(&self, name: &str) -> Option<Arc<Variable>> {
        self.0.state.read().variables.iter().find(|v| v.name() == name).cloned()
    }

    pub fn child(&self, name: &str) -> Option<Registry> {
        self.0.state.read().children.iter().find(|c| c.name() == name).cloned()
    }

    pub fn variables(&self) -> Vec<Arc<Variable>> {
        self.0.state.read().variables.clone()
    }

    pub fn children(&self) -> Vec<Registry> {
        self.0.state.read().children.clone()
    }

    /// Looks up a registry by absolute namespace within this subtree.
    pub fn find_registry(&self, namespace: &Namespace) -> Option<Registry> {
        if !namespace.starts_with(self.namespace()) {
            return None;
        }
        let mut current = self.clone();
        for segment in &namespace.segments()[self.namespace().len()..] {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Looks up a variable by absolute full name within this subtree.
    pub fn find_variable(&self, full_name: &str) -> Option<Arc<Variable>> {
        let (namespace, name) = split_full_name(full_name);
        self.find_registry(&namespace)?.variable(name)
    }

    /// Returns the registry at `namespace`, creating missing intermediate registries.
    pub fn ensure_path_exists(&self, namespace: &Namespace) -> Result<Registry> {
        if !namespace.starts_with(self.namespace()) {
            return Err(BufferError::NamespaceMismatch {
                namespace: namespace.to_string(),
                root: self.namespace().to_string(),
            });
        }

        let mut current = self.clone();
        for segment in &namespace.segments()[self.namespace().len()..] {
            current = match current.child(segment) {
                Some(child) => child,
                None => match current.add_child(segment) {
                    Ok(child) => child,
                    // Another thread added it between the lookup and the insert.
                    Err(BufferError::DuplicateRegistry { .. }) => {
                        current.child(segment).ok_or_else(|| {
                            BufferError::UnknownRegistry(current.namespace().child(segment).to_string())
                        })?
                    }
                    Err(e) => return Err(e),
                },
            };
        }
        Ok(current)
    }

    /// Every variable of this registry and its descendants, depth first.
    pub fn collect_subtree_variables(&self) -> Vec<Arc<Variable>> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut Vec<Arc<Variable>>) {
        let state = self.0.state.read();
        out.extend(state.variables.iter().cloned());
        for child in &state.children {
            child.collect_into(out);
        }
    }

    /// Adds a variable with the same name, namespace and kind as `variable` unless one exists.
    ///
    /// The copy starts with the source's current value. An existing variable of another
    /// type is a configuration error.
    pub fn duplicate_variable(&self, variable: &Variable) -> Result<Arc<Variable>> {
        let registry = self.ensure_path_exists(variable.namespace())?;
        if let Some(existing) = registry.variable(variable.name()) {
            if existing.value_type() != variable.value_type() {
                return Err(BufferError::TypeMismatch {
                    name: existing.full_name(),
                    expected: variable.value_type(),
                    actual: existing.value_type(),
                });
            }
            return Ok(existing);
        }

        let copy = match registry.add_variable(variable.name(), variable.kind().clone()) {
            Ok(copy) => copy,
            Err(BufferError::DuplicateVariable { .. }) => registry
                .variable(variable.name())
                .ok_or_else(|| BufferError::UnknownVariable(variable.full_name()))?,
            Err(e) => return Err(e),
        };
        copy.store_bits(variable.load_bits());
        Ok(copy)
    }

    /// Mirrors every variable of `source`'s subtree that this tree lacks.
    ///
    /// Returns the variables that were created.
    pub fn duplicate_missing(&self, source: &Registry) -> Result<Vec<Arc<Variable>>> {
        let mut created = Vec::new();
        for variable in source.collect_subtree_variables() {
            if self.find_variable(&variable.full_name()).is_none() {
                created.push(self.duplicate_variable(&variable)?);
            }
        }
        Ok(created)
    }

    /// Receives every structural change made at or below this registry from now on.
    pub fn subscribe(&self) -> Receiver<RegistryChange> {
        let (tx, rx) = unbounded();
        self.0.listeners.lock().push(tx);
        rx
    }

    fn notify(&self, change: RegistryChange) {
        let mut node = Some(self.0.clone());
        while let Some(current) = node {
            current
                .listeners
                .lock()
                .retain(|tx| tx.send(change.clone()).is_ok());
            node = current.parent.upgrade();
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("namespace", &self.namespace().to_string())
            .finish()
    }
}
