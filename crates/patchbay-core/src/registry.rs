//! Backend and instance registry
//!
//! Backends are identified by name only. Each backend keeps its own list of
//! instances; instance identities (`ident`) are private to the backend, so
//! lookups by identity scan a single backend's list instead of a global index.

use tracing::info;

use crate::error::{Error, Result};
use crate::types::{BackendId, Instance, InstanceId};

#[derive(Debug)]
struct BackendEntry {
    name: String,
    instances: Vec<InstanceId>,
}

/// Registered backends and their live instances
#[derive(Debug, Default)]
pub struct Registry {
    backends: Vec<BackendEntry>,
    instances: Vec<Instance>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend name. Names are the only backend identity.
    pub fn register(&mut self, name: &str) -> Result<BackendId> {
        if self.backend_by_name(name).is_some() {
            return Err(Error::DuplicateBackend(name.to_string()));
        }

        self.backends.try_reserve(1)?;
        let id = BackendId::from_index(self.backends.len());
        self.backends.push(BackendEntry {
            name: name.to_string(),
            instances: Vec::new(),
        });

        info!("Registered backend {}", name);
        Ok(id)
    }

    pub fn backend_by_name(&self, name: &str) -> Option<BackendId> {
        self.backends
            .iter()
            .position(|entry| entry.name == name)
            .map(BackendId::from_index)
    }

    pub fn backend_name(&self, backend: BackendId) -> &str {
        &self.backends[backend.index()].name
    }

    /// All registered backends in registration order
    pub fn backends(&self) -> impl Iterator<Item = BackendId> + '_ {
        (0..self.backends.len()).map(BackendId::from_index)
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Create a new instance slot owned by `backend`
    pub fn create_instance(&mut self, backend: BackendId, name: &str) -> Result<InstanceId> {
        if name.is_empty() || name.contains(' ') || name.contains('.') {
            return Err(Error::InvalidInstanceName(name.to_string()));
        }

        if self.instance_by_name(name).is_some() {
            return Err(Error::DuplicateInstanceName(name.to_string()));
        }

        self.instances.try_reserve(1)?;
        self.backends[backend.index()].instances.try_reserve(1)?;

        let id = InstanceId::from_index(self.instances.len());
        self.instances.push(Instance {
            name: name.to_string(),
            backend,
            ident: 0,
        });
        self.backends[backend.index()].instances.push(id);
        Ok(id)
    }

    /// Remove the most recently created instance again
    pub(crate) fn discard_instance(&mut self, instance: InstanceId) {
        if instance.index() + 1 != self.instances.len() {
            return;
        }
        if let Some(removed) = self.instances.pop() {
            self.backends[removed.backend().index()]
                .instances
                .retain(|&id| id != instance);
        }
    }

    pub fn instance(&self, instance: InstanceId) -> &Instance {
        &self.instances[instance.index()]
    }

    pub(crate) fn instance_mut(&mut self, instance: InstanceId) -> &mut Instance {
        &mut self.instances[instance.index()]
    }

    pub fn instance_by_name(&self, name: &str) -> Option<InstanceId> {
        self.instances
            .iter()
            .position(|inst| inst.name == name)
            .map(InstanceId::from_index)
    }

    /// Find an instance of the named backend by its backend-assigned identity
    pub fn find_instance(&self, backend: &str, ident: u64) -> Option<InstanceId> {
        let backend = self.backend_by_name(backend)?;
        self.backends[backend.index()]
            .instances
            .iter()
            .copied()
            .find(|id| self.instances[id.index()].ident == ident)
    }

    /// Copy of the instance list of the named backend
    pub fn instances_of(&self, backend: &str) -> Result<Vec<InstanceId>> {
        let backend = self
            .backend_by_name(backend)
            .ok_or_else(|| Error::UnknownBackend(backend.to_string()))?;
        Ok(self.backend_instances(backend).to_vec())
    }

    pub fn backend_instances(&self, backend: BackendId) -> &[InstanceId] {
        &self.backends[backend.index()].instances
    }

    pub fn instance_count(&self, backend: BackendId) -> usize {
        self.backends[backend.index()].instances.len()
    }

    pub fn total_instances(&self) -> usize {
        self.instances.len()
    }
}
