//! Shared tables handed to backends

use std::os::fd::RawFd;
use std::time::Instant;

use crate::channel::ChannelStore;
use crate::error::{Error, Result};
use crate::events::EventQueue;
use crate::fd::FdTable;
use crate::registry::Registry;
use crate::routing::RoutingGraph;
use crate::types::{Channel, ChannelId, ChannelValue, Instance, InstanceId};

/// Everything the engine owns apart from the backends themselves.
///
/// Backends receive a `&mut Core` in every callback; this is the API they use
/// to reach the channel store, the event queue and the descriptor table.
#[derive(Debug)]
pub struct Core {
    pub(crate) registry: Registry,
    pub(crate) channels: ChannelStore,
    pub(crate) routing: RoutingGraph,
    pub(crate) events: EventQueue,
    pub(crate) fds: FdTable,
    epoch: Instant,
    timestamp: u64,
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

impl Core {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            channels: ChannelStore::new(),
            routing: RoutingGraph::new(),
            events: EventQueue::new(),
            fds: FdTable::new(),
            epoch: Instant::now(),
            timestamp: 0,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn channels(&self) -> &ChannelStore {
        &self.channels
    }

    pub fn routing(&self) -> &RoutingGraph {
        &self.routing
    }

    pub fn fds(&self) -> &FdTable {
        &self.fds
    }

    // =========================================================================
    // Channels
    // =========================================================================

    /// Find the channel `(instance, ident)`, creating it if `create` is set
    pub fn channel(&mut self, instance: InstanceId, ident: u64, create: bool) -> Result<ChannelId> {
        self.channels.get_or_create(instance, ident, create)
    }

    pub fn channel_entry(&self, channel: ChannelId) -> &Channel {
        self.channels.get(channel)
    }

    /// Rewrite a channel's identity; edges referencing it stay intact
    pub fn channel_update(&mut self, channel: ChannelId, ident: u64) -> Result<()> {
        self.channels.rekey(channel, ident)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Queue a value change on `channel` for every mapped destination.
    ///
    /// Channels without outgoing edges are sinks; emitting on them is a no-op.
    pub fn emit(&mut self, channel: ChannelId, value: ChannelValue) -> Result<()> {
        let destinations = self.routing.destinations_of(channel);
        if destinations.is_empty() {
            return Ok(());
        }
        self.events.push_all(destinations, value)
    }

    pub fn pending_events(&self) -> usize {
        self.events.pending()
    }

    // =========================================================================
    // Instances
    // =========================================================================

    pub fn instance(&self, instance: InstanceId) -> &Instance {
        self.registry.instance(instance)
    }

    /// Assign the backend-private identity used by [`Core::instance_find`]
    pub fn set_instance_ident(&mut self, instance: InstanceId, ident: u64) {
        self.registry.instance_mut(instance).ident = ident;
    }

    pub fn instance_find(&self, backend: &str, ident: u64) -> Option<InstanceId> {
        self.registry.find_instance(backend, ident)
    }

    pub fn instance_by_name(&self, name: &str) -> Option<InstanceId> {
        self.registry.instance_by_name(name)
    }

    /// Copy of the named backend's instance list
    pub fn backend_instances(&self, backend: &str) -> Result<Vec<InstanceId>> {
        self.registry.instances_of(backend)
    }

    // =========================================================================
    // Descriptors and time
    // =========================================================================

    /// Register (`enable`) or release a descriptor for readiness notification
    pub fn manage_fd(&mut self, fd: RawFd, backend: &str, enable: bool, context: u64) -> Result<()> {
        let backend_id = self
            .registry
            .backend_by_name(backend)
            .ok_or_else(|| Error::UnknownBackend(backend.to_string()))?;
        self.fds.manage(fd, backend_id, enable, context)
    }

    /// Milliseconds since engine creation, sampled once per reactor iteration
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub(crate) fn update_timestamp(&mut self) {
        self.timestamp = self.epoch.elapsed().as_millis() as u64;
    }
}
