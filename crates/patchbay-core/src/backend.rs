//! Backend trait definition
//!
//! A backend is one protocol adapter. The engine owns every registered
//! backend for the lifetime of the process and calls into it with a mutable
//! [`Core`] so the backend can create channels, emit events and manage its
//! descriptors. Per-instance state is kept inside the backend, keyed by
//! [`InstanceId`].

use std::time::Duration;

use crate::context::Core;
use crate::error::Result;
use crate::fd::ManagedFd;
use crate::types::{Channel, ChannelDirection, ChannelId, Event, InstanceId};

/// Capability set of a protocol adapter
pub trait Backend {
    /// Globally unique backend name, used in configuration section headers
    fn name(&self) -> &str;

    /// Apply a global `[backend <name>]` option
    fn configure(&mut self, option: &str, value: &str) -> Result<()>;

    /// Set up private state for a freshly created instance
    fn create(&mut self, core: &mut Core, instance: InstanceId) -> Result<()>;

    /// Apply an instance option
    fn configure_instance(
        &mut self,
        core: &mut Core,
        instance: InstanceId,
        option: &str,
        value: &str,
    ) -> Result<()>;

    /// Resolve a concrete channel spec to a channel, creating it if needed
    fn channel(
        &mut self,
        core: &mut Core,
        instance: InstanceId,
        spec: &str,
        direction: ChannelDirection,
    ) -> Result<ChannelId>;

    /// Deliver routed events to one instance.
    ///
    /// All events of one drain swap destined for `instance` arrive in a single
    /// call, in the order they were emitted.
    fn handle(&mut self, core: &mut Core, instance: InstanceId, events: &[Event]) -> Result<()>;

    /// Ingest input.
    ///
    /// Called once per reactor iteration with the signaled descriptors of this
    /// backend, and also with an empty slice whenever the backend has live
    /// instances. A descriptor left with unread input is signaled again on
    /// the next iteration.
    fn process(&mut self, core: &mut Core, signaled: &[ManagedFd]) -> Result<()>;

    /// Start all instances once configuration is complete
    fn start(&mut self, core: &mut Core, instances: &[InstanceId]) -> Result<()>;

    /// Release all instances. Called exactly once at teardown.
    fn shutdown(&mut self, core: &mut Core, instances: &[InstanceId]) -> Result<()>;

    /// Requested maximum time between two `process` calls
    fn interval(&self) -> Option<Duration> {
        None
    }

    /// Release private per-channel state before instances are shut down
    fn channel_free(&mut self, _channel: &Channel) {}
}
