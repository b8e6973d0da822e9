//! The engine: backends plus the shared core tables
//!
//! Lifecycle:
//!
//! 1. **Configuring** - backends are registered, instances created and
//!    configured, channels resolved and mapped.
//! 2. **Running** - after [`Engine::start`] succeeded; the reactor
//!    ([`Engine::iteration`], [`Engine::run`]) drives backend I/O and event
//!    propagation.
//! 3. **Shutting down** - after [`Engine::shutdown`]; terminal.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::context::Core;
use crate::error::{Error, Result};
use crate::events::{partition_by_instance, DrainReport, SWAP_LIMIT};
use crate::fd::ManagedFd;
use crate::reactor::Selector;
use crate::types::{BackendId, ChannelDirection, ChannelId, InstanceId};

/// Upper bound for a single readiness wait
pub const MAX_WAIT: Duration = Duration::from_secs(1);

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Configuring,
    Running,
    ShuttingDown,
}

/// Owner of all backends and routing tables
pub struct Engine {
    backends: Vec<Box<dyn Backend>>,
    pub(crate) core: Core,
    pub(crate) selector: Selector,
    state: EngineState,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            core: Core::new(),
            selector: Selector::new(),
            state: EngineState::Configuring,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    // =========================================================================
    // Configuration phase
    // =========================================================================

    /// Register a backend. Fails if a backend with the same name exists.
    pub fn register_backend(&mut self, backend: Box<dyn Backend>) -> Result<BackendId> {
        let id = self.core.registry.register(backend.name())?;
        self.backends.push(backend);
        Ok(id)
    }

    pub fn backend_id(&self, name: &str) -> Option<BackendId> {
        self.core.registry.backend_by_name(name)
    }

    pub fn backend_name(&self, backend: BackendId) -> &str {
        self.core.registry.backend_name(backend)
    }

    pub fn configure_backend(&mut self, backend: BackendId, option: &str, value: &str) -> Result<()> {
        self.backends[backend.index()].configure(option, value)
    }

    /// Create a named instance of `backend`
    pub fn create_instance(&mut self, backend: BackendId, name: &str) -> Result<InstanceId> {
        let instance = self.core.registry.create_instance(backend, name)?;
        if let Err(e) = self.backends[backend.index()].create(&mut self.core, instance) {
            self.core.registry.discard_instance(instance);
            return Err(e);
        }
        info!("Created {} instance {}", self.backend_name(backend), name);
        Ok(instance)
    }

    pub fn configure_instance(&mut self, instance: InstanceId, option: &str, value: &str) -> Result<()> {
        let backend = self.core.registry.instance(instance).backend();
        self.backends[backend.index()].configure_instance(&mut self.core, instance, option, value)
    }

    /// Ask the owning backend to resolve a concrete channel spec
    pub fn resolve_channel(
        &mut self,
        instance: InstanceId,
        spec: &str,
        direction: ChannelDirection,
    ) -> Result<ChannelId> {
        let backend = self.core.registry.instance(instance).backend();
        self.backends[backend.index()].channel(&mut self.core, instance, spec, direction)
    }

    /// Add the routing edge `from → to`; returns `false` if it already existed
    pub fn map_channel(&mut self, from: ChannelId, to: ChannelId) -> Result<bool> {
        self.core.routing.add_edge(from, to)
    }

    /// Start every backend that has instances and enter the running state
    pub fn start(&mut self) -> Result<()> {
        for (index, backend) in self.backends.iter_mut().enumerate() {
            let id = BackendId::from_index(index);
            let instances = self.core.registry.backend_instances(id).to_vec();
            if instances.is_empty() {
                continue;
            }

            if let Err(e) = backend.start(&mut self.core, &instances) {
                error!("Failed to start backend {}: {}", backend.name(), e);
                return Err(Error::BackendStart {
                    backend: backend.name().to_string(),
                    reason: e.to_string(),
                });
            }
            debug!("Started backend {} with {} instances", backend.name(), instances.len());
        }

        let stats = self.core.routing.stats();
        info!(
            "Routing {} sources ({} edges), largest bucket has {} entries",
            stats.sources, stats.edges, stats.largest_bucket
        );

        if self.core.fds.is_empty() {
            warn!("No descriptors registered for multiplexing");
        }

        self.state = EngineState::Running;
        Ok(())
    }

    // =========================================================================
    // Event propagation
    // =========================================================================

    /// Deliver queued events until the queue is empty or the swap limit is hit
    pub fn drain(&mut self) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        while !self.core.events.is_empty() && report.swaps < SWAP_LIMIT {
            let mut batch = self.core.events.swap();
            debug!("Swapping event buffers, {} events in primary", batch.len());

            let channels = &self.core.channels;
            let groups = partition_by_instance(&mut batch, |channel| channels.get(channel).instance());

            for (instance, range) in groups {
                let backend = self.core.registry.instance(instance).backend();
                let count = range.len();
                debug!("Calling handler for {} with {} events", instance, count);
                if let Err(e) =
                    self.backends[backend.index()].handle(&mut self.core, instance, &batch[range])
                {
                    error!(
                        "Backend {} failed to handle output: {}",
                        self.core.registry.backend_name(backend),
                        e
                    );
                    return Err(e);
                }
                report.delivered += count;
            }

            self.core.events.recycle(batch);
            report.swaps += 1;
        }

        if !self.core.events.is_empty() {
            report.dropped = self.core.events.discard();
            warn!(
                "Iteration swap limit hit, dropped {} events; a backend may be configured to route events in an infinite loop",
                report.dropped
            );
        }

        Ok(report)
    }

    /// Smallest polling interval requested by any backend with instances, at most [`MAX_WAIT`]
    pub fn backend_timeout(&self) -> Duration {
        let mut timeout = MAX_WAIT;
        for (index, backend) in self.backends.iter().enumerate() {
            if self.core.registry.instance_count(BackendId::from_index(index)) == 0 {
                continue;
            }
            if let Some(interval) = backend.interval() {
                if !interval.is_zero() && interval < timeout {
                    debug!("Updating interval to {:?} by request from {}", interval, backend.name());
                    timeout = interval;
                }
            }
        }
        timeout
    }

    /// Call `process` on every backend that has signaled descriptors or live instances
    pub(crate) fn process_backends(&mut self, signaled: &mut [ManagedFd]) -> Result<()> {
        let mut start = 0;

        for (index, backend) in self.backends.iter_mut().enumerate() {
            let id = BackendId::from_index(index);

            let mut end = start;
            for p in start..signaled.len() {
                if signaled[p].backend == id {
                    signaled.swap(end, p);
                    end += 1;
                }
            }

            if end > start || self.core.registry.instance_count(id) > 0 {
                debug!("Notifying backend {} of {} waiting descriptors", backend.name(), end - start);
                if let Err(e) = backend.process(&mut self.core, &signaled[start..end]) {
                    error!("Backend {} failed to handle input: {}", backend.name(), e);
                    return Err(e);
                }
            }

            start = end;
        }

        Ok(())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Free all channels, then shut every backend down. Runs at most once.
    pub fn shutdown(&mut self) {
        if self.state == EngineState::ShuttingDown {
            return;
        }
        self.state = EngineState::ShuttingDown;

        // channels go before instances so backends can release per-channel state
        for channel in self.core.channels.take_all() {
            let backend = self.core.registry.instance(channel.instance()).backend();
            self.backends[backend.index()].channel_free(&channel);
        }
        self.core.routing.clear();

        for (index, backend) in self.backends.iter_mut().enumerate() {
            let instances = self
                .core
                .registry
                .backend_instances(BackendId::from_index(index))
                .to_vec();
            if let Err(e) = backend.shutdown(&mut self.core, &instances) {
                warn!("Backend {} failed to shut down cleanly: {}", backend.name(), e);
            }
        }

        self.selector.clear();
        self.core.fds.clear();
        info!("Engine shut down");
    }
}
