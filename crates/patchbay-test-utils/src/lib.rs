//! Common test helpers for patchbay tests
//!
//! This crate provides:
//! - A scriptable, recording [`MockBackend`]
//! - Reactor drivers that run a bounded number of iterations
//! - Small constructors for values and engines

use parking_lot::Mutex;
use patchbay_core::{
    Backend, Channel, ChannelDirection, ChannelId, ChannelValue, Core, DrainReport, Engine, Error,
    Event, InstanceId, ManagedFd, Result,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Mock Backend
// ============================================================================

/// Hook run at the end of every `process` call
pub type ProcessHook = Box<dyn FnMut(&mut Core, &[ManagedFd]) -> Result<()>>;

/// Hook run when the backend is started
pub type StartHook = Box<dyn FnMut(&mut Core, &[InstanceId]) -> Result<()>>;

/// Everything a [`MockBackend`] observed
#[derive(Debug, Default)]
pub struct MockState {
    pub configured: Vec<(String, String)>,
    pub created: Vec<InstanceId>,
    pub instance_options: Vec<(InstanceId, String, String)>,
    pub resolved: Vec<(InstanceId, String, ChannelDirection)>,
    pub handled: Vec<(InstanceId, Vec<Event>)>,
    pub process_calls: Vec<Instant>,
    pub signaled: Vec<ManagedFd>,
    pub started: Vec<InstanceId>,
    pub shutdown_calls: usize,
    pub shutdown_instances: Vec<InstanceId>,
    pub freed_channels: Vec<Channel>,
}

/// Shared view of a mock backend's recorded state
#[derive(Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Run `f` with the recorded state locked
    pub fn with<R>(&self, f: impl FnOnce(&MockState) -> R) -> R {
        f(&self.state.lock())
    }

    /// All `handle` batches received so far
    pub fn handled(&self) -> Vec<(InstanceId, Vec<Event>)> {
        self.state.lock().handled.clone()
    }

    pub fn handle_calls(&self) -> usize {
        self.state.lock().handled.len()
    }

    pub fn process_calls(&self) -> usize {
        self.state.lock().process_calls.len()
    }

    pub fn process_times(&self) -> Vec<Instant> {
        self.state.lock().process_calls.clone()
    }

    pub fn signaled(&self) -> Vec<ManagedFd> {
        self.state.lock().signaled.clone()
    }

    pub fn started(&self) -> Vec<InstanceId> {
        self.state.lock().started.clone()
    }

    pub fn shutdown_calls(&self) -> usize {
        self.state.lock().shutdown_calls
    }

    pub fn freed_channels(&self) -> usize {
        self.state.lock().freed_channels.len()
    }

    pub fn configured(&self) -> Vec<(String, String)> {
        self.state.lock().configured.clone()
    }

    pub fn instance_options(&self) -> Vec<(InstanceId, String, String)> {
        self.state.lock().instance_options.clone()
    }

    pub fn resolved(&self) -> Vec<(InstanceId, String, ChannelDirection)> {
        self.state.lock().resolved.clone()
    }
}

/// A backend whose channels are plain decimal identifiers.
///
/// Channel spec `"12"` resolves to channel ident 12 on the instance. The
/// instance option `ident` sets the instance identity, option `fail` (global
/// or per instance) is always rejected.
pub struct MockBackend {
    name: String,
    state: Arc<Mutex<MockState>>,
    interval: Option<Duration>,
    echo: bool,
    fail_create: bool,
    fail_start: bool,
    fail_handle: bool,
    on_process: Option<ProcessHook>,
    on_start: Option<StartHook>,
}

impl MockBackend {
    pub fn new(name: &str) -> (Self, MockHandle) {
        let handle = MockHandle::default();
        let backend = Self {
            name: name.to_string(),
            state: handle.state.clone(),
            interval: None,
            echo: false,
            fail_create: false,
            fail_start: false,
            fail_handle: false,
            on_process: None,
            on_start: None,
        };
        (backend, handle)
    }

    /// Request polling every `interval`
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Re-emit every handled event from the channel it arrived on
    pub fn echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_handle(mut self) -> Self {
        self.fail_handle = true;
        self
    }

    pub fn on_process<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut Core, &[ManagedFd]) -> Result<()> + 'static,
    {
        self.on_process = Some(Box::new(hook));
        self
    }

    pub fn on_start<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut Core, &[InstanceId]) -> Result<()> + 'static,
    {
        self.on_start = Some(Box::new(hook));
        self
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, option: &str, value: &str) -> Result<()> {
        if option == "fail" {
            return Err(Error::InvalidOption {
                option: option.to_string(),
                value: value.to_string(),
                reason: "rejected by mock".to_string(),
            });
        }
        self.state
            .lock()
            .configured
            .push((option.to_string(), value.to_string()));
        Ok(())
    }

    fn create(&mut self, _core: &mut Core, instance: InstanceId) -> Result<()> {
        if self.fail_create {
            return Err(Error::Backend(format!("{} cannot create {}", self.name, instance)));
        }
        self.state.lock().created.push(instance);
        Ok(())
    }

    fn configure_instance(
        &mut self,
        core: &mut Core,
        instance: InstanceId,
        option: &str,
        value: &str,
    ) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidOption {
            option: option.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match option {
            "fail" => return Err(invalid("rejected by mock")),
            "ident" => {
                let ident = value.parse().map_err(|_| invalid("not a number"))?;
                core.set_instance_ident(instance, ident);
            }
            _ => {}
        }

        self.state
            .lock()
            .instance_options
            .push((instance, option.to_string(), value.to_string()));
        Ok(())
    }

    fn channel(
        &mut self,
        core: &mut Core,
        instance: InstanceId,
        spec: &str,
        direction: ChannelDirection,
    ) -> Result<ChannelId> {
        let ident: u64 = spec.parse().map_err(|_| Error::InvalidChannelSpec {
            spec: spec.to_string(),
            reason: "mock channels are decimal numbers".to_string(),
        })?;

        self.state
            .lock()
            .resolved
            .push((instance, spec.to_string(), direction));
        core.channel(instance, ident, true)
    }

    fn handle(&mut self, core: &mut Core, instance: InstanceId, events: &[Event]) -> Result<()> {
        self.state.lock().handled.push((instance, events.to_vec()));

        if self.fail_handle {
            return Err(Error::Backend(format!("{} refused output", self.name)));
        }

        if self.echo {
            for event in events {
                core.emit(event.channel, event.value)?;
            }
        }
        Ok(())
    }

    fn process(&mut self, core: &mut Core, signaled: &[ManagedFd]) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.process_calls.push(Instant::now());
            state.signaled.extend_from_slice(signaled);
        }

        match self.on_process.as_mut() {
            Some(hook) => hook(core, signaled),
            None => Ok(()),
        }
    }

    fn start(&mut self, core: &mut Core, instances: &[InstanceId]) -> Result<()> {
        self.state.lock().started.extend_from_slice(instances);

        if let Some(hook) = self.on_start.as_mut() {
            hook(core, instances)?;
        }

        if self.fail_start {
            return Err(Error::Backend(format!("{} cannot start", self.name)));
        }
        Ok(())
    }

    fn shutdown(&mut self, _core: &mut Core, instances: &[InstanceId]) -> Result<()> {
        let mut state = self.state.lock();
        state.shutdown_calls += 1;
        state.shutdown_instances.extend_from_slice(instances);
        Ok(())
    }

    fn interval(&self) -> Option<Duration> {
        self.interval
    }

    fn channel_free(&mut self, channel: &Channel) {
        self.state.lock().freed_channels.push(*channel);
    }
}

// ============================================================================
// Engine helpers
// ============================================================================

/// Register a mock backend and return its recording handle
pub fn register_mock(engine: &mut Engine, backend: MockBackend) -> MockHandle {
    let handle = MockHandle {
        state: backend.state.clone(),
    };
    engine
        .register_backend(Box::new(backend))
        .expect("mock backend registration failed");
    handle
}

/// Create an instance of the named backend
pub fn instance(engine: &mut Engine, backend: &str, name: &str) -> InstanceId {
    let backend = engine
        .backend_id(backend)
        .unwrap_or_else(|| panic!("backend {} not registered", backend));
    engine
        .create_instance(backend, name)
        .expect("instance creation failed")
}

/// Resolve a mock channel and map it `from → to`
pub fn map(
    engine: &mut Engine,
    from: (InstanceId, &str),
    to: (InstanceId, &str),
) -> (ChannelId, ChannelId) {
    let source = engine
        .resolve_channel(from.0, from.1, ChannelDirection::Input)
        .expect("source channel");
    let destination = engine
        .resolve_channel(to.0, to.1, ChannelDirection::Output)
        .expect("destination channel");
    engine
        .map_channel(source, destination)
        .expect("mapping failed");
    (source, destination)
}

pub fn value(normalised: f64) -> ChannelValue {
    ChannelValue::new(normalised)
}

/// Run exactly `count` reactor iterations
pub async fn run_iterations(engine: &mut Engine, count: usize) -> Result<Vec<DrainReport>> {
    let mut reports = Vec::with_capacity(count);
    for _ in 0..count {
        reports.push(engine.iteration().await?);
    }
    Ok(reports)
}

/// Iterate until `duration` has elapsed, returning the number of iterations
pub async fn run_for(engine: &mut Engine, duration: Duration) -> Result<usize> {
    let start = Instant::now();
    let mut iterations = 0;
    while start.elapsed() < duration {
        engine.iteration().await?;
        iterations += 1;
    }
    Ok(iterations)
}

/// Iterate until `check` holds or `max_wait` elapses - condition-based, not time-based
pub async fn run_until<F>(engine: &mut Engine, check: F, max_wait: Duration) -> Result<bool>
where
    F: Fn(&Engine) -> bool,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check(engine) {
            return Ok(true);
        }
        engine.iteration().await?;
    }
    Ok(check(engine))
}
