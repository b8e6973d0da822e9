//! Loopback backend
//!
//! Every event handed to a loopback instance is emitted again from the
//! channel it arrived on, so mappings can be chained through it. Channels
//! are arbitrary names; each new name gets the next sequential identity.

use std::collections::HashMap;
use tracing::{debug, info};

use patchbay_core::{
    Backend, ChannelDirection, ChannelId, Core, Event, InstanceId, ManagedFd, Result,
};

pub const BACKEND_NAME: &str = "loopback";

#[derive(Debug, Default)]
struct LoopbackInstance {
    names: Vec<String>,
}

/// The loopback backend
#[derive(Debug, Default)]
pub struct LoopbackBackend {
    instances: HashMap<InstanceId, LoopbackInstance>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the channel with identity `ident` on `instance`
    pub fn channel_name(&self, instance: InstanceId, ident: u64) -> Option<&str> {
        let data = self.instances.get(&instance)?;
        data.names.get(ident as usize).map(String::as_str)
    }
}

impl Backend for LoopbackBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn configure(&mut self, option: &str, _value: &str) -> Result<()> {
        debug!("Ignoring loopback backend option {}", option);
        Ok(())
    }

    fn create(&mut self, _core: &mut Core, instance: InstanceId) -> Result<()> {
        self.instances.insert(instance, LoopbackInstance::default());
        Ok(())
    }

    fn configure_instance(
        &mut self,
        _core: &mut Core,
        instance: InstanceId,
        option: &str,
        _value: &str,
    ) -> Result<()> {
        debug!("Ignoring option {} for loopback {}", option, instance);
        Ok(())
    }

    fn channel(
        &mut self,
        core: &mut Core,
        instance: InstanceId,
        spec: &str,
        _direction: ChannelDirection,
    ) -> Result<ChannelId> {
        let data = self.instances.entry(instance).or_default();
        let ident = match data.names.iter().position(|name| name == spec) {
            Some(index) => index,
            None => {
                data.names.try_reserve(1)?;
                data.names.push(spec.to_string());
                data.names.len() - 1
            }
        };
        core.channel(instance, ident as u64, true)
    }

    fn handle(&mut self, core: &mut Core, _instance: InstanceId, events: &[Event]) -> Result<()> {
        for event in events {
            core.emit(event.channel, event.value)?;
        }
        Ok(())
    }

    fn process(&mut self, _core: &mut Core, _signaled: &[ManagedFd]) -> Result<()> {
        Ok(())
    }

    fn start(&mut self, _core: &mut Core, instances: &[InstanceId]) -> Result<()> {
        info!("Loopback backend started with {} instances", instances.len());
        Ok(())
    }

    fn shutdown(&mut self, _core: &mut Core, instances: &[InstanceId]) -> Result<()> {
        for instance in instances {
            self.instances.remove(instance);
        }
        info!("Loopback backend shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_core::{Engine, Registry};

    #[test]
    fn test_names_get_sequential_identities() {
        let mut engine = Engine::new();
        let backend = engine.register_backend(Box::new(LoopbackBackend::new())).unwrap();
        let inst = engine.create_instance(backend, "lo").unwrap();

        let fader = engine.resolve_channel(inst, "fader", ChannelDirection::Input).unwrap();
        let knob = engine.resolve_channel(inst, "knob", ChannelDirection::Output).unwrap();
        let again = engine.resolve_channel(inst, "fader", ChannelDirection::Output).unwrap();

        assert_eq!(engine.core().channel_entry(fader).ident(), 0);
        assert_eq!(engine.core().channel_entry(knob).ident(), 1);
        assert_eq!(fader, again);
    }

    #[test]
    fn test_channel_name_lookup() {
        let mut registry = Registry::new();
        let id = registry.register(BACKEND_NAME).unwrap();
        let inst = registry.create_instance(id, "lo").unwrap();

        let mut core = Core::new();
        let mut backend = LoopbackBackend::new();
        backend.create(&mut core, inst).unwrap();
        backend.channel(&mut core, inst, "x", ChannelDirection::Input).unwrap();

        assert_eq!(backend.channel_name(inst, 0), Some("x"));
        assert_eq!(backend.channel_name(inst, 1), None);

        backend.shutdown(&mut core, &[inst]).unwrap();
        assert_eq!(backend.channel_name(inst, 0), None);
    }
}
