//! Patchbay Backends
//!
//! Built-in protocol backends, selected with cargo features:
//! - `loopback` - re-emits every event it receives

#[cfg(feature = "loopback")]
pub mod loopback;

#[cfg(feature = "loopback")]
pub use loopback::LoopbackBackend;

use patchbay_core::{Backend, Engine, Result};
use tracing::debug;

/// Every backend compiled into this build
pub fn builtin() -> Vec<Box<dyn Backend>> {
    #[allow(unused_mut)]
    let mut backends: Vec<Box<dyn Backend>> = Vec::new();

    #[cfg(feature = "loopback")]
    backends.push(Box::new(LoopbackBackend::new()));

    backends
}

/// Register every built-in backend with `engine`, returning how many were added
pub fn register_builtin(engine: &mut Engine) -> Result<usize> {
    let backends = builtin();
    let count = backends.len();
    for backend in backends {
        debug!("Registering built-in backend {}", backend.name());
        engine.register_backend(backend)?;
    }
    Ok(count)
}
