//! Patchbay Core
//!
//! The routing and multiplexing engine behind patchbay:
//! - Backend and instance registry ([`Registry`])
//! - Channel identity store ([`ChannelStore`])
//! - Static routing graph ([`RoutingGraph`])
//! - Double-buffered event propagation with a swap limit ([`Engine::drain`])
//! - Descriptor reactor ([`Engine::iteration`], [`Engine::run`])
//!
//! Protocol adapters implement [`Backend`] and talk to the engine through
//! the [`Core`] handed to every callback.
//!
//! # Example
//!
//! ```no_run
//! use patchbay_core::Engine;
//! use std::sync::atomic::AtomicBool;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> patchbay_core::Result<()> {
//!     let mut engine = Engine::new();
//!     // register backends, load a configuration ...
//!     engine.start()?;
//!
//!     let shutdown = AtomicBool::new(false);
//!     engine.run(&shutdown).await?;
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```

#![cfg(unix)]

pub mod backend;
pub mod channel;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod fd;
pub mod reactor;
pub mod registry;
pub mod routing;
pub mod types;

pub use backend::Backend;
pub use channel::ChannelStore;
pub use context::Core;
pub use engine::{Engine, EngineState, MAX_WAIT};
pub use error::{Error, Result};
pub use events::{DrainReport, EventQueue, SWAP_LIMIT};
pub use fd::{FdTable, ManagedFd};
pub use registry::Registry;
pub use routing::{RoutingGraph, RoutingStats};
pub use types::*;
