//! Patchbay configuration
//!
//! Line-oriented configuration format:
//!
//! ```text
//! ; comment
//! [backend loopback]
//! option = value
//!
//! [loopback in]
//! option = value
//!
//! [include more.cfg]
//!
//! [map]
//! in.ch{1..4} > out.ch{4..1}
//! in.fader < out.fader
//! in.toggle <> out.toggle
//! ```
//!
//! [`ConfigLoader`] applies it to an engine; [`ChannelSpec`] expands the
//! `{…}` channel globs used on `[map]` lines.

pub mod error;
pub mod glob;
pub mod loader;
pub mod overrides;

pub use error::{ConfigError, Result};
pub use glob::{ChannelGlob, ChannelSpec, GlobKind};
pub use loader::{ConfigLoader, MAX_INCLUDE_DEPTH};
pub use overrides::{Override, OverrideKind};
