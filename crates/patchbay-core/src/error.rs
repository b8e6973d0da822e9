//! Error types for the routing core

use std::collections::TryReserveError;
use thiserror::Error;

use crate::types::InstanceId;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    /// A backend with this name is already registered
    #[error("backend {0} is already registered")]
    DuplicateBackend(String),

    /// Name lookup for a backend failed
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// Name lookup for an instance failed
    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    /// An instance with this name already exists
    #[error("duplicate instance name: {0}")]
    DuplicateInstanceName(String),

    /// Instance names may not contain spaces or dots
    #[error("invalid instance name: {0:?}")]
    InvalidInstanceName(String),

    /// Strict channel lookup on an identity that was never created
    #[error("channel {ident} not found on instance {instance}")]
    ChannelNotFound { instance: InstanceId, ident: u64 },

    /// Rekeying would give two channel records the same identity
    #[error("channel {ident} already exists on instance {instance}")]
    ChannelIdentityCollision { instance: InstanceId, ident: u64 },

    /// A backend could not make sense of a channel specification
    #[error("invalid channel spec {spec:?}: {reason}")]
    InvalidChannelSpec { spec: String, reason: String },

    /// A backend rejected a configuration option
    #[error("invalid option {option} = {value:?}: {reason}")]
    InvalidOption {
        option: String,
        value: String,
        reason: String,
    },

    /// A backend failed to start its instances
    #[error("backend {backend} failed to start: {reason}")]
    BackendStart { backend: String, reason: String },

    /// Generic backend failure during processing or output
    #[error("backend error: {0}")]
    Backend(String),

    /// Growing one of the core tables failed
    #[error("allocation failure: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
