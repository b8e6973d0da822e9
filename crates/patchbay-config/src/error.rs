//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors. Any of them aborts the whole load.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Malformed line or section header
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A `{…}` window could not be parsed
    #[error("invalid channel glob: {0}")]
    GlobParse(String),

    /// Both sides of a mapping expand to different, non-singular channel counts
    #[error("channel count mismatch: {from} ({from_count} channels) vs {to} ({to_count} channels)")]
    ChannelCountMismatch {
        from: String,
        from_count: u64,
        to: String,
        to_count: u64,
    },

    /// A command-line override is not of the form `target.option=value`
    #[error("invalid override {0:?}, expected target.option=value")]
    InvalidOverride(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Location wrapper for errors raised while reading a file
    #[error("{}:{line}: {source}", file.display())]
    Line {
        file: PathBuf,
        line: usize,
        #[source]
        source: Box<ConfigError>,
    },

    #[error(transparent)]
    Core(#[from] patchbay_core::Error),
}

impl ConfigError {
    /// The innermost error, without file and line wrappers
    pub fn root(&self) -> &ConfigError {
        match self {
            ConfigError::Line { source, .. } => source.root(),
            other => other,
        }
    }
}
