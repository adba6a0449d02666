// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GwatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] globset::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlWriteError(#[from] toml::ser::Error),

    #[error("failed to walk {path:?}: {source}")]
    PathWalk {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to start '{label}': {source}")]
    CommandStart {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{label}' exited with status {}", code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    CommandFailed { label: String, code: Option<i32> },

    #[error("failed to signal '{label}': {source}")]
    Signal {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GwatchError {
    /// Shorthand for building a [`GwatchError::ConfigError`].
    pub fn config(msg: impl Into<String>) -> Self {
        GwatchError::ConfigError(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GwatchError>;
