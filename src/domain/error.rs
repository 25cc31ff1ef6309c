//! Error types for hotlog.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating, parsing, writing or watching the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config.yaml / config.yml in the searched location
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// YAML syntax error or a document that is not a mapping
    #[error("Failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Writing the default config file failed
    #[error("Failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error while reading the config file
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Strict lookup of a key that is not present
    #[error("Config key missing: {0}")]
    KeyMissing(String),

    /// Strict lookup of a key holding a value of another kind
    #[error("Config key {key}: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Semantic validation failure
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// File watcher error
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Errors raised while building or running the logger.
#[derive(Debug, Error)]
pub enum LogError {
    /// The file sink could not be opened or written
    #[error("Log sink error on {}: {source}", path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Installing the global dispatcher failed (already installed)
    #[error("Failed to set global subscriber: {0}")]
    Global(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
