//! hotlog: YAML configuration with a hot-reloaded, dual-sink logger.
//!
//! An [`AppContext`] loads `config.yaml` from the working directory,
//! builds a [`Logger`] writing to the console and a size-rotated file, and
//! swaps the logger's level whenever `log.level` changes on disk.

pub mod config;
pub mod domain;
pub mod service;

pub use config::{ConfigEvent, ConfigLoader, ConfigService, Snapshot, Subscription};
pub use domain::{
    field, AtomicLevel, ConfigError, ConsoleSink, Encoding, LogError, LogLevel, Logger,
    LoggerOptions, RotationPolicy,
};
pub use service::{AppContext, AppOptions, LevelSource};
