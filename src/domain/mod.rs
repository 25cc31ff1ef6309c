//! Domain layer.
//!
//! This module contains:
//! - Error types shared by config and logging
//! - Log severity and the atomic level cell
//! - Logger with dual sinks and size-based rotation

mod error;
pub mod level;
pub mod logger;
pub mod rotation;

pub use error::{ConfigError, ConfigResult, LogError};
pub use level::{AtomicLevel, LogLevel};
pub use logger::{field, ConsoleSink, Encoding, Field, Fields, Logger, LoggerOptions};
pub use rotation::{RotatingFile, RotationPolicy, SinkHealth};
