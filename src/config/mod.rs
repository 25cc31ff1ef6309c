//! Configuration management module.
//!
//! Handles YAML configuration loading, default generation, validation and
//! hot reload.
//!
//! ```text
//! config.yaml
//!     → service.rs (locate, read, auto-create)
//!     → snapshot.rs (flatten to dotted keys)
//!     → loader.rs (Arc<ArcSwap<Snapshot>>)
//!
//! On file change:
//!     watcher.rs (notify → debounce → reload)
//!     → atomic swap of the snapshot
//!     → ConfigEvent on the subscription channel
//! ```

mod loader;
mod service;
mod snapshot;
mod types;
mod validation;
mod watcher;

pub use loader::ConfigLoader;
pub use service::{ConfigService, CONFIG_FILE_NAMES, DEFAULT_CONFIG};
pub use snapshot::{
    Snapshot, KEY_LOG_LEVEL, KEY_ROTATE_COMPRESS, KEY_ROTATE_FILENAME, KEY_ROTATE_MAX_AGE,
    KEY_ROTATE_MAX_BACKUPS, KEY_ROTATE_MAX_SIZE,
};
pub use types::ConfigValue;
pub use validation::validate;
pub use watcher::{ChangeKind, ConfigEvent, ConfigWatcher, Subscription, DEFAULT_DEBOUNCE};
