//! Live configuration handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use super::service::ConfigService;
use super::snapshot::Snapshot;
use super::watcher::{ConfigWatcher, Subscription, DEFAULT_DEBOUNCE};
use crate::domain::ConfigResult;

/// Loaded configuration whose snapshot is replaced wholesale on reload.
///
/// Readers always see a complete snapshot, old or new.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
    current: Arc<ArcSwap<Snapshot>>,
}

impl ConfigLoader {
    /// Load the file at `path`. Fails when it is missing or malformed.
    pub fn load(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        Self::open(path, false)
    }

    /// Load the file at `path`, writing the default document first when it
    /// is missing and `auto_create` is set.
    pub fn open(path: impl Into<PathBuf>, auto_create: bool) -> ConfigResult<Self> {
        let path = path.into();
        let snapshot = ConfigService::load_or_create(&path, auto_create)?;
        Ok(Self {
            path,
            current: Arc::new(ArcSwap::from_pointee(snapshot)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Re-read the file now. On failure the current snapshot is kept.
    pub fn reload(&self) -> ConfigResult<Arc<Snapshot>> {
        let snapshot = Arc::new(ConfigService::load(&self.path)?);
        self.current.store(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Watch the file. Must be called within a Tokio runtime.
    pub fn watch(&self) -> ConfigResult<Subscription> {
        self.watch_with_debounce(DEFAULT_DEBOUNCE)
    }

    pub fn watch_with_debounce(&self, debounce: Duration) -> ConfigResult<Subscription> {
        ConfigWatcher::new(&self.path, Arc::clone(&self.current))
            .with_debounce(debounce)
            .start()
    }

    pub fn get_string(&self, key: &str) -> String {
        self.current.load().get_string(key)
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.current.load().get_int(key)
    }

    pub fn get_float(&self, key: &str) -> f64 {
        self.current.load().get_float(key)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.current.load().get_bool(key)
    }

    pub fn try_get_string(&self, key: &str) -> ConfigResult<String> {
        self.current.load().try_get_string(key)
    }

    pub fn try_get_int(&self, key: &str) -> ConfigResult<i64> {
        self.current.load().try_get_int(key)
    }

    pub fn try_get_bool(&self, key: &str) -> ConfigResult<bool> {
        self.current.load().try_get_bool(key)
    }

    pub fn try_get_float(&self, key: &str) -> ConfigResult<f64> {
        self.current.load().try_get_float(key)
    }
}
