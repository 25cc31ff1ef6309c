//! Configuration file watcher for hot reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, Dispatch};

use super::service::ConfigService;
use super::snapshot::Snapshot;
use crate::domain::ConfigResult;

/// Quiet period before a burst of file events is reloaded once.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// What happened to the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Contents written in place
    Write,
    /// File created
    Create,
    /// File replaced through a rename
    Rename,
}

/// A successful reload.
#[derive(Debug, Clone)]
pub struct ConfigEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub snapshot: Arc<Snapshot>,
}

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    current: Arc<ArcSwap<Snapshot>>,
    debounce: Duration,
}

impl ConfigWatcher {
    /// Watch `path`, storing every successfully reloaded snapshot in
    /// `current`.
    pub fn new(path: &Path, current: Arc<ArcSwap<Snapshot>>) -> Self {
        Self {
            path: path.to_path_buf(),
            current,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called within a Tokio runtime.
    ///
    /// The parent directory is watched so that editors replacing the file
    /// through a rename are still seen; events for other files are ignored.
    pub fn start(self) -> ConfigResult<Subscription> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<ChangeKind>();
        let (update_tx, update_rx) = mpsc::unbounded_channel::<ConfigEvent>();

        let dir = self
            .path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name: Option<OsString> = self.path.file_name().map(OsString::from);

        // Diagnostics go to the dispatcher in effect where the watch starts
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        let callback_dispatch = dispatch.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _guard = tracing::dispatcher::set_default(&callback_dispatch);
            match res {
                Ok(event) => {
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref());
                    if !touches_file {
                        return;
                    }
                    if let Some(kind) = change_kind(&event.kind) {
                        debug!(kind = ?event.kind, "Config file event");
                        let _ = raw_tx.send(kind);
                    }
                }
                Err(e) => error!("Watch error: {:?}", e),
            }
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tokio::spawn(
            reload_loop(
                raw_rx,
                update_tx,
                self.path.clone(),
                self.current,
                self.debounce,
            )
            .with_subscriber(dispatch),
        );

        info!(path = %self.path.display(), "Config watcher started");
        Ok(Subscription {
            watcher: Some(watcher),
            rx: update_rx,
            path: self.path,
        })
    }
}

/// Live watch on the config file delivering [`ConfigEvent`]s.
///
/// Dropping the subscription or calling [`Subscription::cancel`] stops the
/// watch; the channel then drains and closes.
pub struct Subscription {
    watcher: Option<RecommendedWatcher>,
    rx: mpsc::UnboundedReceiver<ConfigEvent>,
    path: PathBuf,
}

impl Subscription {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next reload, or `None` once cancelled and drained.
    pub async fn recv(&mut self) -> Option<ConfigEvent> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for non-async callers.
    ///
    /// Panics when called from within an async context.
    pub fn blocking_recv(&mut self) -> Option<ConfigEvent> {
        self.rx.blocking_recv()
    }

    /// A reload that has already arrived, if any.
    pub fn try_recv(&mut self) -> Option<ConfigEvent> {
        self.rx.try_recv().ok()
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching.
    pub fn cancel(&mut self) {
        if self.watcher.take().is_some() {
            info!(path = %self.path.display(), "Config watcher stopped");
        }
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Create),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Rename),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Write),
        _ => None,
    }
}

async fn reload_loop(
    mut raw_rx: mpsc::UnboundedReceiver<ChangeKind>,
    update_tx: mpsc::UnboundedSender<ConfigEvent>,
    path: PathBuf,
    current: Arc<ArcSwap<Snapshot>>,
    debounce: Duration,
) {
    while let Some(mut kind) = raw_rx.recv().await {
        // Collapse a burst of events into one reload
        loop {
            match tokio::time::timeout(debounce, raw_rx.recv()).await {
                Ok(Some(next)) => kind = next,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        info!(path = %path.display(), "Config file change detected, reloading...");
        match ConfigService::load(&path) {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                current.store(Arc::clone(&snapshot));
                let event = ConfigEvent {
                    path: path.clone(),
                    kind,
                    snapshot,
                };
                if update_tx.send(event).is_err() {
                    return;
                }
            }
            Err(e) => {
                error!(
                    "Failed to reload config: {}. Keeping current configuration.",
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RenameMode};

    #[test]
    fn test_change_kind_mapping() {
        assert_eq!(
            change_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Create)
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Write)
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(ChangeKind::Rename)
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            None
        );
        assert_eq!(change_kind(&EventKind::Any), None);
    }
}
