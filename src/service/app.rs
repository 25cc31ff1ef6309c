//! Application context wiring the config loader to the logger.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn};

use crate::config::{self, ConfigEvent, ConfigLoader, ConfigService, Snapshot, DEFAULT_CONFIG};
use crate::domain::{AtomicLevel, LogLevel, Logger, LoggerOptions};

/// Where the minimum log level comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LevelSource {
    /// `log.level`, re-read on every config change
    #[default]
    Config,
    /// A fixed level; config changes do not touch it
    Fixed(LogLevel),
}

/// Options for [`AppContext::init`].
#[derive(Debug)]
pub struct AppOptions {
    /// Explicit config file; otherwise `config.yaml`/`config.yml` in `config_dir`
    pub config_path: Option<PathBuf>,

    /// Directory searched for the config file
    pub config_dir: PathBuf,

    /// Write the default config file when none exists
    pub auto_create_default: bool,

    pub level_source: LevelSource,

    pub logger: LoggerOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            config_dir: PathBuf::from("."),
            auto_create_default: true,
            level_source: LevelSource::Config,
            logger: LoggerOptions::default(),
        }
    }
}

/// Config loader and logger built together at startup.
pub struct AppContext {
    config: ConfigLoader,
    logger: Logger,
    level_source: LevelSource,
    shutdown_tx: broadcast::Sender<()>,
    reload_task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reloading = self
            .reload_task
            .lock()
            .map(|t| t.is_some())
            .unwrap_or(false);
        f.debug_struct("AppContext")
            .field("config", &self.config.path())
            .field("logger", &self.logger)
            .field("level_source", &self.level_source)
            .field("reloading", &reloading)
            .finish()
    }
}

impl AppContext {
    /// Load the config file and build the logger.
    ///
    /// Any failure here is fatal for the caller; the error message embeds
    /// the expected file content.
    pub fn init(options: AppOptions) -> Result<Self> {
        let path = ConfigService::resolve(options.config_path.as_deref(), &options.config_dir);
        let created = options.auto_create_default && !path.exists();

        let config = ConfigLoader::open(&path, options.auto_create_default).with_context(|| {
            format!("Fatal error config file: {}\nFile content include:\n{DEFAULT_CONFIG}", path.display())
        })?;

        let snapshot = config.snapshot();
        let warnings = config::validate(&snapshot)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        let level = Arc::new(AtomicLevel::new(level_for(&snapshot, options.level_source)));
        let policy = snapshot.rotation_policy();
        let logger = Logger::build(level, policy.clone(), options.logger).with_context(|| {
            format!("Failed to open log file: {}", policy.filename.display())
        })?;

        tracing::dispatcher::with_default(logger.dispatch(), || {
            if created {
                warn!(path = %path.display(), "Config file did not exist, wrote default");
            }
            for warning in &warnings {
                warn!("{}", warning);
            }
            info!(
                config = %path.display(),
                level = %logger.level(),
                file = %policy.filename.display(),
                "Logger initialized"
            );
        });

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            logger,
            level_source: options.level_source,
            shutdown_tx,
            reload_task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ConfigLoader {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Re-derive the level from `snapshot` and swap it into the logger.
    /// Returns the level in effect afterwards.
    pub fn apply_level(&self, snapshot: &Snapshot) -> LogLevel {
        tracing::dispatcher::with_default(self.logger.dispatch(), || {
            swap_level(&self.logger, snapshot, self.level_source)
        })
    }

    /// Watch the config file and re-apply the log level on every change.
    pub fn start_reloading(&self) -> Result<()> {
        self.start_reloading_with(|_| {})
    }

    /// Like [`start_reloading`](Self::start_reloading), also calling
    /// `on_change` after each applied reload.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start_reloading_with<F>(&self, on_change: F) -> Result<()>
    where
        F: Fn(&ConfigEvent) + Send + 'static,
    {
        let mut task = self
            .reload_task
            .lock()
            .map_err(|_| anyhow::anyhow!("reload task lock poisoned"))?;
        if task.is_some() {
            anyhow::bail!("Config reloading already started");
        }

        // The watcher inherits the logger as its dispatcher
        let mut subscription = tracing::dispatcher::with_default(self.logger.dispatch(), || {
            self.config.watch()
        })
        .with_context(|| format!("Failed to watch {}", self.config.path().display()))?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let logger = self.logger.clone();
        let level_source = self.level_source;

        let reload = async move {
            loop {
                tokio::select! {
                    event = subscription.recv() => {
                        let Some(event) = event else { break };
                        info!(path = %event.path.display(), kind = ?event.kind, "Config file changed");
                        swap_level(&logger, &event.snapshot, level_source);
                        on_change(&event);
                    }
                    _ = shutdown_rx.recv() => {
                        subscription.cancel();
                        break;
                    }
                }
            }
        };
        *task = Some(tokio::spawn(
            reload.with_subscriber(self.logger.dispatch().clone()),
        ));

        Ok(())
    }

    /// Stop the reload task and flush the file sink.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        let task = self.reload_task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::dispatcher::with_default(self.logger.dispatch(), || {
                    error!("Reload task failed: {}", e);
                });
            }
        }

        self.logger.shutdown();
    }
}

fn swap_level(logger: &Logger, snapshot: &Snapshot, source: LevelSource) -> LogLevel {
    let level = level_for(snapshot, source);
    let previous = logger.set_level(level);
    if previous != level {
        info!(from = %previous, to = %level, "Log level changed");
    }
    level
}

fn level_for(snapshot: &Snapshot, source: LevelSource) -> LogLevel {
    match source {
        LevelSource::Config => snapshot.log_level(),
        LevelSource::Fixed(level) => level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConsoleSink;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn write_config(dir: &Path, level: i64) {
        fs::write(
            dir.join("config.yaml"),
            format!(
                "logrotate:\n  filename: {}\n  maxsize: 1\nlog:\n  level: {level}\n",
                dir.join("logs").join("app.log").display()
            ),
        )
        .unwrap();
    }

    fn options(dir: &Path) -> AppOptions {
        AppOptions {
            config_dir: dir.to_path_buf(),
            auto_create_default: false,
            logger: LoggerOptions {
                console: ConsoleSink::Disabled,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_init_reads_level_and_policy() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), 1);

        let app = AppContext::init(options(tmp.path())).unwrap();
        assert_eq!(app.logger().level(), LogLevel::Warn);
        assert_eq!(app.logger().rotation_policy().max_size_mb, 1);
        assert!(tmp.path().join("logs").join("app.log").exists());
    }

    #[test]
    fn test_init_missing_config_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = AppContext::init(options(tmp.path())).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Fatal error config file"), "{message}");
        assert!(message.contains("logrotate:"), "embeds default content: {message}");
    }

    #[test]
    fn test_fixed_level_source() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), -1);

        let app = AppContext::init(AppOptions {
            level_source: LevelSource::Fixed(LogLevel::Error),
            ..options(tmp.path())
        })
        .unwrap();
        assert_eq!(app.logger().level(), LogLevel::Error);

        let snapshot = Snapshot::from_pairs([(config::KEY_LOG_LEVEL, 0i64)]);
        assert_eq!(app.apply_level(&snapshot), LogLevel::Error);
    }

    #[test]
    fn test_apply_level() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), 0);
        let app = AppContext::init(options(tmp.path())).unwrap();

        let snapshot = Snapshot::from_pairs([(config::KEY_LOG_LEVEL, 3i64)]);
        assert_eq!(app.apply_level(&snapshot), LogLevel::DPanic);
        assert_eq!(app.logger().level(), LogLevel::DPanic);

        let snapshot = Snapshot::from_pairs([(config::KEY_LOG_LEVEL, 17i64)]);
        assert_eq!(app.apply_level(&snapshot), LogLevel::Debug);
    }

    #[tokio::test]
    async fn test_reload_swaps_level() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), -1);
        let app = AppContext::init(options(tmp.path())).unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        app.start_reloading_with(move |event| {
            let _ = tx.send(event.snapshot.log_level());
        })
        .unwrap();
        assert!(app.start_reloading().is_err(), "second start is rejected");

        write_config(tmp.path(), 2);
        let seen = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, LogLevel::Error);
        assert_eq!(app.logger().level(), LogLevel::Error);

        app.shutdown().await;
        assert!(!app.logger().is_active());
    }

    #[tokio::test]
    async fn test_diagnostics_reach_logger_sinks() {
        let tmp = tempfile::tempdir().unwrap();
        let log_file = tmp.path().join("logs").join("app.log");
        fs::write(
            tmp.path().join("config.yaml"),
            format!("logrotate:\n  filename: {}\nlog:\n  level: 9\n", log_file.display()),
        )
        .unwrap();

        let captured = Captured::default();
        let writer = captured.clone();
        let app = AppContext::init(AppOptions {
            logger: LoggerOptions {
                console: ConsoleSink::Writer(BoxMakeWriter::new(move || writer.clone())),
                ..Default::default()
            },
            ..options(tmp.path())
        })
        .unwrap();

        assert!(format!("{app:?}").contains("AppContext"));
        let out = captured.text();
        assert!(out.contains("outside -1..4"), "{out}");
        assert!(out.contains("Logger initialized"), "{out}");

        app.start_reloading().unwrap();
        fs::write(tmp.path().join("config.yaml"), "log: [broken\n").unwrap();

        let reported = timeout(Duration::from_secs(5), async {
            while !captured.text().contains("Failed to reload config") {
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        assert!(reported.is_ok(), "{}", captured.text());

        app.shutdown().await;
        let file = fs::read_to_string(&log_file).unwrap();
        assert!(file.contains("outside -1..4"), "{file}");
        assert!(file.contains("Failed to reload config"), "{file}");
    }

    #[tokio::test]
    async fn test_shutdown_stops_reloading() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), 0);
        let app = AppContext::init(options(tmp.path())).unwrap();
        app.start_reloading().unwrap();

        app.shutdown().await;

        write_config(tmp.path(), 2);
        sleep(Duration::from_millis(500)).await;
        assert_eq!(app.logger().level(), LogLevel::Info);
    }
}
