//! Configuration service for locating, loading and generating config files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::snapshot::Snapshot;
use crate::domain::{ConfigError, ConfigResult};

/// File names searched for, in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["config.yaml", "config.yml"];

/// Document written when no config file exists and auto-create is on.
pub const DEFAULT_CONFIG: &str = r#"# hotlog configuration file
# The log level is re-applied whenever this file changes.
# Rotation settings are read once at startup.

logrotate:
  filename: ./logs/hotlog.log # active log file
  maxsize: 200 # MB before rolling over
  maxbackups: 10 # rolled files to keep
  maxage: 30 # days to keep rolled files
  compress: false # gzip rolled files
log:
  level: -1 # -1~4 Debug > Info > Warn > Error > DPanic > Panic
"#;

/// Configuration service.
pub struct ConfigService;

impl ConfigService {
    /// Path used when nothing else is configured: `config.yaml` in the
    /// working directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE_NAMES[0])
    }

    /// Find `config.yaml` or `config.yml` in `dir`.
    pub fn locate(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Resolve the file to load: the explicit path, else the first file
    /// found in `dir`, else `dir/config.yaml`.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| Self::locate(dir))
            .unwrap_or_else(|| dir.join(CONFIG_FILE_NAMES[0]))
    }

    /// Read and parse the config file.
    pub fn load(path: &Path) -> ConfigResult<Snapshot> {
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        Snapshot::parse(path, &content)
    }

    /// Load configuration, writing the default document first when the
    /// file is missing and `auto_create` is set.
    pub fn load_or_create(path: &Path, auto_create: bool) -> ConfigResult<Snapshot> {
        if auto_create && !path.exists() {
            Self::generate_at(path)?;
        }

        Self::load(path)
    }

    /// Generate the default configuration file at the specified path.
    pub fn generate_at(path: &Path) -> ConfigResult<()> {
        // Create parent directories if needed
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, DEFAULT_CONFIG).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}
