//! Size-rotated log file with backup pruning and optional gzip.
//!
//! Rolled files are renamed to `<stem>-<UTC timestamp><ext>` next to the
//! active file, e.g. `app-2026-01-02T15-04-05.000.log`.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use flate2::write::GzEncoder;
use flate2::Compression;
use time::format_description::BorrowedFormatItem;
use tracing_appender::non_blocking::ErrorCounter;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

const MEGABYTE: u64 = 1024 * 1024;

/// Max size used when the policy says 0.
pub const DEFAULT_MAX_SIZE_MB: u64 = 100;

const BACKUP_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]-[minute]-[second].[subsecond digits:3]");

const COMPRESS_SUFFIX: &str = ".gz";

/// Rotation settings bound into the file sink at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Active log file
    pub filename: PathBuf,

    /// Roll over before the file grows past this many megabytes (0 = default)
    pub max_size_mb: u64,

    /// Rolled files to keep (0 = keep all)
    pub max_backups: usize,

    /// Days to keep rolled files (0 = no age limit)
    pub max_age_days: u64,

    /// Gzip rolled files
    pub compress: bool,
}

impl RotationPolicy {
    pub fn max_bytes(&self) -> u64 {
        let mb = if self.max_size_mb == 0 {
            DEFAULT_MAX_SIZE_MB
        } else {
            self.max_size_mb
        };
        mb.saturating_mul(MEGABYTE)
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            filename: PathBuf::from("./logs/hotlog.log"),
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            max_backups: 0,
            max_age_days: 0,
            compress: false,
        }
    }
}

/// Write outcome counters for the file sink.
#[derive(Default)]
pub struct SinkHealth {
    consecutive_failures: AtomicU64,
    total_failures: AtomicU64,
    last_error: Mutex<Option<String>>,
    dropped: OnceLock<ErrorCounter>,
}

impl fmt::Debug for SinkHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkHealth")
            .field("consecutive_failures", &self.consecutive_failures())
            .field("total_failures", &self.total_failures())
            .field("dropped_records", &self.dropped_records())
            .field("last_error", &self.last_error())
            .finish()
    }
}

impl SinkHealth {
    /// No failure since the last successful write.
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures() == 0
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Records discarded because the non-blocking queue was full.
    pub fn dropped_records(&self) -> usize {
        self.dropped.get().map_or(0, ErrorCounter::dropped_lines)
    }

    /// Track drops of the non-blocking writer feeding this sink.
    pub(crate) fn attach_drop_counter(&self, counter: ErrorCounter) {
        let _ = self.dropped.set(counter);
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &io::Error) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(error.to_string());
        }
    }
}

/// A rolled file found next to the active one.
#[derive(Debug)]
struct Backup {
    path: PathBuf,
    timestamp: OffsetDateTime,
    compressed: bool,
}

/// Log file writer that rolls over by size.
///
/// Not internally synchronized; the logger hands it to a single
/// non-blocking worker.
#[derive(Debug)]
pub struct RotatingFile {
    policy: RotationPolicy,
    max_bytes: u64,
    file: Option<File>,
    size: u64,
    health: Arc<SinkHealth>,
}

impl RotatingFile {
    /// Open (or create) the active file described by `policy`.
    pub fn open(policy: RotationPolicy) -> io::Result<Self> {
        let max_bytes = policy.max_bytes();
        let mut sink = Self {
            policy,
            max_bytes,
            file: None,
            size: 0,
            health: Arc::new(SinkHealth::default()),
        };
        sink.open_existing_or_new(0)?;
        Ok(sink)
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    pub fn health(&self) -> Arc<SinkHealth> {
        Arc::clone(&self.health)
    }

    /// Bytes written to the active file.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Close the active file, rename it to a backup and start a new one.
    pub fn rotate(&mut self) -> io::Result<()> {
        self.file = None;
        self.open_new()
    }

    fn write_inner(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        if len > self.max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write length {} exceeds maximum file size {}",
                    len, self.max_bytes
                ),
            ));
        }

        if self.file.is_none() {
            self.open_existing_or_new(len)?;
        }

        if self.size + len > self.max_bytes {
            self.rotate()?;
        }

        let file = match self.file.as_mut() {
            Some(f) => f,
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "log file not open")),
        };
        let n = file.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn open_existing_or_new(&mut self, write_len: u64) -> io::Result<()> {
        let path = &self.policy.filename;
        match fs::metadata(path) {
            Ok(meta) if meta.len() + write_len <= self.max_bytes => {
                let file = OpenOptions::new().append(true).open(path)?;
                self.size = meta.len();
                self.file = Some(file);
                Ok(())
            }
            Ok(_) => self.open_new(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.open_new(),
            Err(e) => Err(e),
        }
    }

    fn open_new(&mut self) -> io::Result<()> {
        let path = self.policy.filename.clone();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        if path.exists() {
            let backup = self.backup_path(OffsetDateTime::now_utc())?;
            fs::rename(&path, backup)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        self.file = Some(file);
        self.size = 0;

        // Pruning problems must not block logging into the fresh file
        if let Err(e) = self.mill() {
            self.health.record_failure(&e);
        }
        Ok(())
    }

    fn backup_path(&self, now: OffsetDateTime) -> io::Result<PathBuf> {
        let (stem, ext) = self.name_parts();
        let stamp = now
            .format(BACKUP_TIME_FORMAT)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(self.dir().join(format!("{stem}-{stamp}{ext}")))
    }

    fn dir(&self) -> PathBuf {
        self.policy
            .filename
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// File stem and extension (with leading dot, possibly empty).
    fn name_parts(&self) -> (String, String) {
        let path = &self.policy.filename;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "hotlog".to_string());
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        (stem, ext)
    }

    /// Rolled files, newest first.
    fn backups(&self) -> io::Result<Vec<Backup>> {
        let (stem, ext) = self.name_parts();
        let prefix = format!("{stem}-");
        let mut backups = Vec::new();

        for entry in fs::read_dir(self.dir())? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };

            let (base, compressed) = match filename.strip_suffix(COMPRESS_SUFFIX) {
                Some(base) => (base, true),
                None => (filename, false),
            };

            let stamp = match base
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(ext.as_str()))
            {
                Some(s) => s,
                None => continue,
            };

            if let Ok(ts) = PrimitiveDateTime::parse(stamp, BACKUP_TIME_FORMAT) {
                backups.push(Backup {
                    path,
                    timestamp: ts.assume_utc(),
                    compressed,
                });
            }
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    /// Apply max backups, max age and compression to rolled files.
    fn mill(&self) -> io::Result<()> {
        if self.policy.max_backups == 0 && self.policy.max_age_days == 0 && !self.policy.compress
        {
            return Ok(());
        }

        let mut remaining = self.backups()?;

        if self.policy.max_backups > 0 && remaining.len() > self.policy.max_backups {
            for old in remaining.split_off(self.policy.max_backups) {
                let _ = fs::remove_file(&old.path);
            }
        }

        // An age limit reaching past the representable dates prunes nothing
        if let Some(cutoff) = age_cutoff(OffsetDateTime::now_utc(), self.policy.max_age_days) {
            remaining.retain(|b| {
                if b.timestamp < cutoff {
                    let _ = fs::remove_file(&b.path);
                    false
                } else {
                    true
                }
            });
        }

        if self.policy.compress {
            for backup in remaining.iter().filter(|b| !b.compressed) {
                compress_file(&backup.path)?;
            }
        }

        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.write_inner(buf);
        match &result {
            Ok(_) => self.health.record_success(),
            Err(e) => self.health.record_failure(e),
        }
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

/// Oldest backup timestamp kept under a `max_age_days` limit, if any.
fn age_cutoff(now: OffsetDateTime, max_age_days: u64) -> Option<OffsetDateTime> {
    if max_age_days == 0 {
        return None;
    }
    let secs = max_age_days.checked_mul(24 * 60 * 60)?;
    now.checked_sub(time::Duration::seconds(i64::try_from(secs).ok()?))
}

/// Gzip `path` into `path.gz` and remove the original.
fn compress_file(path: &Path) -> io::Result<()> {
    let mut target = path.as_os_str().to_owned();
    target.push(COMPRESS_SUFFIX);

    let mut reader = BufReader::new(File::open(path)?);
    let out = File::create(&target)?;
    let mut encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.flush()?;

    fs::remove_file(path)
}
