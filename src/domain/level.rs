//! Log severity and the shared, atomically swappable level cell.

use std::fmt;
use std::sync::atomic::{AtomicI8, Ordering};

use tracing::Level;

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warn,
    Error,
    /// Logged as an error; panics afterwards in development mode
    DPanic,
    /// Logged as an error, then panics
    Panic,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::DPanic,
        LogLevel::Panic,
    ];

    /// Map the integer used in `log.level` to a severity.
    ///
    /// -1..=4 select Debug..=Panic, anything else falls back to Debug.
    pub fn from_config_value(value: i64) -> Self {
        match value {
            -1 => LogLevel::Debug,
            0 => LogLevel::Info,
            1 => LogLevel::Warn,
            2 => LogLevel::Error,
            3 => LogLevel::DPanic,
            4 => LogLevel::Panic,
            _ => LogLevel::Debug,
        }
    }

    /// Integer form used in the config file.
    pub fn config_value(self) -> i64 {
        self as i64 - 1
    }

    /// Whether `value` is one of the recognized `log.level` integers.
    pub fn is_known_config_value(value: i64) -> bool {
        (-1..=4).contains(&value)
    }

    /// Upper-case name used in encoded records.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::DPanic => "DPANIC",
            LogLevel::Panic => "PANIC",
        }
    }

    /// The `tracing` level events of this severity are emitted at.
    pub fn tracing_level(self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error | LogLevel::DPanic | LogLevel::Panic => Level::ERROR,
        }
    }

    /// Severity of a plain `tracing` event. TRACE is folded into Debug.
    pub fn from_tracing(level: &Level) -> Self {
        match *level {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warn,
            Level::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    fn from_index(index: i8) -> Self {
        Self::ALL
            .get(index as usize)
            .copied()
            .unwrap_or(LogLevel::Debug)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum severity shared by every log call and the reload task.
///
/// A single atomic byte, so readers always see a whole level.
#[derive(Debug)]
pub struct AtomicLevel(AtomicI8);

impl AtomicLevel {
    pub fn new(level: LogLevel) -> Self {
        Self(AtomicI8::new(level as i8))
    }

    pub fn get(&self) -> LogLevel {
        LogLevel::from_index(self.0.load(Ordering::Acquire))
    }

    /// Swap in a new threshold and return the previous one.
    pub fn set(&self, level: LogLevel) -> LogLevel {
        LogLevel::from_index(self.0.swap(level as i8, Ordering::AcqRel))
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.get()
    }
}

impl Default for AtomicLevel {
    fn default() -> Self {
        Self::new(LogLevel::Debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_from_config_value() {
        assert_eq!(LogLevel::from_config_value(-1), LogLevel::Debug);
        assert_eq!(LogLevel::from_config_value(0), LogLevel::Info);
        assert_eq!(LogLevel::from_config_value(1), LogLevel::Warn);
        assert_eq!(LogLevel::from_config_value(2), LogLevel::Error);
        assert_eq!(LogLevel::from_config_value(3), LogLevel::DPanic);
        assert_eq!(LogLevel::from_config_value(4), LogLevel::Panic);

        // Out of range falls back to Debug
        for v in [-100, -2, 5, 6, 42, i64::MAX, i64::MIN] {
            assert_eq!(LogLevel::from_config_value(v), LogLevel::Debug, "value {v}");
        }
    }

    #[test]
    fn test_config_value_inverse() {
        for level in LogLevel::ALL {
            assert_eq!(LogLevel::from_config_value(level.config_value()), level);
        }
    }

    #[test]
    fn test_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Error < LogLevel::DPanic);
        assert!(LogLevel::DPanic < LogLevel::Panic);
    }

    #[test]
    fn test_atomic_level_enabled() {
        let level = AtomicLevel::new(LogLevel::Error);
        assert!(!level.enabled(LogLevel::Debug));
        assert!(!level.enabled(LogLevel::Warn));
        assert!(level.enabled(LogLevel::Error));
        assert!(level.enabled(LogLevel::Panic));

        assert_eq!(level.set(LogLevel::Debug), LogLevel::Error);
        assert!(level.enabled(LogLevel::Debug));
    }

    #[test]
    fn test_atomic_level_concurrent_swap() {
        let level = Arc::new(AtomicLevel::new(LogLevel::Debug));
        let mut readers = Vec::new();

        for _ in 0..8 {
            let level = Arc::clone(&level);
            readers.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    let seen = level.get();
                    assert!(seen == LogLevel::Debug || seen == LogLevel::Error);
                }
            }));
        }

        for i in 0..10_000 {
            level.set(if i % 2 == 0 { LogLevel::Error } else { LogLevel::Debug });
        }

        for r in readers {
            r.join().unwrap();
        }
    }
}
