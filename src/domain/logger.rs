//! Leveled logger writing to the console and a size-rotated file.

use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use time::macros::format_description;
use tracing::field::{Field as EventField, Visit};
use tracing::subscriber::Interest;
use tracing::{Dispatch, Event, Level, Metadata, Subscriber};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::filter::DynFilterFn;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, OffsetTime};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};
use tracing_subscriber::fmt::{self as fmt_layer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Registry;

use super::error::LogError;
use super::level::{AtomicLevel, LogLevel};
use super::rotation::{RotatingFile, RotationPolicy, SinkHealth};

/// Target of events logged through [`Logger::dpanic`].
pub const DPANIC_TARGET: &str = "hotlog::dpanic";

/// Target of events logged through [`Logger::panic`].
pub const PANIC_TARGET: &str = "hotlog::panic";

/// A structured key-value pair attached to one log call.
pub type Field<'a> = (&'a str, Value);

/// Ad hoc fields for a single log call.
pub type Fields<'a> = &'a [Field<'a>];

/// Build a [`Field`] from anything convertible to a JSON value.
pub fn field(key: &str, value: impl Into<Value>) -> Field<'_> {
    (key, value.into())
}

/// Record encoding for both sinks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    /// Human-readable lines
    #[default]
    Console,
    /// One JSON object per line
    Json,
}

/// Where console output goes.
#[derive(Debug, Default)]
pub enum ConsoleSink {
    #[default]
    Stdout,
    Stderr,
    /// File sink only
    Disabled,
    /// Custom writer, mostly for capturing output in tests
    Writer(BoxMakeWriter),
}

/// Options for [`Logger::build`].
#[derive(Debug, Default)]
pub struct LoggerOptions {
    pub encoding: Encoding,

    /// Name of the root logger
    pub name: Option<String>,

    pub console: ConsoleSink,

    /// `dpanic` panics after logging
    pub development: bool,

    /// Attach a stack trace to records at or above this level
    pub stacktrace_level: Option<LogLevel>,
}

struct Shared {
    level: Arc<AtomicLevel>,
    dispatch: Dispatch,
    health: Arc<SinkHealth>,
    guard: Mutex<Option<WorkerGuard>>,
    encoding: Encoding,
    development: bool,
    stacktrace_level: Option<LogLevel>,
    policy: RotationPolicy,
}

/// Handle to a built logger. Cheap to clone; clones share sinks and level.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    name: Option<Arc<str>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level())
            .field("encoding", &self.shared.encoding)
            .field("file", &self.shared.policy.filename)
            .finish()
    }
}

impl Logger {
    /// Build the sink pipeline.
    ///
    /// Every record passing `level` is written to the console sink and,
    /// through a non-blocking worker, to the rotating file described by
    /// `policy`.
    pub fn build(
        level: Arc<AtomicLevel>,
        policy: RotationPolicy,
        options: LoggerOptions,
    ) -> Result<Self, LogError> {
        let file = RotatingFile::open(policy.clone()).map_err(|source| LogError::Sink {
            path: policy.filename.clone(),
            source,
        })?;
        let health = file.health();
        let (file_writer, guard) = NonBlockingBuilder::default().lossy(true).finish(file);
        health.attach_drop_counter(file_writer.error_counter());

        // Use local timezone for timestamps
        let time_format =
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
        let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
        let timer = OffsetTime::new(local_offset, time_format);

        let mut layers: Vec<Box<dyn tracing_subscriber::Layer<Registry> + Send + Sync>> =
            Vec::new();
        match options.console {
            ConsoleSink::Stdout => {
                layers.push(sink_layer(options.encoding, timer.clone(), std::io::stdout, true))
            }
            ConsoleSink::Stderr => {
                layers.push(sink_layer(options.encoding, timer.clone(), std::io::stderr, true))
            }
            ConsoleSink::Writer(writer) => {
                layers.push(sink_layer(options.encoding, timer.clone(), writer, false))
            }
            ConsoleSink::Disabled => {}
        }
        layers.push(sink_layer(options.encoding, timer, file_writer, false));

        let threshold = Arc::clone(&level);
        // The level changes at runtime, so callsite interest must not be cached
        let filter = DynFilterFn::new(move |meta, _cx| threshold.enabled(severity_of(meta)))
            .with_callsite_filter(|_| Interest::sometimes());

        let subscriber = Registry::default().with(layers).with(filter);

        Ok(Self {
            shared: Arc::new(Shared {
                level,
                dispatch: Dispatch::new(subscriber),
                health,
                guard: Mutex::new(Some(guard)),
                encoding: options.encoding,
                development: options.development,
                stacktrace_level: options.stacktrace_level,
                policy,
            }),
            name: options.name.map(Arc::from),
        })
    }

    /// Child logger tagging records with `name`, appended with `.` to the
    /// parent's name.
    pub fn named(&self, name: &str) -> Self {
        let name: Arc<str> = match &self.name {
            Some(parent) if !name.is_empty() => Arc::from(format!("{parent}.{name}")),
            Some(parent) => Arc::clone(parent),
            None => Arc::from(name),
        };
        Self {
            shared: Arc::clone(&self.shared),
            name: Some(name),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn level(&self) -> LogLevel {
        self.shared.level.get()
    }

    /// Swap the minimum severity. Returns the previous level.
    pub fn set_level(&self, level: LogLevel) -> LogLevel {
        self.shared.level.set(level)
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        self.shared.level.enabled(level)
    }

    /// The shared level cell.
    pub fn level_cell(&self) -> Arc<AtomicLevel> {
        Arc::clone(&self.shared.level)
    }

    /// Write outcome counters of the file sink.
    pub fn sink_health(&self) -> Arc<SinkHealth> {
        Arc::clone(&self.shared.health)
    }

    pub fn rotation_policy(&self) -> &RotationPolicy {
        &self.shared.policy
    }

    /// The `tracing` dispatcher behind this logger.
    pub fn dispatch(&self) -> &Dispatch {
        &self.shared.dispatch
    }

    /// Route every `tracing` event in the process through this logger.
    pub fn install_global(&self) -> Result<(), LogError> {
        tracing::dispatcher::set_global_default(self.shared.dispatch.clone())
            .map_err(|e| LogError::Global(e.to_string()))
    }

    /// Whether the file writer is still running.
    pub fn is_active(&self) -> bool {
        self.shared
            .guard
            .lock()
            .map(|g| g.is_some())
            .unwrap_or(false)
    }

    /// Flush the buffered file writer and stop it.
    ///
    /// Console output keeps working afterwards; file records are dropped.
    pub fn shutdown(&self) {
        let guard = match self.shared.guard.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        // Dropping the guard drains the worker queue
        drop(guard);
    }

    #[track_caller]
    pub fn debug(&self, message: &str, fields: Fields<'_>) {
        self.log(LogLevel::Debug, message, fields, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, message: &str, fields: Fields<'_>) {
        self.log(LogLevel::Info, message, fields, Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, message: &str, fields: Fields<'_>) {
        self.log(LogLevel::Warn, message, fields, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, message: &str, fields: Fields<'_>) {
        self.log(LogLevel::Error, message, fields, Location::caller());
    }

    /// Log at DPanic; panics afterwards when built in development mode.
    #[track_caller]
    pub fn dpanic(&self, message: &str, fields: Fields<'_>) {
        self.log(LogLevel::DPanic, message, fields, Location::caller());
        if self.shared.development {
            panic!("{message}");
        }
    }

    /// Log at Panic, then panic.
    #[track_caller]
    pub fn panic(&self, message: &str, fields: Fields<'_>) -> ! {
        self.log(LogLevel::Panic, message, fields, Location::caller());
        panic!("{message}");
    }

    /// Log at an arbitrary level. Never panics.
    #[track_caller]
    pub fn log_at(&self, level: LogLevel, message: &str, fields: Fields<'_>) {
        self.log(level, message, fields, Location::caller());
    }

    fn log(&self, level: LogLevel, message: &str, fields: Fields<'_>, caller: &Location<'_>) {
        if !self.shared.level.enabled(level) {
            return;
        }

        let caller = format!("{}:{}", short_caller(caller.file()), caller.line());
        let logger = self.name.as_deref();
        let rendered = render_fields(fields, self.shared.encoding);
        let extra = (!rendered.is_empty()).then(|| tracing::field::display(rendered.as_str()));
        let stacktrace = self
            .shared
            .stacktrace_level
            .filter(|min| level >= *min)
            .map(|_| Backtrace::force_capture().to_string());
        let stacktrace = stacktrace.as_deref();

        tracing::dispatcher::with_default(&self.shared.dispatch, || {
            macro_rules! emit {
                ($target:expr, $lvl:expr) => {
                    tracing::event!(
                        target: $target,
                        $lvl,
                        logger,
                        caller = %caller,
                        fields = extra,
                        stacktrace,
                        "{}",
                        message
                    )
                };
                ($target:expr, $lvl:expr, $severity:expr) => {
                    tracing::event!(
                        target: $target,
                        $lvl,
                        severity = $severity,
                        logger,
                        caller = %caller,
                        fields = extra,
                        stacktrace,
                        "{}",
                        message
                    )
                };
            }

            match level {
                LogLevel::Debug => emit!("hotlog", Level::DEBUG),
                LogLevel::Info => emit!("hotlog", Level::INFO),
                LogLevel::Warn => emit!("hotlog", Level::WARN),
                LogLevel::Error => emit!("hotlog", Level::ERROR),
                LogLevel::DPanic => emit!(DPANIC_TARGET, Level::ERROR, "DPANIC"),
                LogLevel::Panic => emit!(PANIC_TARGET, Level::ERROR, "PANIC"),
            }
        });
    }
}

/// Severity of an event as seen by the level filter.
fn severity_of(meta: &Metadata<'_>) -> LogLevel {
    match meta.target() {
        DPANIC_TARGET => LogLevel::DPanic,
        PANIC_TARGET => LogLevel::Panic,
        _ => LogLevel::from_tracing(meta.level()),
    }
}

fn sink_layer<T, W>(
    encoding: Encoding,
    timer: T,
    writer: W,
    ansi: bool,
) -> Box<dyn tracing_subscriber::Layer<Registry> + Send + Sync>
where
    T: FormatTime + Send + Sync + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt_layer::layer().with_writer(writer);

    match encoding {
        Encoding::Console => layer
            .with_ansi(ansi)
            .with_target(false)
            .with_timer(timer)
            .boxed(),
        Encoding::Json => layer
            .with_ansi(false)
            .event_format(JsonRecord { timer })
            .boxed(),
    }
}

/// One JSON object per record with every field as a top-level member.
///
/// Fixed keys (`timestamp`, `level`, `message`, `logger`, `caller`,
/// `stacktrace`) win over ad hoc fields of the same name.
struct JsonRecord<T> {
    timer: T,
}

impl<S, N, T> FormatEvent<S, N> for JsonRecord<T>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    T: FormatTime,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut timestamp = String::new();
        self.timer.format_time(&mut Writer::new(&mut timestamp))?;

        let mut record = Map::new();
        record.insert("timestamp".to_string(), Value::String(timestamp));
        record.insert(
            "level".to_string(),
            Value::String(severity_of(event.metadata()).as_str().to_string()),
        );

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        record.append(&mut visitor.fixed);
        for (key, value) in visitor.extra {
            record.entry(key).or_insert(value);
        }

        writeln!(writer, "{}", Value::Object(record))
    }
}

#[derive(Default)]
struct JsonVisitor {
    fixed: Map<String, Value>,
    extra: Map<String, Value>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &EventField, value: Value) {
        match field.name() {
            // Carried as the `level` key
            "severity" => {}
            // Ad hoc fields arrive as one rendered JSON object
            "fields" => {
                let parsed = match &value {
                    Value::String(text) => serde_json::from_str::<Value>(text).ok(),
                    _ => None,
                };
                match parsed {
                    Some(Value::Object(map)) => self.extra.extend(map),
                    _ => {
                        self.extra.insert("fields".to_string(), value);
                    }
                }
            }
            name @ ("message" | "logger" | "caller" | "stacktrace") => {
                self.fixed.insert(name.to_string(), value);
            }
            name => {
                self.extra.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for JsonVisitor {
    fn record_f64(&mut self, field: &EventField, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &EventField, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &EventField, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &EventField, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &EventField, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &EventField, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}

/// Keep the last directory and the file name, e.g. `src/main.rs`.
fn short_caller(file: &str) -> &str {
    let mut seps = file.rmatch_indices(['/', '\\']);
    match (seps.next(), seps.next()) {
        (Some(_), Some((idx, _))) => &file[idx + 1..],
        _ => file,
    }
}

fn render_fields(fields: Fields<'_>, encoding: Encoding) -> String {
    if fields.is_empty() {
        return String::new();
    }

    match encoding {
        Encoding::Console => fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" "),
        Encoding::Json => {
            let map: serde_json::Map<String, Value> = fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect();
            Value::Object(map).to_string()
        }
    }
}
