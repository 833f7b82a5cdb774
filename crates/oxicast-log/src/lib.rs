//! Zero-dependency logging for the `oxicast` runtime.
//!
//! Log records carry a level, the emitting module path and a formatted
//! message. They are filtered by a global atomic level and delivered to a
//! replaceable [`Sink`]. The default sink writes colored lines to stderr.
//!
//! # Example
//!
//! ```
//! use oxicast_log::{Level, debug, info};
//!
//! oxicast_log::set_level(Level::Debug);
//!
//! info!("registered {} types", 3);
//! debug!("cache miss for {:?}", "Optional<Int>");
//! ```

use std::fmt::{self, Arguments};
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

/// Severity of a log record. Lower values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Unrecoverable conditions, including fatal cast reports.
    Error = 0,
    /// Suspicious but recoverable conditions.
    Warn = 1,
    /// High-level lifecycle messages.
    Info = 2,
    /// Registry growth and cast failures.
    Debug = 3,
    /// Per-dispatch tracing.
    Trace = 4,
}

impl Level {
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case name of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError {
    input: String,
}

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid log level: {}", self.input)
    }
}

impl std::error::Error for ParseLevelError {}

impl std::str::FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a level name case-insensitively. `warning` is accepted as an
    /// alias for `warn`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Level::Error),
            "warn" | "warning" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            "trace" => Ok(Level::Trace),
            _ => Err(ParseLevelError {
                input: s.to_string(),
            }),
        }
    }
}

/// A single formatted log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Severity of the record.
    pub level: Level,
    /// Module path of the call site.
    pub target: String,
    /// Rendered message text.
    pub message: String,
}

/// Destination for log records that passed the level filter.
pub trait Sink: Send + Sync {
    /// Delivers one record.
    fn write(&self, level: Level, target: &str, args: Arguments<'_>);
}

/// Writes colored records to standard error.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl Sink for StderrSink {
    fn write(&self, level: Level, target: &str, args: Arguments<'_>) {
        const RESET: &str = "\x1b[0m";
        let color = level.color_code();

        // A failed diagnostic write has nowhere better to go.
        let _ = writeln!(
            std::io::stderr().lock(),
            "{color}[{level}]{RESET} {target}: {args}"
        );
    }
}

/// Collects records in memory. Used by tests that assert on log output.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record captured so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    /// Returns true if any captured message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.records().iter().any(|r| r.message.contains(needle))
    }
}

impl Sink for MemorySink {
    fn write(&self, level: Level, target: &str, args: Arguments<'_>) {
        let record = Record {
            level,
            target: target.to_string(),
            message: args.to_string(),
        };
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record);
    }
}

/// Global logger: an atomic level filter in front of a swappable sink.
pub struct Logger {
    level: AtomicU8,
    sink: RwLock<Arc<dyn Sink>>,
}

impl Logger {
    fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            sink: RwLock::new(Arc::new(StderrSink)),
        }
    }

    /// Sets the most verbose level that will be delivered.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Returns true if a record at `level` would be delivered.
    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }

    /// Replaces the sink, returning the previous one.
    pub fn set_sink(&self, sink: Arc<dyn Sink>) -> Arc<dyn Sink> {
        let mut slot = self
            .sink
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::replace(&mut *slot, sink)
    }

    fn dispatch(&self, level: Level, target: &str, args: Arguments<'_>) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        sink.write(level, target, args);
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, creating it at `Level::Warn` on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Warn))
}

/// Sets the global level.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Parses `s` and sets the global level.
///
/// # Errors
///
/// Returns [`ParseLevelError`] if `s` is not a level name.
pub fn set_level_from_str(s: &str) -> Result<(), ParseLevelError> {
    set_level(s.parse()?);
    Ok(())
}

/// Replaces the global sink, returning the previous one.
pub fn set_sink(sink: Arc<dyn Sink>) -> Arc<dyn Sink> {
    get_logger().set_sink(sink)
}

/// Reads the level from environment variable `var`.
///
/// Returns the level that was applied, or `None` when the variable is unset.
/// An unparsable value is reported at warn level and leaves the current
/// level unchanged.
pub fn init_from_env(var: &str) -> Option<Level> {
    let raw = std::env::var(var).ok()?;
    match raw.parse::<Level>() {
        Ok(level) => {
            set_level(level);
            Some(level)
        }
        Err(err) => {
            __log_with_target(Level::Warn, module_path!(), format_args!("{var}: {err}"));
            None
        }
    }
}

#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments<'_>) {
    let logger = get_logger();
    if logger.enabled(level) {
        logger.dispatch(level, target, args);
    }
}

/// Logs at an explicit level.
///
/// ```
/// use oxicast_log::{Level, log};
///
/// log!(level: Level::Info, "casting {} values", 4);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {{
        let level = $level;
        if $crate::get_logger().enabled(level) {
            $crate::__log_with_target(level, module_path!(), format_args!($($arg)*));
        }
    }};
}

/// Logs at [`Level::Error`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Error, $($arg)*) };
}

/// Logs at [`Level::Warn`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Warn, $($arg)*) };
}

/// Logs at [`Level::Info`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Info, $($arg)*) };
}

/// Logs at [`Level::Debug`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Debug, $($arg)*) };
}

/// Logs at [`Level::Trace`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Trace, $($arg)*) };
}
