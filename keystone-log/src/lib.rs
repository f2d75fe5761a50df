//! Keystone Logging
//!
//! Leveled, environment-configured logging for the Keystone crates.
//!
//! # Features
//!
//! - **Environment-controlled**: `KEYSTONE_DEBUG=1` enables debug logging
//! - **Structured fields**: `fields: [key = value]` attaches key-value pairs
//! - **Three formats**: JSON lines (default), pretty, compact
//! - **`log` bridge**: route records from `log`-based crates (SQLx, SeaORM)
//!   through the same formatter
//!
//! # Usage
//!
//! ```rust
//! use keystone_log::{debug, info, warn, error};
//!
//! info!("Control plane reachable");
//! let store = "tenant_acme";
//! debug!(fields: [store = store], "Building connection pool");
//! warn!(target: "keystone::cache", "Close failed for {}", store);
//! error!("Provisioning aborted");
//! ```
//!
//! # Environment Variables
//!
//! - `KEYSTONE_DEBUG=1` - Enable debug logging
//! - `KEYSTONE_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `KEYSTONE_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `KEYSTONE_LOG_COLOR=1|0` - Enable/disable colors (pretty format)

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

// ============================================================================
// Log Levels
// ============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level (least verbose)
    Error = 4,
    /// Off (no logging)
    Off = 5,
}

impl Level {
    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            _ => Level::Off,
        }
    }

    #[cfg(feature = "color")]
    fn colored(&self) -> colored::ColoredString {
        use colored::Colorize;
        match self {
            Level::Trace => "TRACE".magenta(),
            Level::Debug => "DEBUG".blue(),
            Level::Info => "INFO".green(),
            Level::Warn => "WARN".yellow(),
            Level::Error => "ERROR".red().bold(),
            Level::Off => "OFF".white(),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "off" | "none" => Ok(Level::Off),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable, one field per column
    Pretty,
    /// Short single-line format
    Compact,
    /// One JSON object per line
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Format::Pretty),
            "compact" => Ok(Format::Compact),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

// ============================================================================
// Global Configuration
// ============================================================================

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration, read once from the environment.
#[derive(Debug)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include timestamps
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            timestamps: true,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

impl LogConfig {
    /// Build the configuration from `KEYSTONE_*` environment variables and
    /// publish level/debug to the global switches the macros check.
    pub fn from_env() -> Self {
        let debug = env_flag("KEYSTONE_DEBUG").unwrap_or(false);

        let level = env::var("KEYSTONE_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = env::var("KEYSTONE_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Format::Json);

        let color = env_flag("KEYSTONE_LOG_COLOR")
            .unwrap_or_else(|| env::var("NO_COLOR").is_err() && env::var("TERM").is_ok());

        let timestamps = env_flag("KEYSTONE_LOG_TIMESTAMPS").unwrap_or(true);

        DEBUG_ENABLED.store(debug, Ordering::SeqCst);
        LOG_LEVEL.store(level as u8, Ordering::SeqCst);

        Self {
            debug,
            level,
            format,
            color,
            timestamps,
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Initialize the logging system eagerly.
///
/// The first log macro initializes it anyway; call this at startup so the
/// environment is read before any worker threads spin up.
pub fn init() {
    Lazy::force(&CONFIG);
}

/// Check if debug mode is enabled.
#[inline]
pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Check if a log level passes the configured threshold.
#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    level != Level::Off && level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Check whether a macro at `level` should emit.
#[inline]
pub fn is_enabled(level: Level) -> bool {
    is_level_enabled(level) || (level == Level::Debug && is_debug_enabled())
}

/// Get current log level.
pub fn current_level() -> Level {
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level at runtime.
pub fn set_level(level: Level) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Enable or disable debug mode at runtime.
pub fn set_debug(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    if enabled && current_level() > Level::Debug {
        set_level(Level::Debug);
    }
}

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

// ============================================================================
// Log Output
// ============================================================================

/// Emit a message without structured fields.
#[doc(hidden)]
pub fn log(level: Level, target: &str, message: &str) {
    log_with_fields(level, target, message, &[]);
}

/// Emit a message with structured key-value fields.
#[doc(hidden)]
pub fn log_with_fields(
    level: Level,
    target: &str,
    message: &str,
    fields: &[(&str, &dyn fmt::Display)],
) {
    let config = config();
    if !is_enabled(level) {
        return;
    }

    let fields: BTreeMap<&str, String> = fields
        .iter()
        .map(|(key, value)| (*key, value.to_string()))
        .collect();

    match config.format {
        Format::Pretty => log_pretty(level, target, message, &fields, config),
        Format::Compact => log_compact(level, target, message, &fields, config),
        Format::Json => log_json(level, target, message, &fields),
    }
}

fn write_fields(out: &mut impl Write, fields: &BTreeMap<&str, String>) {
    for (key, value) in fields {
        let _ = write!(out, " {}={}", key, value);
    }
}

fn log_pretty(
    level: Level,
    target: &str,
    message: &str,
    fields: &BTreeMap<&str, String>,
    config: &LogConfig,
) {
    let mut stderr = std::io::stderr().lock();

    if config.timestamps {
        let now = chrono::Local::now();
        let _ = write!(stderr, "{} ", now.format("%Y-%m-%d %H:%M:%S%.3f"));
    }

    #[cfg(feature = "color")]
    if config.color {
        let _ = write!(stderr, "{:5} ", level.colored());
    } else {
        let _ = write!(stderr, "{:5} ", level.as_str());
    }

    #[cfg(not(feature = "color"))]
    let _ = write!(stderr, "{:5} ", level.as_str());

    if !target.is_empty() {
        let _ = write!(stderr, "[{}] ", target);
    }

    let _ = write!(stderr, "{}", message);
    write_fields(&mut stderr, fields);
    let _ = writeln!(stderr);
}

fn log_compact(
    level: Level,
    target: &str,
    message: &str,
    fields: &BTreeMap<&str, String>,
    config: &LogConfig,
) {
    let mut stderr = std::io::stderr().lock();

    if config.timestamps {
        let now = chrono::Local::now();
        let _ = write!(stderr, "{} ", now.format("%H:%M:%S"));
    }

    let _ = write!(stderr, "{} ", level.as_str().chars().next().unwrap_or('?'));

    if !target.is_empty() {
        let _ = write!(stderr, "{}: ", target);
    }

    let _ = write!(stderr, "{}", message);
    write_fields(&mut stderr, fields);
    let _ = writeln!(stderr);
}

#[cfg(feature = "json")]
fn log_json(level: Level, target: &str, message: &str, fields: &BTreeMap<&str, String>) {
    use serde::Serialize;

    #[derive(Serialize)]
    struct LogEntry<'a> {
        timestamp: String,
        level: &'a str,
        target: &'a str,
        message: &'a str,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        fields: &'a BTreeMap<&'a str, String>,
    }

    let entry = LogEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        level: level.as_str(),
        target,
        message,
        fields,
    };

    if let Ok(json) = serde_json::to_string(&entry) {
        eprintln!("{}", json);
    }
}

#[cfg(not(feature = "json"))]
fn log_json(level: Level, target: &str, message: &str, fields: &BTreeMap<&str, String>) {
    let mut line = format!(
        r#"{{"timestamp":"{}","level":"{}","target":"{}","message":"{}""#,
        chrono::Utc::now().to_rfc3339(),
        level.as_str(),
        escape_json(target),
        escape_json(message)
    );
    if !fields.is_empty() {
        let body: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!(r#""{}":"{}""#, escape_json(k), escape_json(v)))
            .collect();
        line.push_str(&format!(r#","fields":{{{}}}"#, body.join(",")));
    }
    line.push('}');
    eprintln!("{}", line);
}

#[cfg(not(feature = "json"))]
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => result.push_str(&format!("\\u{:04x}", c as u32)),
            c => result.push(c),
        }
    }
    result
}

// ============================================================================
// `log` crate bridge
// ============================================================================

struct LogBridge;

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        is_enabled(metadata.level().into())
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            log(
                record.level().into(),
                record.target(),
                &record.args().to_string(),
            );
        }
    }

    fn flush(&self) {}
}

/// Route records emitted through the `log` facade (SQLx, SeaORM) into the
/// Keystone formatter.
///
/// Fails if another global logger is already installed.
pub fn install_log_bridge() -> Result<(), log::SetLoggerError> {
    init();
    log::set_boxed_logger(Box::new(LogBridge))?;
    log::set_max_level(match current_level() {
        Level::Trace => log::LevelFilter::Trace,
        Level::Debug => log::LevelFilter::Debug,
        Level::Info => log::LevelFilter::Info,
        Level::Warn => log::LevelFilter::Warn,
        Level::Error => log::LevelFilter::Error,
        Level::Off => log::LevelFilter::Off,
    });
    Ok(())
}

// ============================================================================
// Macros
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __emit {
    ($level:expr, $target:expr, [$($key:ident = $value:expr),* $(,)?], $($arg:tt)+) => {
        if $crate::is_enabled($level) {
            $crate::log_with_fields(
                $level,
                $target,
                &format!($($arg)+),
                &[$((stringify!($key), &$value as &dyn ::std::fmt::Display)),*],
            );
        }
    };
}

/// Log a trace message.
#[macro_export]
macro_rules! trace {
    (target: $target:expr, fields: [$($f:tt)*], $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Trace, $target, [$($f)*], $($arg)+)
    };
    (fields: [$($f:tt)*], $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Trace, module_path!(), [$($f)*], $($arg)+)
    };
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Trace, $target, [], $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__emit!($crate::Level::Trace, module_path!(), [], $($arg)+)
    };
}

/// Log a debug message.
///
/// Enabled by `KEYSTONE_DEBUG=1` or `KEYSTONE_LOG_LEVEL=debug`.
///
/// # Example
///
/// ```rust
/// use keystone_log::debug;
///
/// let store = "tenant_acme";
/// debug!("Cache miss for {}", store);
/// debug!(fields: [store = store, attempt = 1], "Building pool");
/// ```
#[macro_export]
macro_rules! debug {
    (target: $target:expr, fields: [$($f:tt)*], $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Debug, $target, [$($f)*], $($arg)+)
    };
    (fields: [$($f:tt)*], $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Debug, module_path!(), [$($f)*], $($arg)+)
    };
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Debug, $target, [], $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__emit!($crate::Level::Debug, module_path!(), [], $($arg)+)
    };
}

/// Log an info message.
#[macro_export]
macro_rules! info {
    (target: $target:expr, fields: [$($f:tt)*], $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Info, $target, [$($f)*], $($arg)+)
    };
    (fields: [$($f:tt)*], $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Info, module_path!(), [$($f)*], $($arg)+)
    };
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Info, $target, [], $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__emit!($crate::Level::Info, module_path!(), [], $($arg)+)
    };
}

/// Log a warning message.
#[macro_export]
macro_rules! warn {
    (target: $target:expr, fields: [$($f:tt)*], $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Warn, $target, [$($f)*], $($arg)+)
    };
    (fields: [$($f:tt)*], $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Warn, module_path!(), [$($f)*], $($arg)+)
    };
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Warn, $target, [], $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__emit!($crate::Level::Warn, module_path!(), [], $($arg)+)
    };
}

/// Log an error message.
#[macro_export]
macro_rules! error {
    (target: $target:expr, fields: [$($f:tt)*], $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Error, $target, [$($f)*], $($arg)+)
    };
    (fields: [$($f:tt)*], $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Error, module_path!(), [$($f)*], $($arg)+)
    };
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__emit!($crate::Level::Error, $target, [], $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__emit!($crate::Level::Error, module_path!(), [], $($arg)+)
    };
}

// ============================================================================
// Tracing Integration
// ============================================================================

#[cfg(feature = "tracing")]
pub mod tracing_compat {
    //! Tracing subscriber that honors `KEYSTONE_LOG_LEVEL` unless `RUST_LOG`
    //! is set.

    use super::*;

    /// Create a tracing subscriber configured from the Keystone settings.
    pub fn subscriber() -> impl tracing::Subscriber {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{EnvFilter, fmt};

        let config = config();
        let level = match config.level {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(config.color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_bridge_installs_once() {
        let _ = install_log_bridge();
        assert!(install_log_bridge().is_err());
        log::info!(target: "sqlx::query", "routed through the bridge");
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("debug".parse::<Level>(), Ok(Level::Debug));
        assert_eq!(" WARNING ".parse::<Level>(), Ok(Level::Warn));
        assert_eq!("none".parse::<Level>(), Ok(Level::Off));
        assert!("loud".parse::<Level>().is_err());
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("pretty".parse::<Format>(), Ok(Format::Pretty));
        assert_eq!("JSON".parse::<Format>(), Ok(Format::Json));
        assert!("xml".parse::<Format>().is_err());
    }

    #[test]
    fn test_from_log_level() {
        assert_eq!(Level::from(log::Level::Warn), Level::Warn);
        assert_eq!(Level::from(log::Level::Trace), Level::Trace);
    }

    #[test]
    fn test_off_is_never_enabled() {
        let original = current_level();
        set_level(Level::Trace);
        assert!(!is_level_enabled(Level::Off));
        assert!(is_level_enabled(Level::Trace));
        set_level(original);
    }

    #[test]
    fn test_macros_compile() {
        let store = "tenant_acme";
        trace!("trace message");
        debug!("debug {}", store);
        info!(fields: [store = store], "info with fields");
        warn!(target: "keystone::test", "with target");
        error!(target: "keystone::test", fields: [store = store, attempt = 2], "both");
    }
}
