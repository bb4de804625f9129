//! Keeper Logging
//!
//! Small leveled logger shared by the keeper crates. Lines go to stderr. The
//! logger reads its settings from the environment the first time anything
//! asks it a question, whether that is a macro checking its level or an
//! explicit [`init`].
//!
//! # Usage
//!
//! ```rust
//! use keeper_log::{Level, debug, log, warn};
//!
//! debug!("resolving store");
//! warn!(target: "keeper::driver", "lock wait expired for {}", "report");
//! log!(Level::Info, "store {} ready", "redis");
//! ```
//!
//! # Environment Variables
//!
//! - `KEEPER_DEBUG=1` - Emit debug lines regardless of the level
//! - `KEEPER_LOG_LEVEL=trace|debug|info|warn|error|off` - Minimum level
//! - `KEEPER_LOG_FORMAT=pretty|json` - Output format (default `json`)
//! - `KEEPER_LOG_TIMESTAMPS=1|0` - Include timestamps (default on)
//! - `KEEPER_LOG_COLOR=1|0` - Colored level names (`color` feature)

use once_cell::sync::Lazy;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Severity of a log line, least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Disables all output.
    Off,
}

impl Level {
    const ALL: [Level; 6] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Off,
    ];

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
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.eq_ignore_ascii_case("warning") {
            return Ok(Level::Warn);
        }
        if name.eq_ignore_ascii_case("none") {
            return Ok(Level::Off);
        }
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("unknown log level '{}'", name))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `timestamp LEVEL [target] message`
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            f if f.eq_ignore_ascii_case("pretty") => Ok(Format::Pretty),
            f if f.eq_ignore_ascii_case("json") => Ok(Format::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Settings the logger starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub level: Level,
    pub debug: bool,
    pub format: Format,
    pub timestamps: bool,
    pub color: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            level: Level::Info,
            debug: false,
            format: Format::Json,
            timestamps: true,
            color: false,
        }
    }
}

impl Settings {
    /// Read `KEEPER_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable source. Unparseable values fall back
    /// to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| {
            lookup(name).map(|v| v.trim() == "1" || v.trim().eq_ignore_ascii_case("true"))
        };
        let defaults = Self::default();

        let debug = flag("KEEPER_DEBUG").unwrap_or(defaults.debug);
        let level = lookup("KEEPER_LOG_LEVEL")
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { defaults.level });

        Self {
            level,
            debug,
            format: lookup("KEEPER_LOG_FORMAT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.format),
            timestamps: flag("KEEPER_LOG_TIMESTAMPS").unwrap_or(defaults.timestamps),
            color: flag("KEEPER_LOG_COLOR")
                .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some()),
        }
    }
}

/// Process-wide logger. The level and debug switch can change at runtime.
#[derive(Debug)]
pub struct Logger {
    level: AtomicU8,
    debug: AtomicBool,
    format: Format,
    timestamps: bool,
    color: bool,
}

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new(Settings::from_env()));

/// The global logger, configured from the environment on first access.
pub fn logger() -> &'static Logger {
    &LOGGER
}

impl Logger {
    pub fn new(settings: Settings) -> Self {
        Self {
            level: AtomicU8::new(settings.level as u8),
            debug: AtomicBool::new(settings.debug),
            format: settings.format,
            timestamps: settings.timestamps,
            color: settings.color,
        }
    }

    pub fn level(&self) -> Level {
        let raw = self.level.load(Ordering::Relaxed);
        Level::ALL
            .into_iter()
            .find(|level| *level as u8 == raw)
            .unwrap_or(Level::Off)
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn debug_mode(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    /// Whether level names are colored.
    pub fn color(&self) -> bool {
        self.color
    }

    /// Whether a line at `level` would be written. Debug mode lets debug
    /// lines through even above the configured level.
    pub fn enabled(&self, level: Level) -> bool {
        match level {
            Level::Off => false,
            Level::Debug if self.debug_mode() => true,
            _ => level >= self.level(),
        }
    }

    #[doc(hidden)]
    pub fn emit(&self, level: Level, target: &str, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        let line = self.render(level, target, &args.to_string());
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }

    fn render(&self, level: Level, target: &str, message: &str) -> String {
        match self.format {
            Format::Json => json_line(level, target, message, self.timestamps),
            Format::Pretty => {
                let mut line = String::new();
                if self.timestamps {
                    line.push_str(&chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f ").to_string());
                }
                line.push_str(&self.label(level));
                if !target.is_empty() {
                    line.push_str(&format!(" [{}]", target));
                }
                line.push(' ');
                line.push_str(message);
                line
            }
        }
    }

    #[cfg(feature = "color")]
    fn label(&self, level: Level) -> String {
        use colored::{Color, Colorize};

        let label = format!("{:<5}", level);
        if !self.color() {
            return label;
        }
        let color = match level {
            Level::Trace => Color::Magenta,
            Level::Debug => Color::Blue,
            Level::Info => Color::Green,
            Level::Warn => Color::Yellow,
            Level::Error | Level::Off => Color::Red,
        };
        label.as_str().color(color).to_string()
    }

    #[cfg(not(feature = "color"))]
    fn label(&self, level: Level) -> String {
        format!("{:<5}", level)
    }
}

#[cfg(feature = "json")]
fn json_line(level: Level, target: &str, message: &str, timestamps: bool) -> String {
    let mut entry = serde_json::Map::new();
    if timestamps {
        entry.insert("timestamp".into(), chrono::Utc::now().to_rfc3339().into());
    }
    entry.insert("level".into(), level.as_str().into());
    entry.insert("target".into(), target.into());
    entry.insert("message".into(), message.into());
    serde_json::Value::Object(entry).to_string()
}

#[cfg(not(feature = "json"))]
fn json_line(level: Level, target: &str, message: &str, timestamps: bool) -> String {
    let timestamp = if timestamps {
        format!(r#""timestamp":"{}","#, chrono::Utc::now().to_rfc3339())
    } else {
        String::new()
    };
    format!(
        r#"{{{}"level":"{}","target":"{}","message":"{}"}}"#,
        timestamp,
        level.as_str(),
        target.escape_default(),
        message.escape_default()
    )
}

// Shorthands over the global logger.

/// Load the environment settings now instead of on first use.
pub fn init() {
    Lazy::force(&LOGGER);
}

pub fn current_level() -> Level {
    logger().level()
}

/// Change the minimum level at runtime.
pub fn set_level(level: Level) {
    logger().set_level(level);
}

/// Toggle debug mode at runtime.
pub fn set_debug(enabled: bool) {
    logger().set_debug(enabled);
}

pub fn is_level_enabled(level: Level) -> bool {
    logger().enabled(level)
}

pub fn is_debug_enabled() -> bool {
    logger().enabled(Level::Debug)
}

/// Write a line at an explicit level.
#[macro_export]
macro_rules! log {
    ($level:expr, target: $target:expr, $($arg:tt)+) => {
        $crate::logger().emit($level, $target, format_args!($($arg)+))
    };
    ($level:expr, $($arg:tt)+) => {
        $crate::logger().emit($level, module_path!(), format_args!($($arg)+))
    };
}

/// Write a debug line.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        $crate::log!($crate::Level::Debug, $($arg)+)
    };
}

/// Write a warning.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        $crate::log!($crate::Level::Warn, $($arg)+)
    };
}

#[cfg(feature = "tracing")]
pub mod tracing_compat {
    //! A `tracing` subscriber filtered at the keeper log level, for
    //! applications that route everything through `tracing`.

    use super::*;

    pub fn subscriber() -> impl tracing::Subscriber {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{EnvFilter, fmt};

        let logger = logger();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(logger.level().as_str().to_ascii_lowercase()));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(logger.color()))
    }
}
