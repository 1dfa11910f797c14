//! Logging setup for geotweet.
//!
//! Built on the `tracing` ecosystem. Log records go to stderr so that
//! machine-readable command output on stdout stays clean.
//!
//! # Usage
//!
//! ```rust
//! use geotweet::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::default();
//! init_logging(&config);
//!
//! tracing::info!("Application started");
//! ```

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display.
    pub level: LogLevel,
    /// Output format for log messages.
    pub format: LogFormat,
    /// Include timestamps in log output.
    pub timestamps: bool,
    /// Include target (module path) in log output.
    pub target: bool,
    /// Include span events (enter/exit).
    pub spans: bool,
    /// Enable ANSI colors in output.
    pub colors: bool,
}

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    /// No logging at all.
    Off,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human-readable format.
    Pretty,
    /// Compact single-line format.
    Compact,
    /// Full format with thread, file and line details.
    Full,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            timestamps: true,
            target: false,
            spans: false,
            colors: true,
        }
    }
}

impl LogConfig {
    /// Errors only.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            timestamps: false,
            target: false,
            spans: false,
            colors: true,
        }
    }

    /// Debug level with module targets.
    #[must_use]
    pub const fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            timestamps: true,
            target: true,
            spans: false,
            colors: true,
        }
    }

    /// Maximum verbosity.
    #[must_use]
    pub const fn trace() -> Self {
        Self {
            level: LogLevel::Trace,
            format: LogFormat::Full,
            timestamps: true,
            target: true,
            spans: true,
            colors: true,
        }
    }

    /// Pick a preset from the CLI's `-q` flag and `-v` count.
    #[must_use]
    pub const fn from_verbosity(quiet: bool, verbose: u8) -> Self {
        if quiet {
            Self::quiet()
        } else {
            match verbose {
                0 => Self {
                    level: LogLevel::Info,
                    format: LogFormat::Compact,
                    timestamps: true,
                    target: false,
                    spans: false,
                    colors: true,
                },
                1 => Self::verbose(),
                _ => Self::trace(),
            }
        }
    }

    /// Apply `level` / `format` names from the config file.
    ///
    /// # Errors
    ///
    /// Returns a message naming the value that does not parse.
    pub fn with_overrides(mut self, level: Option<&str>, format: Option<&str>) -> Result<Self, String> {
        if let Some(level) = level {
            self.level = level.parse()?;
        }
        if let Some(format) = format {
            self.format = format.parse()?;
        }
        Ok(self)
    }

    /// Disable ANSI colors.
    #[must_use]
    pub const fn without_colors(mut self) -> Self {
        self.colors = false;
        self
    }
}

impl LogLevel {
    /// Convert to env filter directive string.
    const fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
            Self::Off => "off",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" | "e" => Ok(Self::Error),
            "warn" | "warning" | "w" => Ok(Self::Warn),
            "info" | "i" => Ok(Self::Info),
            "debug" | "d" => Ok(Self::Debug),
            "trace" | "t" => Ok(Self::Trace),
            "off" | "none" | "quiet" => Ok(Self::Off),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(Self::Pretty),
            "compact" | "c" => Ok(Self::Compact),
            "full" | "f" => Ok(Self::Full),
            _ => Err(format!("Invalid log format: {s}")),
        }
    }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(format!("geotweet={}", config.level.to_filter_string()))
    }
}

/// Initialize the global subscriber.
///
/// Only the first call installs a subscriber; later calls are ignored.
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging(config: &LogConfig) {
    let span_events = if config.spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colors)
        .with_target(config.target)
        .with_span_events(span_events);

    let registry = tracing_subscriber::registry().with(env_filter(config));

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => registry.with(base.pretty()).try_init().ok(),
        (LogFormat::Pretty, false) => registry.with(base.pretty().without_time()).try_init().ok(),
        (LogFormat::Compact, true) => registry.with(base.compact()).try_init().ok(),
        (LogFormat::Compact, false) => registry
            .with(base.compact().without_time())
            .try_init()
            .ok(),
        (LogFormat::Full, _) => registry
            .with(
                base.with_thread_ids(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .ok(),
    };
}

/// Logs the start and end of a long-running operation.
pub struct OperationGuard {
    name: String,
    start: std::time::Instant,
}

impl OperationGuard {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!(operation = %name, "Starting operation");
        Self {
            name,
            start: std::time::Instant::now(),
        }
    }

    pub fn complete(self) {
        tracing::info!(
            operation = %self.name,
            elapsed = %crate::format_elapsed(self.start.elapsed()),
            "Operation completed"
        );
    }

    pub fn fail(self, error: &dyn std::error::Error) {
        tracing::error!(
            operation = %self.name,
            elapsed = %crate::format_elapsed(self.start.elapsed()),
            error = %error,
            "Operation failed"
        );
    }
}
