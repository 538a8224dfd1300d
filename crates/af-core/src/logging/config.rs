//! Logging configuration.
//!
//! Read from the environment (`AF_LOG`, `AF_LOG_FORMAT`) with optional caller
//! overrides. `RUST_LOG` applies only when neither sets a level.

use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the `af_core` level (`off`, `error` ... `trace`).
pub const ENV_LOG_LEVEL: &str = "AF_LOG";

/// Environment variable holding the log format.
pub const ENV_LOG_FORMAT: &str = "AF_LOG_FORMAT";

/// Level used when neither `AF_LOG` nor `RUST_LOG` says otherwise.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Console lines for interactive runs.
    #[default]
    Human,
    /// One JSON object per event.
    Jsonl,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const JSONL: [&str; 2] = ["jsonl", "json"];
        if s.eq_ignore_ascii_case("human") {
            Ok(LogFormat::Human)
        } else if JSONL.iter().any(|name| s.eq_ignore_ascii_case(name)) {
            Ok(LogFormat::Jsonl)
        } else {
            Err(format!("unknown log format: {}", s))
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Explicit level for `af_core`. `None` defers to `RUST_LOG`, then info.
    pub level: Option<LevelFilter>,
    /// Whether to include timestamps in human output.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: None,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Build from the environment, then apply any explicit overrides.
    pub fn from_env(level: Option<LevelFilter>, format: Option<LogFormat>) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), level, format)
    }

    /// Same as [`LogConfig::from_env`] with an injectable variable lookup.
    ///
    /// `RUST_LOG` is not read here; it is only consulted by
    /// [`build_filter`] when no level was set.
    pub fn from_lookup<F>(lookup: F, level: Option<LevelFilter>, format: Option<LogFormat>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LogConfig {
            level: lookup(ENV_LOG_LEVEL).and_then(|val| val.parse().ok()),
            ..LogConfig::default()
        };

        if let Some(parsed) = lookup(ENV_LOG_FORMAT).and_then(|val| val.parse().ok()) {
            config.format = parsed;
        }

        if level.is_some() {
            config.level = level;
        }
        if let Some(format) = format {
            config.format = format;
        }

        config
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }
}

/// Resolve the event filter.
///
/// An explicit level (`AF_LOG` or a caller override) wins. Otherwise a valid
/// `rust_log` directive string is used as-is, and anything else falls back to
/// `af_core=info`.
pub fn build_filter(config: &LogConfig, rust_log: Option<&str>) -> EnvFilter {
    if let Some(level) = config.level {
        return EnvFilter::new(format!("af_core={}", level));
    }
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(format!("af_core={}", DEFAULT_LEVEL)))
}
