//! Logging configuration.
//!
//! Levels come from `-v` / `-q`, then `BINDCHECK_LOG`, then `RUST_LOG`.
//! The stderr format comes from `--log-format`, then `BINDCHECK_LOG_FORMAT`.

use clap::ValueEnum;
use tracing_subscriber::filter::LevelFilter;

/// Log output format on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per event.
    #[value(alias = "json")]
    Jsonl,
}

/// Level selected by the `-v` count or `-q`.
///
/// `None` when neither flag was given, so the environment still applies.
pub fn level_from_verbosity(verbose: u8, quiet: bool) -> Option<LevelFilter> {
    if quiet {
        return Some(LevelFilter::ERROR);
    }
    match verbose {
        0 => None,
        1 => Some(LevelFilter::DEBUG),
        _ => Some(LevelFilter::TRACE),
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LevelFilter,
    /// Whether to include timestamps in human output.
    pub timestamps: bool,
    /// Set when RUST_LOG should drive the filter directly.
    pub rust_log_directive: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LevelFilter::INFO,
            timestamps: true,
            rust_log_directive: None,
        }
    }
}

impl LogConfig {
    pub fn from_env(cli_level: Option<LevelFilter>, cli_format: Option<LogFormat>) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), cli_level, cli_format)
    }

    /// [`LogConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(
        lookup: F,
        cli_level: Option<LevelFilter>,
        cli_format: Option<LogFormat>,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LogConfig::default();

        // BINDCHECK_LOG takes precedence over RUST_LOG
        if let Some(val) = lookup("BINDCHECK_LOG") {
            if let Ok(level) = val.trim().parse::<LevelFilter>() {
                config.level = level;
            }
        } else if let Some(val) = lookup("RUST_LOG") {
            if !val.trim().is_empty() {
                config.rust_log_directive = Some(val);
            }
        }

        if let Some(val) = lookup("BINDCHECK_LOG_FORMAT") {
            if let Ok(format) = LogFormat::from_str(val.trim(), true) {
                config.format = format;
            }
        }

        if let Some(level) = cli_level {
            config.level = level;
            config.rust_log_directive = None;
        }
        if let Some(format) = cli_format {
            config.format = format;
        }

        config
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }
}
