//! Structured logging foundation for bindcheck.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for CI pipelines
//!
//! # Design Notes
//!
//! - stdout is reserved for the scenario report (JSON/MD/summary)
//! - stderr receives all log output (human or JSONL)
//! - Every event emitted inside [`run_span`] carries the run id

pub mod config;

pub use config::{level_from_verbosity, LogConfig, LogFormat};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the event filter for a config.
///
/// An explicit level scopes to bindcheck's own crates; a RUST_LOG directive
/// is passed through untouched.
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    if let Some(directive) = &config.rust_log_directive {
        if let Ok(filter) = EnvFilter::try_new(directive) {
            return filter;
        }
    }
    let level = config.level;
    EnvFilter::new(format!("bc_core={level},bindcheck={level},bc_fake_node={level}"))
}

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs. A second call
/// is a no-op.
pub fn init_logging(config: &LogConfig) {
    let filter = build_filter(config);

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init();
            } else {
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init();
            }
        }
        LogFormat::Jsonl => {
            let jsonl_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(false);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(jsonl_layer)
                .try_init();
        }
    }
}

/// Initialize logging with defaults (for tests and simple cases).
pub fn init_default_logging() {
    let config = LogConfig::from_env(None, None);
    init_logging(&config);
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &uuid[..12])
}

/// Root span for one harness invocation.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("run", run_id = %run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();

        assert!(id1.starts_with("run-"));
        assert_ne!(id1, id2);
        // Format: run-<12 hex chars>
        assert_eq!(id1.len(), 16);
        assert!(id1[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_filter_from_level() {
        let config = LogConfig::default().with_level(LevelFilter::DEBUG);
        let filter = build_filter(&config).to_string();
        assert!(filter.contains("bc_core=debug"));
    }

    #[test]
    fn test_filter_passes_rust_log_through() {
        let config = LogConfig {
            rust_log_directive: Some("bc_core::rpc=trace".to_string()),
            ..LogConfig::default()
        };
        assert_eq!(build_filter(&config).to_string(), "bc_core::rpc=trace");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig::default().with_level(LevelFilter::OFF);
        init_logging(&config);
        init_logging(&config);
    }
}
