//! Configuration loading and validation for bindcheck.
//!
//! This module handles:
//! - Config resolution order (CLI > env > XDG > defaults)
//! - Shape/type checking via serde (unknown keys are rejected)
//! - Semantic validation (non-zero timeouts, usable catalog addresses)

mod validation;

pub use validation::{validate_config, ValidationError};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::Preset;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "BINDCHECK_CONFIG";

/// Default XDG config directory name.
const CONFIG_DIR_NAME: &str = "bindcheck";

/// Config file name inside the config directory.
const CONFIG_FILE_NAME: &str = "bindcheck.toml";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid TOML in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for bc_common::Error {
    fn from(err: ConfigError) -> Self {
        bc_common::Error::Config(err.to_string())
    }
}

/// `[target]`: what to launch and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Target executable. Required for `run`; `list` and `check` work without it.
    pub binary: Option<PathBuf>,
    /// Command-line dialect of the target.
    pub preset: Preset,
    /// Appended verbatim after the preset's own arguments.
    pub extra_args: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            binary: None,
            preset: Preset::Generic,
            extra_args: Vec::new(),
        }
    }
}

/// `[rpc]`: credentials, ports and per-request timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcConfig {
    pub user: String,
    pub password: String,
    /// Default RPC port; derived from the port seed when unset.
    pub port: Option<u16>,
    /// P2P port handed to the target; derived from the port seed when unset.
    pub p2p_port: Option<u16>,
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        RpcConfig {
            user: "bindcheck".to_string(),
            password: "bindcheck".to_string(),
            port: None,
            p2p_port: None,
            timeout_ms: 5_000,
        }
    }
}

/// `[lifecycle]`: startup and shutdown windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleConfig {
    pub startup_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Interval between readiness polls and exit checks.
    pub poll_interval_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            startup_timeout_ms: 60_000,
            shutdown_timeout_ms: 30_000,
            poll_interval_ms: 250,
        }
    }
}

/// `[inspect]`: bind-set retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InspectConfig {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for InspectConfig {
    fn default() -> Self {
        InspectConfig {
            attempts: 10,
            backoff_ms: 200,
        }
    }
}

/// `[catalog]`: addresses the allow-list scenarios rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Loopback address other than 127.0.0.1 used as probe source and destination.
    pub other_loopback_ip: String,
    /// Allow-list entry that must not cover `other_loopback_ip`.
    pub denied_allow_ip: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            other_loopback_ip: "127.0.0.2".to_string(),
            denied_allow_ip: "1.1.1.1".to_string(),
        }
    }
}

/// Full harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub target: TargetConfig,
    pub rpc: RpcConfig,
    pub lifecycle: LifecycleConfig,
    pub inspect: InspectConfig,
    pub catalog: CatalogConfig,
    /// Parent directory for per-start data directories (system temp dir when unset).
    pub work_dir: Option<PathBuf>,
    /// Leave data directories behind for post-mortem inspection.
    pub keep_datadirs: bool,
}

impl HarnessConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle.startup_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle.shutdown_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.lifecycle.poll_interval_ms)
    }

    pub fn inspect_backoff(&self) -> Duration {
        Duration::from_millis(self.inspect.backoff_ms)
    }

    /// Apply command-line overrides on top of the loaded file.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(binary) = &overrides.binary {
            self.target.binary = Some(binary.clone());
        }
        if let Some(preset) = overrides.preset {
            self.target.preset = preset;
        }
        if let Some(port) = overrides.rpc_port {
            self.rpc.port = Some(port);
        }
        if overrides.keep_datadirs {
            self.keep_datadirs = true;
        }
    }
}

/// Values given on the command line that beat the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub binary: Option<PathBuf>,
    pub preset: Option<Preset>,
    pub rpc_port: Option<u16>,
    pub keep_datadirs: bool,
}

/// Configuration resolution options.
#[derive(Debug, Default)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: HarnessConfig,
    /// File the config came from (None if using defaults).
    pub path: Option<PathBuf>,
}

/// Load configuration with the standard resolution order.
///
/// Resolution order (highest to lowest priority):
/// 1. Explicit CLI flag (`--config`)
/// 2. Environment variable (BINDCHECK_CONFIG)
/// 3. XDG config home (~/.config/bindcheck/bindcheck.toml)
/// 4. Built-in defaults
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    load_config_with(options, |key| std::env::var(key).ok())
}

/// [`load_config`] with an injectable environment (avoids env races in tests).
pub fn load_config_with<F>(options: &ConfigOptions, env: F) -> Result<ResolvedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // 1. Explicit option; 2. environment variable. Both must exist.
    let explicit = options
        .config_path
        .clone()
        .or_else(|| env(CONFIG_ENV_VAR).filter(|v| !v.is_empty()).map(PathBuf::from));
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = load_config_file(&path)?;
        return Ok(ResolvedConfig {
            config,
            path: Some(path),
        });
    }

    // 3. XDG config home, optional
    let default_path = resolve_config_dir(&env).join(CONFIG_FILE_NAME);
    if default_path.exists() {
        let config = load_config_file(&default_path)?;
        return Ok(ResolvedConfig {
            config,
            path: Some(default_path),
        });
    }

    // 4. Built-in defaults
    Ok(ResolvedConfig {
        config: HarnessConfig::default(),
        path: None,
    })
}

/// Parse and validate one config file.
pub fn load_config_file(path: &Path) -> Result<HarnessConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: HarnessConfig = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate_config(&config)?;
    Ok(config)
}

fn resolve_config_dir<F>(env: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let xdg_config = env("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });

    xdg_config.join(CONFIG_DIR_NAME)
}
