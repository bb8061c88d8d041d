//! Semantic validation for configuration files.
//!
//! Values can be well-formed TOML and still unusable: a zero timeout, or a
//! deny-scenario allow-list entry that actually covers the probe source.

use std::net::IpAddr;

use thiserror::Error;

use super::HarnessConfig;
use crate::addr::AllowSpec;

/// Errors that can occur during semantic validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("rpc.user must not be empty")]
    EmptyRpcUser,

    #[error("{field} must not be port 0")]
    PortZero { field: &'static str },

    #[error("rpc.port and rpc.p2p_port must differ (both {port})")]
    PortClash { port: u16 },

    #[error("catalog.other_loopback_ip '{value}' is not a loopback address")]
    NotLoopback { value: String },

    #[error("catalog.other_loopback_ip '{value}' must differ from the default loopback")]
    DefaultLoopback { value: String },

    #[error("catalog.denied_allow_ip '{value}' is not a valid allow-list entry: {reason}")]
    BadAllowEntry { value: String, reason: String },

    #[error("catalog.denied_allow_ip '{value}' covers catalog.other_loopback_ip '{source_ip}'")]
    DenyCoversSource { value: String, source_ip: String },
}

/// Check a fully merged config.
pub fn validate_config(config: &HarnessConfig) -> Result<(), ValidationError> {
    for (field, value) in [
        ("rpc.timeout_ms", config.rpc.timeout_ms),
        ("lifecycle.startup_timeout_ms", config.lifecycle.startup_timeout_ms),
        ("lifecycle.shutdown_timeout_ms", config.lifecycle.shutdown_timeout_ms),
        ("lifecycle.poll_interval_ms", config.lifecycle.poll_interval_ms),
        ("inspect.attempts", u64::from(config.inspect.attempts)),
    ] {
        if value == 0 {
            return Err(ValidationError::Zero { field });
        }
    }

    if config.rpc.user.is_empty() {
        return Err(ValidationError::EmptyRpcUser);
    }
    if config.rpc.port == Some(0) {
        return Err(ValidationError::PortZero { field: "rpc.port" });
    }
    if config.rpc.p2p_port == Some(0) {
        return Err(ValidationError::PortZero {
            field: "rpc.p2p_port",
        });
    }
    if let (Some(rpc), Some(p2p)) = (config.rpc.port, config.rpc.p2p_port) {
        if rpc == p2p {
            return Err(ValidationError::PortClash { port: rpc });
        }
    }

    let other = &config.catalog.other_loopback_ip;
    let other_ip = match other.parse::<IpAddr>() {
        Ok(ip) if ip.is_loopback() => ip,
        _ => {
            return Err(ValidationError::NotLoopback {
                value: other.clone(),
            })
        }
    };
    if other_ip == IpAddr::from([127, 0, 0, 1]) {
        return Err(ValidationError::DefaultLoopback {
            value: other.clone(),
        });
    }

    let denied = &config.catalog.denied_allow_ip;
    let spec = AllowSpec::parse(denied).map_err(|e| ValidationError::BadAllowEntry {
        value: denied.clone(),
        reason: e.to_string(),
    })?;
    if spec.contains(other_ip) {
        return Err(ValidationError::DenyCoversSource {
            value: denied.clone(),
            source_ip: other.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&HarnessConfig::default()), Ok(()));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = HarnessConfig::default();
        config.inspect.attempts = 0;
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::Zero {
                field: "inspect.attempts"
            })
        );

        let mut config = HarnessConfig::default();
        config.lifecycle.shutdown_timeout_ms = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::Zero { .. })
        ));
    }

    #[test]
    fn test_rpc_checks() {
        let mut config = HarnessConfig::default();
        config.rpc.user.clear();
        assert_eq!(validate_config(&config), Err(ValidationError::EmptyRpcUser));

        let mut config = HarnessConfig::default();
        config.rpc.port = Some(18443);
        config.rpc.p2p_port = Some(18443);
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::PortClash { port: 18443 })
        );
    }

    #[test]
    fn test_other_loopback_must_be_secondary_loopback() {
        let mut config = HarnessConfig::default();
        config.catalog.other_loopback_ip = "10.0.0.1".into();
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::NotLoopback { .. })
        ));

        config.catalog.other_loopback_ip = "127.0.0.1".into();
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::DefaultLoopback { .. })
        ));

        config.catalog.other_loopback_ip = "127.0.0.3".into();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_deny_entry_must_exclude_source() {
        let mut config = HarnessConfig::default();
        config.catalog.denied_allow_ip = "127.0.0.0/8".into();
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::DenyCoversSource { .. })
        ));

        config.catalog.denied_allow_ip = "not-an-ip".into();
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::BadAllowEntry { .. })
        ));
    }
}
