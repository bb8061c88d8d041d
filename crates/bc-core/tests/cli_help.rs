//! CLI help output tests for bindcheck.
//!
//! These tests verify that all commands correctly display their help text
//! without errors.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

/// Get a Command for the bindcheck binary.
fn bindcheck() -> Command {
    cargo_bin_cmd!("bindcheck")
}

// ============================================================================
// Top-level Help Tests
// ============================================================================

mod top_level {
    use super::*;

    #[test]
    fn help_flag_works() {
        bindcheck()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("allow-list"));
    }

    #[test]
    fn version_flag_works() {
        bindcheck()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("bindcheck"));
    }

    #[test]
    fn help_shows_all_commands() {
        bindcheck()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("list"))
            .stdout(predicate::str::contains("inspect"))
            .stdout(predicate::str::contains("parse"))
            .stdout(predicate::str::contains("check"))
            .stdout(predicate::str::contains("version"));
    }

    #[test]
    fn help_shows_global_options() {
        bindcheck()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--format"))
            .stdout(predicate::str::contains("--config"))
            .stdout(predicate::str::contains("--binary"))
            .stdout(predicate::str::contains("--keep-datadirs"));
    }
}

// ============================================================================
// Subcommand Help Tests
// ============================================================================

mod subcommands {
    use super::*;

    #[test]
    fn run_help_mentions_only() {
        bindcheck()
            .args(["run", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--only"));
    }

    #[test]
    fn inspect_help_mentions_pid() {
        bindcheck()
            .args(["inspect", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--pid"));
    }

    #[test]
    fn parse_help_mentions_default_port() {
        bindcheck()
            .args(["parse", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--default-port"));
    }
}

// ============================================================================
// Informational Commands
// ============================================================================

mod informational {
    use super::*;

    #[test]
    fn version_json() {
        let output = bindcheck().arg("version").output().unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["bindcheck_version"], env!("CARGO_PKG_VERSION"));
        assert!(json["schema_version"].is_string());
    }

    #[test]
    fn list_json_has_ten_scenarios() {
        let output = bindcheck()
            .env_remove("BINDCHECK_CONFIG")
            .env("XDG_CONFIG_HOME", "/nonexistent")
            .arg("list")
            .output()
            .unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["count"], 10);
        assert_eq!(json["scenarios"][0]["name"], "default-loopback-dual-stack");
        assert_eq!(json["scenarios"][9]["expected"], "confirmed_deny");
    }

    #[test]
    fn list_summary_is_names() {
        bindcheck()
            .env_remove("BINDCHECK_CONFIG")
            .env("XDG_CONFIG_HOME", "/nonexistent")
            .args(["list", "--format", "summary"])
            .assert()
            .success()
            .stdout(predicate::str::contains("explicit-ipv4-multi-port\n"));
    }

    #[test]
    fn parse_bracketed_ipv6() {
        bindcheck()
            .args(["parse", "[::1]:8332", "--format", "summary"])
            .assert()
            .success()
            .stdout("[::1]:8332\n");
    }

    #[test]
    fn parse_applies_default_port() {
        let output = bindcheck()
            .args(["parse", "127.0.0.1", "--default-port", "18443"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["canonical"], "127.0.0.1:18443");
        assert_eq!(json["family"], "ipv4");
        assert_eq!(json["hex"], "7f000001");
        assert!(json["port"].is_null());
    }
}
