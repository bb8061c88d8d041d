//! bindcheck - socket bind and RPC allow-list verification harness
//!
//! The main entry point, handling:
//! - Running the scenario catalog against a target binary
//! - Listing scenarios
//! - One-off socket inspection and address parsing
//! - Configuration and host capability checks

use std::io::IsTerminal;
use std::net::IpAddr;
use std::path::PathBuf;

use bc_common::{format_error_human, OutputFormat, ProcessId, StructuredError, SCHEMA_VERSION};
use bc_core::addr::{canonicalize, AddressSpec};
use bc_core::capabilities::detect_capabilities;
use bc_core::collect::SocketInspector;
use bc_core::config::{
    load_config, validate_config, ConfigOptions, ConfigOverrides, HarnessConfig, ResolvedConfig,
};
use bc_core::exit_codes::ExitCode;
use bc_core::logging::{
    generate_run_id, init_logging, level_from_verbosity, run_span, LogConfig, LogFormat,
};
use bc_core::node::{ControllerSettings, PortAssignment, PortSeed, Preset, ProcessController};
use bc_core::scenario::{CatalogRunner, RunReport, RunnerSettings, ScenarioCatalog};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

/// Verify that a server binds exactly the sockets it is told to and
/// enforces its RPC allow-list
#[derive(Parser)]
#[command(name = "bindcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (overrides BINDCHECK_CONFIG and the XDG location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Target binary (overrides [target] binary)
    #[arg(long, global = true, env = "BINDCHECK_BINARY")]
    binary: Option<PathBuf>,

    /// Target command-line dialect
    #[arg(long, global = true)]
    preset: Option<Preset>,

    /// Default RPC port (overrides [rpc] port and the pid-derived port)
    #[arg(long, global = true)]
    rpc_port: Option<u16>,

    /// Keep per-start data directories after the run
    #[arg(long, global = true)]
    keep_datadirs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scenario catalog against the target
    Run(RunArgs),

    /// List catalog scenarios without running anything
    List,

    /// Print the listening endpoints a process holds
    Inspect(InspectArgs),

    /// Parse an address spec and print its canonical form
    Parse(ParseArgs),

    /// Validate configuration and report host capabilities
    Check,

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Run only the named scenario (repeatable)
    #[arg(long)]
    only: Vec<String>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Process to inspect
    #[arg(long)]
    pid: u32,
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Address spec, e.g. 127.0.0.1:8332, [::1], ::1
    spec: String,

    /// Port applied when the input carries none
    #[arg(long, default_value_t = 0)]
    default_port: u16,
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(
        level_from_verbosity(cli.global.verbose, cli.global.quiet),
        cli.global.log_format,
    );
    init_logging(&log_config);

    let exit_code = match &cli.command {
        Commands::Run(args) => run_catalog(&cli.global, args),
        Commands::List => run_list(&cli.global),
        Commands::Inspect(args) => run_inspect(&cli.global, args),
        Commands::Parse(args) => run_parse(&cli.global, args),
        Commands::Check => run_check(&cli.global),
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_catalog(global: &GlobalOpts, args: &RunArgs) -> ExitCode {
    let run_id = generate_run_id();
    let span = run_span(&run_id);
    let _guard = span.enter();

    let resolved = match resolve_config(global) {
        Ok(resolved) => resolved,
        Err(err) => return output_error(global, &err),
    };
    let config = &resolved.config;

    let catalog = match ScenarioCatalog::from_config(&config.catalog).filter(&args.only) {
        Ok(catalog) => catalog,
        Err(unknown) => {
            let err = bc_common::Error::Config(format!(
                "unknown scenario name(s): {}",
                unknown.join(", ")
            ));
            output_error(global, &err);
            return ExitCode::ArgsError;
        }
    };

    let ports = PortAssignment::resolve(&config.rpc, PortSeed::from_current_process());
    let settings = match ControllerSettings::from_config(config, ports) {
        Ok(settings) => settings,
        Err(err) => return output_error(global, &err.into()),
    };
    let target = settings.binary.display().to_string();

    let inspector = SocketInspector::new();
    let capabilities = detect_capabilities(&inspector, other_loopback_ip(config));
    info!(
        %target,
        rpc_port = ports.rpc,
        scenarios = catalog.len(),
        config = ?resolved.path,
        "starting run"
    );

    let mut runner = CatalogRunner::new(
        ProcessController::new(settings),
        inspector,
        capabilities.clone(),
        RunnerSettings::from_config(config),
    );
    let results = runner.run(&catalog);
    drop(runner);

    let report = RunReport::new(run_id, target, ports, capabilities, results);
    info!(
        passed = report.summary.passed,
        failed = report.summary.failed,
        skipped = report.summary.skipped,
        "run complete"
    );
    match report.render(global.format) {
        Ok(text) => print!("{}", ensure_newline(text)),
        Err(err) => return output_error(global, &err.into()),
    }
    report.exit_code()
}

fn run_list(global: &GlobalOpts) -> ExitCode {
    let resolved = match resolve_config(global) {
        Ok(resolved) => resolved,
        Err(err) => return output_error(global, &err),
    };
    let catalog = ScenarioCatalog::from_config(&resolved.config.catalog);

    match global.format {
        OutputFormat::Json => {
            let scenarios: Vec<serde_json::Value> = catalog
                .scenarios()
                .iter()
                .map(|s| {
                    let mut value = serde_json::to_value(s).unwrap_or_default();
                    if let Some(obj) = value.as_object_mut() {
                        obj.insert(
                            "requirements".to_string(),
                            serde_json::json!(s.requirements()),
                        );
                    }
                    value
                })
                .collect();
            print_json(&serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "count": catalog.len(),
                "scenarios": scenarios,
            }));
        }
        OutputFormat::Summary => {
            for scenario in catalog.scenarios() {
                println!("{}", scenario.name());
            }
        }
        OutputFormat::Md => {
            println!("# bindcheck scenarios");
            println!();
            println!("| # | Scenario | Type | Requires | Setup |");
            println!("|---|----------|------|----------|-------|");
            for (i, scenario) in catalog.scenarios().iter().enumerate() {
                let requires: Vec<String> =
                    scenario.requirements().iter().map(|r| r.to_string()).collect();
                println!(
                    "| {} | {} | {} | {} | {} |",
                    i + 1,
                    scenario.name(),
                    scenario.kind(),
                    requires.join(", "),
                    scenario.describe()
                );
            }
        }
    }
    ExitCode::Clean
}

fn run_inspect(global: &GlobalOpts, args: &InspectArgs) -> ExitCode {
    let pid = ProcessId(args.pid);
    let binds = match SocketInspector::new().list_bound_addresses(pid) {
        Ok(binds) => binds,
        Err(err) => return output_error(global, &err.into()),
    };

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "pid": pid,
            "count": binds.len(),
            "binds": binds,
        })),
        OutputFormat::Summary => println!("{pid}: {binds}"),
        OutputFormat::Md => {
            println!("# Listening endpoints of pid {pid}");
            println!();
            for addr in &binds {
                println!("- `{addr}` ({}, {})", addr.family(), addr.to_hex());
            }
        }
    }
    ExitCode::Clean
}

fn run_parse(global: &GlobalOpts, args: &ParseArgs) -> ExitCode {
    let parsed = args.spec.parse::<AddressSpec>();
    let canonical = canonicalize(&args.spec, args.default_port);
    let (spec, canonical) = match (parsed, canonical) {
        (Ok(spec), Ok(canonical)) => (spec, canonical),
        (Err(err), _) | (_, Err(err)) => return output_error(global, &err.into()),
    };

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "input": args.spec,
            "host": spec.host().to_string(),
            "port": spec.port(),
            "family": canonical.family(),
            "hex": canonical.to_hex(),
            "canonical": canonical,
        })),
        OutputFormat::Summary => println!("{canonical}"),
        OutputFormat::Md => {
            println!("| Field | Value |");
            println!("|-------|-------|");
            println!("| input | `{}` |", args.spec);
            println!("| family | {} |", canonical.family());
            println!("| hex | `{}` |", canonical.to_hex());
            println!("| canonical | `{canonical}` |");
        }
    }
    ExitCode::Clean
}

#[derive(Serialize)]
struct CheckResult {
    check: &'static str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn run_check(global: &GlobalOpts) -> ExitCode {
    let mut results = Vec::new();
    let mut exit = ExitCode::Clean;

    let config = match resolve_config(global) {
        Ok(resolved) => {
            results.push(CheckResult {
                check: "config",
                status: "ok",
                note: Some(match &resolved.path {
                    Some(path) => format!("loaded {}", path.display()),
                    None => "using built-in defaults".to_string(),
                }),
                error: None,
            });
            Some(resolved.config)
        }
        Err(err) => {
            exit = ExitCode::for_error(&err);
            results.push(CheckResult {
                check: "config",
                status: "error",
                note: None,
                error: Some(err.to_string()),
            });
            None
        }
    };

    if let Some(config) = &config {
        let binary_check = match &config.target.binary {
            Some(path) if path.is_file() => CheckResult {
                check: "binary",
                status: "ok",
                note: Some(path.display().to_string()),
                error: None,
            },
            Some(path) => {
                exit = ExitCode::ConfigError;
                CheckResult {
                    check: "binary",
                    status: "error",
                    note: None,
                    error: Some(format!("{} is not a file", path.display())),
                }
            }
            None => CheckResult {
                check: "binary",
                status: "info",
                note: Some("no target binary configured; 'run' needs --binary".to_string()),
                error: None,
            },
        };
        results.push(binary_check);

        let caps = detect_capabilities(&SocketInspector::new(), other_loopback_ip(config));
        results.push(CheckResult {
            check: "capabilities",
            status: if caps.socket_introspection { "ok" } else { "info" },
            note: Some(caps.summary()),
            error: None,
        });
    }

    let all_ok = exit.is_success();
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "status": if all_ok { "ok" } else { "error" },
            "checks": results,
        })),
        OutputFormat::Summary => {
            println!("check: {}", if all_ok { "OK" } else { "FAILED" });
        }
        OutputFormat::Md => {
            println!("# bindcheck check");
            println!();
            for result in &results {
                let symbol = match result.status {
                    "ok" => "✓",
                    "info" => "ℹ",
                    _ => "✗",
                };
                println!("{} {}: {}", symbol, result.check, result.status);
                if let Some(note) = &result.note {
                    println!("  {}", note);
                }
                if let Some(error) = &result.error {
                    println!("  Error: {}", error);
                }
            }
        }
    }
    exit
}

fn print_version(global: &GlobalOpts) {
    let version_info = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "bindcheck_version": env!("CARGO_PKG_VERSION"),
        "rust_version": env!("CARGO_PKG_RUST_VERSION"),
    });

    match global.format {
        OutputFormat::Json => print_json(&version_info),
        _ => {
            println!("bindcheck {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Load, override and validate configuration.
fn resolve_config(global: &GlobalOpts) -> Result<ResolvedConfig, bc_common::Error> {
    let options = ConfigOptions {
        config_path: global.config.clone(),
    };
    let mut resolved = load_config(&options)?;
    resolved.config.apply_overrides(&ConfigOverrides {
        binary: global.binary.clone(),
        preset: global.preset,
        rpc_port: global.rpc_port,
        keep_datadirs: global.keep_datadirs,
    });
    validate_config(&resolved.config).map_err(|e| bc_common::Error::Config(e.to_string()))?;
    Ok(resolved)
}

fn other_loopback_ip(config: &HarnessConfig) -> IpAddr {
    config
        .catalog
        .other_loopback_ip
        .parse()
        .unwrap_or(IpAddr::from([127, 0, 0, 2]))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("failed to serialize output: {err}"),
    }
}

fn ensure_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Report an error on stderr in the selected format.
fn output_error(global: &GlobalOpts, err: &bc_common::Error) -> ExitCode {
    let exit_code = ExitCode::for_error(err);
    match global.format {
        OutputFormat::Json => {
            let structured = StructuredError::from(err);
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "status": "error",
                "exit_code": exit_code.as_i32(),
                "error": structured,
                "remediation": err.remediation(),
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&response).unwrap_or_else(|_| structured.to_json())
            );
        }
        OutputFormat::Summary => eprintln!("error: {err}"),
        OutputFormat::Md => {
            let use_color = !global.no_color && std::io::stderr().is_terminal();
            eprintln!("{}", format_error_human(err, use_color));
        }
    }
    exit_code
}
