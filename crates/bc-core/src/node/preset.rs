//! Command-line dialects of supported targets.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::NodeOptions;
use crate::rpc::RpcCredentials;

/// How the target expects its data directory, ports and policy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// `--long-flag=value` dialect (also spoken by the bundled fake node)
    #[default]
    Generic,
    /// bitcoind in regtest mode, ports and credentials in bitcoin.conf
    Bitcoind,
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preset::Generic => write!(f, "generic"),
            Preset::Bitcoind => write!(f, "bitcoind"),
        }
    }
}

/// Per-start values the preset needs besides the scenario options.
#[derive(Debug, Clone, Copy)]
pub struct LaunchContext<'a> {
    pub datadir: &'a Path,
    pub rpc_port: u16,
    pub p2p_port: u16,
    pub credentials: &'a RpcCredentials,
}

/// Arguments and files for one launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchPlan {
    pub args: Vec<String>,
    /// Files to write before spawning, relative to the data directory.
    pub files: Vec<(PathBuf, String)>,
}

impl Preset {
    pub fn render(&self, ctx: &LaunchContext<'_>, options: &NodeOptions) -> LaunchPlan {
        match self {
            Preset::Generic => render_generic(ctx, options),
            Preset::Bitcoind => render_bitcoind(ctx, options),
        }
    }
}

fn render_generic(ctx: &LaunchContext<'_>, options: &NodeOptions) -> LaunchPlan {
    let mut args = vec![
        format!("--datadir={}", ctx.datadir.display()),
        format!("--rpc-port={}", ctx.rpc_port),
        format!("--rpc-user={}", ctx.credentials.user),
        format!("--rpc-password={}", ctx.credentials.password),
    ];
    if options.disable_wallet {
        args.push("--disable-wallet".to_string());
    }
    if options.disable_auto_listen {
        args.push("--no-listen".to_string());
    }
    args.extend(options.rpc_allow_ip.iter().map(|ip| format!("--rpc-allow-ip={ip}")));
    args.extend(options.rpc_bind.iter().map(|b| format!("--rpc-bind={b}")));
    LaunchPlan {
        args,
        files: Vec::new(),
    }
}

fn render_bitcoind(ctx: &LaunchContext<'_>, options: &NodeOptions) -> LaunchPlan {
    let conf = format!(
        "regtest=1\n[regtest]\nport={}\nrpcport={}\nrpcuser={}\nrpcpassword={}\nserver=1\nlistenonion=0\ndiscover=0\n",
        ctx.p2p_port, ctx.rpc_port, ctx.credentials.user, ctx.credentials.password
    );

    let mut args = vec![format!("-datadir={}", ctx.datadir.display())];
    if options.disable_wallet {
        args.push("-disablewallet".to_string());
    }
    if options.disable_auto_listen {
        args.push("-nolisten".to_string());
    }
    args.extend(options.rpc_allow_ip.iter().map(|ip| format!("-rpcallowip={ip}")));
    args.extend(options.rpc_bind.iter().map(|b| format!("-rpcbind={b}")));
    LaunchPlan {
        args,
        files: vec![(PathBuf::from("bitcoin.conf"), conf)],
    }
}
