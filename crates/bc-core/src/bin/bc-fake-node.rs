//! Stand-in target binary for end-to-end tests.

use bc_core::fake_node::{FakeNode, FakeNodeArgs};
use bc_core::logging::{init_logging, LogConfig};
use clap::Parser;

fn main() {
    let args = FakeNodeArgs::parse();
    init_logging(&LogConfig::from_env(None, None));

    let node = match FakeNode::bind(&args) {
        Ok(node) => node,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };
    tracing::info!(addrs = ?node.local_addrs(), datadir = %args.datadir.display(), "fake node ready");

    if let Err(err) = node.serve() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
