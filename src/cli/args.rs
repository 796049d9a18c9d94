//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tunblock - intercept traffic to blocked IPv4 addresses over a TUN tunnel
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to config.toml (defaults to the per-user config directory)
    #[arg(long, global = true, env = "TUNBLOCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the blocklist store (overrides [store].path)
    #[arg(long, global = true, env = "TUNBLOCK_BLOCKLIST")]
    pub blocklist: Option<PathBuf>,

    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the interactive console and control the tunnel
    Run,
    /// Add an IPv4 address to the saved blocklist
    Block {
        /// Address in dotted-quad form, e.g. 192.168.0.102
        ip: String,
    },
    /// Remove an IPv4 address from the saved blocklist
    Unblock {
        /// Address in dotted-quad form
        ip: String,
    },
    /// Show the saved blocklist
    List,
}
