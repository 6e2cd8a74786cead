use std::path::PathBuf;

use clap::Parser;

/// Switchboard LLM relay gateway
#[derive(Debug, Parser)]
#[command(name = "switchboard", about = "Failover relay in front of many LLM upstream channels")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchboard.toml", env = "SWITCHBOARD_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "SWITCHBOARD_LISTEN")]
    pub listen: Option<std::net::SocketAddr>,

    /// Log filter used when `RUST_LOG` is unset
    #[arg(long, default_value = "info", env = "SWITCHBOARD_LOG")]
    pub log: String,
}
