//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "astcc",
    version,
    about = "Asterisk coin controller bridge",
    long_about = "Listens for CoinDisposition events on the Asterisk Manager \
                  Interface and drives the coin line hardware accordingly."
)]
pub struct Cli {
    /// Manager host (default: 127.0.0.1)
    #[arg(short = 'l', long, env = "ASTCC_HOST")]
    pub host: Option<String>,

    /// Manager port (default: 5038)
    #[arg(short = 'P', long, env = "ASTCC_PORT")]
    pub port: Option<u16>,

    /// Manager username
    #[arg(short = 'u', long, env = "ASTCC_USERNAME")]
    pub username: Option<String>,

    /// Manager password; read from manager.conf when omitted and the host is local
    #[arg(short = 'p', long, env = "ASTCC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// TOML config file
    #[arg(short = 'c', long, env = "ASTCC_CONFIG")]
    pub config: Option<PathBuf>,

    /// manager.conf used for password discovery
    #[arg(long, env = "ASTCC_MANAGER_CONF")]
    pub manager_conf: Option<PathBuf>,
}
