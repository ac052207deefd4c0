//! astcc-runtime: command line, configuration and the daemon loop that
//! connects a manager session to the coin-line dispatcher.

pub mod cli;
pub mod config;
pub mod daemon;

pub use config::{DaemonConfig, FileConfig, ResolverConfig, ResolverMode};
pub use daemon::{DaemonError, run_daemon};
