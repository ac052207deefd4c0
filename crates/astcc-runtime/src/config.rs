//! Daemon configuration: command line merged over an optional TOML file.
//!
//! Precedence is CLI/env, then the file, then built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use astcc_ami::{DEFAULT_MANAGER_CONF, DEFAULT_PORT, SessionOptions};
use astcc_core::{ChannelResolver, DEFAULT_SEPARATOR, DeviceResolver, SuffixResolver};
use astcc_hw::HardwareConfig;

use crate::cli::Cli;

/// Config file layout. Unknown top-level keys are rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub manager: ManagerSection,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub manager_conf: Option<PathBuf>,
    pub keepalive_secs: Option<u64>,
    pub events: Option<String>,
}

impl std::fmt::Debug for ManagerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerSection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("manager_conf", &self.manager_conf)
            .field("keepalive_secs", &self.keepalive_secs)
            .field("events", &self.events)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverMode {
    /// Strip the per-call suffix: `DAHDI/1-1` → `DAHDI/1`.
    #[default]
    Device,
    /// Use the channel name as is.
    Channel,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    #[serde(default)]
    pub mode: ResolverMode,
    #[serde(default = "default_separator")]
    pub separator: char,
}

fn default_separator() -> char {
    DEFAULT_SEPARATOR
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mode: ResolverMode::default(),
            separator: default_separator(),
        }
    }
}

impl ResolverConfig {
    pub fn build(&self) -> Box<dyn DeviceResolver> {
        match self.mode {
            ResolverMode::Device => Box::new(SuffixResolver::new(self.separator)),
            ResolverMode::Channel => Box::new(ChannelResolver),
        }
    }
}

/// Everything the daemon needs to run.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub session: SessionOptions,
    pub resolver: ResolverConfig,
    pub hardware: HardwareConfig,
}

impl DaemonConfig {
    /// Read the config file named on the command line (if any) and merge.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    pub fn merge(cli: &Cli, file: FileConfig) -> anyhow::Result<Self> {
        let manager = file.manager;

        let Some(username) = cli
            .username
            .clone()
            .or(manager.username)
            .filter(|u| !u.is_empty())
        else {
            bail!("manager username is required (-u/--username or [manager] username)");
        };

        let session = SessionOptions {
            host: cli
                .host
                .clone()
                .or(manager.host)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: cli.port.or(manager.port).unwrap_or(DEFAULT_PORT),
            username,
            password: cli.password.clone().or(manager.password),
            manager_conf: cli
                .manager_conf
                .clone()
                .or(manager.manager_conf)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MANAGER_CONF)),
            keepalive: manager
                .keepalive_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            events: manager.events,
        };

        Ok(Self {
            session,
            resolver: file.resolver,
            hardware: file.hardware,
        })
    }
}

fn read_file(path: &Path) -> anyhow::Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("invalid config file {}", path.display()))
}
