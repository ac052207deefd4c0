//! Serial-line backend.
//!
//! Each device maps to a tty (or any writable path) driven by a line
//! controller that accepts one ASCII command per line, `<command>\r\n`.
//! Ports are opened on first use and dropped after a failed write so the
//! next action reopens them.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use astcc_core::{DeviceId, HardwareAction, HardwareError};

use crate::latch::Actuator;

/// Command strings sent for each action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialCommands {
    pub coin_return: String,
    pub coin_collect: String,
    pub operator_attached: String,
    pub operator_released: String,
    pub operator_ringback: String,
}

impl Default for SerialCommands {
    fn default() -> Self {
        Self {
            coin_return: "RETURN".to_owned(),
            coin_collect: "COLLECT".to_owned(),
            operator_attached: "ATTACH".to_owned(),
            operator_released: "RELEASE".to_owned(),
            operator_ringback: "RINGBACK".to_owned(),
        }
    }
}

impl SerialCommands {
    pub fn command(&self, action: HardwareAction) -> &str {
        match action {
            HardwareAction::CoinReturn => &self.coin_return,
            HardwareAction::CoinCollect => &self.coin_collect,
            HardwareAction::OperatorAttached => &self.operator_attached,
            HardwareAction::OperatorReleased => &self.operator_released,
            HardwareAction::OperatorRingback => &self.operator_ringback,
        }
    }
}

#[derive(Debug)]
struct SerialLine {
    path: PathBuf,
    port: Option<File>,
}

#[derive(Debug)]
pub struct SerialActuator {
    lines: HashMap<DeviceId, SerialLine>,
    commands: SerialCommands,
}

impl SerialActuator {
    pub fn new(commands: SerialCommands) -> Self {
        Self {
            lines: HashMap::new(),
            commands,
        }
    }

    /// Map `device` to the port at `path`. Replaces any earlier mapping.
    pub fn add_line(&mut self, device: DeviceId, path: impl Into<PathBuf>) {
        self.lines.insert(
            device,
            SerialLine {
                path: path.into(),
                port: None,
            },
        );
    }

    pub fn port_for(&self, device: &DeviceId) -> Option<&Path> {
        self.lines.get(device).map(|line| line.path.as_path())
    }
}

impl Actuator for SerialActuator {
    fn backend(&self) -> &'static str {
        "serial"
    }

    fn actuate(&mut self, device: &DeviceId, action: HardwareAction) -> Result<(), HardwareError> {
        let line = self
            .lines
            .get_mut(device)
            .ok_or_else(|| HardwareError::UnknownDevice(device.clone()))?;
        let command = self.commands.command(action);

        let mut port = match line.port.take() {
            Some(port) => port,
            None => {
                tracing::debug!("opening {} for {device}", line.path.display());
                OpenOptions::new()
                    .write(true)
                    .open(&line.path)
                    .map_err(|source| HardwareError::Io {
                        target: line.path.display().to_string(),
                        source,
                    })?
            }
        };

        let written = port
            .write_all(format!("{command}\r\n").as_bytes())
            .and_then(|()| port.flush());
        match written {
            Ok(()) => {
                tracing::debug!("sent {command} to {}", line.path.display());
                line.port = Some(port);
                Ok(())
            }
            Err(source) => {
                tracing::debug!(
                    "write to {} failed, port will be reopened: {source}",
                    line.path.display()
                );
                Err(HardwareError::Io {
                    target: line.path.display().to_string(),
                    source,
                })
            }
        }
    }
}
