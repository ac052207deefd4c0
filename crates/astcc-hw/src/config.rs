//! `[hardware]` configuration table.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use astcc_core::HardwareAction;

use crate::gpio::DEFAULT_GPIO_ROOT;
use crate::serial::SerialCommands;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Mock,
    Serial,
    Gpio,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Mock => "mock",
            BackendKind::Serial => "serial",
            BackendKind::Gpio => "gpio",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HardwareConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// mock: actions that fail with `Rejected`.
    #[serde(default)]
    pub fail: Vec<HardwareAction>,
    #[serde(default)]
    pub lines: Vec<LineConfig>,
    /// serial: command overrides.
    #[serde(default)]
    pub commands: SerialCommands,
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u64,
}

/// One coin line. Which fields are required depends on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineConfig {
    pub device: String,
    pub port: Option<PathBuf>,
    pub coin_return_pin: Option<u32>,
    pub coin_collect_pin: Option<u32>,
    pub keypad_pin: Option<u32>,
    pub ringback_pin: Option<u32>,
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_gpio_root() -> PathBuf {
    PathBuf::from(DEFAULT_GPIO_ROOT)
}

fn default_pulse_ms() -> u64 {
    500
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            debounce_ms: default_debounce_ms(),
            fail: Vec::new(),
            lines: Vec::new(),
            commands: SerialCommands::default(),
            gpio_root: default_gpio_root(),
            pulse_ms: default_pulse_ms(),
        }
    }
}

impl HardwareConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn pulse(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }
}
