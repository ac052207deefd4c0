//! sysfs GPIO backend.
//!
//! Pins live under `<root>/gpio<N>/value`. A pin that is not yet exported
//! is exported through `<root>/export` and switched to output on first use.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use astcc_core::{DeviceId, HardwareAction, HardwareError};

use crate::latch::Actuator;

pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// Tries at driving a pulsed pin back low before giving up.
const RELEASE_ATTEMPTS: usize = 3;

/// Pin assignment for one coin line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioLine {
    pub coin_return: u32,
    pub coin_collect: u32,
    /// High while an operator is attached (keypad disabled).
    pub keypad: u32,
    pub ringback: Option<u32>,
}

#[derive(Debug)]
pub struct GpioActuator {
    root: PathBuf,
    pulse: Duration,
    lines: HashMap<DeviceId, GpioLine>,
    exported: HashSet<u32>,
}

impl GpioActuator {
    pub fn new(root: impl Into<PathBuf>, pulse: Duration) -> Self {
        Self {
            root: root.into(),
            pulse,
            lines: HashMap::new(),
            exported: HashSet::new(),
        }
    }

    pub fn add_line(&mut self, device: DeviceId, line: GpioLine) {
        self.lines.insert(device, line);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn ensure_exported(&mut self, pin: u32) -> Result<(), HardwareError> {
        if self.exported.contains(&pin) {
            return Ok(());
        }
        let dir = self.pin_dir(pin);
        if !dir.exists() {
            tracing::debug!("exporting gpio{pin}");
            write_file(&self.root.join("export"), &pin.to_string())?;
            write_file(&dir.join("direction"), "out")?;
        }
        self.exported.insert(pin);
        Ok(())
    }

    fn set(&mut self, pin: u32, high: bool) -> Result<(), HardwareError> {
        self.ensure_exported(pin)?;
        let value = if high { "1" } else { "0" };
        write_file(&self.pin_dir(pin).join("value"), value)
    }

    fn pulse(&mut self, pin: u32) -> Result<(), HardwareError> {
        self.set(pin, true)?;
        std::thread::sleep(self.pulse);
        // A pin left high keeps the relay energised.
        let value = self.pin_dir(pin).join("value");
        retry(RELEASE_ATTEMPTS, || write_file(&value, "0"))
    }
}

fn retry(
    attempts: usize,
    mut op: impl FnMut() -> Result<(), HardwareError>,
) -> Result<(), HardwareError> {
    let mut result = op();
    for attempt in 1..attempts {
        let Err(e) = &result else {
            break;
        };
        tracing::debug!("attempt {attempt} failed: {e}, retrying");
        result = op();
    }
    result
}

fn write_file(path: &Path, value: &str) -> Result<(), HardwareError> {
    std::fs::write(path, value).map_err(|source| HardwareError::Io {
        target: path.display().to_string(),
        source,
    })
}

impl Actuator for GpioActuator {
    fn backend(&self) -> &'static str {
        "gpio"
    }

    fn actuate(&mut self, device: &DeviceId, action: HardwareAction) -> Result<(), HardwareError> {
        let line = *self
            .lines
            .get(device)
            .ok_or_else(|| HardwareError::UnknownDevice(device.clone()))?;

        match action {
            HardwareAction::CoinReturn => self.pulse(line.coin_return),
            HardwareAction::CoinCollect => self.pulse(line.coin_collect),
            HardwareAction::OperatorAttached => self.set(line.keypad, true),
            HardwareAction::OperatorReleased => self.set(line.keypad, false),
            HardwareAction::OperatorRingback => match line.ringback {
                Some(pin) => self.pulse(pin),
                None => Err(HardwareError::Unsupported {
                    action,
                    backend: self.backend(),
                }),
            },
        }
    }
}
