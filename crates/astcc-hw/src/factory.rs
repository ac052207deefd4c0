//! Backend construction from [`HardwareConfig`].

use std::collections::HashSet;

use thiserror::Error;

use astcc_core::{CoinController, DeviceId, HardwareAction};

use crate::config::{BackendKind, HardwareConfig, LineConfig};
use crate::gpio::{GpioActuator, GpioLine};
use crate::latch::Latched;
use crate::mock::MockActuator;
use crate::serial::SerialActuator;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("device {0} is configured more than once")]
    DuplicateDevice(String),

    #[error("hardware line with empty device name")]
    EmptyDevice,

    #[error("the {0} backend needs at least one [[hardware.lines]] entry")]
    NoLines(&'static str),

    #[error("device {device}: missing `{field}` for the {backend} backend")]
    MissingField {
        device: String,
        field: &'static str,
        backend: &'static str,
    },

    #[error("empty serial command for {0}")]
    EmptyCommand(HardwareAction),
}

/// Build the configured backend, wrapped in the actuation latch.
pub fn build_controller(config: &HardwareConfig) -> Result<Box<dyn CoinController>, BuildError> {
    check_lines(config)?;
    let debounce = config.debounce();

    let controller: Box<dyn CoinController> = match config.backend {
        BackendKind::Mock => {
            let mock = MockActuator::new(config.fail.iter().copied());
            Box::new(Latched::new(mock, debounce))
        }
        BackendKind::Serial => {
            for action in HardwareAction::ALL {
                if config.commands.command(action).trim().is_empty() {
                    return Err(BuildError::EmptyCommand(action));
                }
            }
            let mut serial = SerialActuator::new(config.commands.clone());
            for line in &config.lines {
                let port = line
                    .port
                    .clone()
                    .ok_or_else(|| missing(line, "port", BackendKind::Serial))?;
                serial.add_line(DeviceId::new(line.device.as_str()), port);
            }
            Box::new(Latched::new(serial, debounce))
        }
        BackendKind::Gpio => {
            let mut gpio = GpioActuator::new(config.gpio_root.clone(), config.pulse());
            for line in &config.lines {
                let pins = GpioLine {
                    coin_return: line
                        .coin_return_pin
                        .ok_or_else(|| missing(line, "coin_return_pin", BackendKind::Gpio))?,
                    coin_collect: line
                        .coin_collect_pin
                        .ok_or_else(|| missing(line, "coin_collect_pin", BackendKind::Gpio))?,
                    keypad: line
                        .keypad_pin
                        .ok_or_else(|| missing(line, "keypad_pin", BackendKind::Gpio))?,
                    ringback: line.ringback_pin,
                };
                gpio.add_line(DeviceId::new(line.device.as_str()), pins);
            }
            Box::new(Latched::new(gpio, debounce))
        }
    };

    tracing::info!(
        "hardware backend: {} ({} line(s), debounce {}ms)",
        config.backend.as_str(),
        config.lines.len(),
        config.debounce_ms
    );
    Ok(controller)
}

fn check_lines(config: &HardwareConfig) -> Result<(), BuildError> {
    if config.backend != BackendKind::Mock && config.lines.is_empty() {
        return Err(BuildError::NoLines(config.backend.as_str()));
    }
    let mut seen = HashSet::new();
    for line in &config.lines {
        if line.device.trim().is_empty() {
            return Err(BuildError::EmptyDevice);
        }
        if !seen.insert(line.device.as_str()) {
            return Err(BuildError::DuplicateDevice(line.device.clone()));
        }
    }
    Ok(())
}

fn missing(line: &LineConfig, field: &'static str, backend: BackendKind) -> BuildError {
    BuildError::MissingField {
        device: line.device.clone(),
        field,
        backend: backend.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use astcc_core::{Dispatcher, ManagerEvent, SuffixResolver};

    use super::*;

    fn parse(toml_str: &str) -> HardwareConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn default_is_mock() {
        let controller = build_controller(&HardwareConfig::default()).unwrap();
        assert_eq!(controller.backend(), "mock");
    }

    #[test]
    fn mock_fail_list_applies() {
        let mut controller = build_controller(&parse(r#"fail = ["coin_return"]"#)).unwrap();
        let d = DeviceId::from("DAHDI/1");
        assert!(controller.coin_return(&d).is_err());
        assert!(controller.coin_collect(&d).is_ok());
    }

    #[test]
    fn serial_backend_writes_to_port() {
        let port = tempfile::NamedTempFile::new().unwrap();
        let config = parse(&format!(
            "backend = \"serial\"\n[[lines]]\ndevice = \"DAHDI/1\"\nport = {:?}\n",
            port.path().display().to_string()
        ));
        let mut controller = build_controller(&config).unwrap();
        assert_eq!(controller.backend(), "serial");
        controller.coin_return(&DeviceId::from("DAHDI/1")).unwrap();
        assert_eq!(std::fs::read_to_string(port.path()).unwrap(), "RETURN\r\n");
    }

    #[test]
    fn duplicate_devices_rejected() {
        let config = parse(
            r#"
backend = "serial"
[[lines]]
device = "DAHDI/1"
port = "/dev/ttyUSB0"
[[lines]]
device = "DAHDI/1"
port = "/dev/ttyUSB1"
"#,
        );
        let err = build_controller(&config).err().expect("duplicate");
        assert!(matches!(err, BuildError::DuplicateDevice(d) if d == "DAHDI/1"));
    }

    #[test]
    fn serial_requires_lines_and_ports() {
        let err = build_controller(&parse(r#"backend = "serial""#))
            .err()
            .expect("no lines");
        assert!(matches!(err, BuildError::NoLines("serial")));

        let err = build_controller(&parse(
            "backend = \"serial\"\n[[lines]]\ndevice = \"DAHDI/1\"\n",
        ))
        .err()
        .expect("no port");
        assert_eq!(
            err.to_string(),
            "device DAHDI/1: missing `port` for the serial backend"
        );
    }

    #[test]
    fn empty_serial_command_rejected() {
        let config = parse(
            "backend = \"serial\"\n[commands]\ncoin_return = \" \"\n[[lines]]\ndevice = \"DAHDI/1\"\nport = \"/dev/null\"\n",
        );
        let err = build_controller(&config).err().expect("empty command");
        assert!(matches!(
            err,
            BuildError::EmptyCommand(HardwareAction::CoinReturn)
        ));
    }

    #[test]
    fn gpio_requires_pins() {
        let err = build_controller(&parse(
            "backend = \"gpio\"\n[[lines]]\ndevice = \"DAHDI/1\"\ncoin_return_pin = 17\ncoin_collect_pin = 18\n",
        ))
        .err()
        .expect("no keypad pin");
        assert!(matches!(
            err,
            BuildError::MissingField {
                field: "keypad_pin",
                ..
            }
        ));

        let controller = build_controller(&parse(
            "backend = \"gpio\"\n[[lines]]\ndevice = \"DAHDI/1\"\ncoin_return_pin = 17\ncoin_collect_pin = 18\nkeypad_pin = 27\n",
        ))
        .unwrap();
        assert_eq!(controller.backend(), "gpio");
    }

    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(str::to_owned)
                .collect()
        }

        fn at(&self, level: &str) -> Vec<String> {
            self.lines()
                .into_iter()
                .filter(|line| line.split_whitespace().next() == Some(level))
                .collect()
        }
    }

    /// Dispatch one coin event through `controller` and return what was
    /// printed at the default level.
    fn dispatch_logged(controller: Box<dyn CoinController>, disposition: &str) -> LogCapture {
        let mut dispatcher = Dispatcher::new(controller, SuffixResolver::default());
        let event: ManagerEvent = [
            ("Event", "CoinDisposition"),
            ("Channel", "DAHDI/1-1"),
            ("Disposition", disposition),
        ]
        .into_iter()
        .collect();

        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::with_default(subscriber, || dispatcher.on_event(event));
        capture
    }

    #[test]
    fn mock_backend_event_prints_one_line() {
        let controller = build_controller(&HardwareConfig::default()).unwrap();
        let logs = dispatch_logged(controller, "CoinCollectOperatorReleased");
        let lines = logs.lines();
        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("Coin event on channel DAHDI/1-1: CoinCollectOperatorReleased"));
    }

    #[test]
    fn failed_serial_write_reported_once() {
        let full = std::path::Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let config = parse(
            "backend = \"serial\"\n[[lines]]\ndevice = \"DAHDI/1\"\nport = \"/dev/full\"\n",
        );
        let controller = build_controller(&config).unwrap();
        let logs = dispatch_logged(controller, "CoinReturn");

        let errors = logs.at("ERROR");
        assert_eq!(errors.len(), 1, "{:?}", logs.lines());
        assert!(errors[0].contains("Coin operation (CoinReturn) failed on device DAHDI/1"));
        assert!(logs.at("WARN").is_empty(), "{:?}", logs.lines());
    }
}
