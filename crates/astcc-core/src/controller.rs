//! Hardware action capability set.
//!
//! The core never talks to hardware directly. Backends (serial line, GPIO,
//! mock) implement [`CoinController`] and are selected at startup.

use thiserror::Error;

use crate::device::DeviceId;
use crate::disposition::HardwareAction;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("no hardware line configured for device {0}")]
    UnknownDevice(DeviceId),

    #[error("{action} is not supported by the {backend} backend")]
    Unsupported {
        action: HardwareAction,
        backend: &'static str,
    },

    #[error("hardware io error on {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("controller rejected {action} on {device}")]
    Rejected {
        action: HardwareAction,
        device: DeviceId,
    },
}

/// Physical coin-line operations.
///
/// Every operation must be idempotent: asking for a state the line is already
/// in succeeds without actuating again. Calls are made from a single thread,
/// one at a time, and may block for the duration of the actuation.
pub trait CoinController: Send {
    /// Short backend name for log lines.
    fn backend(&self) -> &'static str;

    fn coin_return(&mut self, device: &DeviceId) -> Result<(), HardwareError>;
    fn coin_collect(&mut self, device: &DeviceId) -> Result<(), HardwareError>;
    fn operator_attached(&mut self, device: &DeviceId) -> Result<(), HardwareError>;
    fn operator_released(&mut self, device: &DeviceId) -> Result<(), HardwareError>;
    fn operator_ringback(&mut self, device: &DeviceId) -> Result<(), HardwareError>;
}

impl<T: CoinController + ?Sized> CoinController for Box<T> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn coin_return(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        (**self).coin_return(device)
    }

    fn coin_collect(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        (**self).coin_collect(device)
    }

    fn operator_attached(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        (**self).operator_attached(device)
    }

    fn operator_released(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        (**self).operator_released(device)
    }

    fn operator_ringback(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        (**self).operator_ringback(device)
    }
}

impl<T: CoinController + ?Sized> CoinController for &mut T {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn coin_return(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        (**self).coin_return(device)
    }

    fn coin_collect(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        (**self).coin_collect(device)
    }

    fn operator_attached(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        (**self).operator_attached(device)
    }

    fn operator_released(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        (**self).operator_released(device)
    }

    fn operator_ringback(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        (**self).operator_ringback(device)
    }
}

/// Result of one attempted action, kept only for aggregation and logging.
#[derive(Debug)]
pub struct ActionResult {
    pub device: DeviceId,
    pub action: HardwareAction,
    pub outcome: Result<(), HardwareError>,
}

impl ActionResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}
