//! astcc-core: coin-line dispatch engine.
//! Event record, disposition table, device resolution, hardware capability
//! trait and the dispatcher that ties them together. No IO.

pub mod controller;
pub mod device;
pub mod dispatch;
pub mod disposition;
pub mod event;

pub use controller::{ActionResult, CoinController, HardwareError};
pub use device::{
    ChannelResolver, DEFAULT_SEPARATOR, DeviceId, DeviceResolver, MAX_DEVICE_NAME_LEN,
    ResolutionError, SuffixResolver, device_name,
};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use disposition::{COIN_DISPOSITION_EVENT, Disposition, HardwareAction, UnknownDisposition};
pub use event::ManagerEvent;
