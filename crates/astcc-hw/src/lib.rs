//! astcc-hw: coin-line hardware backends.
//! Every backend is an [`Actuator`] wrapped in [`Latched`], which supplies
//! the idempotence the dispatcher relies on.

pub mod config;
pub mod factory;
pub mod gpio;
pub mod latch;
pub mod mock;
pub mod serial;

pub use config::{BackendKind, HardwareConfig, LineConfig};
pub use factory::{BuildError, build_controller};
pub use gpio::{DEFAULT_GPIO_ROOT, GpioActuator, GpioLine};
pub use latch::{ActuationLatch, Actuator, Latched};
pub use mock::{Actuation, MockActuator, MockJournal};
pub use serial::{SerialActuator, SerialCommands};
