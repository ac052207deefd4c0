//! Per-device actuation latch.
//!
//! Keypad actions are levels: asking for the level the line is already at
//! is a no-op. Coin return/collect and ringback are pulses: the same pulse
//! on the same device inside the debounce window is a no-op. Only
//! successful actuations are recorded, so a failed action is retried the
//! next time it is requested.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use astcc_core::{CoinController, DeviceId, HardwareAction, HardwareError};

/// Raw line driver. Performs the actuation unconditionally.
pub trait Actuator: Send {
    fn backend(&self) -> &'static str;
    fn actuate(&mut self, device: &DeviceId, action: HardwareAction) -> Result<(), HardwareError>;
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn actuate(&mut self, device: &DeviceId, action: HardwareAction) -> Result<(), HardwareError> {
        (**self).actuate(device, action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeypadLevel {
    /// Operator attached, keypad disabled.
    Disabled,
    Enabled,
}

#[derive(Debug)]
pub struct ActuationLatch {
    debounce: Duration,
    keypad: HashMap<DeviceId, KeypadLevel>,
    pulses: HashMap<(DeviceId, HardwareAction), Instant>,
}

impl ActuationLatch {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            keypad: HashMap::new(),
            pulses: HashMap::new(),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Whether `action` would change anything on `device` at `now`.
    pub fn should_actuate(&self, device: &DeviceId, action: HardwareAction, now: Instant) -> bool {
        match keypad_level(action) {
            Some(level) => self.keypad.get(device) != Some(&level),
            None => match self.pulses.get(&(device.clone(), action)) {
                Some(last) => now.saturating_duration_since(*last) >= self.debounce,
                None => true,
            },
        }
    }

    /// Record a successful actuation.
    pub fn record(&mut self, device: &DeviceId, action: HardwareAction, now: Instant) {
        match keypad_level(action) {
            Some(level) => {
                self.keypad.insert(device.clone(), level);
            }
            None => {
                self.pulses.insert((device.clone(), action), now);
            }
        }
    }
}

fn keypad_level(action: HardwareAction) -> Option<KeypadLevel> {
    match action {
        HardwareAction::OperatorAttached => Some(KeypadLevel::Disabled),
        HardwareAction::OperatorReleased => Some(KeypadLevel::Enabled),
        HardwareAction::CoinReturn
        | HardwareAction::CoinCollect
        | HardwareAction::OperatorRingback => None,
    }
}

/// [`CoinController`] over an [`Actuator`], filtered through the latch.
pub struct Latched<A> {
    actuator: A,
    latch: ActuationLatch,
}

impl<A: Actuator> Latched<A> {
    pub fn new(actuator: A, debounce: Duration) -> Self {
        Self {
            actuator,
            latch: ActuationLatch::new(debounce),
        }
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    fn apply(&mut self, device: &DeviceId, action: HardwareAction) -> Result<(), HardwareError> {
        let now = Instant::now();
        if !self.latch.should_actuate(device, action, now) {
            tracing::debug!("{action} already in effect on {device}, skipping");
            return Ok(());
        }
        self.actuator.actuate(device, action)?;
        self.latch.record(device, action, now);
        Ok(())
    }
}

impl<A: Actuator> CoinController for Latched<A> {
    fn backend(&self) -> &'static str {
        self.actuator.backend()
    }

    fn coin_return(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        self.apply(device, HardwareAction::CoinReturn)
    }

    fn coin_collect(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        self.apply(device, HardwareAction::CoinCollect)
    }

    fn operator_attached(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        self.apply(device, HardwareAction::OperatorAttached)
    }

    fn operator_released(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        self.apply(device, HardwareAction::OperatorReleased)
    }

    fn operator_ringback(&mut self, device: &DeviceId) -> Result<(), HardwareError> {
        self.apply(device, HardwareAction::OperatorRingback)
    }
}
