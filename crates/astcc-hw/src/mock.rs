//! In-memory backend. Logs and journals actuations instead of driving a line.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use astcc_core::{DeviceId, HardwareAction, HardwareError};

use crate::latch::Actuator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actuation {
    pub device: DeviceId,
    pub action: HardwareAction,
}

/// Shared view of a mock backend's successful actuations.
#[derive(Debug, Clone, Default)]
pub struct MockJournal(Arc<Mutex<Vec<Actuation>>>);

impl MockJournal {
    pub fn entries(&self) -> Vec<Actuation> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, actuation: Actuation) {
        self.lock().push(actuation);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Actuation>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Default)]
pub struct MockActuator {
    journal: MockJournal,
    fail: HashSet<HardwareAction>,
}

impl MockActuator {
    /// Actions listed in `fail` are rejected instead of journaled.
    pub fn new(fail: impl IntoIterator<Item = HardwareAction>) -> Self {
        Self {
            journal: MockJournal::default(),
            fail: fail.into_iter().collect(),
        }
    }

    pub fn journal(&self) -> MockJournal {
        self.journal.clone()
    }
}

impl Actuator for MockActuator {
    fn backend(&self) -> &'static str {
        "mock"
    }

    fn actuate(&mut self, device: &DeviceId, action: HardwareAction) -> Result<(), HardwareError> {
        if self.fail.contains(&action) {
            return Err(HardwareError::Rejected {
                action,
                device: device.clone(),
            });
        }
        tracing::debug!("mock: {action} on {device}");
        self.journal.push(Actuation {
            device: device.clone(),
            action,
        });
        Ok(())
    }
}
