//! Event classification and dispatch.
//!
//! [`Dispatcher::on_event`] takes one manager event, decides whether it is a
//! coin disposition, resolves the line, and runs the mapped hardware actions.
//! Every per-event failure is logged once and contained here; nothing is
//! propagated to the session.
//!
//! Log lines:
//! - unrelated event: none
//! - recognised coin event: one info line
//! - missing header: one error line
//! - bad channel / unknown disposition: one warning
//! - any failed action: one aggregated error line

use crate::controller::{ActionResult, CoinController};
use crate::device::{DeviceId, DeviceResolver, ResolutionError};
use crate::disposition::{COIN_DISPOSITION_EVENT, Disposition, HardwareAction};
use crate::event::ManagerEvent;

/// What happened to one event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Not a coin disposition event.
    Ignored,
    /// Coin disposition event without a required header.
    ProtocolViolation { missing: &'static str },
    /// Channel could not be mapped to a device.
    Unresolved(ResolutionError),
    /// Disposition outside the dispatch table.
    UnknownDisposition { device: DeviceId, disposition: String },
    /// Actions ran; `results` is in invocation order.
    Dispatched {
        device: DeviceId,
        disposition: Disposition,
        results: Vec<ActionResult>,
    },
}

impl DispatchOutcome {
    /// Actions that reported failure, in invocation order.
    pub fn failed_actions(&self) -> Vec<HardwareAction> {
        match self {
            DispatchOutcome::Dispatched { results, .. } => results
                .iter()
                .filter(|r| !r.succeeded())
                .map(|r| r.action)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Actions that were attempted, in invocation order.
    pub fn attempted_actions(&self) -> Vec<HardwareAction> {
        match self {
            DispatchOutcome::Dispatched { results, .. } => {
                results.iter().map(|r| r.action).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Single-threaded event sink driving a [`CoinController`].
pub struct Dispatcher<C, R> {
    controller: C,
    resolver: R,
}

impl<C, R> Dispatcher<C, R>
where
    C: CoinController,
    R: DeviceResolver,
{
    pub fn new(controller: C, resolver: R) -> Self {
        Self {
            controller,
            resolver,
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Handle one event. The event is consumed and released before this
    /// returns, whatever the outcome.
    pub fn on_event(&mut self, event: ManagerEvent) -> DispatchOutcome {
        self.handle(&event)
    }

    fn handle(&mut self, event: &ManagerEvent) -> DispatchOutcome {
        if event.name() != Some(COIN_DISPOSITION_EVENT) {
            return DispatchOutcome::Ignored;
        }

        let Some(channel) = event.get("Channel") else {
            tracing::error!("{COIN_DISPOSITION_EVENT} event without Channel header, dropped");
            return DispatchOutcome::ProtocolViolation { missing: "Channel" };
        };
        let Some(raw_disposition) = event.get("Disposition") else {
            tracing::error!(
                "{COIN_DISPOSITION_EVENT} event on {channel} without Disposition header, dropped"
            );
            return DispatchOutcome::ProtocolViolation {
                missing: "Disposition",
            };
        };

        tracing::info!("Coin event on channel {channel}: {raw_disposition}");

        let device = match self.resolver.resolve(channel) {
            Ok(device) => device,
            Err(e) => {
                tracing::warn!("{e}");
                return DispatchOutcome::Unresolved(e);
            }
        };

        let disposition = match raw_disposition.parse::<Disposition>() {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("{e} on device {device}, no action taken");
                return DispatchOutcome::UnknownDisposition {
                    device,
                    disposition: raw_disposition.to_owned(),
                };
            }
        };

        // Best effort: every action runs even if an earlier one failed.
        let results: Vec<ActionResult> = disposition
            .actions()
            .iter()
            .map(|&action| {
                let outcome = action.invoke(&mut self.controller, &device);
                if let Err(e) = &outcome {
                    tracing::debug!(%device, %action, backend = self.controller.backend(), "{e}");
                }
                ActionResult {
                    device: device.clone(),
                    action,
                    outcome,
                }
            })
            .collect();

        let failed: Vec<&str> = results
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.action.as_str())
            .collect();
        if !failed.is_empty() {
            tracing::error!(
                "Coin operation ({disposition}) failed on device {device}: {}",
                failed.join(", ")
            );
        }

        DispatchOutcome::Dispatched {
            device,
            disposition,
            results,
        }
    }
}
