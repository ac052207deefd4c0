//! Daemon loop: one manager session feeding one dispatch worker.
//!
//! The session's connection task pushes events into a bounded channel; a
//! single blocking worker drains it through the [`Dispatcher`], so hardware
//! actions run one at a time and in arrival order.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use astcc_ami::{DisconnectReason, EventStream, ManagerSession, SessionError, SessionState};
use astcc_core::{CoinController, DeviceResolver, DispatchOutcome, Dispatcher};

use crate::config::DaemonConfig;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("AMI was forcibly disconnected: {0}")]
    ForcedDisconnect(String),

    #[error("event dispatcher stopped unexpectedly")]
    DispatcherStopped,
}

/// Run until `shutdown` is cancelled or the session is lost.
///
/// Returns `Ok(())` after a requested shutdown, once queued events have
/// been dispatched. A forced disconnect halts the worker before its next
/// event and returns [`DaemonError::ForcedDisconnect`] without waiting for
/// an action already in progress.
pub async fn run_daemon(
    config: DaemonConfig,
    controller: Box<dyn CoinController>,
    shutdown: CancellationToken,
) -> Result<(), DaemonError> {
    let (mut session, events) = ManagerSession::start(&config.session).await?;
    tracing::info!(
        "listening for coin events (backend: {})",
        controller.backend()
    );

    let dispatcher = Dispatcher::new(controller, config.resolver.build());
    let halt = CancellationToken::new();
    let mut worker = tokio::task::spawn_blocking({
        let halt = halt.clone();
        move || dispatch_loop(dispatcher, events, halt)
    });

    tokio::select! {
        biased;

        reason = session.disconnected() => {
            halt.cancel();
            disconnect_result(reason)
        }
        () = shutdown.cancelled() => {
            tracing::info!("shutting down");
            session.stop().await;
            match worker.await {
                Ok(handled) => tracing::debug!("dispatcher drained after {handled} event(s)"),
                Err(e) => tracing::warn!("dispatcher task failed: {e}"),
            }
            Ok(())
        }
        result = &mut worker => {
            if let Err(e) = result {
                tracing::debug!("dispatcher task: {e}");
            }
            // The event channel also closes when the manager drops us; the
            // session state is published before that happens.
            if let SessionState::Disconnected(reason) = session.state() {
                return disconnect_result(reason);
            }
            session.stop().await;
            Err(DaemonError::DispatcherStopped)
        }
    }
}

fn disconnect_result(reason: DisconnectReason) -> Result<(), DaemonError> {
    match reason {
        DisconnectReason::Forced(reason) => Err(DaemonError::ForcedDisconnect(reason)),
        DisconnectReason::Requested => Ok(()),
    }
}

/// Blocking worker body. Returns the number of events handled.
fn dispatch_loop<C, R>(
    mut dispatcher: Dispatcher<C, R>,
    mut events: EventStream,
    halt: CancellationToken,
) -> u64
where
    C: CoinController,
    R: DeviceResolver,
{
    let mut handled = 0;
    while let Some(event) = events.blocking_recv() {
        if halt.is_cancelled() {
            tracing::debug!("dispatcher halted, dropping pending events");
            break;
        }
        if let DispatchOutcome::Dispatched { results, .. } = dispatcher.on_event(event) {
            tracing::trace!("dispatched {} action(s)", results.len());
        }
        handled += 1;
    }
    handled
}
