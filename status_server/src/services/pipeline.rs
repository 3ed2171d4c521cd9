//! Per-event pipeline shared by every transport:
//! intake → (store update) → aggregate → notify.

use thiserror::Error;

use crate::services::intake_service::{EventIntake, IntakeOutcome};
use crate::services::notify_service::{Connector, Notifier, NotifyReport, TcpConnector};
use crate::services::store_service::StoreError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("intake worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("event queue is closed")]
    QueueClosed,
}

/// Result of dispatching one message.
#[derive(Debug)]
pub struct Dispatched {
    pub outcome: IntakeOutcome,
    /// Aggregate status, computed only after a store update.
    pub passing: Option<bool>,
    pub report: Option<NotifyReport>,
}

pub struct Pipeline<C = TcpConnector> {
    intake: EventIntake,
    notifier: Notifier<C>,
}

impl<C: Connector> Pipeline<C> {
    pub fn new(intake: EventIntake, notifier: Notifier<C>) -> Self {
        Self { intake, notifier }
    }

    pub fn intake(&self) -> &EventIntake {
        &self.intake
    }

    /// Process one raw message that arrived on `transport`.
    ///
    /// Store I/O runs on the blocking pool; the notification is awaited
    /// in place, so a transport handles one event fully before the next.
    pub async fn dispatch(
        &self,
        transport: &'static str,
        payload: Vec<u8>,
    ) -> Result<Dispatched, DispatchError> {
        crate::metrics::event_received(transport);

        let intake = self.intake.clone();
        let processed = tokio::task::spawn_blocking(move || -> Result<_, StoreError> {
            let outcome = intake.process(&payload)?;
            let passing = outcome
                .triggers_notification()
                .then(|| intake.store().aggregate());
            Ok((outcome, passing))
        })
        .await
        .map_err(DispatchError::from)
        .and_then(|r| r.map_err(DispatchError::from));

        let (outcome, passing) = match processed {
            Ok(processed) => processed,
            Err(e) => {
                crate::metrics::store_error();
                tracing::error!(transport, "Build status update lost: {e}");
                return Err(e);
            }
        };

        let report = match passing {
            Some(passing) => {
                crate::metrics::aggregate_computed(passing);
                tracing::info!(transport, passing, "Notifying indicator");
                Some(self.notifier.notify(passing).await)
            }
            None => {
                crate::metrics::event_ignored(outcome.as_str());
                None
            }
        };

        Ok(Dispatched {
            outcome,
            passing,
            report,
        })
    }
}
