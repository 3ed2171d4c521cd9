//! Serial event worker for transports that accept messages concurrently.
//!
//! HTTP requests are served in parallel, but events are handled one at a
//! time, each through to its notification, before the next one starts.
//! Handlers queue the body and wait for the reply. A handler that is dropped
//! (client gone, request timed out) does not cancel work it already queued.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::services::notify_service::Connector;
use crate::services::pipeline::{DispatchError, Dispatched, Pipeline};

/// Events waiting behind the one in progress.
const QUEUE_CAPACITY: usize = 64;

struct QueuedEvent {
    payload: Vec<u8>,
    reply: oneshot::Sender<Result<Dispatched, DispatchError>>,
}

/// Handle to a running worker. Cloning shares the same worker.
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<QueuedEvent>,
}

impl EventQueue {
    /// Spawn the worker feeding `pipeline` with events from `transport`.
    /// It exits once every handle has been dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<C>(transport: &'static str, pipeline: Arc<Pipeline<C>>) -> Self
    where
        C: Connector + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<QueuedEvent>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let result = pipeline.dispatch(transport, event.payload).await;
                if event.reply.send(result).is_err() {
                    tracing::debug!(transport, "Caller left before its event was handled");
                }
            }
            tracing::debug!(transport, "Event queue closed");
        });

        Self { tx }
    }

    /// Queue one raw message and wait for it to be fully handled.
    pub async fn submit(&self, payload: Vec<u8>) -> Result<Dispatched, DispatchError> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(QueuedEvent { payload, reply })
            .await
            .map_err(|_| DispatchError::QueueClosed)?;
        answer.await.map_err(|_| DispatchError::QueueClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TcpClientConfig;
    use crate::models::mask::Mask;
    use crate::services::intake_service::{EventIntake, IntakeOutcome};
    use crate::services::notify_service::Notifier;
    use crate::services::store_service::StatusStore;
    use tempfile::tempdir;

    fn queue(dir: &tempfile::TempDir) -> EventQueue {
        let store = Arc::new(StatusStore::new(dir.path().join("build_result.yml")));
        let notifier = Notifier::new(TcpClientConfig {
            port: 9,
            attempts: 0,
            ..TcpClientConfig::default()
        });
        EventQueue::spawn(
            "http",
            Arc::new(Pipeline::new(EventIntake::new(Mask::allow_all(), store), notifier)),
        )
    }

    #[tokio::test]
    async fn replies_with_the_outcome() {
        let dir = tempdir().unwrap();
        let queue = queue(&dir);

        let started = queue
            .submit(br#"{"name":"web","build":{"phase":"STARTED"}}"#.to_vec())
            .await
            .unwrap();
        let malformed = queue.submit(b"nope".to_vec()).await.unwrap();

        assert_eq!(started.outcome, IntakeOutcome::Started);
        assert_eq!(malformed.outcome, IntakeOutcome::Malformed);
    }

    #[tokio::test]
    async fn store_failures_are_returned_to_the_caller() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StatusStore::new(dir.path().join("missing").join("store.yml")));
        let notifier = Notifier::new(TcpClientConfig::default());
        let queue = EventQueue::spawn(
            "http",
            Arc::new(Pipeline::new(EventIntake::new(Mask::allow_all(), store), notifier)),
        );

        let err = queue
            .submit(br#"{"name":"web","build":{"phase":"FINISHED","status":"SUCCESS"}}"#.to_vec())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Store(_)));
    }
}
