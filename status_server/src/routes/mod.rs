//! HTTP routes: event intake, status page, status API, health.

pub mod api;
pub mod events;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::services::event_queue::EventQueue;
use crate::services::notify_service::Connector;
use crate::services::pipeline::Pipeline;
use crate::services::store_service::StatusStore;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Serial worker handling `POST /` bodies.
    pub events: EventQueue,
    store: Arc<StatusStore>,
}

impl AppState {
    /// Starts the HTTP event worker; call from within a Tokio runtime.
    pub fn new<C: Connector + 'static>(pipeline: Arc<Pipeline<C>>) -> Self {
        let store = Arc::clone(pipeline.intake().store());
        Self {
            events: EventQueue::spawn("http", pipeline),
            store,
        }
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }
}

/// Build the server's Axum router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            get(crate::dashboard::status_page).post(events::post_event),
        )
        .route("/api/status", get(api::status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
