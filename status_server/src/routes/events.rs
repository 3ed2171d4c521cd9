//! `POST /`: the HTTP form of the UDP event intake.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;

use super::AppState;
use crate::services::intake_service::IntakeOutcome;

/// Accept a build event body.
///
/// - 200 `recorded`: the store was updated and the indicator notified
/// - 202 `ignored`: filtered, started, or finished without a terminal status
/// - 400: not JSON, or not shaped like a build event
/// - 500: the store could not be written
///
/// The body goes through the HTTP event queue, so events are handled one at
/// a time and keep going if the client disconnects.
pub async fn post_event(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    match state.events.submit(body.to_vec()).await {
        Ok(dispatched) => match dispatched.outcome {
            IntakeOutcome::Recorded { .. } => (StatusCode::OK, "recorded"),
            IntakeOutcome::Malformed | IntakeOutcome::InvalidShape => {
                (StatusCode::BAD_REQUEST, "invalid payload")
            }
            IntakeOutcome::Filtered { .. }
            | IntakeOutcome::Started
            | IntakeOutcome::Unrecorded { .. } => (StatusCode::ACCEPTED, "ignored"),
        },
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store update failed"),
    }
}
