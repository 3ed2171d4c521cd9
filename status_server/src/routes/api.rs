//! Read-only JSON view of the status store.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;

use super::AppState;
use crate::models::status::{all_passing, StatusMap};

#[derive(Debug, Serialize)]
pub struct StatusJson {
    pub passing: bool,
    pub builds: StatusMap,
}

/// `GET /api/status`
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusJson>, StatusCode> {
    let store = state.store().clone();
    let builds = tokio::task::spawn_blocking(move || store.read())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(StatusJson {
        passing: all_passing(&builds),
        builds,
    }))
}
