// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Notification intake and service endpoints of the monitoring daemon.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use common::k8s::ClusterClient;
use common::schema::{RmsState, ScnNotification, TS_START_API};

use crate::hsm;
use crate::state_manager::{StateField, StateManager};

/// Trigger carried from the intake to the coordinator task.
#[derive(Debug, Clone, Copy)]
pub enum ScnTrigger {
    /// A failure notification arrived.
    Notification,
    /// A previous incomplete session is resumed at startup.
    Resume,
}

#[derive(Clone)]
pub struct AppState {
    pub state: Arc<StateManager>,
    pub cluster: ClusterClient,
    pub scn_tx: mpsc::Sender<ScnTrigger>,
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn internal_error(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    error!("Internal server error: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
        }),
    )
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scn", post(handle_scn))
        .route("/api-ts", post(update_api_timestamp))
        .route("/healthz/ready", get(healthz))
        .route("/healthz/live", get(healthz))
        .route("/version", get(version))
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({}))
}

async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// Internal endpoint used by the read API daemon to record its start time.
async fn update_api_timestamp(
    State(app): State<AppState>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("Request received from the API server, updating the API start timestamp");
    match app.state.update_state_timestamp(None, Some(TS_START_API)).await {
        Ok(()) => Ok(Json(SuccessResponse {
            message: "API timestamp updated successfully".to_string(),
        })),
        Err(e) => {
            error!("Failed to update API timestamp: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to update API timestamp".to_string(),
                }),
            ))
        }
    }
}

/// Receives state-change notifications from the hardware notification bus.
async fn handle_scn(
    State(app): State<AppState>,
    Json(notification): Json<ScnNotification>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("Notification received from the hardware notification bus");

    if notification.components.is_empty() || notification.state.is_empty() {
        error!("Missing 'Components' or 'State' in the request");
        return Err(bad_request("Missing 'Components' or 'State' in the request"));
    }

    match notification.state.as_str() {
        "Off" | "Standby" => {
            warn!(
                "Components {:?} are changed to {} state",
                notification.components, notification.state
            );
            if let Err(e) = app
                .state
                .update_state_timestamp(Some(StateField::RmsState(RmsState::FailNotified)), None)
                .await
            {
                return Err(internal_error(&format!(
                    "failed to record failure notification: {}",
                    e
                )));
            }

            // Classification runs in the background so the bus is answered
            // promptly; the coordinator applies its own entry rule.
            let cluster = app.cluster.clone();
            let state = app.state.clone();
            let components = notification.components.clone();
            tokio::spawn(async move {
                check_failure_type(&state, &cluster, &components).await;
            });
            if let Err(e) = app.scn_tx.send(ScnTrigger::Notification).await {
                return Err(internal_error(&format!("failed to trigger monitoring: {}", e)));
            }
        }
        "On" => {
            for component in &notification.components {
                info!("Node {} is turned On", component);
            }
        }
        other => {
            warn!(
                "State '{}' received for {:?}, ignoring",
                other, notification.components
            );
        }
    }

    Ok(Json(SuccessResponse {
        message: "POST call received".to_string(),
    }))
}

/// Classifies the reported components as a rack or node failure and logs the
/// verdict. Inventory failures flip the RMS state to `InternalFailure`.
async fn check_failure_type(state: &StateManager, cluster: &ClusterClient, components: &[String]) {
    info!("Checking failure type (node or rack) for the received SCN");
    let inventory = async {
        let http = hsm::http_client()?;
        let token = hsm::fetch_token(cluster, &http).await?;
        hsm::fetch_components(&http, &token).await
    }
    .await;

    match inventory {
        Ok(inventory) => hsm::report_failures(components, &inventory),
        Err(e) => {
            error!("Failed to retrieve hardware inventory: {}", e);
            if let Err(persist_err) = state
                .update_state_timestamp(Some(StateField::RmsState(RmsState::InternalFailure)), None)
                .await
            {
                error!("Failed to persist InternalFailure state: {}", persist_err);
            }
        }
    }
}
