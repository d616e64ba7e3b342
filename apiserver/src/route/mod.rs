// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! REST routes of the read API daemon.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use common::configmap::DocStore;
use common::k8s::ClusterClient;
use common::schema::{CriticalServicesStatic, DynamicData};
use common::setting::DYNAMIC_DATA_KEY;
use common::RrsError;

use crate::services::critical_services::{
    self, CriticalServiceList, CriticalServiceStatusList,
};
use crate::services::zones;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocStore>,
    pub cluster: ClusterClient,
    pub static_doc: String,
    pub dynamic_doc: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(message: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn internal_error(message: &str) -> ApiError {
    error!("Internal server error: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
        }),
    )
}

fn from_rrs_error(e: RrsError) -> ApiError {
    match e {
        RrsError::NotFound(what) => not_found(&format!("{} not found", what)),
        RrsError::BadRequest(msg) => bad_request(&msg),
        other => internal_error(&other.to_string()),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz/ready", get(healthz))
        .route("/healthz/live", get(healthz))
        .route("/version", get(version))
        .route("/zones", get(get_zones))
        .route("/zones/:zone_name", get(get_zone))
        .route(
            "/criticalservices",
            get(get_critical_services).patch(patch_critical_services),
        )
        .route("/criticalservices/status", get(get_critical_services_status))
        .route(
            "/criticalservices/status/:service_name",
            get(get_critical_service_status),
        )
        .route("/criticalservices/:service_name", get(get_critical_service))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({}))
}

async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn dynamic_payload(state: &AppState) -> Result<DynamicData, ApiError> {
    let data = state
        .store
        .read(&state.dynamic_doc)
        .await
        .map_err(from_rrs_error)?;
    let yaml = data
        .get(DYNAMIC_DATA_KEY)
        .ok_or_else(|| internal_error("dynamic document payload is missing"))?;
    DynamicData::from_yaml(yaml).map_err(|e| internal_error(&e.to_string()))
}

// Zones

async fn get_zones(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    debug!("GET /zones");
    let payload = dynamic_payload(&state).await?;
    if let Some(information) = zones::zones_missing_information(&payload.zone) {
        return Ok(Json(json!({ "Information": information })));
    }
    let listing = zones::list_zones(&payload.zone);
    serde_json::to_value(listing)
        .map(Json)
        .map_err(|e| internal_error(&e.to_string()))
}

async fn get_zone(
    Path(zone_name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    debug!("GET /zones/{}", zone_name);
    if !zones::valid_zone_name(&zone_name) {
        return Err(bad_request("Invalid zone name"));
    }
    let payload = dynamic_payload(&state).await?;
    if let Some(information) = zones::zones_missing_information(&payload.zone) {
        return Ok(Json(json!({ "Information": information })));
    }
    match zones::describe_zone(&zone_name, &payload.zone) {
        Some(report) => serde_json::to_value(report)
            .map(Json)
            .map_err(|e| internal_error(&e.to_string())),
        None => Err(not_found("Zone not found")),
    }
}

// Critical services: registry views

async fn get_critical_services(
    State(state): State<AppState>,
) -> Result<Json<CriticalServiceList>, ApiError> {
    debug!("GET /criticalservices");
    let registry = critical_services::load_static_registry(&*state.store, &state.static_doc)
        .await
        .map_err(from_rrs_error)?;
    Ok(Json(CriticalServiceList {
        critical_services: critical_services::GroupedServices {
            namespace: critical_services::group_by_namespace(&registry.critical_services),
        },
    }))
}

async fn get_critical_service(
    Path(service_name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    debug!("GET /criticalservices/{}", service_name);
    let registry = critical_services::load_static_registry(&*state.store, &state.static_doc)
        .await
        .map_err(from_rrs_error)?;
    let Some(info) = registry.critical_services.get(&service_name) else {
        return Err(not_found("Service not found"));
    };
    let report = critical_services::describe_service(&state.cluster, &service_name, info).await;
    serde_json::to_value(report)
        .map(Json)
        .map_err(|e| internal_error(&e.to_string()))
}

async fn patch_critical_services(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    debug!("PATCH /criticalservices");
    let incoming: CriticalServicesStatic = serde_json::from_value(body)
        .map_err(|e| bad_request(&format!("Invalid critical services payload: {}", e)))?;
    if incoming.critical_services.is_empty() {
        return Err(bad_request("No critical services in the payload"));
    }
    let outcome = critical_services::apply_update(&*state.store, &state.static_doc, &incoming)
        .await
        .map_err(from_rrs_error)?;
    serde_json::to_value(outcome)
        .map(Json)
        .map_err(|e| internal_error(&e.to_string()))
}

// Critical services: evaluated views

async fn get_critical_services_status(
    State(state): State<AppState>,
) -> Result<Json<CriticalServiceStatusList>, ApiError> {
    debug!("GET /criticalservices/status");
    let registry = critical_services::load_dynamic_registry(&*state.store, &state.dynamic_doc)
        .await
        .map_err(from_rrs_error)?;
    Ok(Json(CriticalServiceStatusList {
        critical_services: critical_services::GroupedServices {
            namespace: critical_services::group_status_by_namespace(&registry.critical_services),
        },
    }))
}

async fn get_critical_service_status(
    Path(service_name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    debug!("GET /criticalservices/status/{}", service_name);
    let registry = critical_services::load_dynamic_registry(&*state.store, &state.dynamic_doc)
        .await
        .map_err(from_rrs_error)?;
    let Some(info) = registry.critical_services.get(&service_name) else {
        return Err(not_found("Service not found"));
    };
    let report =
        critical_services::describe_service_status(&state.cluster, &service_name, info)
            .await
            .map_err(from_rrs_error)?;
    serde_json::to_value(report)
        .map(Json)
        .map_err(|e| internal_error(&e.to_string()))
}
