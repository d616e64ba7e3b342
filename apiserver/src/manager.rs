// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Startup orchestration of the read API daemon.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use common::configmap::{DocStore, DocumentStore};
use common::k8s::ClusterClient;
use common::retry::with_retries;
use common::setting::{self, get_settings, REQUESTS_TIMEOUT};
use common::{Result, RrsError};

use crate::route::{self, AppState};

/// Runs the read API daemon.
pub async fn run(bind_address: &str, bind_port: u16) -> Result<()> {
    let settings = get_settings();
    setting::validate(settings)?;

    // Record the API start timestamp with the monitoring daemon before
    // accepting requests; exhaustion of the retry budget is fatal.
    notify_monitoring_daemon().await?;

    let cluster = ClusterClient::new().await?;
    let store: Arc<dyn DocStore> =
        Arc::new(DocumentStore::new(cluster.kube_client(), &settings.namespace));

    let app = route::router(AppState {
        store,
        cluster,
        static_doc: settings.static_cm_name.clone(),
        dynamic_doc: settings.dynamic_cm_name.clone(),
    });

    let addr = format!("{}:{}", bind_address, bind_port);
    info!("Starting the read API server on {}", addr);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| RrsError::Internal(format!("failed to bind to {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down the read API server");
        })
        .await
        .map_err(|e| RrsError::Internal(format!("server error: {}", e)))?;
    Ok(())
}

/// Posts the API start timestamp to the monitoring daemon.
async fn notify_monitoring_daemon() -> Result<()> {
    let url = format!("{}/api-ts", get_settings().rms_url);
    info!("Updating the API start timestamp via {}", url);
    let http = reqwest::Client::builder()
        .timeout(REQUESTS_TIMEOUT)
        .build()
        .map_err(|e| RrsError::Internal(format!("failed to build HTTP client: {}", e)))?;

    with_retries("API timestamp update", || {
        let http = http.clone();
        let url = url.clone();
        async move {
            let response = http
                .post(&url)
                .send()
                .await
                .map_err(|e| RrsError::Transient(e.to_string()))?
                .error_for_status()
                .map_err(|e| RrsError::Transient(e.to_string()))?;
            info!("Response: {}", response.status());
            Ok(())
        }
    })
    .await
    .map_err(|e| {
        error!("Failed to update the API timestamp after all retries: {}", e);
        e
    })
}
