// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Startup orchestration and the main control loop of the monitoring daemon.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{error, info, warn};

use common::configmap::{DocStore, DocumentStore};
use common::k8s::ClusterClient;
use common::schema::{RmsState, SubsystemState, TS_START_RMS};
use common::setting::{self, get_settings, MAIN_LOOP_INTERVAL};
use common::{Result, RrsError};

use crate::monitor::MonitorCoordinator;
use crate::route::{self, AppState, ScnTrigger};
use crate::state_manager::{StateField, StateManager};
use crate::subscription;

/// Runs the monitoring daemon until a shutdown signal arrives.
pub async fn run(bind_address: &str, bind_port: u16) -> Result<()> {
    let settings = get_settings();
    setting::validate(settings)?;

    let cluster = ClusterClient::new().await?;
    let store: Arc<dyn DocStore> =
        Arc::new(DocumentStore::new(cluster.kube_client(), &settings.namespace));
    let state = Arc::new(StateManager::new(store.clone(), &settings.dynamic_cm_name));

    let resume_monitoring = initial_check_and_update(&state).await?;

    let coordinator = Arc::new(MonitorCoordinator::new(
        state.clone(),
        cluster.clone(),
        store.clone(),
        &settings.static_cm_name,
        &settings.dynamic_cm_name,
    ));

    // Notifications flow from the intake to the coordinator over a channel;
    // every trigger enters the coordinator's own at-most-one-session rule.
    let (scn_tx, mut scn_rx) = mpsc::channel::<ScnTrigger>(8);
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            while let Some(trigger) = scn_rx.recv().await {
                info!("Monitoring trigger received: {:?}", trigger);
                tokio::spawn(coordinator.clone().monitoring_loop());
            }
        });
    }

    let app = route::router(AppState {
        state: state.clone(),
        cluster: cluster.clone(),
        scn_tx: scn_tx.clone(),
    });
    let addr = format!("{}:{}", bind_address, bind_port);
    info!("Starting the notification intake server on {}", addr);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| RrsError::Internal(format!("failed to bind to {}: {}", addr, e)))?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    if let Err(e) = subscription::ensure_subscription(&state, &cluster).await {
        error!("Cannot establish the notification subscription: {}", e);
        let _ = state
            .update_state_timestamp(Some(StateField::RmsState(RmsState::InternalFailure)), None)
            .await;
    }

    if resume_monitoring {
        info!("RMS was in Monitoring state, resuming the previous incomplete session");
        let _ = scn_tx.send(ScnTrigger::Resume).await;
    }

    if let Err(e) = coordinator.update_critical_services(true).await {
        error!("Initial critical service evaluation failed: {}", e);
    }
    if let Err(e) = coordinator.update_zone_status().await {
        error!("Initial zone refresh failed: {}", e);
    }

    info!("Starting the main loop");
    let control = {
        let state = state.clone();
        let coordinator = coordinator.clone();
        let cluster = cluster.clone();
        tokio::spawn(async move { main_control_loop(state, coordinator, cluster).await })
    };

    shutdown_signal().await;
    info!("Received shutdown signal, cleaning up...");
    control.abort();

    // Best-effort: record that this instance is gone so the orchestrator
    // restart is visible in the document trail.
    if let Err(e) = state
        .update_state_timestamp(Some(StateField::RmsState(RmsState::InternalFailure)), None)
        .await
    {
        error!("Failed to update state during shutdown: {}", e);
    }

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(Duration::from_secs(10), server).await {
        Ok(_) => info!("Notification intake server stopped gracefully"),
        Err(_) => warn!("Notification intake server did not stop within the grace period"),
    }
    info!("RMS shutdown complete");
    Ok(())
}

/// Startup reconciliation against the dynamic document: decides whether a
/// previous monitoring session must be resumed and stamps the daemon start.
pub async fn initial_check_and_update(state: &StateManager) -> Result<bool> {
    let mut resume_monitoring = false;
    let mut restarted = false;

    state
        .mutate_payload(|payload| {
            match payload.state.rms_state {
                Some(RmsState::Ready) => {}
                other => {
                    info!("RMS state is {:?}", other);
                    let unfinished = payload.state.k8s_monitoring == SubsystemState::Started
                        || payload.state.ceph_monitoring == SubsystemState::Started;
                    if unfinished {
                        resume_monitoring = true;
                    } else {
                        info!("Updating RMS state to Ready for this fresh run");
                        payload.state.rms_state = Some(RmsState::Ready);
                    }
                }
            }
            restarted = payload.timestamps.contains_key(TS_START_RMS);
            payload
                .timestamps
                .insert(TS_START_RMS.to_string(), common::schema::utc_timestamp());
            true
        })
        .await?;

    if restarted {
        info!("Rack Resiliency Monitoring Service is restarted post failure");
    }
    Ok(resume_monitoring)
}

/// Periodic refresh while no monitoring session is active: re-assert the
/// subscription, re-baseline the service status, refresh zone status.
async fn main_control_loop(
    state: Arc<StateManager>,
    coordinator: Arc<MonitorCoordinator>,
    cluster: ClusterClient,
) {
    loop {
        if state.get_state().await != Some(RmsState::Monitoring) {
            if let Err(e) = state
                .update_state_timestamp(Some(StateField::RmsState(RmsState::Waiting)), None)
                .await
            {
                error!("Failed to persist Waiting state: {}", e);
            }
            sleep(MAIN_LOOP_INTERVAL).await;
            if state.get_state().await == Some(RmsState::Monitoring) {
                continue;
            }
            if let Err(e) = state
                .update_state_timestamp(Some(StateField::RmsState(RmsState::Started)), None)
                .await
            {
                error!("Failed to persist Started state: {}", e);
            }
            if let Err(e) = subscription::ensure_subscription(&state, &cluster).await {
                error!("Cannot re-assert the notification subscription: {}", e);
            }
            if let Err(e) = coordinator.update_critical_services(true).await {
                error!("Critical service refresh failed: {}", e);
            }
            if let Err(e) = coordinator.update_zone_status().await {
                error!("Zone refresh failed: {}", e);
            }
        } else {
            info!("Not running the main loop as monitoring is active");
            sleep(MAIN_LOOP_INTERVAL).await;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Cannot install SIGTERM handler: {}", e),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
