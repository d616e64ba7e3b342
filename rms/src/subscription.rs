// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Idempotent management of the hardware notification subscription.
//!
//! The daemon asks the notification bus to deliver state-change
//! notifications for every management component to its `/scn` endpoint. An
//! existing subscription owned by the `rms` agent is left untouched.

use tracing::{error, info};

use common::k8s::ClusterClient;
use common::retry::with_retries;
use common::schema::{ScnSubscribePost, ScnSubscriptionList, HMNFD_STATES};
use common::setting::get_settings;
use common::{Result, RrsError};

use crate::hsm;
use crate::state_manager::StateManager;

const AGENT_NAME: &str = "rms";

/// Ensures the SCN subscription exists, creating it when absent.
pub async fn ensure_subscription(state: &StateManager, cluster: &ClusterClient) -> Result<()> {
    info!("Checking the notification bus subscription for SCN delivery");
    let settings = get_settings();
    let http = hsm::http_client()?;
    let token = hsm::fetch_token(cluster, &http).await?;

    let get_url = format!("{}/subscriptions", settings.hmnfd_url);
    let list: ScnSubscriptionList = with_retries("subscription list fetch", || {
        let http = http.clone();
        let token = token.clone();
        let url = get_url.clone();
        async move {
            let response = http
                .get(&url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| RrsError::Transient(e.to_string()))?
                .error_for_status()
                .map_err(|e| RrsError::Transient(e.to_string()))?;
            response
                .json::<ScnSubscriptionList>()
                .await
                .map_err(|e| RrsError::Corrupt(e.to_string()))
        }
    })
    .await?;

    if list
        .subscription_list
        .iter()
        .any(|s| s.subscriber_agent == AGENT_NAME)
    {
        info!("{} is already present in the subscription list", AGENT_NAME);
        return Ok(());
    }

    info!(
        "{} not present in the subscription list, creating it ...",
        AGENT_NAME
    );

    // The subscription is registered against the rack recorded for this pod
    // at initialization.
    let subscriber = state.dynamic_payload().await?.cray_rrs_pod.rack;
    if subscriber.is_empty() {
        return Err(RrsError::Corrupt(
            "cray_rrs_pod rack is not recorded in the dynamic document".to_string(),
        ));
    }

    let components = hsm::fetch_components(&http, &token).await?;
    let xnames = hsm::management_xnames(&components);
    if xnames.is_empty() {
        error!("Management component list is empty or the inventory fetch failed");
        return Err(RrsError::NotFound("management components".to_string()));
    }

    let post_url = format!(
        "{}/subscriptions/{}/agents/{}",
        settings.hmnfd_url, subscriber, AGENT_NAME
    );
    let body = ScnSubscribePost {
        components: xnames,
        states: HMNFD_STATES.iter().map(|s| s.to_string()).collect(),
        enabled: true,
        url: settings.scn_callback_url.clone(),
    };
    with_retries("subscription create", || {
        let http = http.clone();
        let token = token.clone();
        let url = post_url.clone();
        let body = body.clone();
        async move {
            http.post(&url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await
                .map_err(|e| RrsError::Transient(e.to_string()))?
                .error_for_status()
                .map_err(|e| RrsError::Transient(e.to_string()))?;
            Ok(())
        }
    })
    .await?;

    info!("Successfully subscribed for SCN notifications");
    Ok(())
}
