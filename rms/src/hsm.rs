// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Hardware inventory access and failure classification.
//!
//! The inventory reports every management component's xname and hardware
//! state. A state-change notification is classified as a rack failure when
//! every component sharing the reported component's rack prefix is in a
//! non-healthy state, and as a node failure otherwise.

use tracing::{debug, info, warn};

use common::k8s::ClusterClient;
use common::schema::{HwComponent, HwComponentArray, SlsEntry, HEALTHY_HW_STATES};
use common::setting::{get_settings, REQUESTS_TIMEOUT};
use common::{Result, RrsError};

const AUTH_SECRET_NAME: &str = "admin-client-auth";
const AUTH_SECRET_NAMESPACE: &str = "default";
const AUTH_SECRET_KEY: &str = "client-secret";

const MANAGEMENT_SUB_ROLES: [&str; 3] = ["Master", "Worker", "Storage"];

/// Classification outcome for one reported component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Every component in the rack is unhealthy.
    Rack { rack: String },
    /// Only a subset of the rack is unhealthy.
    Node { rack: String, failed: Vec<String> },
}

/// HTTP client for the management API gateway. Certificate verification is
/// disabled until the gateway endpoints carry trusted certificates.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUESTS_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| RrsError::Internal(format!("failed to build HTTP client: {}", e)))
}

/// Fetches an access token for the management API gateway using the client
/// credentials stored in the cluster.
pub async fn fetch_token(cluster: &ClusterClient, http: &reqwest::Client) -> Result<String> {
    let client_secret = cluster
        .read_secret_key(AUTH_SECRET_NAMESPACE, AUTH_SECRET_NAME, AUTH_SECRET_KEY)
        .await?;
    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", "admin-client"),
        ("client_secret", client_secret.as_str()),
    ];
    let response = http
        .post(&get_settings().keycloak_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| RrsError::Transient(format!("token request failed: {}", e)))?;
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| RrsError::Corrupt(format!("token response is not JSON: {}", e)))?;
    body.get("access_token")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| RrsError::Corrupt("token response carries no access_token".to_string()))
}

/// Fetches the management components from the hardware inventory, filtered to
/// the master/worker/storage sub-roles.
pub async fn fetch_components(http: &reqwest::Client, token: &str) -> Result<Vec<HwComponent>> {
    let url = format!("{}/State/Components?role=Management", get_settings().hsm_url);
    debug!("Fetching hardware inventory from {}", url);
    let response = http
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| RrsError::Transient(format!("inventory request failed: {}", e)))?
        .error_for_status()
        .map_err(|e| RrsError::Transient(format!("inventory request rejected: {}", e)))?;
    let array: HwComponentArray = response
        .json()
        .await
        .map_err(|e| RrsError::Corrupt(format!("inventory response malformed: {}", e)))?;
    Ok(array
        .components
        .into_iter()
        .filter(|c| {
            c.sub_role
                .as_deref()
                .map(|r| MANAGEMENT_SUB_ROLES.contains(&r))
                .unwrap_or(false)
        })
        .collect())
}

/// Fetches the management node entries from the system layout search.
pub async fn fetch_sls_hardware(http: &reqwest::Client, token: &str) -> Result<Vec<SlsEntry>> {
    let url = format!("{}/search/hardware?type=comptype_node", get_settings().sls_url);
    let response = http
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| RrsError::Transient(format!("layout request failed: {}", e)))?
        .error_for_status()
        .map_err(|e| RrsError::Transient(format!("layout request rejected: {}", e)))?;
    response
        .json::<Vec<SlsEntry>>()
        .await
        .map_err(|e| RrsError::Corrupt(format!("layout response malformed: {}", e)))
}

/// Xnames of all management components, used as the subscription target set.
pub fn management_xnames(components: &[HwComponent]) -> Vec<String> {
    components.iter().map(|c| c.id.clone()).collect()
}

/// Resolves a node alias (hostname) to its component xname.
pub fn xname_for_alias(entries: &[SlsEntry], alias: &str) -> Option<String> {
    entries
        .iter()
        .find(|e| e.extra_properties.aliases.iter().any(|a| a == alias))
        .map(|e| e.xname.clone())
}

/// Rack portion of an xname: everything before the chassis designator
/// (`x3000c0s1b0n0` → `x3000`).
pub fn rack_id(xname: &str) -> Option<&str> {
    match xname.find('c') {
        Some(idx) if idx > 0 => Some(&xname[..idx]),
        _ => None,
    }
}

/// Classifies one reported component against the inventory snapshot. Returns
/// `None` when the component is not part of the management inventory.
pub fn classify_failure(xname: &str, components: &[HwComponent]) -> Option<FailureKind> {
    let known = components.iter().any(|c| c.id == xname);
    if !known {
        warn!("No matching component found in inventory for {}", xname);
        return None;
    }
    let rack = rack_id(xname)?.to_string();

    let rack_components: Vec<&HwComponent> = components
        .iter()
        .filter(|c| c.id.starts_with(rack.as_str()))
        .collect();
    for comp in &rack_components {
        debug!("ID: {}, State: {}", comp.id, comp.state);
    }

    let failed: Vec<String> = rack_components
        .iter()
        .filter(|c| !HEALTHY_HW_STATES.contains(&c.state.as_str()))
        .map(|c| c.id.clone())
        .collect();

    if failed.len() == rack_components.len() {
        Some(FailureKind::Rack { rack })
    } else {
        Some(FailureKind::Node { rack, failed })
    }
}

/// Logs the failure classification for every reported component.
pub fn report_failures(components: &[String], inventory: &[HwComponent]) {
    for xname in components {
        info!("Node {} has failed", xname);
        match classify_failure(xname, inventory) {
            Some(FailureKind::Rack { rack }) => {
                info!("All the nodes in rack {} are not healthy - RACK FAILURE", rack);
            }
            Some(FailureKind::Node { rack, failed }) => {
                info!("Some nodes in rack {} are down. Failed nodes: {:?}", rack, failed);
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::schema::SlsExtraProperties;

    fn component(id: &str, state: &str) -> HwComponent {
        HwComponent {
            id: id.to_string(),
            state: state.to_string(),
            role: Some("Management".to_string()),
            sub_role: Some("Worker".to_string()),
        }
    }

    #[test]
    fn test_rack_id_extraction() {
        assert_eq!(rack_id("x3000c0s1b0n0"), Some("x3000"));
        assert_eq!(rack_id("x3001c0s1b75n75"), Some("x3001"));
        assert_eq!(rack_id("c0s1"), None);
        assert_eq!(rack_id("x3000"), None);
    }

    #[test]
    fn test_classify_rack_failure_when_all_siblings_unhealthy() {
        let inventory = vec![
            component("x3000c0s1b0n0", "Off"),
            component("x3000c0s2b0n0", "Standby"),
            component("x3001c0s1b0n0", "Ready"),
        ];
        assert_eq!(
            classify_failure("x3000c0s1b0n0", &inventory),
            Some(FailureKind::Rack {
                rack: "x3000".to_string()
            })
        );
    }

    #[test]
    fn test_classify_node_failure_when_rack_partially_healthy() {
        let inventory = vec![
            component("x3000c0s1b0n0", "Off"),
            component("x3000c0s2b0n0", "Ready"),
        ];
        assert_eq!(
            classify_failure("x3000c0s1b0n0", &inventory),
            Some(FailureKind::Node {
                rack: "x3000".to_string(),
                failed: vec!["x3000c0s1b0n0".to_string()],
            })
        );
    }

    #[test]
    fn test_classify_unknown_component_is_skipped() {
        let inventory = vec![component("x3000c0s1b0n0", "Ready")];
        assert_eq!(classify_failure("x9999c0s1b0n0", &inventory), None);
    }

    #[test]
    fn test_xname_for_alias() {
        let entries = vec![SlsEntry {
            xname: "x3000c0s1b0n0".to_string(),
            parent: None,
            extra_properties: SlsExtraProperties {
                aliases: vec!["ncn-w001".to_string()],
                role: Some("Management".to_string()),
            },
        }];
        assert_eq!(
            xname_for_alias(&entries, "ncn-w001"),
            Some("x3000c0s1b0n0".to_string())
        );
        assert_eq!(xname_for_alias(&entries, "ncn-w002"), None);
    }
}
