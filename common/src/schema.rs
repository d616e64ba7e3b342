// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Typed schemas for the RRS documents and upstream wire formats.
//!
//! The dynamic document payload (`dynamic-data.yaml`) and the
//! critical-service registries (`critical-service-config.json`) are decoded
//! into the records here at every boundary; unknown or malformed fields are
//! rejected instead of being carried along untyped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamp keys used inside the dynamic document.
pub const TS_INIT: &str = "init_timestamp";
pub const TS_START_API: &str = "start_timestamp_api";
pub const TS_START_RMS: &str = "start_timestamp_rms";
pub const TS_START_K8S_MONITORING: &str = "start_timestamp_k8s_monitoring";
pub const TS_END_K8S_MONITORING: &str = "end_timestamp_k8s_monitoring";
pub const TS_START_CEPH_MONITORING: &str = "start_timestamp_ceph_monitoring";
pub const TS_END_CEPH_MONITORING: &str = "end_timestamp_ceph_monitoring";

/// Component states the notification bus is asked to report.
pub const HMNFD_STATES: [&str; 6] = ["Ready", "On", "Off", "Empty", "Unknown", "Populated"];

/// Hardware states under which a component counts as healthy when
/// classifying a rack-versus-node failure.
pub const HEALTHY_HW_STATES: [&str; 3] = ["On", "Ready", "Populated"];

/// Returns the current UTC time in the document timestamp format.
pub fn utc_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Lifecycle state of the monitoring daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RmsState {
    Init,
    InitFail,
    Ready,
    Waiting,
    Started,
    FailNotified,
    Monitoring,
    InternalFailure,
}

impl std::fmt::Display for RmsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RmsState::Init => "Init",
            RmsState::InitFail => "InitFail",
            RmsState::Ready => "Ready",
            RmsState::Waiting => "Waiting",
            RmsState::Started => "Started",
            RmsState::FailNotified => "FailNotified",
            RmsState::Monitoring => "Monitoring",
            RmsState::InternalFailure => "InternalFailure",
        };
        f.write_str(s)
    }
}

/// Per-subsystem monitoring state. The empty string means the loop has never
/// run in the lifetime of the dynamic document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubsystemState {
    #[default]
    #[serde(rename = "")]
    NotRun,
    Started,
    Completed,
}

/// `state` section of the dynamic document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rms_state: Option<RmsState>,
    #[serde(default)]
    pub k8s_monitoring: SubsystemState,
    #[serde(default)]
    pub ceph_monitoring: SubsystemState,
}

/// Kubernetes node condition as recorded in the rack map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Ready,
    NotReady,
    Unknown,
}

/// Storage daemon state as reported by the storage orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsdStatus {
    Up,
    Down,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub name: String,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsdEntry {
    pub name: String,
    pub status: OsdStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNodeEntry {
    pub name: String,
    pub status: NodeStatus,
    pub osds: Vec<OsdEntry>,
}

/// Rack map: every labelled node appears in exactly one rack bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneSection {
    #[serde(default)]
    pub k8s_zones: BTreeMap<String, Vec<NodeEntry>>,
    #[serde(default)]
    pub ceph_zones: BTreeMap<String, Vec<StorageNodeEntry>>,
}

/// Placement of the RRS pod itself, recorded once at initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PodPlacement {
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub rack: String,
}

/// Payload stored under `dynamic-data.yaml` in the dynamic document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamicData {
    #[serde(default)]
    pub state: StateSection,
    #[serde(default)]
    pub timestamps: BTreeMap<String, String>,
    #[serde(default)]
    pub zone: ZoneSection,
    #[serde(default)]
    pub cray_rrs_pod: PodPlacement,
}

impl DynamicData {
    /// Decodes the YAML payload; schema violations are surfaced as `Corrupt`.
    pub fn from_yaml(content: &str) -> crate::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> crate::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Workload controller kinds tracked for critical services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceKind::Deployment => "Deployment",
            ServiceKind::StatefulSet => "StatefulSet",
            ServiceKind::DaemonSet => "DaemonSet",
        };
        f.write_str(s)
    }
}

/// Readiness verdict for a critical service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Configured,
    PartiallyConfigured,
    Unconfigured,
}

/// Rack-balance verdict, serialized as the literal strings consumed by
/// operators ("true" / "false" / "NA").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Balanced {
    #[serde(rename = "true")]
    True,
    #[serde(rename = "false")]
    False,
    #[serde(rename = "NA")]
    NotApplicable,
}

/// Operator-authored registry entry in the static document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalServiceStatic {
    pub namespace: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
}

/// Registry entry enriched by the evaluator in the dynamic document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalServiceDynamic {
    pub namespace: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub status: ServiceStatus,
    pub balanced: Balanced,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalServicesStatic {
    pub critical_services: BTreeMap<String, CriticalServiceStatic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalServicesDynamic {
    pub critical_services: BTreeMap<String, CriticalServiceDynamic>,
}

/// Timer tunables from the static document, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timers {
    pub k8s_pre_monitoring_delay: u64,
    pub k8s_monitoring_polling_interval: u64,
    pub k8s_monitoring_total_time: u64,
    pub ceph_pre_monitoring_delay: u64,
    pub ceph_monitoring_polling_interval: u64,
    pub ceph_monitoring_total_time: u64,
}

impl Default for Timers {
    fn default() -> Self {
        Timers {
            k8s_pre_monitoring_delay: 40,
            k8s_monitoring_polling_interval: 60,
            k8s_monitoring_total_time: 600,
            ceph_pre_monitoring_delay: 60,
            ceph_monitoring_polling_interval: 60,
            ceph_monitoring_total_time: 600,
        }
    }
}

impl Timers {
    /// Reads the six timers from the static document data, substituting the
    /// default for any key that is absent or unparseable.
    pub fn from_static_data(data: &BTreeMap<String, String>) -> Self {
        let defaults = Timers::default();
        let read = |key: &str, fallback: u64| -> u64 {
            match data.get(key).map(|v| v.trim().parse::<u64>()) {
                Some(Ok(v)) => v,
                Some(Err(_)) => {
                    tracing::warn!("Timer {} is not a valid number, using default", key);
                    fallback
                }
                None => fallback,
            }
        };
        Timers {
            k8s_pre_monitoring_delay: read("k8s_pre_monitoring_delay", defaults.k8s_pre_monitoring_delay),
            k8s_monitoring_polling_interval: read(
                "k8s_monitoring_polling_interval",
                defaults.k8s_monitoring_polling_interval,
            ),
            k8s_monitoring_total_time: read("k8s_monitoring_total_time", defaults.k8s_monitoring_total_time),
            ceph_pre_monitoring_delay: read("ceph_pre_monitoring_delay", defaults.ceph_pre_monitoring_delay),
            ceph_monitoring_polling_interval: read(
                "ceph_monitoring_polling_interval",
                defaults.ceph_monitoring_polling_interval,
            ),
            ceph_monitoring_total_time: read("ceph_monitoring_total_time", defaults.ceph_monitoring_total_time),
        }
    }
}

// Upstream wire formats
////////////////////////////////////////////////////////////////////////////

/// One entry from the hardware inventory component listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HwComponent {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Role", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "SubRole", default, skip_serializing_if = "Option::is_none")]
    pub sub_role: Option<String>,
}

/// Response body of the hardware inventory component listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HwComponentArray {
    #[serde(rename = "Components", default)]
    pub components: Vec<HwComponent>,
}

/// Extra properties of a system layout entry; only the fields RRS consumes
/// are modelled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlsExtraProperties {
    #[serde(rename = "Aliases", default)]
    pub aliases: Vec<String>,
    #[serde(rename = "Role", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// One entry from the system layout hardware search, mapping node aliases to
/// component xnames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlsEntry {
    #[serde(rename = "Xname")]
    pub xname: String,
    #[serde(rename = "Parent", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(rename = "ExtraProperties", default)]
    pub extra_properties: SlsExtraProperties,
}

/// One subscription entry from the notification bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScnSubscription {
    #[serde(rename = "SubscriberAgent", default)]
    pub subscriber_agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScnSubscriptionList {
    #[serde(rename = "SubscriptionList", default)]
    pub subscription_list: Vec<ScnSubscription>,
}

/// Subscription request posted to the notification bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScnSubscribePost {
    #[serde(rename = "Components")]
    pub components: Vec<String>,
    #[serde(rename = "States")]
    pub states: Vec<String>,
    #[serde(rename = "Enabled")]
    pub enabled: bool,
    #[serde(rename = "Url")]
    pub url: String,
}

/// State-change notification delivered to the `/scn` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScnNotification {
    #[serde(rename = "Components", default)]
    pub components: Vec<String>,
    #[serde(rename = "State", default)]
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_state_serializes_to_document_values() {
        assert_eq!(serde_yaml::to_string(&RmsState::Ready).unwrap().trim(), "Ready");
        assert_eq!(
            serde_yaml::to_string(&RmsState::InternalFailure).unwrap().trim(),
            "InternalFailure"
        );
        let parsed: RmsState = serde_yaml::from_str("FailNotified").unwrap();
        assert_eq!(parsed, RmsState::FailNotified);
    }

    #[test]
    fn test_subsystem_state_empty_string_means_never_run() {
        let parsed: SubsystemState = serde_yaml::from_str("\"\"").unwrap();
        assert_eq!(parsed, SubsystemState::NotRun);
        assert_eq!(
            serde_yaml::to_string(&SubsystemState::Completed).unwrap().trim(),
            "Completed"
        );
    }

    #[test]
    fn test_dynamic_data_round_trip() {
        let yaml = r#"
state:
  rms_state: Ready
  k8s_monitoring: Started
  ceph_monitoring: ""
timestamps:
  init_timestamp: "2025-06-01T10:00:00Z"
zone:
  k8s_zones:
    rack-1:
      - name: ncn-m001
        status: Ready
  ceph_zones:
    rack-1:
      - name: ncn-s001
        status: Ready
        osds:
          - name: osd.0
            status: up
cray_rrs_pod:
  node: ncn-w001
  zone: rack-1
  rack: x3000
"#;
        let data = DynamicData::from_yaml(yaml).unwrap();
        assert_eq!(data.state.rms_state, Some(RmsState::Ready));
        assert_eq!(data.state.k8s_monitoring, SubsystemState::Started);
        assert_eq!(data.zone.k8s_zones["rack-1"][0].status, NodeStatus::Ready);
        assert_eq!(data.zone.ceph_zones["rack-1"][0].osds[0].status, OsdStatus::Up);
        assert_eq!(data.cray_rrs_pod.rack, "x3000");

        let dumped = data.to_yaml().unwrap();
        let reparsed = DynamicData::from_yaml(&dumped).unwrap();
        assert_eq!(reparsed.zone, data.zone);
    }

    #[test]
    fn test_dynamic_data_rejects_unknown_fields() {
        let yaml = "state: {}\nbogus_field: 1\n";
        assert!(DynamicData::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_balanced_serializes_to_operator_strings() {
        let svc = CriticalServiceDynamic {
            namespace: "kube-system".to_string(),
            kind: ServiceKind::Deployment,
            status: ServiceStatus::Configured,
            balanced: Balanced::NotApplicable,
        };
        let json = serde_json::to_string(&svc).unwrap();
        assert!(json.contains("\"balanced\":\"NA\""));
        assert!(json.contains("\"type\":\"Deployment\""));
    }

    #[test]
    fn test_timers_fall_back_to_defaults() {
        let mut data = BTreeMap::new();
        data.insert("k8s_monitoring_total_time".to_string(), "300".to_string());
        data.insert("ceph_pre_monitoring_delay".to_string(), "not-a-number".to_string());
        let timers = Timers::from_static_data(&data);
        assert_eq!(timers.k8s_monitoring_total_time, 300);
        assert_eq!(timers.ceph_pre_monitoring_delay, 60);
        assert_eq!(timers.k8s_pre_monitoring_delay, 40);
    }

    #[test]
    fn test_scn_notification_parses_bus_payload() {
        let body = r#"{"Components": ["x3000c0s1b0n0"], "State": "Off"}"#;
        let scn: ScnNotification = serde_json::from_str(body).unwrap();
        assert_eq!(scn.components, vec!["x3000c0s1b0n0"]);
        assert_eq!(scn.state, "Off");
    }
}
