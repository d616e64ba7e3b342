// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Environment-driven settings for the RRS daemons.
//!
//! The three document identifiers (`namespace`, `static_cm_name`,
//! `dynamic_cm_name`) have no sane defaults and are validated with
//! [`validate`] before a daemon accepts work. Everything else falls back to
//! the cluster-standard endpoints and timer values.

use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

/// Key inside the dynamic document holding the YAML state payload.
pub const DYNAMIC_DATA_KEY: &str = "dynamic-data.yaml";
/// Key holding the critical-service registry in both documents.
pub const CRITICAL_SERVICE_KEY: &str = "critical-service-config.json";

/// Bounded retry budget for subscription, lock-release and upstream calls.
pub const MAX_RETRIES: u32 = 3;
/// Initial retry delay; doubled on each attempt.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);
/// Per-call timeout on outbound HTTP requests.
pub const REQUESTS_TIMEOUT: Duration = Duration::from_secs(10);
/// Poll interval while waiting for a contended document lock.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on the lock wait before `LockTimeout` is returned.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(120);
/// Period of the main control loop.
pub const MAIN_LOOP_INTERVAL: Duration = Duration::from_secs(600);

static SETTINGS: OnceLock<Settings> = OnceLock::new();

#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Namespace holding both RRS documents.
    pub namespace: String,
    /// Name of the operator-authored static document.
    pub static_cm_name: String,
    /// Name of the runtime dynamic document.
    pub dynamic_cm_name: String,
    /// Hardware State Manager base URL.
    pub hsm_url: String,
    /// System Layout Service base URL (node alias → xname resolution).
    pub sls_url: String,
    /// Hardware notification fanout daemon base URL.
    pub hmnfd_url: String,
    /// Token endpoint used to authenticate against the management API gateway.
    pub keycloak_url: String,
    /// Callback URL handed to the notification bus for SCN delivery.
    pub scn_callback_url: String,
    /// Where the apiserver reaches the rms daemon.
    pub rms_url: String,
}

fn parse_settings() -> Settings {
    let builder = config::Config::builder()
        .set_default("namespace", "")
        .and_then(|b| b.set_default("static_cm_name", ""))
        .and_then(|b| b.set_default("dynamic_cm_name", ""))
        .and_then(|b| {
            b.set_default("hsm_url", "https://api-gw-service-nmn.local/apis/smd/hsm/v2")
        })
        .and_then(|b| b.set_default("sls_url", "https://api-gw-service-nmn.local/apis/sls/v1"))
        .and_then(|b| {
            b.set_default(
                "hmnfd_url",
                "https://api-gw-service-nmn.local/apis/hmnfd/hmi/v2",
            )
        })
        .and_then(|b| {
            b.set_default(
                "keycloak_url",
                "https://api-gw-service-nmn.local/keycloak/realms/shasta/protocol/openid-connect/token",
            )
        })
        .and_then(|b| {
            b.set_default(
                "scn_callback_url",
                "http://cray-rrs-rms.rack-resiliency.svc.cluster.local:8551/scn",
            )
        })
        .and_then(|b| b.set_default("rms_url", "http://localhost:8551"));

    builder
        .expect("static defaults are well-formed")
        .add_source(config::Environment::default())
        .build()
        .and_then(|c| c.try_deserialize::<Settings>())
        .expect("settings deserialize from defaults and environment")
}

/// Process-wide settings, resolved once from the environment.
pub fn get_settings() -> &'static Settings {
    SETTINGS.get_or_init(parse_settings)
}

/// Checks the three mandatory document identifiers. Missing any is fatal to
/// the caller (exit code 1).
pub fn validate(settings: &Settings) -> crate::Result<()> {
    for (key, value) in [
        ("namespace", &settings.namespace),
        ("static_cm_name", &settings.static_cm_name),
        ("dynamic_cm_name", &settings.dynamic_cm_name),
    ] {
        if value.is_empty() {
            return Err(crate::RrsError::ConfigMissing(key.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_missing_identifiers() {
        let settings = Settings {
            namespace: "rack-resiliency".to_string(),
            static_cm_name: String::new(),
            dynamic_cm_name: "rrs-mon-dynamic".to_string(),
            hsm_url: String::new(),
            sls_url: String::new(),
            hmnfd_url: String::new(),
            keycloak_url: String::new(),
            scn_callback_url: String::new(),
            rms_url: String::new(),
        };
        match validate(&settings) {
            Err(crate::RrsError::ConfigMissing(key)) => assert_eq!(key, "static_cm_name"),
            other => panic!("expected ConfigMissing, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_validate_accepts_complete_identifiers() {
        let settings = Settings {
            namespace: "rack-resiliency".to_string(),
            static_cm_name: "rrs-mon-static".to_string(),
            dynamic_cm_name: "rrs-mon-dynamic".to_string(),
            hsm_url: String::new(),
            sls_url: String::new(),
            hmnfd_url: String::new(),
            keycloak_url: String::new(),
            scn_callback_url: String::new(),
            rms_url: String::new(),
        };
        assert!(validate(&settings).is_ok());
    }
}
