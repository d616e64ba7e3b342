// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Document store and lock primitive over cluster ConfigMaps.
//!
//! Two named documents hold all shared RRS state: the operator-authored
//! static document and the runtime dynamic document. Writers serialize on a
//! sentinel ConfigMap named `<doc>-lock`: creation succeeds for exactly one
//! contender, everyone else polls until the holder deletes it.
//!
//! The lock is advisory. It has no fencing token and no TTL, which is safe
//! only because a single RRS instance runs per cluster and initialization
//! always begins by force-clearing both locks left behind by a crashed
//! predecessor. The wait is bounded: a contender gives up with
//! [`RrsError::LockTimeout`] after [`setting::LOCK_TIMEOUT`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{Result, RrsError};
use crate::setting::{LOCK_POLL_INTERVAL, LOCK_TIMEOUT, MAX_RETRIES, RETRY_DELAY};

fn lock_name(doc: &str) -> String {
    format!("{}-lock", doc)
}

/// Key/value document abstraction shared by both daemons.
///
/// The trait exists so document-driven logic can run against an in-memory
/// store in tests; production code uses [`DocumentStore`].
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Returns the document's data map. Absent document → `NotFound`,
    /// empty or missing data → `Corrupt`.
    async fn read(&self, doc: &str) -> Result<BTreeMap<String, String>>;

    /// Sets `data[key] = value` under the document's lock and replaces the
    /// document as a whole. Partial writes never reach the cluster.
    async fn update(&self, doc: &str, key: &str, value: &str) -> Result<()>;

    /// Creates `<doc>-lock`, polling while a contender holds it. Bounded by
    /// `LOCK_TIMEOUT`.
    async fn acquire(&self, doc: &str) -> Result<()>;

    /// Deletes `<doc>-lock` with exponential backoff retries.
    async fn release(&self, doc: &str) -> Result<()>;

    /// Unconditionally deletes `<doc>-lock`. Initialization only.
    async fn force_release(&self, doc: &str) -> Result<()>;
}

/// ConfigMap-backed document store.
#[derive(Clone)]
pub struct DocumentStore {
    client: Client,
    namespace: String,
}

impl DocumentStore {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn replace_data(&self, doc: &str, data: BTreeMap<String, String>) -> Result<()> {
        let api = self.api();
        let mut current = api.get(doc).await?;
        current.data = Some(data);
        api.replace(doc, &PostParams::default(), &current).await?;
        Ok(())
    }
}

#[async_trait]
impl DocStore for DocumentStore {
    async fn read(&self, doc: &str) -> Result<BTreeMap<String, String>> {
        debug!("Fetching document {} from namespace {}", doc, self.namespace);
        let cm = self.api().get(doc).await.map_err(|e| match e {
            kube::Error::Api(ref resp) if resp.code == 404 => RrsError::NotFound(doc.to_string()),
            other => RrsError::from(other),
        })?;
        match cm.data {
            Some(data) if !data.is_empty() => Ok(data),
            _ => Err(RrsError::Corrupt(format!(
                "document {} has no data map",
                doc
            ))),
        }
    }

    async fn update(&self, doc: &str, key: &str, value: &str) -> Result<()> {
        self.acquire(doc).await?;

        let result = async {
            let mut data = self.read(doc).await?;
            data.insert(key.to_string(), value.to_string());
            self.replace_data(doc, data).await
        }
        .await;

        // The lock is released on both paths; a failed release is logged by
        // release() itself and must not mask the update error.
        if let Err(release_err) = self.release(doc).await {
            error!("Failed to release lock on {}: {}", doc, release_err);
        }

        match &result {
            Ok(()) => info!("Document {} updated (key {})", doc, key),
            Err(e) => error!("Failed to update document {}: {}", doc, e),
        }
        result
    }

    async fn acquire(&self, doc: &str) -> Result<()> {
        let name = lock_name(doc);
        let lock_cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        let api = self.api();
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match api.create(&PostParams::default(), &lock_cm).await {
                Ok(_) => {
                    debug!("Acquired lock {}", name);
                    return Ok(());
                }
                Err(kube::Error::Api(resp)) if resp.code == 409 => {
                    if Instant::now() >= deadline {
                        return Err(RrsError::LockTimeout(doc.to_string()));
                    }
                    info!("Waiting for document {} lock", doc);
                    sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn release(&self, doc: &str) -> Result<()> {
        let name = lock_name(doc);
        let api = self.api();
        let mut delay = RETRY_DELAY;
        let mut last_err = None;
        for attempt in 1..=MAX_RETRIES {
            match api.delete(&name, &DeleteParams::default()).await {
                Ok(_) => {
                    debug!("Released lock {}", name);
                    return Ok(());
                }
                Err(kube::Error::Api(resp)) if resp.code == 404 => {
                    debug!("Lock {} does not exist; nothing to release", name);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Attempt {}: failed to delete lock {}: {}", attempt, name, e);
                    last_err = Some(e);
                    if attempt < MAX_RETRIES {
                        sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Err(RrsError::Transient(format!(
            "failed to delete lock {} after {} attempts: {}",
            name,
            MAX_RETRIES,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn force_release(&self, doc: &str) -> Result<()> {
        let name = lock_name(doc);
        match self.api().delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Cleared stale lock {}", name);
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_name_suffix() {
        assert_eq!(lock_name("rrs-mon-dynamic"), "rrs-mon-dynamic-lock");
    }
}
