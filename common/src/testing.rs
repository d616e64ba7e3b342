// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! In-memory [`DocStore`] used by the test suites of the daemon crates.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::configmap::DocStore;
use crate::error::{Result, RrsError};
use crate::k8s::ClusterClient;

/// Cluster client pointed at a closed local port: every call fails fast with
/// a connection error. Used to exercise degraded-cluster paths.
pub fn offline_cluster_client() -> ClusterClient {
    let uri: http::Uri = "http://127.0.0.1:1".parse().expect("static URI parses");
    let config = kube::Config::new(uri);
    ClusterClient::from_client(kube::Client::try_from(config).expect("offline client builds"))
}

/// Cluster client pointed at an unroutable address (TEST-NET): calls hang
/// until their timeout. Used where a test needs a stable window before the
/// first cluster error surfaces.
pub fn unreachable_cluster_client() -> ClusterClient {
    let uri: http::Uri = "http://192.0.2.1:80".parse().expect("static URI parses");
    let config = kube::Config::new(uri);
    ClusterClient::from_client(kube::Client::try_from(config).expect("offline client builds"))
}

/// In-memory document store with the same lock observable behavior as the
/// ConfigMap-backed store: `acquire` succeeds for one holder at a time and
/// contenders poll until release, bounded by a short timeout.
#[derive(Default)]
pub struct MemStore {
    docs: Mutex<HashMap<String, BTreeMap<String, String>>>,
    locks: Mutex<HashSet<String>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document with the given data map.
    pub fn seed(&self, doc: &str, data: BTreeMap<String, String>) {
        self.docs.lock().unwrap().insert(doc.to_string(), data);
    }

    /// Seeds a document with a single key.
    pub fn seed_key(&self, doc: &str, key: &str, value: &str) {
        let mut docs = self.docs.lock().unwrap();
        docs.entry(doc.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// True while a contender holds `<doc>-lock`.
    pub fn is_locked(&self, doc: &str) -> bool {
        self.locks.lock().unwrap().contains(doc)
    }
}

#[async_trait]
impl DocStore for MemStore {
    async fn read(&self, doc: &str) -> Result<BTreeMap<String, String>> {
        let docs = self.docs.lock().unwrap();
        match docs.get(doc) {
            Some(data) if !data.is_empty() => Ok(data.clone()),
            Some(_) => Err(RrsError::Corrupt(format!("document {} has no data map", doc))),
            None => Err(RrsError::NotFound(doc.to_string())),
        }
    }

    async fn update(&self, doc: &str, key: &str, value: &str) -> Result<()> {
        self.acquire(doc).await?;
        let result = {
            let mut docs = self.docs.lock().unwrap();
            match docs.get_mut(doc) {
                Some(data) => {
                    data.insert(key.to_string(), value.to_string());
                    Ok(())
                }
                None => Err(RrsError::NotFound(doc.to_string())),
            }
        };
        self.release(doc).await?;
        result
    }

    async fn acquire(&self, doc: &str) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(1);
        loop {
            {
                let mut locks = self.locks.lock().unwrap();
                if locks.insert(doc.to_string()) {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(RrsError::LockTimeout(doc.to_string()));
            }
            sleep(Duration::from_millis(5)).await;
        }
    }

    async fn release(&self, doc: &str) -> Result<()> {
        self.locks.lock().unwrap().remove(doc);
        Ok(())
    }

    async fn force_release(&self, doc: &str) -> Result<()> {
        self.locks.lock().unwrap().remove(doc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_mutual_exclusion() {
        let store = MemStore::new();
        store.acquire("doc").await.unwrap();
        // A second contender times out while the lock is held.
        assert!(matches!(
            store.acquire("doc").await,
            Err(RrsError::LockTimeout(_))
        ));
        store.release("doc").await.unwrap();
        store.acquire("doc").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_classifies_missing_and_empty() {
        let store = MemStore::new();
        assert!(matches!(store.read("doc").await, Err(RrsError::NotFound(_))));
        store.seed("doc", BTreeMap::new());
        assert!(matches!(store.read("doc").await, Err(RrsError::Corrupt(_))));
    }
}
