// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! In-process authoritative copy of the dynamic document and the live RMS
//! state, with the at-most-one-monitoring-session flag.
//!
//! Every mutation of the persisted dynamic document goes through this
//! manager: the cache is updated and the new content is written through the
//! document store under its lock. A caller that has claimed monitoring via
//! [`StateManager::start_monitoring`] may write subsystem state keys freely,
//! but must not flip the RMS state back to `Ready`/`Started` before
//! [`StateManager::stop_monitoring`] has run.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use common::configmap::DocStore;
use common::schema::{utc_timestamp, DynamicData, RmsState, SubsystemState};
use common::setting::DYNAMIC_DATA_KEY;
use common::{Result, RrsError};

/// One field of the `state` section, written together with an optional
/// timestamp in a single document update.
#[derive(Debug, Clone, Copy)]
pub enum StateField {
    RmsState(RmsState),
    K8sMonitoring(SubsystemState),
    CephMonitoring(SubsystemState),
}

#[derive(Default)]
struct Inner {
    rms_state: Option<RmsState>,
    monitor_running: bool,
    dynamic_data: Option<BTreeMap<String, String>>,
}

pub struct StateManager {
    store: Arc<dyn DocStore>,
    dynamic_doc: String,
    inner: Mutex<Inner>,
}

impl StateManager {
    pub fn new(store: Arc<dyn DocStore>, dynamic_doc: impl Into<String>) -> Self {
        Self {
            store,
            dynamic_doc: dynamic_doc.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn set_state(&self, state: RmsState) {
        self.inner.lock().await.rms_state = Some(state);
    }

    pub async fn get_state(&self) -> Option<RmsState> {
        self.inner.lock().await.rms_state
    }

    /// Claims the monitoring session. Returns true iff no session was active.
    pub async fn start_monitoring(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.monitor_running {
            false
        } else {
            inner.monitor_running = true;
            true
        }
    }

    pub async fn stop_monitoring(&self) {
        self.inner.lock().await.monitor_running = false;
    }

    pub async fn is_monitoring(&self) -> bool {
        self.inner.lock().await.monitor_running
    }

    /// Cached dynamic document data, lazily loaded from the store.
    pub async fn dynamic_data(&self) -> Result<BTreeMap<String, String>> {
        let mut inner = self.inner.lock().await;
        if let Some(data) = &inner.dynamic_data {
            return Ok(data.clone());
        }
        let data = self.store.read(&self.dynamic_doc).await?;
        inner.dynamic_data = Some(data.clone());
        Ok(data)
    }

    pub async fn set_dynamic_data(&self, data: BTreeMap<String, String>) {
        self.inner.lock().await.dynamic_data = Some(data);
    }

    /// Writes one key of the dynamic document through the store and keeps the
    /// cache in sync. The cache is updated only after the store accepted the
    /// write, so a failed write never leaves the cache ahead of the cluster.
    pub async fn persist_key(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let mut data = self.load_locked(&mut inner).await?;
        data.insert(key.to_string(), value.to_string());
        self.store.update(&self.dynamic_doc, key, value).await?;
        inner.dynamic_data = Some(data);
        Ok(())
    }

    /// Decodes the YAML payload from the cached dynamic document.
    pub async fn dynamic_payload(&self) -> Result<DynamicData> {
        let data = self.dynamic_data().await?;
        let yaml = data.get(DYNAMIC_DATA_KEY).ok_or_else(|| {
            RrsError::Corrupt(format!("{} not found in the dynamic document", DYNAMIC_DATA_KEY))
        })?;
        DynamicData::from_yaml(yaml)
    }

    /// Atomically applies `mutate` to the decoded payload and persists the
    /// result when `mutate` returns true. The manager mutex is held across
    /// the whole read-modify-write, so concurrent writers (the two monitor
    /// loops, the intake, the main loop) cannot lose each other's updates.
    /// Returns whether the payload was persisted.
    pub async fn mutate_payload<F>(&self, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut DynamicData) -> bool,
    {
        let mut inner = self.inner.lock().await;
        let mut data = self.load_locked(&mut inner).await?;
        let yaml = data.get(DYNAMIC_DATA_KEY).ok_or_else(|| {
            RrsError::Corrupt(format!("{} not found in the dynamic document", DYNAMIC_DATA_KEY))
        })?;
        let mut payload = DynamicData::from_yaml(yaml)?;

        if !mutate(&mut payload) {
            inner.dynamic_data = Some(data);
            return Ok(false);
        }

        let new_yaml = payload.to_yaml()?;
        self.store
            .update(&self.dynamic_doc, DYNAMIC_DATA_KEY, &new_yaml)
            .await?;
        data.insert(DYNAMIC_DATA_KEY.to_string(), new_yaml);
        inner.dynamic_data = Some(data);
        // The persisted payload is authoritative for the live state.
        inner.rms_state = payload.state.rms_state;
        Ok(true)
    }

    /// Applies a state field and/or stamps a timestamp key, then persists the
    /// payload. This is the single write path for all state transitions.
    pub async fn update_state_timestamp(
        &self,
        field: Option<StateField>,
        timestamp_key: Option<&str>,
    ) -> Result<()> {
        debug!(
            "Persisting state update (field {:?}, timestamp {:?})",
            field, timestamp_key
        );
        self.mutate_payload(|payload| {
            match field {
                Some(StateField::RmsState(state)) => payload.state.rms_state = Some(state),
                Some(StateField::K8sMonitoring(state)) => payload.state.k8s_monitoring = state,
                Some(StateField::CephMonitoring(state)) => payload.state.ceph_monitoring = state,
                None => {}
            }
            if let Some(key) = timestamp_key {
                payload.timestamps.insert(key.to_string(), utc_timestamp());
            }
            true
        })
        .await
        .map(|_| ())
    }

    async fn load_locked(&self, inner: &mut Inner) -> Result<BTreeMap<String, String>> {
        if let Some(data) = &inner.dynamic_data {
            return Ok(data.clone());
        }
        let data = self.store.read(&self.dynamic_doc).await?;
        inner.dynamic_data = Some(data.clone());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::schema::{TS_START_CEPH_MONITORING, TS_START_K8S_MONITORING};
    use common::testing::MemStore;

    fn seeded_manager() -> (Arc<MemStore>, StateManager) {
        let store = Arc::new(MemStore::new());
        let payload = DynamicData::default();
        store.seed_key("rrs-mon-dynamic", DYNAMIC_DATA_KEY, &payload.to_yaml().unwrap());
        let manager = StateManager::new(store.clone(), "rrs-mon-dynamic");
        (store, manager)
    }

    #[tokio::test]
    async fn test_at_most_one_monitoring_session() {
        let (_, manager) = seeded_manager();
        assert!(manager.start_monitoring().await);
        assert!(!manager.start_monitoring().await);
        manager.stop_monitoring().await;
        assert!(manager.start_monitoring().await);
    }

    #[tokio::test]
    async fn test_persisted_state_matches_authoritative_state() {
        let (store, manager) = seeded_manager();
        manager
            .update_state_timestamp(Some(StateField::RmsState(RmsState::Ready)), None)
            .await
            .unwrap();

        assert_eq!(manager.get_state().await, Some(RmsState::Ready));
        let persisted = store.read("rrs-mon-dynamic").await.unwrap();
        let payload = DynamicData::from_yaml(&persisted[DYNAMIC_DATA_KEY]).unwrap();
        assert_eq!(payload.state.rms_state, Some(RmsState::Ready));
    }

    #[tokio::test]
    async fn test_subsystem_state_and_timestamp_written_together() {
        let (store, manager) = seeded_manager();
        manager
            .update_state_timestamp(
                Some(StateField::K8sMonitoring(SubsystemState::Started)),
                Some(TS_START_K8S_MONITORING),
            )
            .await
            .unwrap();

        let persisted = store.read("rrs-mon-dynamic").await.unwrap();
        let payload = DynamicData::from_yaml(&persisted[DYNAMIC_DATA_KEY]).unwrap();
        assert_eq!(payload.state.k8s_monitoring, SubsystemState::Started);
        assert!(payload.timestamps.contains_key(TS_START_K8S_MONITORING));
        // The RMS state itself is untouched by subsystem updates.
        assert_eq!(payload.state.rms_state, None);
    }

    #[tokio::test]
    async fn test_concurrent_subsystem_updates_are_not_lost() {
        let (store, manager) = seeded_manager();
        let manager = Arc::new(manager);

        let k8s = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .update_state_timestamp(
                        Some(StateField::K8sMonitoring(SubsystemState::Started)),
                        Some(TS_START_K8S_MONITORING),
                    )
                    .await
            })
        };
        let ceph = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .update_state_timestamp(
                        Some(StateField::CephMonitoring(SubsystemState::Started)),
                        Some(TS_START_CEPH_MONITORING),
                    )
                    .await
            })
        };
        k8s.await.unwrap().unwrap();
        ceph.await.unwrap().unwrap();

        let persisted = store.read("rrs-mon-dynamic").await.unwrap();
        let payload = DynamicData::from_yaml(&persisted[DYNAMIC_DATA_KEY]).unwrap();
        assert_eq!(payload.state.k8s_monitoring, SubsystemState::Started);
        assert_eq!(payload.state.ceph_monitoring, SubsystemState::Started);
        assert!(payload.timestamps.contains_key(TS_START_K8S_MONITORING));
        assert!(payload.timestamps.contains_key(TS_START_CEPH_MONITORING));
    }

    #[tokio::test]
    async fn test_dynamic_data_cache_lazy_loads_once() {
        let (store, manager) = seeded_manager();
        let first = manager.dynamic_data().await.unwrap();
        // Mutate the store behind the cache; the cached copy wins until
        // explicitly replaced.
        store.seed_key("rrs-mon-dynamic", "extra", "1");
        let second = manager.dynamic_data().await.unwrap();
        assert_eq!(first, second);

        // Replacing the cache makes the new content visible.
        let fresh = store.read("rrs-mon-dynamic").await.unwrap();
        manager.set_dynamic_data(fresh.clone()).await;
        assert_eq!(manager.dynamic_data().await.unwrap(), fresh);
    }
}
