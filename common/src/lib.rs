// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Shared library for the Rack Resiliency Service (RRS) daemons.
//!
//! Both the monitoring daemon (`rms`) and the read API daemon (`apiserver`)
//! build on the modules here: the error taxonomy, the environment-driven
//! settings layer, the typed document schemas, the ConfigMap-backed document
//! store with its advisory lock, and the cluster/storage adapters.

pub mod ceph;
pub mod configmap;
pub mod error;
pub mod k8s;
pub mod logging;
pub mod retry;
pub mod schema;
pub mod setting;
pub mod testing;

pub use error::{Result, RrsError};
