// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Rack Resiliency Monitoring Service (RMS).
//!
//! The daemon tracks management-node and storage health per rack, receives
//! state-change notifications from the hardware notification bus, and runs
//! bounded monitoring sessions that record whether critical services and
//! storage recover after a rack or node event.

pub mod evaluator;
pub mod hsm;
pub mod init;
pub mod manager;
pub mod monitor;
pub mod route;
pub mod state_manager;
pub mod subscription;
