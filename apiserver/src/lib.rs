// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Read API daemon of the Rack Resiliency Service.
//!
//! Serves the zone map and the critical-service registry recorded by the
//! monitoring daemon, plus the additive registry update endpoint.

pub mod manager;
pub mod route;
pub mod services;
