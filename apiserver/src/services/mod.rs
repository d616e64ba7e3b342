// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Service layer: mapping between the recorded documents, the live cluster,
//! and the API response shapes.

pub mod critical_services;
pub mod zones;
