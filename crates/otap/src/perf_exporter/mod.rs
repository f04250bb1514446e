// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the Perf Exporter node
//!
/// allows the user to configure their perf exporter
pub mod config;
/// Perf Exporter implementation
pub mod exporter;
