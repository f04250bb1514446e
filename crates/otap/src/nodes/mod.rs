// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! OTAP node components organized by type (receiver, processor, exporter).

pub mod exporter;
pub mod processor;
pub mod receiver;
