// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Implementation of the Contrib nodes (receiver, exporter, processor).

/// Exporter implementations for contrib nodes.
pub mod exporters;

/// Processor implementations for contrib nodes.
pub mod processors;
