// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The three sinks (`spec.md` §6): an OTLP exporter whose wire transport is
//! injected externally, a New Relic Infrastructure (NRI) newline-delimited
//! JSON exporter, and a debug sink for local inspection.

/// `spec.md` §6: OTLP/gRPC and OTLP/HTTP export, transport provided
/// externally.
pub mod otlp;

/// `spec.md` §6: New Relic Infrastructure newline-delimited JSON export.
pub mod nri;

/// `spec.md` §6: human-readable debug sink.
pub mod debug;
