// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Domain nodes for the database telemetry collector.
//!
//! Implements the seven custom processing stages (`spec.md` §4.2–4.8), the
//! three domain-specific receivers (`spec.md` §4.9), and the collector's
//! sinks (`spec.md` §2 "Sinks"), instantiating the generic
//! `otap_df_engine` receiver/processor/exporter traits with
//! `otap_df_pdata::Batch` as the `PData` payload.

use otap_df_engine::{PipelineFactory, build_factory};
use otap_df_engine_macros::pipeline_factory;
use otap_df_pdata::Batch;

/// Database connectivity seam shared by the three scheduled receivers.
pub mod db;

/// Cardinality sketching used by the cost control processor.
pub mod cardinality;

/// The seven custom processing stages.
pub mod processors;

/// The three domain-specific receivers.
pub mod receivers;

/// The collector's sinks (OTLP, NRI, debug).
pub mod exporters;

/// Factory for the database telemetry collector's pipeline.
#[pipeline_factory(DBTEL, Batch)]
pub static DBTEL_PIPELINE_FACTORY: PipelineFactory<Batch> = build_factory();
