// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared test scaffolding for the end-to-end scenarios in `spec.md` §8.

use otap_df_engine::context::{ControllerContext, PipelineContext};
use otap_df_telemetry::registry::MetricsRegistryHandle;

/// Builds a `PipelineContext` the same way every processor/receiver unit
/// test in this crate does, so a metrics registry is available to
/// `register_metrics`.
pub fn test_pipeline_context() -> PipelineContext {
    let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
    controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
}
