// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Observed state of deployed pipelines: lifecycle conditions aggregated
//! from events reported by each pipeline-core thread, exposed read-only to
//! the admin health and status surface.

pub mod conditions;
pub mod error;
pub mod pipeline_status;
pub mod reporter;
pub mod store;

pub use otap_df_config::{DeployedPipelineKey, PipelineKey};
pub use pipeline_status::PipelineStatus;
pub use store::{ObservedStateHandle, ObservedStateStore};
