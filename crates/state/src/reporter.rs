// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Re-exports the event reporter type so call sites that think in terms of
//! "observed state" don't need to reach into the telemetry crate directly.

pub use otap_df_telemetry::event::{EngineEvent, ObservedEventReporter};
