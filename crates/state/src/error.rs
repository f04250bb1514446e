// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors produced by the observed-state store.

/// Errors that can occur while aggregating observed pipeline state.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The lifecycle event channel closed unexpectedly while the store was
    /// still expected to be running.
    #[error("observed state event channel closed unexpectedly")]
    EventChannelClosed,
}
