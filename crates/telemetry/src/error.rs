// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors produced by the telemetry crate.

/// Errors that can occur while registering or reporting telemetry.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A metric snapshot could not be delivered to the aggregator.
    #[error("failed to report metrics snapshot: {message}")]
    ReportFailed {
        /// Underlying channel error message.
        message: String,
    },

    /// The metrics aggregation task stopped unexpectedly.
    #[error("metrics aggregator task terminated: {message}")]
    AggregatorStopped {
        /// Explanation of why the task stopped.
        message: String,
    },
}
