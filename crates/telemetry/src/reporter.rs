// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Channel-based fan-in of metric snapshots from pipeline threads to the
//! metrics aggregator task.

use crate::error::Error;
use crate::metrics::MetricSetSnapshot;

/// Cheap-to-clone handle nodes use to report metric snapshots.
///
/// A `MetricsReporter` is handed to every effect handler; reporting is a
/// non-blocking, best-effort send so that a slow or stalled aggregator never
/// backpressures the hot data path.
#[derive(Clone, Debug)]
pub struct MetricsReporter {
    sender: flume::Sender<MetricSetSnapshot>,
}

impl MetricsReporter {
    /// Wraps an existing sender half of a snapshot channel.
    #[must_use]
    pub const fn new(sender: flume::Sender<MetricSetSnapshot>) -> Self {
        Self { sender }
    }

    /// Creates a bounded snapshot channel and returns its receiver alongside
    /// a reporter for the sending side.
    #[must_use]
    pub fn create_new_and_receiver(
        capacity: usize,
    ) -> (flume::Receiver<MetricSetSnapshot>, Self) {
        let (tx, rx) = flume::bounded(capacity.max(1));
        (rx, Self::new(tx))
    }

    /// Attempts to send a snapshot without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReportFailed`] if the aggregator's channel is full
    /// or has been dropped.
    pub fn try_report_snapshot(&self, snapshot: MetricSetSnapshot) -> Result<(), Error> {
        self.sender
            .try_send(snapshot)
            .map_err(|e| Error::ReportFailed {
                message: e.to_string(),
            })
    }
}
