// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Lock-free instrument primitives used by generated metric sets.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A monotonically increasing counter.
///
/// `T` is a phantom marker for the metric's logical unit (`u64`, `f64`, ...);
/// the value is always stored as a 64-bit integer internally. Fractional
/// counters (e.g. accumulated seconds) are tracked in fixed-point
/// microseconds by callers that need sub-integer precision.
#[derive(Debug, Default)]
pub struct Counter<T = u64> {
    value: AtomicU64,
    _marker: PhantomData<T>,
}

impl<T> Counter<T> {
    /// Creates a new counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    /// Increments the counter by one.
    pub fn inc(&self) {
        let _ = self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the counter by `n`.
    pub fn add(&self, n: u64) {
        let _ = self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl<T> Clone for Counter<T> {
    fn clone(&self) -> Self {
        Self {
            value: AtomicU64::new(self.get()),
            _marker: PhantomData,
        }
    }
}

/// A value that can increase or decrease.
#[derive(Debug, Default)]
pub struct Gauge<T = i64> {
    value: AtomicI64,
    _marker: PhantomData<T>,
}

impl<T> Gauge<T> {
    /// Creates a new gauge starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
            _marker: PhantomData,
        }
    }

    /// Sets the gauge to an absolute value.
    pub fn set(&self, n: i64) {
        self.value.store(n, Ordering::Relaxed);
    }

    /// Adds `n` to the gauge (use a negative value to decrease).
    pub fn add(&self, n: i64) {
        let _ = self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Returns the current value, as a non-negative integer.
    ///
    /// Gauges may briefly observe negative values under concurrent
    /// adjustment; callers that require the signed value should use
    /// [`Gauge::get_signed`].
    #[must_use]
    pub fn get(&self) -> u64 {
        self.get_signed().max(0) as u64
    }

    /// Returns the current signed value.
    #[must_use]
    pub fn get_signed(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl<T> Clone for Gauge<T> {
    fn clone(&self) -> Self {
        Self {
            value: AtomicI64::new(self.get_signed()),
            _marker: PhantomData,
        }
    }
}

/// A counter whose value is observed (sampled) rather than incremented
/// directly by the instrumented code, e.g. a value read from the OS.
pub type ObserveCounter<T = u64> = Counter<T>;

/// An up/down counter whose value is observed rather than incremented
/// directly, e.g. queue depth sampled at report time.
pub type ObserveUpDownCounter<T = i64> = Gauge<T>;
