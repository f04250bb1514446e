// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Channel implementations optimized for single-threaded async runtime

pub mod error;
pub mod mpmc;
pub mod mpsc;
