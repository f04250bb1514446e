// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! This module contains implementation of the Views traits for various types of of OTLP data.

pub mod bytes;
pub mod proto;
