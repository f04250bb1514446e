// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Engine telemetry backend settings.
//!
//! This module currently exposes logging backend configuration used by
//! `engine.telemetry.logs`.

pub mod logs;
