// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Implementation of OTLP view backend for proto Rust structs

pub mod common;
pub mod logs;
pub mod resource;
pub mod trace;
