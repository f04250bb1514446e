// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Implementation of OTLP view backend for serialized OTLP protobuf bytes

pub mod common;
pub mod consts;
pub mod decode;
pub mod logs;
pub mod resource;
