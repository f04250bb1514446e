// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

mod create_array;

pub(crate) use create_array::{create_record_batch, create_test_schema};
