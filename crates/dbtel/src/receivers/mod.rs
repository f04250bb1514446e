// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The three domain-specific receivers (`spec.md` §4.9), all built on the
//! same scheduled-poll skeleton: connect via [`crate::db::DbConnection`],
//! run one or more configured queries on a fixed interval, map the result
//! rows into a [`otap_df_pdata::Batch`], and forward it.

/// `spec.md` §4.9: PostgreSQL/MySQL host and database metrics.
pub mod pg_mysql;

/// `spec.md` §4.9: Active Session History sampling.
pub mod ash_sampler;

/// `spec.md` §4.9: user-defined SQL query receiver.
pub mod sql_query;
