// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Database connectivity seam for the three scheduled receivers.
//!
//! Connection pooling and the wire protocol to PostgreSQL/MySQL are
//! explicitly out of scope (`spec.md` §1, §4.9 "Connection pooling is
//! external"); receivers depend on this narrow trait instead, the way
//! `otlp_receiver.rs` treats the gRPC transport as provided by `tonic`
//! rather than hand-rolled.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// A single row of query results, column name to scalar value.
pub type Row = HashMap<String, ColumnValue>;

/// A scalar column value returned by a database driver.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValue {
    /// NULL.
    Null,
    /// String/text column.
    Text(String),
    /// Integer column.
    Int(i64),
    /// Floating point column.
    Float(f64),
    /// Boolean column.
    Bool(bool),
}

impl ColumnValue {
    /// Returns the value as an `f64`, coercing `Int`/`Bool`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Int(v) => Some(*v as f64),
            ColumnValue::Float(v) => Some(*v),
            ColumnValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Returns the value as a string, formatting numerics.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            ColumnValue::Text(v) => Some(v.clone()),
            ColumnValue::Int(v) => Some(v.to_string()),
            ColumnValue::Float(v) => Some(v.to_string()),
            ColumnValue::Bool(v) => Some(v.to_string()),
            ColumnValue::Null => None,
        }
    }
}

/// Errors a `DbConnection` implementation may report, matching the outcome
/// classification the circuit breaker (`spec.md` §4.3) needs to label a
/// call success or failure.
#[derive(Debug, Error, Clone)]
pub enum DbError {
    /// The query exceeded the caller's deadline.
    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// The driver returned an error unrelated to timeout.
    #[error("driver error: {0}")]
    Driver(String),
    /// The connection is not currently available (e.g. circuit open
    /// upstream, pool exhausted).
    #[error("connection unavailable: {0}")]
    Unavailable(String),
}

/// A database connection capable of running parameterless SQL and
/// returning rows. A real deployment wires this to a driver of its choice
/// (e.g. `tokio-postgres`, `mysql_async`); tests use an in-memory fake.
#[async_trait(?Send)]
pub trait DbConnection {
    /// Stable identity of the target database, used to key circuit
    /// breaker state (`spec.md` §4.3: `db.system` + `db.name` +
    /// `server.address`).
    fn database_key(&self) -> DatabaseKey;

    /// Runs `sql` and returns its result rows.
    async fn query(&self, sql: &str) -> Result<Vec<Row>, DbError>;
}

/// Identifies a monitored database instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatabaseKey {
    /// `db.system`, e.g. `postgresql` or `mysql`.
    pub db_system: String,
    /// `db.name`.
    pub db_name: String,
    /// `server.address`.
    pub server_address: String,
}

impl std::fmt::Display for DatabaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.db_system, self.db_name, self.server_address)
    }
}

/// In-memory, scriptable `DbConnection`. Used by receiver tests, and also
/// as the receivers' placeholder connection until an external
/// connection-providing extension seam is wired in (`spec.md` §1
/// Non-goal: no bundled database client library).
pub mod fake {
    use super::*;
    use std::cell::RefCell;

    /// A canned, scriptable `DbConnection`.
    pub struct FakeConnection {
        key: DatabaseKey,
        responses: RefCell<HashMap<String, Result<Vec<Row>, DbError>>>,
    }

    impl FakeConnection {
        /// Creates a fake connection with no canned responses; unknown
        /// queries return an empty row set.
        #[must_use]
        pub fn new(key: DatabaseKey) -> Self {
            Self {
                key,
                responses: RefCell::new(HashMap::new()),
            }
        }

        /// Scripts a response for an exact SQL string.
        pub fn on(&self, sql: &str, response: Result<Vec<Row>, DbError>) {
            let _ = self.responses.borrow_mut().insert(sql.to_owned(), response);
        }
    }

    #[async_trait(?Send)]
    impl DbConnection for FakeConnection {
        fn database_key(&self) -> DatabaseKey {
            self.key.clone()
        }

        async fn query(&self, sql: &str) -> Result<Vec<Row>, DbError> {
            match self.responses.borrow().get(sql) {
                Some(r) => r.clone(),
                None => Ok(Vec::new()),
            }
        }
    }
}
