// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §8 Scenario S4 (circuit open): once a database's observed
//! error rate crosses `failure_threshold`, the breaker stops admitting
//! calls until `recovery_timeout` elapses, then allows a HalfOpen probe
//! that closes the breaker again on success.

mod common;

use otap_df_dbtel::db::DatabaseKey;
use otap_df_dbtel::processors::circuit_breaker::{CircuitBreaker, Config, Outcome};
use std::time::Duration;

fn key() -> DatabaseKey {
    DatabaseKey {
        db_system: "postgresql".to_owned(),
        db_name: "orders".to_owned(),
        server_address: "db1:5432".to_owned(),
    }
}

#[test]
fn four_failures_open_the_breaker_then_recover_through_a_half_open_probe() {
    let config = Config {
        min_requests: 4,
        failure_threshold: 0.5,
        recovery_timeout: Duration::from_millis(0),
        probe_count: 1,
        success_threshold: 1.0,
        ..Config::default()
    };
    let mut breaker = CircuitBreaker::new(common::test_pipeline_context(), config);
    let k = key();

    for _ in 0..4 {
        let (allowed, reason) = breaker.allow(k.clone());
        assert!(allowed, "breaker must admit calls while closed");
        assert_eq!(reason, "closed");
        breaker.record(k.clone(), Outcome::Failure);
    }

    let (allowed, reason) = breaker.allow(k.clone());
    assert!(!allowed, "breaker must reject calls once open");
    assert_eq!(reason, "open");

    // recovery_timeout is zero, so the very next call is the HalfOpen probe.
    let (allowed, reason) = breaker.allow(k.clone());
    assert!(allowed, "first post-recovery call must be admitted as a probe");
    assert_eq!(reason, "half_open_probe");

    breaker.record(k.clone(), Outcome::Success);

    let (allowed, reason) = breaker.allow(k);
    assert!(allowed, "breaker must admit calls again once the probe succeeds");
    assert_eq!(reason, "closed");
}
