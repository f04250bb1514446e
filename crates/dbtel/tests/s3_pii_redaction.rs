// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §8 Scenario S3 (PII redaction): a log body containing an
//! email address is redacted to `[REDACTED:email]` and the per-category
//! counter increases by 1.

mod common;

use otap_df_dbtel::processors::verification::{Config, PiiCategory, PiiDetectionConfig, Verification};
use otap_df_pdata::{AttributeSet, Batch, LogBatch, LogRecord, Severity};

#[test]
fn email_in_body_is_redacted_and_counted() {
    let config = Config {
        pii_detection: PiiDetectionConfig { categories: vec![PiiCategory::Email], ..PiiDetectionConfig::default() },
        required_attributes: Vec::new(),
        ..Config::default()
    };
    let mut verification = Verification::new(common::test_pipeline_context(), config);

    let resource = AttributeSet::new().with("service.name", "dbtel-collector").with("db.system", "postgresql");
    let record = LogRecord::new(0, Severity::Info, "user email: test@example.com", resource);
    let batch = Batch::Logs(LogBatch { records: vec![record] });

    let out = verification.verify_for_test(batch);
    let Batch::Logs(lb) = out else { panic!("expected a log batch") };

    assert_eq!(lb.records[0].body, "user email: [REDACTED:email]");
    assert_eq!(verification.metrics().pii_redacted_email.get(), 1);
}
