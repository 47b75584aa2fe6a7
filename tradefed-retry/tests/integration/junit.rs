// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use indoc::indoc;
use std::sync::Arc;
use tradefed_retry::{
    aggregator::ResultAggregator,
    config::AggregatorConfig,
    events::{LogDataType, TestEvent},
    listener::ListenerKind,
    log_saver::{FileSystemLogSaver, LogSaver},
    reporter::RecordingListener,
    retry::RetryStrategy,
};

#[test]
fn junit_report_from_config_file() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let config_file = dir.path().join("tradefed-retry.toml");
    std::fs::write(
        &config_file,
        indoc! {r#"
            [retry]
            strategy = "retry-any-failure"
            max-attempts = 2

            [junit]
            path = "results/junit.xml"
            report-name = "cts"
        "#},
    )
    .expect("wrote config");

    let config = AggregatorConfig::from_file(&config_file).expect("valid config");
    assert_eq!(config.retry_policy().strategy(), RetryStrategy::RetryAnyFailure);

    let granular = RecordingListener::granular();
    let mut aggregator = ResultAggregator::from_config(&config, vec![Box::new(granular.clone())]);
    assert_eq!(
        aggregator.listener_kinds().collect::<Vec<_>>(),
        vec![ListenerKind::Granular, ListenerKind::AggregateOnly],
        "the JUnit reporter is appended as an aggregate-only listener"
    );

    report_events(&mut aggregator, &[module_started("arm64-v8a CtsExampleTestCases")]);
    report_attempts(
        &mut aggregator,
        &[
            AttemptFixture::new("run1", 0, &[("A", Outcome::Pass), ("B", Outcome::Fail)]),
            AttemptFixture::new("run1", 1, &[("B", Outcome::Pass)]),
        ],
    );
    report_events(&mut aggregator, &[TestEvent::ModuleEnded]);

    let junit_path = dir.path().join("results/junit.xml");
    assert!(!junit_path.exists(), "report is written at invocation end");
    report_events(&mut aggregator, &[invocation_ended()]);

    let xml = std::fs::read_to_string(&junit_path).expect("read JUnit report");
    assert!(xml.contains(r#"<testsuites name="cts""#), "{xml}");
    assert!(
        xml.contains(r#"<testsuite name="arm64-v8a CtsExampleTestCases run1" tests="2""#),
        "{xml}"
    );
    assert!(!xml.contains("<failure"), "B passed on retry: {xml}");
    assert_eq!(
        granular
            .events()
            .iter()
            .filter(|event| matches!(event, TestEvent::TestFailed { .. }))
            .count(),
        1,
        "the granular listener still saw the first failure"
    );
}

#[test]
fn log_saver_is_shared_with_listeners() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let saver = Arc::new(FileSystemLogSaver::new(dir.path().join("logs")));

    let aggregate = RecordingListener::aggregate_only();
    let config = AggregatorConfig::from_toml_str("").expect("default config is valid");
    let mut aggregator = ResultAggregator::from_config(&config, vec![Box::new(aggregate.clone())]);
    aggregator.set_log_saver(saver.clone());

    let log_file = saver
        .save_log_data("device_logcat", LogDataType::Logcat, b"I/ActivityManager: start")
        .expect("saved log");
    aggregator
        .test_log_saved("device_logcat", LogDataType::Logcat, log_file.clone())
        .expect("event reported");

    assert_eq!(
        aggregate.events(),
        vec![TestEvent::TestLogSaved {
            name: "device_logcat".to_owned(),
            data_type: LogDataType::Logcat,
            log_file,
        }],
        "log-saved events reach aggregate-only listeners immediately"
    );
}
