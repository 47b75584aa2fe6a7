// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shorthands for building events in unit tests.

use crate::events::{LogDataType, LogFile, Metrics, TestEvent, TestIdentity};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::time::Duration;

/// Returns a timestamp `secs` seconds after a fixed epoch.
pub(crate) fn ts(secs: i64) -> DateTime<FixedOffset> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("valid timestamp")
        .fixed_offset()
}

pub(crate) fn test_id(name: &str) -> TestIdentity {
    TestIdentity::new("classname", name)
}

pub(crate) fn run_started(name: &str, test_count: usize, attempt: u32) -> TestEvent {
    TestEvent::RunStarted {
        name: name.to_owned(),
        test_count,
        attempt,
        start_time: ts(0),
    }
}

pub(crate) fn test_started(name: &str, secs: i64) -> TestEvent {
    TestEvent::TestStarted {
        test: test_id(name),
        start_time: ts(secs),
    }
}

pub(crate) fn test_failed(name: &str, trace: &str) -> TestEvent {
    TestEvent::TestFailed {
        test: test_id(name),
        trace: trace.to_owned(),
    }
}

pub(crate) fn test_ended(name: &str, secs: i64) -> TestEvent {
    TestEvent::TestEnded {
        test: test_id(name),
        end_time: ts(secs),
        metrics: Metrics::new(),
    }
}

pub(crate) fn run_ended(elapsed_ms: u64) -> TestEvent {
    TestEvent::RunEnded {
        elapsed: Duration::from_millis(elapsed_ms),
        metrics: Metrics::new(),
    }
}

pub(crate) fn log_file(name: &str) -> LogFile {
    LogFile {
        path: format!("/tmp/logs/{name}.txt").into(),
        url: None,
        data_type: LogDataType::Text,
        size: 16,
    }
}

pub(crate) fn log_association(name: &str) -> TestEvent {
    TestEvent::LogAssociation {
        name: name.to_owned(),
        log_file: log_file(name),
    }
}
