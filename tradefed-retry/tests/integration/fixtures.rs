// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::time::Duration;
use tradefed_retry::{
    aggregator::ResultAggregator,
    errors::WriteEventError,
    events::{Metrics, ModuleContext, TestEvent, TestIdentity},
    listener::TestListener,
    run_result::TestStatus,
};

pub(crate) fn ts(secs: i64) -> DateTime<FixedOffset> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("valid timestamp")
        .fixed_offset()
}

/// Routes aggregator logs to the test harness's captured output.
pub(crate) fn init_logging() {
    // Fails if another test already installed the subscriber.
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub(crate) fn test_id(name: &str) -> TestIdentity {
    TestIdentity::new("com.android.tradefed.FakeTest", name)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Outcome {
    Pass,
    Fail,
}

/// One attempt of a run: which tests it executes and how they turn out.
#[derive(Clone, Debug)]
pub(crate) struct AttemptFixture {
    pub(crate) run_name: &'static str,
    pub(crate) attempt: u32,
    pub(crate) test_count: usize,
    pub(crate) tests: Vec<(&'static str, Outcome)>,
    pub(crate) elapsed: Duration,
}

impl AttemptFixture {
    pub(crate) fn new(
        run_name: &'static str,
        attempt: u32,
        tests: &[(&'static str, Outcome)],
    ) -> Self {
        Self {
            run_name,
            attempt,
            test_count: tests.len(),
            tests: tests.to_vec(),
            elapsed: Duration::from_millis(450),
        }
    }

    pub(crate) fn events(&self) -> Vec<TestEvent> {
        let base = i64::from(self.attempt) * 100;
        let mut events = vec![TestEvent::RunStarted {
            name: self.run_name.to_owned(),
            test_count: self.test_count,
            attempt: self.attempt,
            start_time: ts(base),
        }];
        for (index, (name, outcome)) in (1..).zip(&self.tests) {
            let test = test_id(name);
            events.push(TestEvent::TestStarted {
                test: test.clone(),
                start_time: ts(base + index),
            });
            if *outcome == Outcome::Fail {
                events.push(TestEvent::TestFailed {
                    test: test.clone(),
                    trace: format!("{name} failed on attempt {}", self.attempt),
                });
            }
            events.push(TestEvent::TestEnded {
                test,
                end_time: ts(base + index),
                metrics: Metrics::new(),
            });
        }
        events.push(TestEvent::RunEnded {
            elapsed: self.elapsed,
            metrics: Metrics::new(),
        });
        events
    }
}

pub(crate) fn module_started(module_id: &str) -> TestEvent {
    TestEvent::ModuleStarted {
        context: ModuleContext::new(module_id),
    }
}

pub(crate) fn invocation_ended() -> TestEvent {
    TestEvent::InvocationEnded {
        elapsed: Duration::from_secs(10),
    }
}

pub(crate) fn report_attempts(aggregator: &mut ResultAggregator<'_>, attempts: &[AttemptFixture]) {
    for attempt in attempts {
        report_events(aggregator, &attempt.events());
    }
}

pub(crate) fn report_events(aggregator: &mut ResultAggregator<'_>, events: &[TestEvent]) {
    init_logging();
    for event in events {
        aggregator.report_event(event).expect("event reported");
    }
}

/// Returns the final status of every test in every run-started/run-ended sequence in `events`.
pub(crate) fn outcomes(events: &[TestEvent]) -> Vec<(String, TestStatus)> {
    let mut outcomes = Vec::new();
    let mut current: Option<(String, TestStatus)> = None;
    for event in events {
        match event {
            TestEvent::TestStarted { test, .. } => {
                current = Some((test.test_name().to_owned(), TestStatus::Passed));
            }
            TestEvent::TestFailed { .. } => {
                if let Some((_, status)) = &mut current {
                    *status = TestStatus::Failed;
                }
            }
            TestEvent::TestEnded { .. } => outcomes.extend(current.take()),
            _ => {}
        }
    }
    outcomes
}

/// A listener that fails on the first event of the given kind.
pub(crate) struct FailingListener {
    pub(crate) fail_on: &'static str,
    pub(crate) granular: bool,
}

impl TestListener for FailingListener {
    fn write_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        if event.kind_str() == self.fail_on {
            return Err(WriteEventError::Listener {
                name: "failing".to_owned(),
                error: format!("refusing {}", self.fail_on).into(),
            });
        }
        Ok(())
    }

    fn supports_granular_results(&self) -> bool {
        self.granular
    }
}
