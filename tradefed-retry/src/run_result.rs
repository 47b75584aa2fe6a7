// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-attempt run state, and the merge of several attempts into one aggregate.
//!
//! A [`RunRecord`] holds everything observed during one attempt of a run. Once the attempt is
//! over, [`RunRecord::seal_and_merge_into`] folds it into the [`AggregatedRunRecord`] for that run
//! name: per test, the latest attempt that executed the test wins.

use crate::events::{LogFile, Metrics, TestEvent, TestIdentity};
use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;
use std::time::Duration;
use tracing::warn;

/// The failure message reported for tests that started but never ended.
pub const INCOMPLETE_TEST_MESSAGE: &str = "Test did not complete due to exception.";

/// The outcome of a single test within an attempt.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum TestStatus {
    /// The test started but has not ended (or never ended).
    Incomplete,

    /// The test passed.
    Passed,

    /// The test failed.
    Failed,

    /// The test was ignored.
    Ignored,

    /// An assumption of the test did not hold.
    AssumptionFailure,
}

impl TestStatus {
    /// Returns true for the statuses that count as failures for retry purposes.
    pub fn is_failure(self) -> bool {
        match self {
            TestStatus::Failed | TestStatus::Incomplete => true,
            TestStatus::Passed | TestStatus::Ignored | TestStatus::AssumptionFailure => false,
        }
    }
}

/// The result of a single test within an attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct TestResult {
    /// The current status.
    pub status: TestStatus,

    /// The failure message or stack trace, if any.
    pub stack_trace: Option<String>,

    /// When the test started.
    pub start_time: DateTime<FixedOffset>,

    /// When the test ended, if it did.
    pub end_time: Option<DateTime<FixedOffset>>,

    /// Metrics reported at test end.
    pub metrics: Metrics,

    /// Logs associated with this test.
    pub logged_files: IndexMap<String, LogFile>,
}

impl TestResult {
    fn started(start_time: DateTime<FixedOffset>) -> Self {
        Self {
            status: TestStatus::Incomplete,
            stack_trace: None,
            start_time,
            end_time: None,
            metrics: Metrics::new(),
            logged_files: IndexMap::new(),
        }
    }

    /// Returns true if a test-ended event was seen for this test.
    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }
}

/// The state of one attempt of one run.
///
/// Created at run start, mutated by [`record`](Self::record), and sealed by a run-ended event.
#[derive(Clone, Debug, PartialEq)]
pub struct RunRecord {
    /// The run name.
    pub name: String,

    /// The zero-based attempt index.
    pub attempt: u32,

    /// The test count declared at run start.
    pub expected_test_count: usize,

    /// When the attempt started.
    pub start_time: DateTime<FixedOffset>,

    /// Time taken by this attempt, as reported at run end.
    pub elapsed: Duration,

    /// Test results, in order of first appearance.
    pub tests: IndexMap<TestIdentity, TestResult>,

    /// Run-level metrics, as reported at run end.
    pub metrics: Metrics,

    /// Why the attempt failed as a whole, if it did.
    pub run_failure: Option<String>,

    /// Logs associated with the run rather than with a single test.
    pub logged_files: IndexMap<String, LogFile>,

    current_test: Option<TestIdentity>,
    sealed: bool,
}

impl RunRecord {
    /// Creates the record for a newly-started attempt.
    pub fn new(
        name: impl Into<String>,
        expected_test_count: usize,
        attempt: u32,
        start_time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            name: name.into(),
            attempt,
            expected_test_count,
            start_time,
            elapsed: Duration::ZERO,
            tests: IndexMap::new(),
            metrics: Metrics::new(),
            run_failure: None,
            logged_files: IndexMap::new(),
            current_test: None,
            sealed: false,
        }
    }

    /// Returns true once a run-ended event has been recorded.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Returns true if the attempt failed as a whole.
    pub fn is_run_failure(&self) -> bool {
        self.run_failure.is_some()
    }

    /// Returns true if any test failed or never completed.
    pub fn has_failed_tests(&self) -> bool {
        self.tests.values().any(|result| result.status.is_failure())
    }

    /// Returns the number of tests currently in `status`.
    pub fn num_tests_in_status(&self, status: TestStatus) -> usize {
        count_in_status(&self.tests, status)
    }

    /// Applies one event to this attempt.
    ///
    /// This never fails. Test events referring to a test that was never started create an entry
    /// for it, and events arriving after the run ended still apply.
    pub fn record(&mut self, event: &TestEvent) {
        match event {
            TestEvent::TestStarted { test, start_time } => {
                self.tests
                    .insert(test.clone(), TestResult::started(*start_time));
                self.current_test = Some(test.clone());
            }
            TestEvent::TestFailed { test, trace } => {
                let result = self.entry_or_synthesize(test, None);
                result.status = TestStatus::Failed;
                result.stack_trace = Some(trace.clone());
            }
            TestEvent::TestAssumptionFailure { test, trace } => {
                let result = self.entry_or_synthesize(test, None);
                result.status = TestStatus::AssumptionFailure;
                result.stack_trace = Some(trace.clone());
            }
            TestEvent::TestIgnored { test } => {
                self.entry_or_synthesize(test, None).status = TestStatus::Ignored;
            }
            TestEvent::TestEnded {
                test,
                end_time,
                metrics,
            } => {
                let result = self.entry_or_synthesize(test, Some(*end_time));
                if result.status == TestStatus::Incomplete {
                    result.status = TestStatus::Passed;
                }
                result.end_time = Some(*end_time);
                result.metrics = metrics.clone();
                if self.current_test.as_ref() == Some(test) {
                    self.current_test = None;
                }
            }
            TestEvent::RunFailed { reason } => match &mut self.run_failure {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(reason);
                }
                None => self.run_failure = Some(reason.clone()),
            },
            TestEvent::RunEnded { elapsed, metrics } => {
                self.elapsed = *elapsed;
                self.metrics = metrics.clone();
                self.current_test = None;
                self.sealed = true;
            }
            TestEvent::LogAssociation { name, log_file } => {
                let logged_files = match &self.current_test {
                    Some(test) => match self.tests.get_mut(test) {
                        Some(result) => &mut result.logged_files,
                        None => &mut self.logged_files,
                    },
                    None => &mut self.logged_files,
                };
                logged_files.insert(name.clone(), log_file.clone());
            }
            TestEvent::RunStarted { .. }
            | TestEvent::InvocationStarted { .. }
            | TestEvent::InvocationFailed { .. }
            | TestEvent::InvocationEnded { .. }
            | TestEvent::ModuleStarted { .. }
            | TestEvent::ModuleEnded
            | TestEvent::TestLogSaved { .. } => {}
        }
    }

    /// Folds this attempt into the aggregate accumulated so far for the same run name.
    ///
    /// * Every test present in this attempt overwrites the aggregate's result for that test. Tests
    ///   not executed in this attempt keep their earlier result.
    /// * Elapsed time is added to the aggregate's elapsed time.
    /// * Run-level metrics and run failure are replaced by this attempt's.
    pub fn seal_and_merge_into(self, mut aggregate: AggregatedRunRecord) -> AggregatedRunRecord {
        if !self.sealed {
            warn!(
                run_name = %self.name,
                attempt = self.attempt,
                "attempt merged without a run-ended event",
            );
        }

        aggregate.name = self.name;
        aggregate.attempts += 1;
        aggregate.expected_test_count = aggregate.expected_test_count.max(self.expected_test_count);
        aggregate.start_time.get_or_insert(self.start_time);
        aggregate.elapsed += self.elapsed;

        for (test, mut result) in self.tests {
            if let Some(previous) = aggregate.tests.get(&test) {
                // Logs from earlier attempts stay associated with the test.
                let mut logged_files = previous.logged_files.clone();
                logged_files.extend(result.logged_files);
                result.logged_files = logged_files;
            }
            // IndexMap::insert keeps the original position of an existing key.
            aggregate.tests.insert(test, result);
        }

        aggregate.metrics = self.metrics;
        aggregate.run_failure = self.run_failure;
        aggregate.logged_files.extend(self.logged_files);
        aggregate
    }

    fn entry_or_synthesize(
        &mut self,
        test: &TestIdentity,
        time: Option<DateTime<FixedOffset>>,
    ) -> &mut TestResult {
        let start_time = self.start_time;
        let run_name = &self.name;
        self.tests.entry(test.clone()).or_insert_with(|| {
            warn!(
                %run_name,
                %test,
                "test event received for a test that was never started",
            );
            TestResult::started(time.unwrap_or(start_time))
        })
    }
}

/// The merged outcome of every attempt of one run name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregatedRunRecord {
    /// The run name.
    pub name: String,

    /// The number of attempts merged so far.
    pub attempts: u32,

    /// The largest test count declared by any attempt.
    pub expected_test_count: usize,

    /// When the first attempt started.
    pub start_time: Option<DateTime<FixedOffset>>,

    /// The sum of every attempt's elapsed time.
    pub elapsed: Duration,

    /// The final result per test, in order of first appearance.
    pub tests: IndexMap<TestIdentity, TestResult>,

    /// Run-level metrics of the latest attempt.
    pub metrics: Metrics,

    /// Run failure of the latest attempt.
    pub run_failure: Option<String>,

    /// Run-level logs of every attempt.
    pub logged_files: IndexMap<String, LogFile>,
}

impl AggregatedRunRecord {
    /// Creates an empty aggregate for the given run name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns true if the latest attempt failed as a whole.
    pub fn is_run_failure(&self) -> bool {
        self.run_failure.is_some()
    }

    /// Returns the number of tests whose final status is `status`.
    pub fn num_tests_in_status(&self, status: TestStatus) -> usize {
        count_in_status(&self.tests, status)
    }

    /// Applies an event that arrived after the latest attempt was merged.
    ///
    /// Test events update that test's final result, a run failure is appended to the latest
    /// attempt's, and log associations are kept at run level. Run-level metrics and elapsed time
    /// are left alone.
    pub fn record_late(&mut self, event: &TestEvent) {
        let start_time = self.start_time.unwrap_or_else(|| Utc::now().into());
        let mut record = RunRecord::new(
            self.name.as_str(),
            self.expected_test_count,
            self.attempts.saturating_sub(1),
            start_time,
        );
        record.tests = std::mem::take(&mut self.tests);
        record.run_failure = self.run_failure.take();
        record.logged_files = std::mem::take(&mut self.logged_files);

        record.record(event);

        self.tests = record.tests;
        self.run_failure = record.run_failure;
        self.logged_files = record.logged_files;
    }

    /// Returns the event sequence that reports this aggregate as a single attempt.
    ///
    /// The sequence is `RunStarted` (attempt 0), then for every test `TestStarted`, an optional
    /// status marker, its log associations and `TestEnded`, then an optional `RunFailed`, the
    /// run-level log associations, and `RunEnded` with the summed elapsed time.
    pub fn replay_events(&self) -> Vec<TestEvent> {
        let mut events = Vec::with_capacity(self.tests.len() * 3 + self.logged_files.len() + 3);
        let start_time = self.start_time.unwrap_or_else(|| Utc::now().into());

        events.push(TestEvent::RunStarted {
            name: self.name.clone(),
            test_count: self.expected_test_count,
            attempt: 0,
            start_time,
        });

        for (test, result) in &self.tests {
            events.push(TestEvent::TestStarted {
                test: test.clone(),
                start_time: result.start_time,
            });
            let trace = || result.stack_trace.clone().unwrap_or_default();
            match result.status {
                TestStatus::Passed => {}
                TestStatus::Failed => events.push(TestEvent::TestFailed {
                    test: test.clone(),
                    trace: trace(),
                }),
                TestStatus::AssumptionFailure => events.push(TestEvent::TestAssumptionFailure {
                    test: test.clone(),
                    trace: trace(),
                }),
                TestStatus::Ignored => events.push(TestEvent::TestIgnored { test: test.clone() }),
                TestStatus::Incomplete => events.push(TestEvent::TestFailed {
                    test: test.clone(),
                    trace: INCOMPLETE_TEST_MESSAGE.to_owned(),
                }),
            }
            events.extend(result.logged_files.iter().map(|(name, log_file)| {
                TestEvent::LogAssociation {
                    name: name.clone(),
                    log_file: log_file.clone(),
                }
            }));
            events.push(TestEvent::TestEnded {
                test: test.clone(),
                end_time: result.end_time.unwrap_or(result.start_time),
                metrics: result.metrics.clone(),
            });
        }

        if let Some(reason) = &self.run_failure {
            events.push(TestEvent::RunFailed {
                reason: reason.clone(),
            });
        }
        events.extend(
            self.logged_files
                .iter()
                .map(|(name, log_file)| TestEvent::LogAssociation {
                    name: name.clone(),
                    log_file: log_file.clone(),
                }),
        );
        events.push(TestEvent::RunEnded {
            elapsed: self.elapsed,
            metrics: self.metrics.clone(),
        });

        events
    }
}

fn count_in_status(tests: &IndexMap<TestIdentity, TestResult>, status: TestStatus) -> usize {
    tests
        .values()
        .filter(|result| result.status == status)
        .count()
}
