// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code to generate JUnit XML reports from aggregated results.

use crate::{
    config::JunitConfig,
    errors::WriteEventError,
    events::TestEvent,
    listener::TestListener,
    run_result::{RunRecord, TestStatus},
};
use chrono::{DateTime, FixedOffset};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use smol_str::SmolStr;
use std::{fs::File, time::Duration};
use tracing::debug;

/// An aggregate-only listener that writes a JUnit XML report when the invocation ends.
///
/// Each run becomes a test suite. Runs within a module carry a `module` property.
#[derive(Clone, Debug)]
pub struct JunitReporter {
    config: JunitConfig,
    start_time: Option<DateTime<FixedOffset>>,
    current_module: Option<SmolStr>,
    current_run: Option<RunRecord>,
    test_suites: DebugIgnore<IndexMap<String, TestSuite>>,
}

impl JunitReporter {
    /// Creates a new reporter writing to the path in `config`.
    pub fn new(config: JunitConfig) -> Self {
        Self {
            config,
            start_time: None,
            current_module: None,
            current_run: None,
            test_suites: DebugIgnore(IndexMap::new()),
        }
    }

    /// Returns the configuration of this reporter.
    pub fn config(&self) -> &JunitConfig {
        &self.config
    }

    /// Builds the report for the suites seen so far.
    pub fn report(&self, elapsed: Duration) -> Report {
        let mut report = Report::new(self.config.report_name());
        if let Some(start_time) = self.start_time {
            report.set_timestamp(start_time);
        }
        report
            .set_time(elapsed)
            .add_test_suites(self.test_suites.values().cloned());
        report
    }

    fn finish_run(&mut self, record: RunRecord) {
        let key = match &self.current_module {
            Some(module) => format!("{module} {}", record.name),
            None => record.name.clone(),
        };
        let module = self.current_module.clone();
        // A run emitted more than once under the same key shares its suite.
        let test_suite = self.test_suites.entry(key.clone()).or_insert_with(|| {
            let mut test_suite = TestSuite::new(key.as_str());
            test_suite.set_timestamp(record.start_time);
            if let Some(module) = &module {
                test_suite.add_property(("module", module.as_str()));
            }
            test_suite
        });
        let elapsed = test_suite.time.unwrap_or_default() + record.elapsed;
        test_suite.set_time(elapsed);
        if let Some(reason) = &record.run_failure {
            test_suite.add_property(("run-failure", reason.as_str()));
        }

        for (test, result) in &record.tests {
            let mut status = match result.status {
                TestStatus::Passed => TestCaseStatus::success(),
                TestStatus::Ignored | TestStatus::AssumptionFailure => TestCaseStatus::skipped(),
                TestStatus::Failed | TestStatus::Incomplete => {
                    TestCaseStatus::non_success(NonSuccessKind::Failure)
                }
            };
            if let Some(trace) = &result.stack_trace {
                let message = trace.lines().next().unwrap_or_default();
                status.set_message(message).set_description(trace.as_str());
            }

            let mut test_case = TestCase::new(test.test_name(), status);
            test_case
                .set_classname(test.class_name())
                .set_timestamp(result.start_time);
            if let Some(time) = result
                .end_time
                .and_then(|end_time| (end_time - result.start_time).to_std().ok())
            {
                test_case.set_time(time);
            }
            test_suite.add_test_case(test_case);
        }

        debug!(suite = %key, tests = record.tests.len(), "added runs to JUnit test suite");
    }

    fn write_report(&mut self, elapsed: Duration) -> Result<(), WriteEventError> {
        let report = self.report(elapsed);

        let junit_path = self.config.path();
        if let Some(junit_dir) = junit_path.parent().filter(|dir| !dir.as_str().is_empty()) {
            std::fs::create_dir_all(junit_dir).map_err(|error| WriteEventError::Fs {
                file: junit_dir.to_path_buf(),
                error,
            })?;
        }

        let f = File::create(junit_path).map_err(|error| WriteEventError::Fs {
            file: junit_path.to_path_buf(),
            error,
        })?;
        report
            .serialize(f)
            .map_err(|error| WriteEventError::Junit {
                file: junit_path.to_path_buf(),
                error,
            })?;

        debug!(path = %junit_path, "wrote JUnit report");
        Ok(())
    }
}

impl TestListener for JunitReporter {
    fn write_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        match event {
            TestEvent::ModuleStarted { context } => {
                self.current_module = Some(context.module_id.clone());
            }
            TestEvent::ModuleEnded => {
                self.current_module = None;
            }
            TestEvent::RunStarted {
                name,
                test_count,
                attempt,
                start_time,
            } => {
                self.start_time.get_or_insert(*start_time);
                self.current_run = Some(RunRecord::new(
                    name.as_str(),
                    *test_count,
                    *attempt,
                    *start_time,
                ));
            }
            TestEvent::RunEnded { .. } => {
                if let Some(mut record) = self.current_run.take() {
                    record.record(event);
                    self.finish_run(record);
                }
            }
            TestEvent::RunFailed { .. }
            | TestEvent::TestStarted { .. }
            | TestEvent::TestFailed { .. }
            | TestEvent::TestAssumptionFailure { .. }
            | TestEvent::TestIgnored { .. }
            | TestEvent::TestEnded { .. } => {
                if let Some(record) = &mut self.current_run {
                    record.record(event);
                }
            }
            TestEvent::InvocationEnded { elapsed } => {
                self.write_report(*elapsed)?;
            }
            TestEvent::InvocationStarted { .. }
            | TestEvent::InvocationFailed { .. }
            | TestEvent::TestLogSaved { .. }
            | TestEvent::LogAssociation { .. } => {}
        }

        Ok(())
    }
}
