// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::WriteEventError,
    events::{InvocationContext, LogFile, TestEvent},
    listener::TestListener,
    run_result::RunRecord,
};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::time::Duration;
use tracing::warn;

/// A run observed by a [`CollectingListener`], along with the module it ran in.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectedRun {
    /// The module the run belonged to, if any.
    pub module: Option<SmolStr>,

    /// The run's results.
    pub record: RunRecord,
}

/// A listener that keeps structured results for every run it sees.
///
/// As an aggregate-only listener, it sees one record per run name with the final result of every
/// test. As a granular listener, it sees one record per attempt.
#[derive(Clone, Debug, Default)]
pub struct CollectingListener {
    granular: bool,
    invocation: Option<InvocationContext>,
    invocation_failures: Vec<String>,
    invocation_elapsed: Option<Duration>,
    invocation_logs: IndexMap<String, LogFile>,
    saved_logs: Vec<LogFile>,
    current_module: Option<SmolStr>,
    current_run: Option<RunRecord>,
    runs: Vec<CollectedRun>,
}

impl CollectingListener {
    /// Creates a new, aggregate-only collecting listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether this listener receives every attempt in real time.
    pub fn set_granular(&mut self, granular: bool) -> &mut Self {
        self.granular = granular;
        self
    }

    /// Returns the context of the current invocation, if it started.
    pub fn invocation(&self) -> Option<&InvocationContext> {
        self.invocation.as_ref()
    }

    /// Returns every invocation failure reported so far.
    pub fn invocation_failures(&self) -> &[String] {
        &self.invocation_failures
    }

    /// Returns the elapsed time of the invocation, once it ended.
    pub fn invocation_elapsed(&self) -> Option<Duration> {
        self.invocation_elapsed
    }

    /// Returns logs associated with the invocation rather than with a run.
    pub fn invocation_logs(&self) -> &IndexMap<String, LogFile> {
        &self.invocation_logs
    }

    /// Returns every log reported through a test-log-saved event.
    pub fn saved_logs(&self) -> &[LogFile] {
        &self.saved_logs
    }

    /// Returns every completed run, in the order in which they ended.
    pub fn runs(&self) -> &[CollectedRun] {
        &self.runs
    }

    /// Returns the completed runs with the given name.
    pub fn runs_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RunRecord> + 'a {
        self.runs
            .iter()
            .filter(move |run| run.record.name == name)
            .map(|run| &run.record)
    }

    /// Returns the completed runs within the given module.
    pub fn runs_in_module<'a>(
        &'a self,
        module_id: &'a str,
    ) -> impl Iterator<Item = &'a RunRecord> + 'a {
        self.runs
            .iter()
            .filter(move |run| run.module.as_deref() == Some(module_id))
            .map(|run| &run.record)
    }

    fn finish_run(&mut self) {
        if let Some(record) = self.current_run.take() {
            self.runs.push(CollectedRun {
                module: self.current_module.clone(),
                record,
            });
        }
    }
}

impl TestListener for CollectingListener {
    fn write_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        match event {
            TestEvent::InvocationStarted { context } => {
                self.invocation = Some(context.clone());
            }
            TestEvent::InvocationFailed { cause } => {
                self.invocation_failures.push(cause.clone());
            }
            TestEvent::InvocationEnded { elapsed } => {
                self.finish_run();
                self.invocation_elapsed = Some(*elapsed);
            }
            TestEvent::ModuleStarted { context } => {
                self.finish_run();
                self.current_module = Some(context.module_id.clone());
            }
            TestEvent::ModuleEnded => {
                self.finish_run();
                self.current_module = None;
            }
            TestEvent::RunStarted {
                name,
                test_count,
                attempt,
                start_time,
            } => {
                self.finish_run();
                self.current_run = Some(RunRecord::new(
                    name.as_str(),
                    *test_count,
                    *attempt,
                    *start_time,
                ));
            }
            TestEvent::RunEnded { .. } => match &mut self.current_run {
                Some(record) => {
                    record.record(event);
                    self.finish_run();
                }
                None => warn!("run ended without a run in progress"),
            },
            TestEvent::LogAssociation { name, log_file } if self.current_run.is_none() => {
                self.invocation_logs.insert(name.clone(), log_file.clone());
            }
            TestEvent::TestLogSaved { log_file, .. } => {
                self.saved_logs.push(log_file.clone());
            }
            TestEvent::RunFailed { .. }
            | TestEvent::TestStarted { .. }
            | TestEvent::TestFailed { .. }
            | TestEvent::TestAssumptionFailure { .. }
            | TestEvent::TestIgnored { .. }
            | TestEvent::TestEnded { .. }
            | TestEvent::LogAssociation { .. } => match &mut self.current_run {
                Some(record) => record.record(event),
                None => warn!(
                    event = event.kind_str(),
                    "event received without a run in progress"
                ),
            },
        }
        Ok(())
    }

    fn supports_granular_results(&self) -> bool {
        self.granular
    }
}
