// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The result aggregator: forwards every attempt to granular listeners and one merged attempt per
//! run to aggregate-only listeners.
//!
//! # Boundaries
//!
//! The aggregator cannot know that a run is done being retried until it sees the next boundary.
//! Pending aggregates are emitted to aggregate-only listeners:
//!
//! * outside a module, when a run with a different name starts;
//! * when a module starts or ends;
//! * when the invocation ends.
//!
//! Inside a module, every run name's aggregate is held until the module ends, and the aggregates
//! are emitted in the order in which their run names were first seen.
//!
//! An invocation that never ends never emits its last pending aggregate. Dropping the aggregator
//! does not flush anything.

use crate::{
    config::AggregatorConfig,
    errors::WriteEventError,
    events::{
        InvocationContext, LogDataType, LogFile, Metrics, ModuleContext, TestEvent, TestIdentity,
    },
    listener::{ClassifiedListener, ListenerKind, TestListener},
    log_saver::LogSaver,
    reporter::JunitReporter,
    retry::RetryPolicy,
    run_result::{AggregatedRunRecord, RunRecord},
};
use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;
use std::{sync::Arc, time::Duration};
use tracing::{debug, trace, warn};

/// The run name used for attempts synthesized before any run was seen.
pub const UNNAMED_RUN: &str = "unnamed-run";

/// Sits between one event producer and any number of listeners.
///
/// Each listener is classified once, at construction time. Granular listeners receive every
/// event as it happens. Aggregate-only listeners receive invocation, module and log-saved events
/// as they happen, and a single synthesized attempt per run name once that run's attempts are
/// complete.
///
/// The first error returned by a listener is returned to the caller, and the event is not
/// forwarded to the remaining listeners.
pub struct ResultAggregator<'a> {
    listeners: Vec<ClassifiedListener<'a>>,
    policy: RetryPolicy,
    state: AggregatorState,
    pending: IndexMap<String, AggregatedRunRecord>,
    invocation_logs: IndexMap<String, LogFile>,
    last_run: Option<(String, u32)>,
}

#[derive(Debug)]
enum AggregatorState {
    /// Outside any module, with no attempt in progress.
    Idle,

    /// Outside any module, with an attempt in progress.
    InRun { attempt: RunRecord },

    /// Inside a module.
    InModule {
        module: ModuleContext,
        attempt: Option<RunRecord>,
    },
}

impl<'a> ResultAggregator<'a> {
    /// Creates a new aggregator, classifying listeners by their own capability query.
    pub fn new(listeners: Vec<Box<dyn TestListener + 'a>>, policy: RetryPolicy) -> Self {
        Self::with_classifier(listeners, policy, ListenerKind::of)
    }

    /// Creates a new aggregator, classifying listeners with `classifier`.
    pub fn with_classifier(
        listeners: Vec<Box<dyn TestListener + 'a>>,
        policy: RetryPolicy,
        classifier: impl Fn(&dyn TestListener) -> ListenerKind,
    ) -> Self {
        let listeners: Vec<_> = listeners
            .into_iter()
            .map(|listener| ClassifiedListener::new(classifier(&*listener), listener))
            .collect();
        let granular = listeners
            .iter()
            .filter(|l| l.kind == ListenerKind::Granular)
            .count();
        debug!(
            granular,
            aggregate_only = listeners.len() - granular,
            strategy = %policy.strategy(),
            max_attempts = policy.max_attempts(),
            "created result aggregator",
        );

        Self {
            listeners,
            policy,
            state: AggregatorState::Idle,
            pending: IndexMap::new(),
            invocation_logs: IndexMap::new(),
            last_run: None,
        }
    }

    /// Creates a new aggregator from a parsed configuration.
    ///
    /// If the configuration requests a JUnit report, a [`JunitReporter`] is appended to
    /// `listeners`.
    pub fn from_config(
        config: &AggregatorConfig,
        mut listeners: Vec<Box<dyn TestListener + 'a>>,
    ) -> Self {
        if let Some(junit) = config.junit() {
            listeners.push(Box::new(JunitReporter::new(junit.clone())));
        }
        Self::new(listeners, config.retry_policy())
    }

    /// Returns the retry policy this aggregator was created with.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns the classification of every listener, in order.
    pub fn listener_kinds(&self) -> impl Iterator<Item = ListenerKind> + '_ {
        self.listeners.iter().map(|l| l.kind)
    }

    /// Returns true if an attempt is in progress or an aggregate has not been emitted yet.
    pub fn has_pending_results(&self) -> bool {
        !self.pending.is_empty()
            || match &self.state {
                AggregatorState::Idle => false,
                AggregatorState::InRun { .. } => true,
                AggregatorState::InModule { attempt, .. } => attempt.is_some(),
            }
    }

    /// Forwards the log saver to every listener. Call this before reporting any event.
    pub fn set_log_saver(&mut self, log_saver: Arc<dyn LogSaver>) {
        for classified in &mut self.listeners {
            classified.listener.set_log_saver(log_saver.clone());
        }
    }

    /// Consumes a single event.
    pub fn report_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        trace!(event = event.kind_str(), "received event");

        match event {
            TestEvent::InvocationStarted { .. }
            | TestEvent::InvocationFailed { .. }
            | TestEvent::TestLogSaved { .. } => self.forward_to_all(event),
            TestEvent::InvocationEnded { .. } => {
                self.close_attempt();
                if let AggregatorState::InModule { module, .. } = &self.state {
                    warn!(module_id = %module.module_id, "invocation ended inside a module");
                }
                self.state = AggregatorState::Idle;
                self.flush_pending()?;
                self.flush_invocation_logs()?;
                self.forward_to_all(event)
            }
            TestEvent::ModuleStarted { context } => {
                self.close_attempt();
                if let AggregatorState::InModule { module, .. } = &self.state {
                    warn!(
                        module_id = %module.module_id,
                        next_module_id = %context.module_id,
                        "module started before the previous module ended",
                    );
                }
                self.flush_pending()?;
                self.state = AggregatorState::InModule {
                    module: context.clone(),
                    attempt: None,
                };
                self.forward_to_all(event)
            }
            TestEvent::ModuleEnded => {
                self.close_attempt();
                if !matches!(self.state, AggregatorState::InModule { .. }) {
                    warn!("module ended without a module in progress");
                }
                self.flush_pending()?;
                self.state = AggregatorState::Idle;
                self.forward_to_all(event)
            }
            TestEvent::RunStarted {
                name,
                test_count,
                attempt,
                start_time,
            } => {
                self.close_attempt();
                if !self.in_module() && !self.pending.contains_key(name) {
                    self.flush_pending()?;
                }
                self.forward_to(ListenerKind::Granular, event)?;
                self.last_run = Some((name.clone(), *attempt));
                self.open_attempt(RunRecord::new(
                    name.as_str(),
                    *test_count,
                    *attempt,
                    *start_time,
                ));
                Ok(())
            }
            TestEvent::RunEnded { .. } => {
                self.forward_to(ListenerKind::Granular, event)?;
                self.record_in_attempt(event);
                self.close_attempt();
                Ok(())
            }
            TestEvent::LogAssociation { name, log_file } => {
                self.forward_to(ListenerKind::Granular, event)?;
                match self.attempt_mut() {
                    Some(attempt) => attempt.record(event),
                    None => {
                        self.invocation_logs.insert(name.clone(), log_file.clone());
                    }
                }
                Ok(())
            }
            TestEvent::RunFailed { .. }
            | TestEvent::TestStarted { .. }
            | TestEvent::TestFailed { .. }
            | TestEvent::TestAssumptionFailure { .. }
            | TestEvent::TestIgnored { .. }
            | TestEvent::TestEnded { .. } => {
                self.forward_to(ListenerKind::Granular, event)?;
                self.record_in_attempt(event);
                Ok(())
            }
        }
    }

    // ---
    // One method per event
    // ---

    /// Reports that the invocation started.
    pub fn invocation_started(&mut self, context: InvocationContext) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::InvocationStarted { context })
    }

    /// Reports that the invocation failed as a whole.
    pub fn invocation_failed(&mut self, cause: impl Into<String>) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::InvocationFailed {
            cause: cause.into(),
        })
    }

    /// Reports that the invocation ended, emitting every pending aggregate first.
    pub fn invocation_ended(&mut self, elapsed: Duration) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::InvocationEnded { elapsed })
    }

    /// Reports that a module started.
    pub fn module_started(&mut self, context: ModuleContext) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::ModuleStarted { context })
    }

    /// Reports that the current module ended.
    pub fn module_ended(&mut self) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::ModuleEnded)
    }

    /// Reports that an attempt of a run started.
    pub fn run_started(
        &mut self,
        name: impl Into<String>,
        test_count: usize,
        attempt: u32,
        start_time: DateTime<FixedOffset>,
    ) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::RunStarted {
            name: name.into(),
            test_count,
            attempt,
            start_time,
        })
    }

    /// Reports that the current attempt failed as a whole.
    pub fn run_failed(&mut self, reason: impl Into<String>) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::RunFailed {
            reason: reason.into(),
        })
    }

    /// Reports that the current attempt ended.
    pub fn run_ended(&mut self, elapsed: Duration, metrics: Metrics) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::RunEnded { elapsed, metrics })
    }

    /// Reports that a test started.
    pub fn test_started(
        &mut self,
        test: TestIdentity,
        start_time: DateTime<FixedOffset>,
    ) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::TestStarted { test, start_time })
    }

    /// Reports that a test failed.
    pub fn test_failed(
        &mut self,
        test: TestIdentity,
        trace: impl Into<String>,
    ) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::TestFailed {
            test,
            trace: trace.into(),
        })
    }

    /// Reports that a test's assumption failed.
    pub fn test_assumption_failure(
        &mut self,
        test: TestIdentity,
        trace: impl Into<String>,
    ) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::TestAssumptionFailure {
            test,
            trace: trace.into(),
        })
    }

    /// Reports that a test was ignored.
    pub fn test_ignored(&mut self, test: TestIdentity) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::TestIgnored { test })
    }

    /// Reports that a test ended.
    pub fn test_ended(
        &mut self,
        test: TestIdentity,
        end_time: DateTime<FixedOffset>,
        metrics: Metrics,
    ) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::TestEnded {
            test,
            end_time,
            metrics,
        })
    }

    /// Reports that log data was saved.
    pub fn test_log_saved(
        &mut self,
        name: impl Into<String>,
        data_type: LogDataType,
        log_file: LogFile,
    ) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::TestLogSaved {
            name: name.into(),
            data_type,
            log_file,
        })
    }

    /// Associates an already-saved log with the current test, run or invocation.
    pub fn log_association(
        &mut self,
        name: impl Into<String>,
        log_file: LogFile,
    ) -> Result<(), WriteEventError> {
        self.report_event(&TestEvent::LogAssociation {
            name: name.into(),
            log_file,
        })
    }

    // ---
    // Helper methods
    // ---

    fn in_module(&self) -> bool {
        matches!(self.state, AggregatorState::InModule { .. })
    }

    fn attempt_mut(&mut self) -> Option<&mut RunRecord> {
        match &mut self.state {
            AggregatorState::Idle => None,
            AggregatorState::InRun { attempt } => Some(attempt),
            AggregatorState::InModule { attempt, .. } => attempt.as_mut(),
        }
    }

    fn open_attempt(&mut self, record: RunRecord) {
        match &mut self.state {
            AggregatorState::InModule { attempt, .. } => *attempt = Some(record),
            state => *state = AggregatorState::InRun { attempt: record },
        }
    }

    fn take_attempt(&mut self) -> Option<RunRecord> {
        match std::mem::replace(&mut self.state, AggregatorState::Idle) {
            AggregatorState::Idle => None,
            AggregatorState::InRun { attempt } => Some(attempt),
            AggregatorState::InModule { module, attempt } => {
                self.state = AggregatorState::InModule {
                    module,
                    attempt: None,
                };
                attempt
            }
        }
    }

    /// Merges the attempt in progress, if any, into the pending aggregate for its run name.
    fn close_attempt(&mut self) {
        let Some(attempt) = self.take_attempt() else {
            return;
        };
        let aggregate = self
            .pending
            .entry(attempt.name.clone())
            .or_insert_with(|| AggregatedRunRecord::new(attempt.name.as_str()));
        *aggregate = attempt.seal_and_merge_into(std::mem::take(aggregate));
    }

    fn record_in_attempt(&mut self, event: &TestEvent) {
        if let Some(attempt) = self.attempt_mut() {
            attempt.record(event);
            return;
        }

        // An event arrived outside of a run: apply it to the last run's pending aggregate.
        if let Some((name, aggregate)) = self
            .last_run
            .as_ref()
            .and_then(|(name, _)| Some((name, self.pending.get_mut(name)?)))
        {
            debug!(
                run_name = %name,
                event = event.kind_str(),
                "event received after run ended, applying to pending aggregate",
            );
            aggregate.record_late(event);
            return;
        }

        // The last run was already emitted, or no run was seen at all.
        let (name, attempt) = self
            .last_run
            .clone()
            .unwrap_or_else(|| (UNNAMED_RUN.to_owned(), 0));
        warn!(
            run_name = %name,
            attempt,
            event = event.kind_str(),
            "event received outside of a run, synthesizing an attempt",
        );
        let start_time = event.timestamp().unwrap_or_else(|| Utc::now().into());
        let mut record = RunRecord::new(name, 0, attempt, start_time);
        record.record(event);
        self.open_attempt(record);
    }

    fn flush_pending(&mut self) -> Result<(), WriteEventError> {
        for (name, aggregate) in std::mem::take(&mut self.pending) {
            debug!(
                run_name = %name,
                attempts = aggregate.attempts,
                tests = aggregate.tests.len(),
                "emitting aggregated run",
            );
            for event in aggregate.replay_events() {
                self.forward_to(ListenerKind::AggregateOnly, &event)?;
            }
        }
        Ok(())
    }

    fn flush_invocation_logs(&mut self) -> Result<(), WriteEventError> {
        for (name, log_file) in std::mem::take(&mut self.invocation_logs) {
            self.forward_to(
                ListenerKind::AggregateOnly,
                &TestEvent::LogAssociation { name, log_file },
            )?;
        }
        Ok(())
    }

    fn forward_to(&mut self, kind: ListenerKind, event: &TestEvent) -> Result<(), WriteEventError> {
        for classified in self.listeners.iter_mut().filter(|l| l.kind == kind) {
            classified.listener.write_event(event)?;
        }
        Ok(())
    }

    fn forward_to_all(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        for classified in &mut self.listeners {
            classified.listener.write_event(event)?;
        }
        Ok(())
    }
}

/// An aggregator can itself be attached to another aggregator. It asks for every attempt.
impl TestListener for ResultAggregator<'_> {
    fn write_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        self.report_event(event)
    }

    fn supports_granular_results(&self) -> bool {
        true
    }

    fn set_log_saver(&mut self, log_saver: Arc<dyn LogSaver>) {
        ResultAggregator::set_log_saver(self, log_saver)
    }
}
