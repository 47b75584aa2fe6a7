// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use pretty_assertions::assert_eq;
use tradefed_retry::{
    aggregator::ResultAggregator,
    events::TestEvent,
    reporter::{CollectingListener, RecordingListener},
    retry::{RetryPolicy, RetryStrategy},
    run_result::TestStatus,
};

fn policy() -> RetryPolicy {
    RetryPolicy::new(RetryStrategy::RetryAnyFailure, 2)
}

/// Returns the sequence of module and run boundaries seen by a listener, for example
/// `["module-started", "run-started run1", "run-ended", "module-ended"]`.
fn boundaries(events: &[TestEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            TestEvent::RunStarted { name, .. } => Some(format!("run-started {name}")),
            TestEvent::ModuleStarted { context } => {
                Some(format!("module-started {}", context.module_id))
            }
            TestEvent::RunEnded { .. } | TestEvent::ModuleEnded => {
                Some(event.kind_str().to_owned())
            }
            _ => None,
        })
        .collect()
}

#[test]
fn same_run_name_in_different_modules() {
    let mut aggregate = CollectingListener::new();
    let mut aggregator = ResultAggregator::new(vec![Box::new(&mut aggregate)], policy());

    report_events(&mut aggregator, &[module_started("module1")]);
    report_attempts(
        &mut aggregator,
        &[AttemptFixture::new("run1", 0, &[("A", Outcome::Fail)])],
    );
    report_events(
        &mut aggregator,
        &[TestEvent::ModuleEnded, module_started("module2")],
    );
    report_attempts(
        &mut aggregator,
        &[AttemptFixture::new("run1", 0, &[("A", Outcome::Pass)])],
    );
    report_events(&mut aggregator, &[TestEvent::ModuleEnded, invocation_ended()]);
    drop(aggregator);

    let module1: Vec<_> = aggregate.runs_in_module("module1").collect();
    let module2: Vec<_> = aggregate.runs_in_module("module2").collect();
    assert_eq!(module1.len(), 1);
    assert_eq!(module2.len(), 1);
    assert_eq!(
        module1[0].num_tests_in_status(TestStatus::Failed),
        1,
        "module1's failure is not superseded by module2"
    );
    assert_eq!(module2[0].num_tests_in_status(TestStatus::Passed), 1);
}

#[test]
fn module_run_flushed_before_top_level_run() {
    let granular = RecordingListener::granular();
    let aggregate = RecordingListener::aggregate_only();
    let mut aggregator = ResultAggregator::new(
        vec![Box::new(granular.clone()), Box::new(aggregate.clone())],
        policy(),
    );

    report_events(&mut aggregator, &[module_started("module1")]);
    report_attempts(
        &mut aggregator,
        &[AttemptFixture::new("run1", 0, &[("A", Outcome::Pass)])],
    );
    report_events(&mut aggregator, &[TestEvent::ModuleEnded]);
    assert_eq!(
        boundaries(&aggregate.events()),
        vec![
            "module-started module1",
            "run-started run1",
            "run-ended",
            "module-ended"
        ],
        "module end flushes run1 before the module-ended event"
    );

    report_attempts(
        &mut aggregator,
        &[AttemptFixture::new("run2", 0, &[("B", Outcome::Pass)])],
    );
    report_events(&mut aggregator, &[invocation_ended()]);

    assert_eq!(
        boundaries(&aggregate.events()),
        vec![
            "module-started module1",
            "run-started run1",
            "run-ended",
            "module-ended",
            "run-started run2",
            "run-ended",
        ],
    );
    assert_eq!(boundaries(&granular.events()), boundaries(&aggregate.events()));
}

#[test]
fn top_level_run_flushed_before_module() {
    let aggregate = RecordingListener::aggregate_only();
    let mut aggregator = ResultAggregator::new(vec![Box::new(aggregate.clone())], policy());

    report_attempts(
        &mut aggregator,
        &[AttemptFixture::new("run2", 0, &[("B", Outcome::Pass)])],
    );
    report_events(&mut aggregator, &[module_started("module1")]);
    assert_eq!(
        boundaries(&aggregate.events()),
        vec!["run-started run2", "run-ended", "module-started module1"],
        "module start flushes run2 before the module-started event"
    );

    report_attempts(
        &mut aggregator,
        &[AttemptFixture::new("run1", 0, &[("A", Outcome::Pass)])],
    );
    report_events(&mut aggregator, &[TestEvent::ModuleEnded, invocation_ended()]);

    assert_eq!(
        boundaries(&aggregate.events()),
        vec![
            "run-started run2",
            "run-ended",
            "module-started module1",
            "run-started run1",
            "run-ended",
            "module-ended",
        ],
    );
}

#[test]
fn top_level_run_name_change_flushes() {
    let aggregate = RecordingListener::aggregate_only();
    let mut aggregator = ResultAggregator::new(vec![Box::new(aggregate.clone())], policy());

    report_attempts(
        &mut aggregator,
        &[
            AttemptFixture::new("run1", 0, &[("A", Outcome::Fail)]),
            AttemptFixture::new("run1", 1, &[("A", Outcome::Pass)]),
        ],
    );
    assert!(
        aggregate.events().is_empty(),
        "run1 may still be retried: {:?}",
        aggregate.event_kinds()
    );

    report_events(
        &mut aggregator,
        &[TestEvent::RunStarted {
            name: "run2".to_owned(),
            test_count: 1,
            attempt: 0,
            start_time: ts(500),
        }],
    );
    assert_eq!(
        boundaries(&aggregate.events()),
        vec!["run-started run1", "run-ended"],
        "run1 is emitted as soon as run2 starts"
    );
}

#[test]
fn retried_module_holds_runs_until_module_end() {
    let mut aggregate = CollectingListener::new();
    let recorder = RecordingListener::aggregate_only();
    let mut aggregator = ResultAggregator::new(
        vec![Box::new(&mut aggregate), Box::new(recorder.clone())],
        policy(),
    );

    // A retried module re-runs every run it contains.
    report_events(&mut aggregator, &[module_started("module1")]);
    report_attempts(
        &mut aggregator,
        &[
            AttemptFixture::new("run1", 0, &[("A", Outcome::Fail), ("B", Outcome::Pass)]),
            AttemptFixture::new("run2", 0, &[("C", Outcome::Fail)]),
            AttemptFixture::new("run1", 1, &[("A", Outcome::Pass)]),
            AttemptFixture::new("run2", 1, &[("C", Outcome::Fail)]),
        ],
    );
    assert_eq!(
        recorder.event_kinds(),
        vec!["module-started"],
        "no run is emitted inside the module"
    );

    report_events(&mut aggregator, &[TestEvent::ModuleEnded, invocation_ended()]);
    drop(aggregator);

    let runs: Vec<_> = aggregate
        .runs_in_module("module1")
        .map(|run| {
            (
                run.name.as_str(),
                run.num_tests_in_status(TestStatus::Passed),
                run.num_tests_in_status(TestStatus::Failed),
            )
        })
        .collect();
    assert_eq!(runs, vec![("run1", 2, 0), ("run2", 0, 1)]);
}
