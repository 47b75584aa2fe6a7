// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Downstream consumers of test events.
//!
//! Every listener attached to a [`ResultAggregator`](crate::aggregator::ResultAggregator) is
//! classified exactly once, at construction time, as either [granular](ListenerKind::Granular) or
//! [aggregate-only](ListenerKind::AggregateOnly).

use crate::{errors::WriteEventError, events::TestEvent, log_saver::LogSaver};
use std::sync::Arc;

/// A consumer of test events.
pub trait TestListener {
    /// Consumes a single event.
    fn write_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError>;

    /// Returns true if this listener wants to see every attempt as it happens.
    ///
    /// Listeners returning false only see one synthesized attempt per run, after all attempts
    /// have been merged.
    fn supports_granular_results(&self) -> bool {
        false
    }

    /// Called when a log saver is configured for the invocation.
    fn set_log_saver(&mut self, log_saver: Arc<dyn LogSaver>) {
        let _ = log_saver;
    }
}

impl<T: TestListener + ?Sized> TestListener for &mut T {
    fn write_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        (**self).write_event(event)
    }

    fn supports_granular_results(&self) -> bool {
        (**self).supports_granular_results()
    }

    fn set_log_saver(&mut self, log_saver: Arc<dyn LogSaver>) {
        (**self).set_log_saver(log_saver)
    }
}

impl<T: TestListener + ?Sized> TestListener for Box<T> {
    fn write_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        (**self).write_event(event)
    }

    fn supports_granular_results(&self) -> bool {
        (**self).supports_granular_results()
    }

    fn set_log_saver(&mut self, log_saver: Arc<dyn LogSaver>) {
        (**self).set_log_saver(log_saver)
    }
}

/// How a listener receives run and test events.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ListenerKind {
    /// Receives every attempt's events in real time.
    Granular,

    /// Receives one synthesized attempt per run name, once the run's attempts are complete.
    AggregateOnly,
}

impl ListenerKind {
    /// Returns the kind of listener `listener` declares itself to be.
    pub fn of(listener: &dyn TestListener) -> Self {
        if listener.supports_granular_results() {
            ListenerKind::Granular
        } else {
            ListenerKind::AggregateOnly
        }
    }
}

/// A listener paired with its classification.
pub(crate) struct ClassifiedListener<'a> {
    pub(crate) kind: ListenerKind,
    pub(crate) listener: Box<dyn TestListener + 'a>,
}

impl<'a> ClassifiedListener<'a> {
    pub(crate) fn new(kind: ListenerKind, listener: Box<dyn TestListener + 'a>) -> Self {
        Self { kind, listener }
    }
}
