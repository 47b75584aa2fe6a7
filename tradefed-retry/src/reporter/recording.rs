// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::WriteEventError, events::TestEvent, listener::TestListener};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A listener that stores every event it receives, in order.
///
/// Clones share the same event log, so a clone can be handed to an aggregator while the original
/// is used to inspect what was received.
#[derive(Clone, Debug, Default)]
pub struct RecordingListener {
    granular: bool,
    events: Arc<Mutex<Vec<TestEvent>>>,
}

impl RecordingListener {
    /// Creates a recorder that receives every attempt in real time.
    pub fn granular() -> Self {
        Self {
            granular: true,
            events: Arc::default(),
        }
    }

    /// Creates a recorder that receives one synthesized attempt per run.
    pub fn aggregate_only() -> Self {
        Self::default()
    }

    /// Returns a copy of the events received so far.
    pub fn events(&self) -> Vec<TestEvent> {
        self.lock().clone()
    }

    /// Returns the kinds of the events received so far, for compact assertions.
    pub fn event_kinds(&self) -> Vec<&'static str> {
        self.lock().iter().map(TestEvent::kind_str).collect()
    }

    /// Removes and returns the events received so far.
    pub fn take_events(&self) -> Vec<TestEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TestEvent>> {
        // A panic while holding the lock cannot leave the log half-written.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TestListener for RecordingListener {
    fn write_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        self.lock().push(event.clone());
        Ok(())
    }

    fn supports_granular_results(&self) -> bool {
        self.granular
    }
}
