// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The vocabulary of test lifecycle events.
//!
//! Events are produced by the test executor driving retries and consumed by a
//! [`ResultAggregator`](crate::aggregator::ResultAggregator), which forwards them to
//! [`TestListener`](crate::listener::TestListener)s. Granular listeners and aggregate-only
//! listeners receive the same [`TestEvent`] type.

use camino::Utf8PathBuf;
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::{fmt, time::Duration};

/// Uniquely identifies a test case within a run.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TestIdentity {
    class_name: SmolStr,
    test_name: SmolStr,
}

impl TestIdentity {
    /// Creates a new identity from a class name and a test name.
    pub fn new(class_name: impl Into<SmolStr>, test_name: impl Into<SmolStr>) -> Self {
        Self {
            class_name: class_name.into(),
            test_name: test_name.into(),
        }
    }

    /// Returns the class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the test name.
    pub fn test_name(&self) -> &str {
        &self.test_name
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_name, self.test_name)
    }
}

/// A single metric value.
#[derive(Clone, Debug, PartialEq)]
pub enum Metric {
    /// A free-form text measurement.
    Text(String),

    /// An integral measurement.
    Int(i64),

    /// A floating-point measurement.
    Double(f64),
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Text(text) => write!(f, "{text}"),
            Metric::Int(value) => write!(f, "{value}"),
            Metric::Double(value) => write!(f, "{value}"),
        }
    }
}

/// A map of metric names to values, in insertion order.
pub type Metrics = IndexMap<String, Metric>;

/// Context attached to the start of an invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InvocationContext {
    /// The invocation identifier.
    pub invocation_id: String,

    /// Free-form attributes, for example build identifiers.
    pub attributes: IndexMap<String, String>,
}

impl InvocationContext {
    /// Creates a new invocation context with no attributes.
    pub fn new(invocation_id: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            attributes: IndexMap::new(),
        }
    }
}

/// Context for a module, an optional grouping of runs.
///
/// Two module contexts are the same module if they compare equal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleContext {
    /// The module identifier, for example `arm64-v8a CtsExampleTestCases`.
    pub module_id: SmolStr,

    /// Free-form attributes attached to the module.
    pub attributes: IndexMap<String, String>,
}

impl ModuleContext {
    /// Creates a new module context with no attributes.
    pub fn new(module_id: impl Into<SmolStr>) -> Self {
        Self {
            module_id: module_id.into(),
            attributes: IndexMap::new(),
        }
    }
}

/// The type of data stored in a log file.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum LogDataType {
    /// Plain text.
    Text,

    /// Device logcat output.
    Logcat,

    /// A device bug report.
    Bugreport,

    /// A PNG screenshot.
    Png,

    /// A zip archive.
    Zip,

    /// An XML document.
    Xml,

    /// Anything else.
    Unknown,
}

impl LogDataType {
    /// Returns the file extension conventionally used for this data type.
    pub fn file_extension(self) -> &'static str {
        match self {
            LogDataType::Text | LogDataType::Logcat => "txt",
            LogDataType::Bugreport | LogDataType::Zip => "zip",
            LogDataType::Png => "png",
            LogDataType::Xml => "xml",
            LogDataType::Unknown => "dat",
        }
    }
}

/// A reference to log data that has already been saved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogFile {
    /// Where the data was saved.
    pub path: Utf8PathBuf,

    /// A remote URL for the data, if it was uploaded.
    pub url: Option<String>,

    /// The type of data stored.
    pub data_type: LogDataType,

    /// The size of the data in bytes.
    pub size: u64,
}

/// A test lifecycle event.
///
/// For a given `(run name, attempt)` pair, events must arrive in the order
/// [`RunStarted`](Self::RunStarted), any number of test events, then
/// [`RunEnded`](Self::RunEnded). Out-of-order sequences are tolerated, not rejected.
#[derive(Clone, Debug, PartialEq)]
pub enum TestEvent {
    /// The invocation started.
    InvocationStarted {
        /// The invocation context.
        context: InvocationContext,
    },

    /// The invocation failed as a whole.
    InvocationFailed {
        /// A description of the failure.
        cause: String,
    },

    /// The invocation ended. Every pending aggregate is flushed before this event is forwarded.
    InvocationEnded {
        /// Total time taken by the invocation.
        elapsed: Duration,
    },

    /// A module started.
    ModuleStarted {
        /// The module context.
        context: ModuleContext,
    },

    /// The current module ended.
    ModuleEnded,

    /// An attempt of a test run started.
    RunStarted {
        /// The run name. Attempts with the same name are retries of the same run.
        name: String,

        /// The number of tests the run declares. Advisory only.
        test_count: usize,

        /// The zero-based attempt index.
        attempt: u32,

        /// When the attempt started.
        start_time: DateTime<FixedOffset>,
    },

    /// The current attempt failed as a whole, independent of individual test outcomes.
    RunFailed {
        /// Why the run failed.
        reason: String,
    },

    /// The current attempt ended.
    RunEnded {
        /// Time taken by this attempt.
        elapsed: Duration,

        /// Run-level metrics.
        metrics: Metrics,
    },

    /// A test started.
    TestStarted {
        /// The test.
        test: TestIdentity,

        /// When the test started.
        start_time: DateTime<FixedOffset>,
    },

    /// A test failed. Usually followed by [`TestEnded`](Self::TestEnded).
    TestFailed {
        /// The test.
        test: TestIdentity,

        /// The failure message or stack trace.
        trace: String,
    },

    /// A test's assumption failed.
    TestAssumptionFailure {
        /// The test.
        test: TestIdentity,

        /// The failure message or stack trace.
        trace: String,
    },

    /// A test was ignored.
    TestIgnored {
        /// The test.
        test: TestIdentity,
    },

    /// A test ended. If no failure marker was reported, the test passed.
    TestEnded {
        /// The test.
        test: TestIdentity,

        /// When the test ended.
        end_time: DateTime<FixedOffset>,

        /// Metrics captured at the end of the test.
        metrics: Metrics,
    },

    /// Log data was saved. Passed through to every listener unmodified.
    TestLogSaved {
        /// The name of the data.
        name: String,

        /// The type of data.
        data_type: LogDataType,

        /// Where the data was saved.
        log_file: LogFile,
    },

    /// Associates an already-saved log with the current test, run or invocation.
    LogAssociation {
        /// The name of the data.
        name: String,

        /// Where the data was saved.
        log_file: LogFile,
    },
}

impl TestEvent {
    /// Returns a short, static name for this kind of event.
    pub fn kind_str(&self) -> &'static str {
        match self {
            TestEvent::InvocationStarted { .. } => "invocation-started",
            TestEvent::InvocationFailed { .. } => "invocation-failed",
            TestEvent::InvocationEnded { .. } => "invocation-ended",
            TestEvent::ModuleStarted { .. } => "module-started",
            TestEvent::ModuleEnded => "module-ended",
            TestEvent::RunStarted { .. } => "run-started",
            TestEvent::RunFailed { .. } => "run-failed",
            TestEvent::RunEnded { .. } => "run-ended",
            TestEvent::TestStarted { .. } => "test-started",
            TestEvent::TestFailed { .. } => "test-failed",
            TestEvent::TestAssumptionFailure { .. } => "test-assumption-failure",
            TestEvent::TestIgnored { .. } => "test-ignored",
            TestEvent::TestEnded { .. } => "test-ended",
            TestEvent::TestLogSaved { .. } => "test-log-saved",
            TestEvent::LogAssociation { .. } => "log-association",
        }
    }

    /// Returns the test this event refers to, if it is a per-test event.
    pub fn test(&self) -> Option<&TestIdentity> {
        match self {
            TestEvent::TestStarted { test, .. }
            | TestEvent::TestFailed { test, .. }
            | TestEvent::TestAssumptionFailure { test, .. }
            | TestEvent::TestIgnored { test }
            | TestEvent::TestEnded { test, .. } => Some(test),
            _ => None,
        }
    }

    /// Returns the timestamp carried by this event, if any.
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            TestEvent::RunStarted { start_time, .. } | TestEvent::TestStarted { start_time, .. } => {
                Some(*start_time)
            }
            TestEvent::TestEnded { end_time, .. } => Some(*end_time),
            _ => None,
        }
    }
}
