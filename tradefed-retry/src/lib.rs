// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Retry-aware aggregation of test results.
//!
//! A test executor that retries failing runs reports every attempt to a
//! [`ResultAggregator`](aggregator::ResultAggregator). Listeners that support granular results see
//! every attempt as it happens; every other listener sees a single merged attempt per run, in which
//! each test carries the outcome of the latest attempt that executed it.
//!
//! ```
//! use tradefed_retry::{
//!     aggregator::ResultAggregator,
//!     events::TestIdentity,
//!     reporter::CollectingListener,
//!     retry::{RetryPolicy, RetryStrategy},
//!     run_result::TestStatus,
//! };
//! use chrono::Utc;
//! use std::time::Duration;
//!
//! let mut collector = CollectingListener::new();
//! let mut aggregator = ResultAggregator::new(
//!     vec![Box::new(&mut collector)],
//!     RetryPolicy::new(RetryStrategy::RetryAnyFailure, 2),
//! );
//!
//! let test = TestIdentity::new("com.example.FooTest", "testBar");
//! let now = Utc::now().fixed_offset();
//! for attempt in 0..2 {
//!     aggregator.run_started("run1", 1, attempt, now).unwrap();
//!     aggregator.test_started(test.clone(), now).unwrap();
//!     if attempt == 0 {
//!         aggregator.test_failed(test.clone(), "flaky").unwrap();
//!     }
//!     aggregator.test_ended(test.clone(), now, Default::default()).unwrap();
//!     aggregator.run_ended(Duration::from_millis(450), Default::default()).unwrap();
//! }
//! aggregator.invocation_ended(Duration::from_secs(1)).unwrap();
//! drop(aggregator);
//!
//! let run = &collector.runs()[0].record;
//! assert_eq!(run.num_tests_in_status(TestStatus::Passed), 1);
//! assert_eq!(run.elapsed, Duration::from_millis(900));
//! ```

pub mod aggregator;
pub mod config;
pub mod errors;
pub mod events;
pub mod listener;
pub mod log_saver;
pub mod reporter;
pub mod retry;
pub mod run_result;
#[cfg(test)]
mod test_helpers;
