// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry strategies: which failures cause a run to be attempted again.
//!
//! The aggregator itself never branches on the strategy. It merges however many attempts it
//! observes, keyed by run name. The strategy is consumed by the executor that decides whether to
//! schedule another attempt.

use crate::{
    errors::{RetryPolicyError, RetryStrategyParseError},
    events::TestIdentity,
    run_result::RunRecord,
};
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// Which failures cause a run to be attempted again.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Never retry.
    #[default]
    NoRetry,

    /// Retry only if the run as a whole failed.
    RetryRunFailure,

    /// Retry if the run failed or any test failed.
    RetryAnyFailure,

    /// Run a fixed number of iterations regardless of the outcome.
    Iterations,

    /// Keep re-running until something fails.
    RerunUntilFailure,
}

impl RetryStrategy {
    /// String representations of all known variants.
    pub fn variants() -> &'static [&'static str] {
        &[
            "no-retry",
            "retry-run-failure",
            "retry-any-failure",
            "iterations",
            "rerun-until-failure",
        ]
    }

    /// Returns true if, given the attempt that just finished, another attempt should run.
    ///
    /// This does not take the attempt budget into account: see [`RetryPolicy::should_retry`].
    pub fn should_retry(self, attempt: &RunRecord) -> bool {
        match self {
            RetryStrategy::NoRetry => false,
            RetryStrategy::RetryRunFailure => attempt.is_run_failure(),
            RetryStrategy::RetryAnyFailure => {
                attempt.is_run_failure() || attempt.has_failed_tests()
            }
            RetryStrategy::Iterations => true,
            RetryStrategy::RerunUntilFailure => {
                !attempt.is_run_failure() && !attempt.has_failed_tests()
            }
        }
    }

    /// Returns the tests that the next attempt should execute.
    ///
    /// With [`RetryAnyFailure`](Self::RetryAnyFailure), only the tests that failed or never
    /// completed are re-run, so later attempts report a subset of the tests. Every other strategy
    /// re-runs the whole attempt.
    pub fn tests_to_retry(self, attempt: &RunRecord) -> Vec<TestIdentity> {
        match self {
            RetryStrategy::RetryAnyFailure => attempt
                .tests
                .iter()
                .filter(|(_, result)| result.status.is_failure())
                .map(|(test, _)| test.clone())
                .collect(),
            RetryStrategy::NoRetry
            | RetryStrategy::RetryRunFailure
            | RetryStrategy::Iterations
            | RetryStrategy::RerunUntilFailure => attempt.tests.keys().cloned().collect(),
        }
    }
}

impl FromStr for RetryStrategy {
    type Err = RetryStrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = match s {
            "no-retry" => RetryStrategy::NoRetry,
            "retry-run-failure" => RetryStrategy::RetryRunFailure,
            "retry-any-failure" => RetryStrategy::RetryAnyFailure,
            "iterations" => RetryStrategy::Iterations,
            "rerun-until-failure" => RetryStrategy::RerunUntilFailure,
            other => return Err(RetryStrategyParseError::new(other)),
        };
        Ok(val)
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryStrategy::NoRetry => write!(f, "no-retry"),
            RetryStrategy::RetryRunFailure => write!(f, "retry-run-failure"),
            RetryStrategy::RetryAnyFailure => write!(f, "retry-any-failure"),
            RetryStrategy::Iterations => write!(f, "iterations"),
            RetryStrategy::RerunUntilFailure => write!(f, "rerun-until-failure"),
        }
    }
}

/// A retry strategy combined with an attempt budget.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    strategy: RetryStrategy,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self::new(RetryStrategy::NoRetry, 1)
    }
}

impl RetryPolicy {
    /// Creates a new policy. A `max_attempts` of zero is clamped to one.
    ///
    /// Use [`try_new`](Self::try_new) to reject such values instead.
    pub fn new(strategy: RetryStrategy, max_attempts: u32) -> Self {
        Self {
            strategy,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Creates a new policy, rejecting a zero budget and a `no-retry` strategy with more than one
    /// attempt.
    pub fn try_new(strategy: RetryStrategy, max_attempts: u32) -> Result<Self, RetryPolicyError> {
        match (strategy, max_attempts) {
            (_, 0) => Err(RetryPolicyError::InvalidMaxAttempts),
            (RetryStrategy::NoRetry, max_attempts) if max_attempts > 1 => {
                Err(RetryPolicyError::RetriesDisabled { max_attempts })
            }
            _ => Ok(Self {
                strategy,
                max_attempts,
            }),
        }
    }

    /// Returns the retry strategy.
    pub fn strategy(&self) -> RetryStrategy {
        self.strategy
    }

    /// Returns the maximum number of attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns true if another attempt should run after `attempt` finished.
    pub fn should_retry(&self, attempt: &RunRecord) -> bool {
        attempt.attempt.saturating_add(1) < self.max_attempts && self.strategy.should_retry(attempt)
    }
}
