// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the result aggregator and its listeners.

use crate::retry::RetryStrategy;
use camino::Utf8PathBuf;
use config::ConfigError;
use thiserror::Error;

/// Error returned while parsing a [`RetryStrategy`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for retry strategy: {input}\n(known values: {})",
    RetryStrategy::variants().join(", "),
)]
pub struct RetryStrategyParseError {
    input: String,
}

impl RetryStrategyParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// An invalid combination of retry strategy and attempt budget.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum RetryPolicyError {
    /// The maximum number of attempts was zero.
    #[error("max attempts must be at least 1")]
    InvalidMaxAttempts,

    /// More than one attempt was requested, but the strategy never retries.
    #[error("max attempts is {max_attempts}, but the `no-retry` strategy only runs once")]
    RetriesDisabled {
        /// The requested maximum number of attempts.
        max_attempts: u32,
    },
}

/// An error that occurred while reading the aggregator configuration.
#[derive(Debug, Error)]
#[error("failed to parse aggregator config{}", display_config_file(.config_file.as_ref()))]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Option<Utf8PathBuf>,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: Option<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self { config_file, kind }
    }

    /// Returns the config file that failed to parse, if the config was read from a file.
    pub fn config_file(&self) -> Option<&Utf8PathBuf> {
        self.config_file.as_ref()
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

fn display_config_file(config_file: Option<&Utf8PathBuf>) -> String {
    match config_file {
        Some(file) => format!(" at `{file}`"),
        None => String::new(),
    }
}

/// The kind of error that occurred while reading the aggregator configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// `max-attempts` was set to zero.
    #[error("`retry.max-attempts` must be at least 1")]
    InvalidMaxAttempts,

    /// More than one attempt was requested, but the strategy never retries.
    #[error(
        "`retry.max-attempts` is {max_attempts}, but `retry.strategy` is `no-retry` \
         (set max-attempts to 1 or choose a retrying strategy)"
    )]
    RetriesDisabled {
        /// The configured maximum number of attempts.
        max_attempts: u32,
    },
}

impl From<RetryPolicyError> for ConfigParseErrorKind {
    fn from(error: RetryPolicyError) -> Self {
        match error {
            RetryPolicyError::InvalidMaxAttempts => Self::InvalidMaxAttempts,
            RetryPolicyError::RetriesDisabled { max_attempts } => {
                Self::RetriesDisabled { max_attempts }
            }
        }
    }
}

/// An error that occurs while a listener consumes an event.
///
/// The aggregator never swallows these: the first error returned by a listener is propagated to
/// the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while operating on the file system.
    #[error("error operating on path {file}")]
    Fs {
        /// The file being operated on.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while producing JUnit XML.
    #[error("error writing JUnit output to {file}")]
    Junit {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: quick_junit::SerializeError,
    },

    /// A listener failed for a reason of its own.
    #[error("listener `{name}` failed to consume event")]
    Listener {
        /// The name of the listener.
        name: String,

        /// The underlying error.
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// An error that occurs while saving log data.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SaveLogError {
    /// The log directory could not be created.
    #[error("error creating log directory `{path}`")]
    CreateDir {
        /// The directory that could not be created.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The log file could not be written.
    #[error("error writing log file `{path}`")]
    Write {
        /// The file that could not be written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}
