// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregator configuration, read from TOML.
//!
//! User configuration is layered on top of [`AggregatorConfig::DEFAULT_CONFIG`]:
//!
//! ```toml
//! [retry]
//! strategy = "retry-any-failure"
//! max-attempts = 3
//!
//! [junit]
//! path = "results/junit.xml"
//! ```

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    retry::{RetryPolicy, RetryStrategy},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

/// The default report name for JUnit output.
pub const DEFAULT_REPORT_NAME: &str = "tradefed";

/// Configuration for a [`ResultAggregator`](crate::aggregator::ResultAggregator) and its
/// built-in listeners.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AggregatorConfig {
    retry_policy: RetryPolicy,
    junit: Option<JunitConfig>,
    unknown_keys: BTreeSet<String>,
}

impl AggregatorConfig {
    /// The default configuration, as TOML.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the configuration from a TOML file, layered on top of the defaults.
    ///
    /// A relative JUnit path is resolved against the directory containing the file.
    pub fn from_file(config_file: impl AsRef<Utf8Path>) -> Result<Self, ConfigParseError> {
        let config_file = config_file.as_ref();
        let builder = Self::make_default_config()
            .add_source(File::new(config_file.as_str(), FileFormat::Toml).required(true));
        let mut config = Self::build(&builder)
            .map_err(|kind| ConfigParseError::new(Some(config_file.to_owned()), kind))?;

        match (&mut config.junit, config_file.parent()) {
            (Some(junit), Some(parent)) if junit.path.is_relative() => {
                junit.path = parent.join(&junit.path);
            }
            _ => {}
        }
        Ok(config)
    }

    /// Reads the configuration from a TOML string, layered on top of the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigParseError> {
        let builder = Self::make_default_config().add_source(File::from_str(toml, FileFormat::Toml));
        Self::build(&builder).map_err(|kind| ConfigParseError::new(None, kind))
    }

    /// Returns the retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Returns the JUnit configuration, if a report was requested.
    pub fn junit(&self) -> Option<&JunitConfig> {
        self.junit.as_ref()
    }

    /// Returns configuration keys that were not recognized and were ignored.
    pub fn unknown_keys(&self) -> &BTreeSet<String> {
        &self.unknown_keys
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build(builder: &ConfigBuilder<DefaultState>) -> Result<Self, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut unknown_keys = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            unknown_keys.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let deserialized: AggregatorConfigDeserialize =
            serde_path_to_error::deserialize(ignored_de).map_err(|error| {
                // The key is already reported by serde_path_to_error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        for key in &unknown_keys {
            warn!(%key, "ignoring unknown configuration key");
        }

        let retry = deserialized.retry;
        let retry_policy = RetryPolicy::try_new(retry.strategy, retry.max_attempts)?;

        Ok(Self {
            retry_policy,
            junit: deserialized.junit.map(|junit| JunitConfig {
                path: junit.path,
                report_name: junit.report_name,
            }),
            unknown_keys,
        })
    }
}

/// Where and how to write the JUnit report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JunitConfig {
    path: Utf8PathBuf,
    report_name: String,
}

impl JunitConfig {
    /// Creates a new JUnit configuration.
    pub fn new(path: impl Into<Utf8PathBuf>, report_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            report_name: report_name.into(),
        }
    }

    /// Returns the output path of the report.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the name of the report.
    pub fn report_name(&self) -> &str {
        &self.report_name
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AggregatorConfigDeserialize {
    retry: RetryConfigDeserialize,
    #[serde(default)]
    junit: Option<JunitConfigDeserialize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RetryConfigDeserialize {
    strategy: RetryStrategy,
    max_attempts: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct JunitConfigDeserialize {
    path: Utf8PathBuf,
    #[serde(default = "default_report_name")]
    report_name: String,
}

fn default_report_name() -> String {
    DEFAULT_REPORT_NAME.to_owned()
}
