// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisting log data produced during an invocation.

use crate::{
    errors::SaveLogError,
    events::{LogDataType, LogFile},
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    io::Write,
    sync::atomic::{AtomicUsize, Ordering},
};
use tracing::debug;

/// Saves log data and returns a reference to the saved copy.
///
/// A log saver is shared by every listener of an invocation.
pub trait LogSaver: Send + Sync {
    /// Saves `data` under a name derived from `name` and returns where it was saved.
    fn save_log_data(
        &self,
        name: &str,
        data_type: LogDataType,
        data: &[u8],
    ) -> Result<LogFile, SaveLogError>;
}

/// A [`LogSaver`] that writes every log into a single directory.
///
/// File names are `<name>_<n>.<ext>`, where `n` increases with every saved log so that repeated
/// names across attempts never collide.
#[derive(Debug)]
pub struct FileSystemLogSaver {
    root: Utf8PathBuf,
    counter: AtomicUsize,
}

impl FileSystemLogSaver {
    /// Creates a new log saver rooted at `root`. The directory is created on first use.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            counter: AtomicUsize::new(0),
        }
    }

    /// Returns the directory logs are written to.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn file_name(&self, name: &str, data_type: LogDataType) -> String {
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        let sanitized: String = name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c => c,
            })
            .collect();
        format!("{sanitized}_{index}.{}", data_type.file_extension())
    }
}

impl LogSaver for FileSystemLogSaver {
    fn save_log_data(
        &self,
        name: &str,
        data_type: LogDataType,
        data: &[u8],
    ) -> Result<LogFile, SaveLogError> {
        std::fs::create_dir_all(&self.root).map_err(|error| SaveLogError::CreateDir {
            path: self.root.clone(),
            error,
        })?;

        let path = self.root.join(self.file_name(name, data_type));
        AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
            .write(|f| f.write_all(data))
            .map_err(|error| SaveLogError::Write {
                path: path.clone(),
                error: match error {
                    atomicwrites::Error::Internal(error) | atomicwrites::Error::User(error) => {
                        error
                    }
                },
            })?;

        debug!(%path, size = data.len(), "saved log data");
        Ok(LogFile {
            path,
            url: None,
            data_type,
            size: data.len() as u64,
        })
    }
}
