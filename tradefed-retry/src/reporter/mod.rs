// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in listeners.
//!
//! * [`JunitReporter`] writes the aggregated results as JUnit XML.
//! * [`CollectingListener`] keeps structured per-run results in memory.
//! * [`RecordingListener`] keeps the raw event stream in memory.

mod collecting;
mod junit;
mod recording;

pub use collecting::*;
pub use junit::*;
pub use recording::*;
