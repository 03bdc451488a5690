// src/attribution/mod.rs

//! Line attribution back-ends.
//!
//! A back-end turns `(commit, path)` into a stream of hunks, each handed to
//! the caller's sink as soon as it is known. Two back-ends exist:
//!
//! - [`IncrementalBlame`] runs `git blame --incremental` and parses its
//!   output while git is still working. Accurate and honors `.mailmap`.
//! - [`Libgit2Blame`] calls libgit2's blame in-process. No `git` binary
//!   needed, but libgit2 does not implement move/copy detection fully.

pub mod cache;
pub mod incremental;
pub mod libgit2;

pub use cache::CommitCache;
pub use incremental::{HunkReader, IncrementalBlame};
pub use libgit2::Libgit2Blame;

use crate::error::AttributionError;
use crate::model::{AttributionRecord, ObjectId};
use std::time::{Duration, Instant};

/// Knobs forwarded to the blame back-end (`-w`, `-M`, `-C`).
///
/// Back-ends may ignore combinations they do not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributionOptions {
    pub ignore_whitespace: bool,
    pub detect_moves_within_file: bool,
    pub detect_moves_across_commit: bool,
}

impl Default for AttributionOptions {
    fn default() -> Self {
        Self {
            ignore_whitespace: true,
            detect_moves_within_file: true,
            detect_moves_across_commit: true,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    /// Stream `git blame --incremental` from the git binary
    #[default]
    Incremental,
    /// Use libgit2's built-in blame
    Libgit2,
}

/// One file to attribute
#[derive(Debug, Clone, Copy)]
pub struct AttributionRequest<'a> {
    pub commit: ObjectId,
    pub path: &'a str,
    pub deadline: Option<Deadline>,
}

/// Point in time after which attribution of a file is abandoned
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    pub at: Instant,
    pub budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

pub trait AttributionSource: Sync {
    /// Stream the hunks of `request.path` at `request.commit` into `sink`.
    ///
    /// Records already delivered stay delivered when an error is returned;
    /// callers treat the whole file as failed.
    fn attribute(
        &self,
        request: &AttributionRequest<'_>,
        sink: &mut dyn FnMut(AttributionRecord),
    ) -> Result<(), AttributionError>;
}
