// src/error.rs

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort the whole run
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("failed to open git repository at {path:?}: {source}")]
    OpenRepository { path: PathBuf, source: git2::Error },

    #[error("cannot resolve revision '{revision}': {source}")]
    ResolveRevision { revision: String, source: git2::Error },

    #[error("cannot list tags: {0}")]
    ListTags(git2::Error),

    #[error("cannot list tree '{path}': {source}")]
    ListTree { path: String, source: git2::Error },

    #[error("unknown repository object kind '{kind}' at '{path}'")]
    UnknownEntryKind { path: String, kind: String },

    #[error("internal error while summarizing '{path}': {source}")]
    Invariant { path: String, source: InvariantViolation },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A broken internal invariant; indicates a bug rather than bad input
#[derive(Error, Debug, PartialEq, Eq)]
#[error("histogram has {ages} age buckets and {authors} authors but zero total lines")]
pub struct InvariantViolation {
    pub ages: usize,
    pub authors: usize,
}

/// Line attribution failed for a single file
#[derive(Error, Debug)]
pub enum AttributionError {
    #[error("libgit2 blame failed: {0}")]
    Git(#[from] git2::Error),

    #[error("failed to run git blame: {0}")]
    Spawn(std::io::Error),

    #[error("git blame exited with {status}: {stderr}")]
    Exit { status: std::process::ExitStatus, stderr: String },

    #[error("malformed blame output at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("attribution timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FatalResult<T> = Result<T, FatalError>;
