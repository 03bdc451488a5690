// src/config.rs

use crate::attribution::{AttributionOptions, Backend};
use crate::cli::Args;
use crate::error::{FatalError, FatalResult};
use crate::model::AuthorKey;
use crate::report::Dialect;
use std::path::PathBuf;
use std::time::Duration;

/// Files handed to the worker pool per worker before results are emitted
pub const BATCH_PER_WORKER: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionSelection {
    /// The first positional argument if it names a revision, else `HEAD`
    Implicit,
    Explicit(Vec<String>),
    AllTags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// One row per text file
    PerFile,
    /// One years-old histogram row per revision
    YearsOld,
}

/// Validated settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub git_dir: PathBuf,
    pub revisions: RevisionSelection,
    /// Positional arguments: restrictions, possibly led by a revision
    pub paths: Vec<String>,
    pub report: ReportKind,
    pub dialect: Dialect,
    pub backend: Backend,
    pub author_key: AuthorKey,
    pub attribution: AttributionOptions,
    pub timeout: Option<Duration>,
    /// Worker threads; `None` lets rayon pick one per CPU
    pub jobs: Option<usize>,
    pub progress: bool,
}

impl RunConfig {
    pub fn from_args(args: &Args) -> FatalResult<Self> {
        let report = if args.years_old {
            ReportKind::YearsOld
        } else {
            ReportKind::PerFile
        };

        let revisions = if args.all_tags {
            RevisionSelection::AllTags
        } else if args.revisions.is_empty() {
            RevisionSelection::Implicit
        } else {
            RevisionSelection::Explicit(args.revisions.clone())
        };
        if report == ReportKind::PerFile {
            if let RevisionSelection::Explicit(list) = &revisions {
                if list.len() > 1 {
                    return Err(FatalError::Config(
                        "several revisions need --years-old; per-file reports cover one revision"
                            .to_string(),
                    ));
                }
            }
        }

        let timeout = match args.timeout {
            Some(0) => {
                return Err(FatalError::Config("--timeout must be at least 1 second".to_string()))
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(Self {
            git_dir: args.git_dir.clone(),
            revisions,
            paths: args.paths.clone(),
            report,
            dialect: if args.csv { Dialect::Csv } else { Dialect::Tsv },
            backend: args.backend,
            author_key: args.author,
            attribution: AttributionOptions {
                ignore_whitespace: !args.no_ignore_whitespace,
                detect_moves_within_file: !args.no_move_detection,
                detect_moves_across_commit: !args.no_copy_detection,
            },
            timeout,
            jobs: args.jobs,
            progress: args.progress,
        })
    }

    pub fn batch_size(&self) -> usize {
        let workers = self.jobs.unwrap_or_else(rayon::current_num_threads);
        workers.max(1) * BATCH_PER_WORKER
    }
}
