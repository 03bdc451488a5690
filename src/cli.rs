// src/cli.rs

use crate::attribution::Backend;
use crate::model::AuthorKey;
use clap::Parser;
use std::path::PathBuf;

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("jobs must be at least 1".to_string())
    } else if n > 64 {
        Err("jobs cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// Identify stale parts of a codebase: report the modal and mean age of the
/// lines of every text file at a revision, plus the author who wrote most of it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
Examples:
  sunset-blame                          Every file at HEAD, tab-separated
  sunset-blame origin/stable src/       Only src/ at origin/stable
  sunset-blame --csv --jobs 8           Comma-separated, eight workers
  sunset-blame --years-old --all-tags   How old each tag's files were")]
pub struct Args {
    /// Files or directories to restrict the report to. Without -r, a first
    /// argument that names a revision selects the revision instead, as with
    /// `git ls-tree`; write `./NAME` to force a path.
    #[arg(value_name = "PATH")]
    pub paths: Vec<String>,

    /// Path to the git repository (or any directory inside its work tree)
    #[arg(long, env = "GIT_DIR", default_value = ".")]
    pub git_dir: PathBuf,

    /// Revision to analyze (default: HEAD); may be repeated with --years-old.
    /// Every positional argument is then a path.
    #[arg(short = 'r', long = "revision", value_name = "REV")]
    pub revisions: Vec<String>,

    /// Count files by age in years for each revision instead of one row per file
    #[arg(long)]
    pub years_old: bool,

    /// With --years-old, analyze every tag in the repository
    #[arg(long, requires = "years_old", conflicts_with = "revisions")]
    pub all_tags: bool,

    /// Comma-separated output (default is tab-separated)
    #[arg(long)]
    pub csv: bool,

    /// Log skipped files and per-revision totals
    #[arg(short, long)]
    pub verbose: bool,

    /// Log every tree entry visited
    #[arg(long)]
    pub debug: bool,

    /// Show a progress spinner on stderr
    #[arg(long)]
    pub progress: bool,

    /// Line attribution back-end
    #[arg(long, value_enum, default_value_t = Backend::Incremental)]
    pub backend: Backend,

    /// How to identify authors
    #[arg(long, value_enum, default_value_t = AuthorKey::Name)]
    pub author: AuthorKey,

    /// Count whitespace-only changes (drops blame -w)
    #[arg(long)]
    pub no_ignore_whitespace: bool,

    /// Do not follow lines moved within a file (drops blame -M)
    #[arg(long)]
    pub no_move_detection: bool,

    /// Do not follow lines moved between files of a commit (drops blame -C)
    #[arg(long)]
    pub no_copy_detection: bool,

    /// Give up on a file after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of files blamed in parallel (1-64, default: one per CPU)
    #[arg(short, long, value_parser = parse_workers)]
    pub jobs: Option<usize>,
}

impl Args {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}
