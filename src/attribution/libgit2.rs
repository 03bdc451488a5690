// src/attribution/libgit2.rs

use super::{AttributionOptions, AttributionRequest, AttributionSource, CommitCache};
use crate::error::AttributionError;
use crate::model::{AttributionRecord, AuthorKey, CommitMeta};
use git2::{BlameOptions, Repository, Signature};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tracing::debug;

/// Attribution through libgit2's in-process blame.
///
/// Each call opens its own `Repository` handle, so one instance can serve
/// every worker thread.
pub struct Libgit2Blame {
    repo_path: PathBuf,
    options: AttributionOptions,
    author_key: AuthorKey,
    cache: Arc<CommitCache>,
    capability_note: Once,
}

impl Libgit2Blame {
    pub fn new(
        repo_path: PathBuf,
        options: AttributionOptions,
        author_key: AuthorKey,
        cache: Arc<CommitCache>,
    ) -> Self {
        Self {
            repo_path,
            options,
            author_key,
            cache,
            capability_note: Once::new(),
        }
    }

    fn blame_options(&self, request: &AttributionRequest<'_>) -> BlameOptions {
        let mut opts = BlameOptions::new();
        opts.newest_commit(request.commit)
            .use_mailmap(true)
            .ignore_whitespace(self.options.ignore_whitespace)
            .track_copies_same_file(self.options.detect_moves_within_file)
            .track_copies_same_commit_moves(self.options.detect_moves_across_commit);
        if self.options.detect_moves_within_file || self.options.detect_moves_across_commit {
            self.capability_note.call_once(|| {
                debug!("libgit2 blame may ignore move/copy detection; use the incremental back-end for -M/-C");
            });
        }
        opts
    }
}

fn signature_meta(sig: &Signature<'_>) -> CommitMeta {
    CommitMeta {
        author_name: sig.name().unwrap_or("Unknown").to_string(),
        author_email: sig.email().unwrap_or("").to_string(),
        author_time: sig.when().seconds(),
    }
}

impl AttributionSource for Libgit2Blame {
    fn attribute(
        &self,
        request: &AttributionRequest<'_>,
        sink: &mut dyn FnMut(AttributionRecord),
    ) -> Result<(), AttributionError> {
        // libgit2 cannot be interrupted, so the deadline is checked around the call.
        if let Some(deadline) = request.deadline.filter(|d| d.expired()) {
            return Err(AttributionError::Timeout(deadline.budget));
        }

        let repo = Repository::open(&self.repo_path)?;
        let mut opts = self.blame_options(request);
        let blame = repo.blame_file(Path::new(request.path), Some(&mut opts))?;

        if let Some(deadline) = request.deadline.filter(|d| d.expired()) {
            return Err(AttributionError::Timeout(deadline.budget));
        }

        for hunk in blame.iter() {
            let line_count = hunk.lines_in_hunk() as u64;
            if line_count == 0 {
                continue;
            }
            let meta = self
                .cache
                .get_or_insert_with(hunk.final_commit_id(), || signature_meta(&hunk.final_signature()));
            sink(AttributionRecord {
                line_count,
                commit_age: meta.age_bucket(),
                author: meta.author_key(self.author_key),
            });
        }
        Ok(())
    }
}
