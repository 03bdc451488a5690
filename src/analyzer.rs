// src/analyzer.rs

use crate::aggregate::FileAgeHistogram;
use crate::attribution::{
    AttributionRequest, AttributionSource, Backend, CommitCache, Deadline, IncrementalBlame,
    Libgit2Blame,
};
use crate::classify::{ContentClassifier, NulSniffer};
use crate::config::{ReportKind, RevisionSelection, RunConfig};
use crate::error::{AttributionError, FatalError, FatalResult, InvariantViolation};
use crate::finalize::finalize;
use crate::model::{FileSummary, ObjectId};
use crate::report::{RecordWriter, SummarySink, YearsOldHistogram, YearsOldWriter};
use crate::store::{GitStore, ObjectStore, ResolvedRevision};
use crate::walker::{FileJob, PathFilter, SkipReason, WalkEvent, Walker};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What happened to each path of one revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub summarized: usize,
    pub binary: usize,
    pub submodules: usize,
    pub unreadable: usize,
    pub empty: usize,
    pub failed: usize,
    /// Path restrictions that matched nothing in the tree
    pub unmatched_paths: Vec<String>,
}

impl RunStats {
    fn skipped(&mut self, reason: &SkipReason) {
        match reason {
            SkipReason::Binary => self.binary += 1,
            SkipReason::Submodule => self.submodules += 1,
            SkipReason::Unreadable(_) => self.unreadable += 1,
        }
    }
}

#[derive(Debug)]
enum FileOutcome {
    Summary(FileSummary),
    Empty,
    Failed(AttributionError),
    Broken(InvariantViolation),
}

fn summarize_file(
    source: &dyn AttributionSource,
    commit: ObjectId,
    job: &FileJob,
    timeout: Option<Duration>,
) -> FileOutcome {
    let request = AttributionRequest {
        commit,
        path: &job.path,
        deadline: timeout.map(Deadline::after),
    };
    let mut histogram = FileAgeHistogram::new();
    if let Err(err) = source.attribute(&request, &mut |record| histogram.record(&record)) {
        return FileOutcome::Failed(err);
    }
    match finalize(&job.path, &histogram) {
        Ok(Some(summary)) => FileOutcome::Summary(summary),
        Ok(None) => FileOutcome::Empty,
        Err(violation) => FileOutcome::Broken(violation),
    }
}

/// Walks a revision and summarizes its text files on a worker pool.
///
/// The walk itself stays on the calling thread; text files are collected
/// into batches, attributed in parallel, and handed to the sink in walk
/// order once the whole batch is done.
pub struct Analyzer<'a> {
    source: &'a dyn AttributionSource,
    classifier: &'a dyn ContentClassifier,
    pool: rayon::ThreadPool,
    batch_size: usize,
    timeout: Option<Duration>,
    progress: ProgressBar,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        source: &'a dyn AttributionSource,
        classifier: &'a dyn ContentClassifier,
        jobs: Option<usize>,
        batch_size: usize,
    ) -> FatalResult<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = jobs {
            builder = builder.num_threads(jobs);
        }
        Ok(Self {
            source,
            classifier,
            pool: builder.build()?,
            batch_size: batch_size.max(1),
            timeout: None,
            progress: ProgressBar::hidden(),
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    fn summarize_batch(&self, commit: ObjectId, batch: &[FileJob]) -> Vec<FileOutcome> {
        let source = self.source;
        let timeout = self.timeout;
        let progress = self.progress.clone();
        self.pool.install(|| {
            batch
                .par_iter()
                .progress_with(progress)
                .map(|job| summarize_file(source, commit, job, timeout))
                .collect()
        })
    }

    /// Summarize every text file under `revision`, feeding `sink` in walk order.
    pub fn summarize<S>(
        &self,
        store: &S,
        revision: &ResolvedRevision,
        filter: PathFilter,
        sink: &mut dyn SummarySink,
    ) -> FatalResult<RunStats>
    where
        S: ObjectStore + ?Sized,
    {
        let mut walker = Walker::new(store, self.classifier, revision.tree, filter);
        let mut stats = RunStats::default();

        loop {
            let mut batch = Vec::with_capacity(self.batch_size);
            for event in walker.by_ref() {
                match event? {
                    WalkEvent::Skipped { path, reason } => {
                        info!("ignoring {} {}", reason, path);
                        stats.skipped(&reason);
                    }
                    WalkEvent::Text(job) => {
                        batch.push(job);
                        if batch.len() == self.batch_size {
                            break;
                        }
                    }
                }
            }
            if batch.is_empty() {
                break;
            }

            let outcomes = self.summarize_batch(revision.commit, &batch);
            for (job, outcome) in batch.into_iter().zip(outcomes) {
                match outcome {
                    FileOutcome::Summary(summary) => {
                        stats.summarized += 1;
                        sink.summary(summary)?;
                    }
                    FileOutcome::Empty => {
                        info!("ignoring empty file {}", job.path);
                        stats.empty += 1;
                    }
                    FileOutcome::Failed(err) => {
                        warn!("skipping {}: {}", job.path, err);
                        stats.failed += 1;
                    }
                    FileOutcome::Broken(source) => {
                        return Err(FatalError::Invariant {
                            path: job.path,
                            source,
                        });
                    }
                }
            }
            sink.batch_done()?;
        }
        stats.unmatched_paths = walker.unmatched_paths();
        Ok(stats)
    }
}

type Targets = (Vec<(String, ResolvedRevision)>, PathFilter);

/// The revisions to report on, and the path restriction.
///
/// Like `git ls-tree`, a first positional argument that resolves to a commit
/// is the revision when none was chosen otherwise.
fn targets(store: &GitStore, config: &RunConfig) -> FatalResult<Targets> {
    let mut paths = config.paths.as_slice();
    let leading = paths
        .first()
        .and_then(|first| store.resolve(first).ok().map(|resolved| (first.clone(), resolved)));

    let revisions = match (&config.revisions, leading) {
        (RevisionSelection::Implicit, Some(leading)) => {
            debug!("reporting on revision {}", leading.0);
            paths = &paths[1..];
            vec![leading]
        }
        (RevisionSelection::Implicit, None) => resolve_named(store, vec!["HEAD".to_string()])?,
        (_, Some((name, _))) => {
            return Err(FatalError::Config(format!(
                "'{}' is a revision but -r or --all-tags already chose one; use ./{} for the path",
                name, name
            )))
        }
        (RevisionSelection::Explicit(names), None) => resolve_named(store, names.clone())?,
        (RevisionSelection::AllTags, None) => {
            resolve_named(store, store.tag_names().map_err(FatalError::ListTags)?)?
        }
    };
    Ok((revisions, PathFilter::new(paths)))
}

fn resolve_named(store: &GitStore, names: Vec<String>) -> FatalResult<Vec<(String, ResolvedRevision)>> {
    names
        .into_iter()
        .map(|name| match store.resolve(&name) {
            Ok(resolved) => Ok((name, resolved)),
            Err(source) => Err(FatalError::ResolveRevision {
                revision: name,
                source,
            }),
        })
        .collect()
}

fn progress_bar(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {pos} files blamed [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Run a whole report as configured, writing data rows to `out`.
pub fn run<W: Write>(config: &RunConfig, out: W) -> FatalResult<()> {
    let store = GitStore::open(&config.git_dir)?;
    let (revisions, filter) = targets(&store, config)?;

    let cache = Arc::new(CommitCache::new());
    let git_dir = store.git_dir().to_path_buf();
    let source: Box<dyn AttributionSource> = match config.backend {
        Backend::Incremental => Box::new(IncrementalBlame::new(
            git_dir,
            config.attribution,
            config.author_key,
            Arc::clone(&cache),
        )),
        Backend::Libgit2 => Box::new(Libgit2Blame::new(
            git_dir,
            config.attribution,
            config.author_key,
            Arc::clone(&cache),
        )),
    };
    let classifier = NulSniffer::default();
    let progress = progress_bar(config.progress);
    let analyzer = Analyzer::new(source.as_ref(), &classifier, config.jobs, config.batch_size())?
        .with_timeout(config.timeout)
        .with_progress(progress.clone());

    match config.report {
        ReportKind::PerFile => {
            let mut writer = RecordWriter::new(out, config.dialect);
            writer.write_header()?;
            for (name, revision) in &revisions {
                let start = Instant::now();
                let stats = analyzer.summarize(&store, revision, filter.clone(), &mut writer)?;
                log_stats(name, &stats, start);
            }
            writer.into_inner()?;
        }
        ReportKind::YearsOld => {
            let mut writer = YearsOldWriter::new(out, config.dialect);
            writer.write_header()?;
            for (name, revision) in &revisions {
                let start = Instant::now();
                let mut histogram = YearsOldHistogram::new(revision.time);
                let stats = analyzer.summarize(&store, revision, filter.clone(), &mut histogram)?;
                writer.write_histogram(name, revision.time, &histogram)?;
                log_stats(name, &stats, start);
            }
            writer.into_inner()?;
        }
    }

    progress.finish_and_clear();
    if !cache.is_empty() {
        debug!("{} commits in metadata cache", cache.len());
    }
    Ok(())
}

fn log_stats(revision: &str, stats: &RunStats, start: Instant) {
    info!(
        "{}: {} files summarized in {:.2?} ({} binary, {} submodules, {} empty, {} unreadable, {} failed)",
        revision,
        stats.summarized,
        start.elapsed(),
        stats.binary,
        stats.submodules,
        stats.empty,
        stats.unreadable,
        stats.failed
    );
    for path in &stats.unmatched_paths {
        warn!("{}: '{}' did not match any file", revision, path);
    }
}
