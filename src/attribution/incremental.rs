// src/attribution/incremental.rs

//! `git blame --incremental` back-end.
//!
//! Stream layout, one hunk at a time:
//!
//! ```text
//! <40-hex commit> <orig line> <final line> <lines in hunk>
//! author Alice
//! author-mail <alice@example.com>
//! author-time 1457000000
//! ...
//! filename src/main.c
//! ```
//!
//! The `author*` headers are only printed the first time a commit shows up
//! in the stream; later hunks from the same commit carry just the hunk
//! header and the `filename` terminator.

use super::{AttributionOptions, AttributionRequest, AttributionSource, CommitCache, Deadline};
use crate::error::AttributionError;
use crate::model::{AttributionRecord, AuthorKey, CommitMeta, ObjectId};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

/// A parsed hunk with its commit metadata resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameHunk {
    pub commit: ObjectId,
    pub line_count: u64,
    pub meta: CommitMeta,
}

impl BlameHunk {
    pub fn into_record(self, key: AuthorKey) -> AttributionRecord {
        AttributionRecord {
            line_count: self.line_count,
            commit_age: self.meta.age_bucket(),
            author: self.meta.author_key(key),
        }
    }
}

struct PendingHunk {
    commit: ObjectId,
    line_count: u64,
    header_line: usize,
    author: Option<String>,
    author_mail: Option<String>,
    author_time: Option<i64>,
}

/// Iterator over the hunks of an incremental blame stream.
///
/// Commit metadata is recorded in, and looked up from, `cache`. Hunks
/// covering zero lines are dropped. The iterator ends after the first
/// error.
pub struct HunkReader<'c, R> {
    reader: R,
    cache: &'c CommitCache,
    buf: Vec<u8>,
    line_no: usize,
    done: bool,
}

impl<'c, R: BufRead> HunkReader<'c, R> {
    pub fn new(reader: R, cache: &'c CommitCache) -> Self {
        Self {
            reader,
            cache,
            buf: Vec::new(),
            line_no: 0,
            done: false,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> AttributionError {
        AttributionError::Malformed {
            line: self.line_no,
            reason: reason.into(),
        }
    }

    fn read_hunk(&mut self) -> Result<Option<BlameHunk>, AttributionError> {
        let mut pending: Option<PendingHunk> = None;
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return match pending {
                    Some(hunk) => Err(AttributionError::Malformed {
                        line: hunk.header_line,
                        reason: "stream ended before the hunk's filename line".to_string(),
                    }),
                    None => Ok(None),
                };
            }
            self.line_no += 1;

            // Author names are not guaranteed to be UTF-8.
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(' ').unwrap_or((line, ""));

            if is_commit_id(key) {
                if pending.is_some() {
                    return Err(self.malformed("new hunk started before filename line"));
                }
                pending = Some(self.parse_header(key, value)?);
                continue;
            }

            let Some(hunk) = pending.as_mut() else {
                return Err(self.malformed(format!("'{}' outside of a hunk", key)));
            };
            match key {
                "author" => hunk.author = Some(value.to_string()),
                "author-mail" => hunk.author_mail = Some(value.to_string()),
                "author-time" => {
                    let time = value
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| self.malformed(format!("bad author-time '{}'", value)))?;
                    hunk.author_time = Some(time);
                }
                "filename" => {
                    let Some(hunk) = pending.take() else {
                        continue;
                    };
                    let hunk = self.resolve(hunk)?;
                    if hunk.line_count == 0 {
                        debug!("dropping empty hunk for {}", hunk.commit);
                        continue;
                    }
                    return Ok(Some(hunk));
                }
                _ => {}
            }
        }
    }

    fn parse_header(&self, commit: &str, rest: &str) -> Result<PendingHunk, AttributionError> {
        let numbers: Vec<u64> = rest
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| self.malformed(format!("bad hunk header '{} {}'", commit, rest)))?;
        let [_orig_line, _final_line, line_count] = numbers[..] else {
            return Err(self.malformed(format!(
                "hunk header needs three numbers, got {}",
                numbers.len()
            )));
        };
        let commit = ObjectId::from_str(commit)
            .map_err(|err| self.malformed(format!("bad commit id: {}", err.message())))?;
        Ok(PendingHunk {
            commit,
            line_count,
            header_line: self.line_no,
            author: None,
            author_mail: None,
            author_time: None,
        })
    }

    fn resolve(&self, hunk: PendingHunk) -> Result<BlameHunk, AttributionError> {
        let meta = match hunk.author_time {
            Some(author_time) => {
                let meta = CommitMeta {
                    author_name: hunk.author.unwrap_or_default(),
                    author_email: hunk.author_mail.unwrap_or_default(),
                    author_time,
                };
                self.cache.insert(hunk.commit, meta.clone());
                meta
            }
            None => self.cache.get(&hunk.commit).ok_or_else(|| AttributionError::Malformed {
                line: hunk.header_line,
                reason: format!("no author metadata for commit {}", hunk.commit),
            })?,
        };
        Ok(BlameHunk {
            commit: hunk.commit,
            line_count: hunk.line_count,
            meta,
        })
    }
}

impl<'c, R: BufRead> Iterator for HunkReader<'c, R> {
    type Item = Result<BlameHunk, AttributionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_hunk() {
            Ok(Some(hunk)) => Some(Ok(hunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn is_commit_id(token: &str) -> bool {
    token.len() == 40 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Attribution by running `git blame --incremental` per file
pub struct IncrementalBlame {
    git_dir: PathBuf,
    program: OsString,
    leading_args: Vec<OsString>,
    options: AttributionOptions,
    author_key: AuthorKey,
    cache: Arc<CommitCache>,
}

impl IncrementalBlame {
    pub fn new(
        git_dir: PathBuf,
        options: AttributionOptions,
        author_key: AuthorKey,
        cache: Arc<CommitCache>,
    ) -> Self {
        Self {
            git_dir,
            program: OsString::from("git"),
            leading_args: Vec::new(),
            options,
            author_key,
            cache,
        }
    }

    /// Run `program leading_args... --git-dir ...` instead of `git --git-dir ...`.
    pub fn with_git_command<I, S>(mut self, program: impl Into<OsString>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.program = program.into();
        self.leading_args = leading_args.into_iter().map(Into::into).collect();
        self
    }

    pub fn command(&self, request: &AttributionRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("--git-dir")
            .arg(&self.git_dir)
            .args(["blame", "--incremental"]);
        if self.options.ignore_whitespace {
            cmd.arg("-w");
        }
        if self.options.detect_moves_within_file {
            cmd.arg("-M");
        }
        if self.options.detect_moves_across_commit {
            cmd.arg("-C");
        }
        cmd.arg(request.commit.to_string())
            .arg("--")
            .arg(request.path)
            .current_dir(&self.git_dir)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

fn drain(
    rx: Receiver<Result<AttributionRecord, AttributionError>>,
    deadline: Option<Deadline>,
    sink: &mut dyn FnMut(AttributionRecord),
) -> Result<(), AttributionError> {
    loop {
        let item = match deadline {
            Some(deadline) => match rx.recv_deadline(deadline.at) {
                Ok(item) => item,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(AttributionError::Timeout(deadline.budget))
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            },
            None => match rx.recv() {
                Ok(item) => item,
                Err(_) => return Ok(()),
            },
        };
        sink(item?);
    }
}

impl AttributionSource for IncrementalBlame {
    fn attribute(
        &self,
        request: &AttributionRequest<'_>,
        sink: &mut dyn FnMut(AttributionRecord),
    ) -> Result<(), AttributionError> {
        let mut child = self.command(request).spawn().map_err(AttributionError::Spawn)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stderr_reader = thread::spawn(move || {
            let mut bytes = Vec::new();
            if let Some(mut stderr) = stderr {
                if let Err(err) = stderr.read_to_end(&mut bytes) {
                    debug!("failed to read git blame stderr: {}", err);
                }
            }
            // git prints paths and names verbatim; keep whatever is readable.
            String::from_utf8_lossy(&bytes).into_owned()
        });

        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let cache = Arc::clone(&self.cache);
        let key = self.author_key;
        let stdout_reader = thread::spawn(move || {
            let Some(stdout) = stdout else {
                return;
            };
            for item in HunkReader::new(BufReader::new(stdout), &cache) {
                if tx.send(item.map(|hunk| hunk.into_record(key))).is_err() {
                    break;
                }
            }
        });

        let result = drain(rx, request.deadline, sink);
        if result.is_err() {
            let _ = child.kill();
        }
        let status = child.wait()?;
        let _ = stdout_reader.join();
        let stderr = stderr_reader.join().unwrap_or_default();
        result?;

        if !status.success() {
            return Err(AttributionError::Exit {
                status,
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use std::io::Cursor;
    use std::time::Duration;

    const ALICE: &str = "a3f1c0de00000000000000000000000000000001";
    const BOB: &str = "b0b0b0b000000000000000000000000000000002";

    fn fixture() -> String {
        format!(
            "{alice} 1 1 6\n\
             author Alice\n\
             author-mail <alice@example.com>\n\
             author-time 86500\n\
             author-tz +0000\n\
             committer Alice\n\
             committer-mail <alice@example.com>\n\
             committer-time 86500\n\
             committer-tz +0000\n\
             summary first\n\
             boundary\n\
             filename src/a.c\n\
             {bob} 3 7 3\n\
             author Bob\n\
             author-mail <bob@example.org>\n\
             author-time 432100\n\
             author-tz -0500\n\
             committer Bob\n\
             committer-mail <bob@example.org>\n\
             committer-time 432100\n\
             committer-tz -0500\n\
             summary second\n\
             previous {alice} src/a.c\n\
             filename src/a.c\n\
             {bob} 9 10 1\n\
             filename src/a.c\n",
            alice = ALICE,
            bob = BOB
        )
    }

    fn read_all(input: &str, cache: &CommitCache) -> Vec<Result<BlameHunk, AttributionError>> {
        HunkReader::new(Cursor::new(input.as_bytes().to_vec()), cache).collect()
    }

    #[test]
    fn test_parse_stream_reuses_commit_metadata() {
        let cache = CommitCache::new();
        let hunks: Vec<BlameHunk> = read_all(&fixture(), &cache)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(hunks.len(), 3);
        assert_eq!(hunks[0].line_count, 6);
        assert_eq!(hunks[0].meta.author_name, "Alice");
        assert_eq!(hunks[1].line_count, 3);
        assert_eq!(hunks[2].meta.author_name, "Bob");
        assert_eq!(hunks[2].meta.author_time, 432_100);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_stream_aggregates_to_expected_histogram() {
        let cache = CommitCache::new();
        let records = read_all(&fixture(), &cache)
            .into_iter()
            .map(|h| h.unwrap().into_record(AuthorKey::Email));
        let histogram = aggregate(records);
        assert_eq!(histogram.total_lines(), 10);
        assert_eq!(histogram.ages()[&1], 6);
        assert_eq!(histogram.ages()[&5], 4);
        assert_eq!(histogram.authors()["alice"], 6);
        assert_eq!(histogram.authors()["bob"], 4);
    }

    #[test]
    fn test_crlf_and_blank_lines_are_tolerated() {
        let cache = CommitCache::new();
        let input = fixture().replace('\n', "\r\n") + "\r\n";
        let hunks = read_all(&input, &cache);
        assert_eq!(hunks.len(), 3);
        assert!(hunks.iter().all(Result::is_ok));
    }

    #[test]
    fn test_empty_stream() {
        let cache = CommitCache::new();
        assert!(read_all("", &cache).is_empty());
    }

    #[test]
    fn test_metadata_from_shared_cache() {
        let cache = CommitCache::new();
        let id = ObjectId::from_str(BOB).unwrap();
        cache.insert(
            id,
            CommitMeta {
                author_name: "Bob".into(),
                author_email: "<bob@example.org>".into(),
                author_time: 0,
            },
        );
        let input = format!("{} 1 1 2\nfilename x\n", BOB);
        let hunks = read_all(&input, &cache);
        assert_eq!(hunks[0].as_ref().unwrap().meta.author_name, "Bob");
    }

    #[test]
    fn test_zero_line_hunk_is_dropped() {
        let cache = CommitCache::new();
        let input = format!(
            "{a} 1 1 0\nauthor A\nauthor-time 5\nfilename x\n{a} 1 1 2\nfilename x\n",
            a = ALICE
        );
        let hunks = read_all(&input, &cache);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].as_ref().unwrap().line_count, 2);
    }

    fn expect_malformed(input: &str, line: usize) {
        let cache = CommitCache::new();
        let items = read_all(input, &cache);
        match items.last() {
            Some(Err(AttributionError::Malformed { line: at, .. })) => assert_eq!(*at, line),
            other => panic!("expected malformed error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_streams() {
        // unknown commit without metadata
        expect_malformed(&format!("{} 1 1 2\nfilename x\n", ALICE), 1);
        // second header before filename
        expect_malformed(&format!("{a} 1 1 2\n{a} 3 3 1\n", a = ALICE), 2);
        // header key before any hunk
        expect_malformed("author Alice\n", 1);
        // truncated stream
        expect_malformed(&format!("{} 1 1 2\nauthor A\n", ALICE), 1);
        // wrong number of fields
        expect_malformed(&format!("{} 1 2\n", ALICE), 1);
        // non-numeric count
        expect_malformed(&format!("{} 1 1 many\n", ALICE), 1);
        // bad timestamp
        expect_malformed(&format!("{} 1 1 1\nauthor-time soon\n", ALICE), 2);
    }

    #[test]
    fn test_reader_stops_after_error() {
        let cache = CommitCache::new();
        let input = format!("author x\n{}", fixture());
        let items = read_all(&input, &cache);
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    fn request(deadline: Option<Deadline>) -> AttributionRequest<'static> {
        AttributionRequest {
            commit: ObjectId::from_str(ALICE).unwrap(),
            path: "src/a.c",
            deadline,
        }
    }

    fn source(options: AttributionOptions) -> IncrementalBlame {
        IncrementalBlame::new(
            std::env::temp_dir(),
            options,
            AuthorKey::Name,
            Arc::new(CommitCache::new()),
        )
    }

    #[test]
    fn test_command_arguments() {
        let cmd = source(AttributionOptions::default()).command(&request(None));
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(cmd.get_program(), "git");
        assert_eq!(&args[2..], ["blame", "--incremental", "-w", "-M", "-C", ALICE, "--", "src/a.c"]);

        let plain = AttributionOptions {
            ignore_whitespace: false,
            detect_moves_within_file: false,
            detect_moves_across_commit: false,
        };
        let cmd = source(plain).command(&request(None));
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(&args[2..], ["blame", "--incremental", ALICE, "--", "src/a.c"]);
    }

    #[cfg(unix)]
    fn scripted(script: &str) -> IncrementalBlame {
        source(AttributionOptions::default()).with_git_command("/bin/sh", ["-c", script, "fake-git"])
    }

    #[cfg(unix)]
    #[test]
    fn test_streams_records_from_child_process() {
        let script = format!("cat <<'EOF'\n{}EOF\n", fixture());
        let mut records = Vec::new();
        scripted(&script)
            .attribute(&request(None), &mut |r| records.push(r))
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].author, "Alice");
        assert_eq!(records[0].commit_age, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_child_failure_is_reported() {
        let err = scripted("echo 'fatal: no such path' >&2; exit 128")
            .attribute(&request(None), &mut |_| {})
            .unwrap_err();
        match err {
            AttributionError::Exit { stderr, .. } => assert_eq!(stderr, "fatal: no such path"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_deadline_kills_child() {
        let deadline = Deadline::after(Duration::from_millis(200));
        let err = scripted("exec sleep 30")
            .attribute(&request(Some(deadline)), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, AttributionError::Timeout(d) if d == Duration::from_millis(200)));
    }

    #[cfg(unix)]
    #[test]
    fn test_blames_real_repository() -> anyhow::Result<()> {
        use git2::{Repository, Signature, Time};

        let have_git = Command::new("git")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false);
        if !have_git {
            eprintln!("git not on PATH, skipping");
            return Ok(());
        }

        let dir = tempfile::tempdir()?;
        let repo = Repository::init(dir.path())?;
        let mut parent = None;
        let history = [
            ("a", 1, "1\n2\n3\n4\n5\n6\n"),
            ("b", 5, "1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n"),
        ];
        for (author, day, content) in history {
            let email = format!("{}@example.com", author);
            let sig = Signature::new(author, &email, &Time::new(day * 86_400 + 100, 0))?;
            let mut builder = repo.treebuilder(None)?;
            builder.insert("f.txt", repo.blob(content.as_bytes())?, 0o100644)?;
            let tree = repo.find_tree(builder.write()?)?;
            let parents = parent
                .iter()
                .map(|id| repo.find_commit(*id))
                .collect::<Result<Vec<_>, _>>()?;
            let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
            parent = Some(repo.commit(Some("HEAD"), &sig, &sig, "change", &tree, &parent_refs)?);
        }
        let head = parent.ok_or_else(|| anyhow::anyhow!("no commit"))?;

        let blame = IncrementalBlame::new(
            repo.path().to_path_buf(),
            AttributionOptions::default(),
            AuthorKey::Name,
            Arc::new(CommitCache::new()),
        );
        let request = AttributionRequest {
            commit: head,
            path: "f.txt",
            deadline: Some(Deadline::after(Duration::from_secs(60))),
        };
        let mut records = Vec::new();
        blame.attribute(&request, &mut |r| records.push(r))?;
        let histogram = aggregate(records);
        assert_eq!(histogram.total_lines(), 10);
        assert_eq!(histogram.ages()[&1], 6);
        assert_eq!(histogram.ages()[&5], 4);
        assert_eq!(histogram.authors()["a"], 6);
        assert_eq!(histogram.authors()["b"], 4);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_undecodable_stderr_is_kept() {
        let err = scripted("printf 'fatal: bad \\377 path\\n' >&2; exit 128")
            .attribute(&request(None), &mut |_| {})
            .unwrap_err();
        match err {
            AttributionError::Exit { stderr, .. } => assert_eq!(stderr, "fatal: bad \u{fffd} path"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
