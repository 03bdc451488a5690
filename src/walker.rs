// src/walker.rs

//! Depth-first enumeration of every blob reachable from a tree.
//!
//! The walker is an iterator over an explicit stack of tree frames, so it is
//! lazy: trees are listed only when the consumer gets to them. Submodules,
//! binary blobs and unreadable blobs come out as `WalkEvent::Skipped`; text
//! blobs come out as jobs for the attribution stage.

use crate::classify::{ContentClass, ContentClassifier};
use crate::error::{FatalError, FatalResult};
use crate::model::{EntryKind, ObjectId, TreeEntry};
use crate::store::ObjectStore;
use std::fmt;
use tracing::debug;

/// A text blob waiting for attribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub path: String,
    pub blob: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Submodule,
    Binary,
    Unreadable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Submodule => write!(f, "submodule"),
            SkipReason::Binary => write!(f, "binary blob"),
            SkipReason::Unreadable(err) => write!(f, "unreadable blob ({})", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    Text(FileJob),
    Skipped { path: String, reason: SkipReason },
}

/// Restricts a walk to a set of files and directories.
///
/// An empty filter admits everything.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    prefixes: Vec<String>,
}

impl PathFilter {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut prefixes = Vec::new();
        for path in paths {
            let normalized = path
                .as_ref()
                .trim_start_matches("./")
                .trim_matches('/')
                .to_string();
            if normalized.is_empty() || normalized == "." {
                // "." or "/" covers the whole tree
                return Self::default();
            }
            prefixes.push(normalized);
        }
        Self { prefixes }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// `path` is one of the restrictions or lies below one.
    pub fn includes(&self, path: &str) -> bool {
        self.is_unrestricted()
            || self
                .prefixes
                .iter()
                .any(|p| path == p || is_below(path, p))
    }

    /// Some admitted path may live under the directory `dir`.
    pub fn may_contain(&self, dir: &str) -> bool {
        self.includes(dir) || self.prefixes.iter().any(|p| is_below(p, dir))
    }
}

fn is_below(path: &str, dir: &str) -> bool {
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

struct Frame {
    prefix: String,
    entries: std::vec::IntoIter<TreeEntry>,
}

pub struct Walker<'a, S: ?Sized, C: ?Sized> {
    store: &'a S,
    classifier: &'a C,
    filter: PathFilter,
    root: Option<ObjectId>,
    stack: Vec<Frame>,
    /// Per restriction: some visited entry is it or lies below it
    matched: Vec<bool>,
    failed: bool,
}

impl<'a, S, C> Walker<'a, S, C>
where
    S: ObjectStore + ?Sized,
    C: ContentClassifier + ?Sized,
{
    pub fn new(store: &'a S, classifier: &'a C, root: ObjectId, filter: PathFilter) -> Self {
        Self {
            store,
            classifier,
            matched: vec![false; filter.prefixes.len()],
            filter,
            root: Some(root),
            stack: Vec::new(),
            failed: false,
        }
    }

    /// Restrictions no visited entry has matched. Complete once the walk
    /// has run to the end.
    pub fn unmatched_paths(&self) -> Vec<String> {
        self.filter
            .prefixes
            .iter()
            .zip(&self.matched)
            .filter(|&(_, &seen)| !seen)
            .map(|(prefix, _)| prefix.clone())
            .collect()
    }

    fn mark_matched(&mut self, path: &str) {
        for (seen, prefix) in self.matched.iter_mut().zip(&self.filter.prefixes) {
            if !*seen && (path == prefix || is_below(path, prefix)) {
                *seen = true;
            }
        }
    }

    fn push_tree(&mut self, tree: ObjectId, prefix: String) -> FatalResult<()> {
        let mut entries = self
            .store
            .list_entries(tree)
            .map_err(|source| FatalError::ListTree {
                path: prefix.clone(),
                source,
            })?;
        // Tree order differs between back-ends; byte order does not.
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        self.stack.push(Frame {
            prefix,
            entries: entries.into_iter(),
        });
        Ok(())
    }

    fn visit(&mut self, entry: TreeEntry, path: String) -> FatalResult<Option<WalkEvent>> {
        debug!("entry path is {}", path);
        self.mark_matched(&path);
        match entry.kind {
            EntryKind::Other(kind) => Err(FatalError::UnknownEntryKind { path, kind }),
            EntryKind::Tree => {
                if self.filter.may_contain(&path) {
                    self.push_tree(entry.id, path)?;
                }
                Ok(None)
            }
            _ if !self.filter.includes(&path) => Ok(None),
            EntryKind::Submodule => Ok(Some(WalkEvent::Skipped {
                path,
                reason: SkipReason::Submodule,
            })),
            EntryKind::Blob => {
                let reason = match self.store.read_blob(entry.id) {
                    Err(err) => SkipReason::Unreadable(err.message().to_string()),
                    Ok(content) => match self.classifier.classify(&content) {
                        ContentClass::Binary => SkipReason::Binary,
                        ContentClass::Text => {
                            return Ok(Some(WalkEvent::Text(FileJob {
                                path,
                                blob: entry.id,
                            })))
                        }
                    },
                };
                Ok(Some(WalkEvent::Skipped { path, reason }))
            }
        }
    }
}

impl<'a, S, C> Iterator for Walker<'a, S, C>
where
    S: ObjectStore + ?Sized,
    C: ContentClassifier + ?Sized,
{
    type Item = FatalResult<WalkEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(root) = self.root.take() {
            if let Err(err) = self.push_tree(root, String::new()) {
                self.failed = true;
                return Some(Err(err));
            }
        }
        loop {
            let frame = self.stack.last_mut()?;
            let Some(entry) = frame.entries.next() else {
                self.stack.pop();
                continue;
            };
            let path = join_path(&frame.prefix, &entry.name);
            match self.visit(entry, path) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
