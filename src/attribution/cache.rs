// src/attribution/cache.rs

use crate::model::{CommitMeta, ObjectId};
use dashmap::DashMap;

/// Read-through commit metadata cache shared by every worker of a run.
///
/// Holds nothing file-specific, so concurrent lookups and inserts from
/// different files are safe.
#[derive(Debug, Default)]
pub struct CommitCache {
    entries: DashMap<ObjectId, CommitMeta>,
}

impl CommitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, commit: &ObjectId) -> Option<CommitMeta> {
        self.entries.get(commit).map(|meta| meta.value().clone())
    }

    /// Remember `meta` unless the commit is already known.
    pub fn insert(&self, commit: ObjectId, meta: CommitMeta) {
        self.entries.entry(commit).or_insert(meta);
    }

    pub fn get_or_insert_with<F>(&self, commit: ObjectId, load: F) -> CommitMeta
    where
        F: FnOnce() -> CommitMeta,
    {
        if let Some(meta) = self.get(&commit) {
            return meta;
        }
        self.entries.entry(commit).or_insert_with(load).value().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
