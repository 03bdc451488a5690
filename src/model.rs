// src/model.rs

use chrono::{NaiveDate, TimeZone, Utc};

/// Identifies a tree, blob or commit in the object database
pub type ObjectId = git2::Oid;

/// Day number since the Unix epoch (UTC); the unit every age is measured in
pub type AgeBucket = i64;

pub const SECS_PER_DAY: i64 = 86_400;

/// What a tree entry points at, decided once when the tree is listed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Tree,
    Blob,
    /// A gitlink; the commit lives in another repository's object space
    Submodule,
    /// Anything else the object database reports. Never expected.
    Other(String),
}

/// One child of a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub id: ObjectId,
}

/// Author metadata of a commit, as reported by the attribution back-end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMeta {
    pub author_name: String,
    pub author_email: String,
    /// Author time, seconds since the Unix epoch
    pub author_time: i64,
}

impl CommitMeta {
    /// The identifier used for the author histogram.
    pub fn author_key(&self, key: AuthorKey) -> String {
        match key {
            AuthorKey::Name => self.author_name.clone(),
            AuthorKey::Email => {
                // "<twb@example.net>" -> "twb"
                let email = self.author_email.trim().trim_start_matches('<').trim_end_matches('>');
                let local = email.split('@').next().unwrap_or_default();
                if local.is_empty() {
                    self.author_name.clone()
                } else {
                    local.to_string()
                }
            }
        }
    }

    pub fn age_bucket(&self) -> AgeBucket {
        day_bucket(self.author_time)
    }
}

/// How authors are identified in the author histogram
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthorKey {
    /// The author name (mailmap applied when the back-end supports it)
    #[default]
    Name,
    /// The local part of the author email address
    Email,
}

/// A contiguous run of lines last touched by a single commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionRecord {
    pub line_count: u64,
    pub commit_age: AgeBucket,
    pub author: String,
}

/// The per-file output unit
#[derive(Debug, Clone, PartialEq)]
pub struct FileSummary {
    pub path: String,
    pub age_mode: AgeBucket,
    pub age_mean: f64,
    /// `age_mean` rounded towards negative infinity, computed exactly
    pub age_mean_floor: AgeBucket,
    pub author_mode: String,
}

pub fn day_bucket(timestamp: i64) -> AgeBucket {
    timestamp.div_euclid(SECS_PER_DAY)
}

/// Calendar date of a day bucket, `None` when chrono cannot represent it.
pub fn bucket_date(day: AgeBucket) -> Option<NaiveDate> {
    let secs = day.checked_mul(SECS_PER_DAY)?;
    Utc.timestamp_opt(secs, 0).single().map(|dt| dt.date_naive())
}
