// src/aggregate.rs

use crate::model::{AgeBucket, AttributionRecord};
use std::collections::BTreeMap;

/// Running line counts for one file.
///
/// Keys are kept ordered so that mode selection can break ties by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAgeHistogram {
    pub(crate) ages: BTreeMap<AgeBucket, u64>,
    pub(crate) authors: BTreeMap<String, u64>,
    pub(crate) age_sum: i128,
    pub(crate) total_lines: u64,
}

impl FileAgeHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one hunk into the counters.
    pub fn record(&mut self, record: &AttributionRecord) {
        if record.line_count == 0 {
            return;
        }
        *self.ages.entry(record.commit_age).or_insert(0) += record.line_count;
        if let Some(count) = self.authors.get_mut(&record.author) {
            *count += record.line_count;
        } else {
            self.authors.insert(record.author.clone(), record.line_count);
        }
        self.age_sum += i128::from(record.commit_age) * i128::from(record.line_count);
        self.total_lines += record.line_count;
    }

    /// True when no lines have been recorded.
    pub fn is_empty(&self) -> bool {
        self.total_lines == 0
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    pub fn ages(&self) -> &BTreeMap<AgeBucket, u64> {
        &self.ages
    }

    pub fn authors(&self) -> &BTreeMap<String, u64> {
        &self.authors
    }

    pub fn age_sum(&self) -> i128 {
        self.age_sum
    }
}

impl Extend<AttributionRecord> for FileAgeHistogram {
    fn extend<I: IntoIterator<Item = AttributionRecord>>(&mut self, iter: I) {
        for record in iter {
            self.record(&record);
        }
    }
}

/// Fold an attribution sequence in a single pass.
pub fn aggregate<I>(records: I) -> FileAgeHistogram
where
    I: IntoIterator<Item = AttributionRecord>,
{
    let mut histogram = FileAgeHistogram::new();
    histogram.extend(records);
    histogram
}
