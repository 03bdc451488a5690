// src/finalize.rs

//! Turns a file's histogram into its reported statistics.
//!
//! Ties for either mode go to the smallest key: the oldest day for
//! `age_mode`, the lexicographically smallest author for `author_mode`.

use crate::aggregate::FileAgeHistogram;
use crate::error::InvariantViolation;
use crate::model::FileSummary;
use std::collections::BTreeMap;

/// `Ok(None)` when the histogram holds no lines.
pub fn finalize(
    path: &str,
    histogram: &FileAgeHistogram,
) -> Result<Option<FileSummary>, InvariantViolation> {
    let total = histogram.total_lines();
    if total == 0 {
        if histogram.ages().is_empty() && histogram.authors().is_empty() {
            return Ok(None);
        }
        return Err(InvariantViolation {
            ages: histogram.ages().len(),
            authors: histogram.authors().len(),
        });
    }

    let (Some(age_mode), Some(author_mode)) = (mode(histogram.ages()), mode(histogram.authors()))
    else {
        return Err(InvariantViolation {
            ages: histogram.ages().len(),
            authors: histogram.authors().len(),
        });
    };

    let total = i128::from(total);
    let floor = histogram.age_sum().div_euclid(total);
    let rem = histogram.age_sum().rem_euclid(total);
    // floor lies between the smallest and largest bucket, so it fits an i64
    let age_mean_floor = floor as i64;
    let age_mean = age_mean_floor as f64 + rem as f64 / total as f64;

    Ok(Some(FileSummary {
        path: path.to_string(),
        age_mode: *age_mode,
        age_mean,
        age_mean_floor,
        author_mode: author_mode.clone(),
    }))
}

/// Key with the largest count; the first (smallest) key wins ties.
fn mode<K>(counts: &BTreeMap<K, u64>) -> Option<&K> {
    let mut best: Option<(&K, u64)> = None;
    for (key, &count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((key, count)),
        }
    }
    best.map(|(key, _)| key)
}
