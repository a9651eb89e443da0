use std::cmp::Ordering;

use ahash::AHashMap;
use anyhow::{Result, bail};

use crate::engine::budget::Deadline;
use crate::engine::index::FileCommitIndex;
use crate::error::{AnalyzeError, Stage};
use crate::models::cochange::{CoChangeResult, CorrelationPair};

#[derive(Debug, Clone, PartialEq)]
pub struct CoChangeParams {
    /// Minimum number of commits a pair must share
    pub threshold: usize,
    pub max_results: usize,
    /// Minimum Jaccard score (0.0 to 1.0)
    pub min_correlation: f64,
    /// Only keep pairs containing this path
    pub file: Option<String>,
}

impl Default for CoChangeParams {
    fn default() -> Self {
        Self {
            threshold: 1,
            max_results: 20,
            min_correlation: 0.0,
            file: None,
        }
    }
}

impl CoChangeParams {
    pub fn validate(&self) -> Result<()> {
        if self.threshold < 1 {
            bail!(AnalyzeError::invalid_argument(format!(
                "threshold must be >= 1, got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_correlation) {
            bail!(AnalyzeError::invalid_argument(format!(
                "min_correlation must be between 0.0 and 1.0, got {}",
                self.min_correlation
            )));
        }
        Ok(())
    }
}

/// Compute Jaccard co-change correlation for every pair of files sharing a commit.
///
/// Pairs are enumerated through each commit's own file set, so cost follows
/// Σ (files per commit choose 2) rather than the square of all files.
pub fn compute_correlations(
    index: &FileCommitIndex,
    params: &CoChangeParams,
    deadline: &Deadline,
) -> Result<CoChangeResult> {
    params.validate()?;
    let focus = params.file.as_deref();

    // 1. Count co-occurrences per (a, b) with a < b
    let mut pair_counts: AHashMap<(&str, &str), usize> = AHashMap::new();
    for (_, files) in index.commits() {
        deadline.check(Stage::Correlation)?;
        if files.len() < 2 {
            continue;
        }
        // BTreeSet iteration is sorted, so i < j gives file_a < file_b
        let files: Vec<&str> = files.iter().map(String::as_str).collect();
        for i in 0..files.len() {
            // one wide commit can hold most of the pairs
            deadline.check(Stage::Correlation)?;
            for j in (i + 1)..files.len() {
                let (a, b) = (files[i], files[j]);
                if let Some(focus) = focus
                    && a != focus
                    && b != focus
                {
                    continue;
                }
                *pair_counts.entry((a, b)).or_insert(0) += 1;
            }
        }
    }

    // 2. Score and filter
    let mut correlations: Vec<CorrelationPair> = pair_counts
        .into_iter()
        .filter(|&(_, co_changes)| co_changes >= params.threshold)
        .filter_map(|((file_a, file_b), co_changes)| {
            let changes_a = index.change_count(file_a);
            let changes_b = index.change_count(file_b);
            let correlation = jaccard(co_changes, changes_a, changes_b);
            if correlation < params.min_correlation {
                return None;
            }
            Some(CorrelationPair {
                file_a: file_a.to_string(),
                file_b: file_b.to_string(),
                correlation,
                co_changes,
                changes_a,
                changes_b,
            })
        })
        .collect();

    deadline.check(Stage::Aggregation)?;

    // 3. Rank
    correlations.sort_by(|a, b| {
        b.correlation
            .partial_cmp(&a.correlation)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.co_changes.cmp(&a.co_changes))
            .then_with(|| a.file_a.cmp(&b.file_a))
            .then_with(|| a.file_b.cmp(&b.file_b))
    });

    let total_pairs = correlations.len();
    correlations.truncate(params.max_results);

    Ok(CoChangeResult {
        commits_analyzed: index.commit_count(),
        threshold: params.threshold,
        total_pairs,
        correlations,
    })
}

/// `|A ∩ B| / |A ∪ B|` from the intersection and both set sizes.
pub fn jaccard(co_changes: usize, changes_a: usize, changes_b: usize) -> f64 {
    let union = changes_a + changes_b - co_changes;
    if union == 0 {
        return 0.0;
    }
    co_changes as f64 / union as f64
}
