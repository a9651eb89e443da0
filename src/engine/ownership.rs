//! Recency-weighted file ownership and author expertise.

use ahash::AHashMap;
use anyhow::{Result, bail};
use time::OffsetDateTime;

use crate::engine::budget::Deadline;
use crate::engine::index::FileCommitIndex;
use crate::error::{AnalyzeError, Stage};
use crate::models::commit::{ChangeStatus, CommitRecord, CommitTable};
use crate::models::ownership::{
    Classification, ExpertiseFile, ExpertiseResult, OwnershipEntry, OwnershipResult,
};

/// Cutoffs that turn an ownership share into a label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OwnershipPolicy {
    pub primary_pct: f64,
    pub secondary_pct: f64,
    /// Authors idle for longer than this are flagged stale
    pub stale_days: i64,
}

impl Default for OwnershipPolicy {
    fn default() -> Self {
        Self {
            primary_pct: 40.0,
            secondary_pct: 20.0,
            stale_days: 180,
        }
    }
}

impl OwnershipPolicy {
    pub fn classify(&self, pct: f64) -> Classification {
        if pct >= self.primary_pct {
            Classification::Primary
        } else if pct >= self.secondary_pct {
            Classification::Secondary
        } else {
            Classification::Historical
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.secondary_pct >= 0.0 && self.secondary_pct <= self.primary_pct) {
            bail!(AnalyzeError::invalid_argument(format!(
                "classification cutoffs must satisfy 0 <= secondary ({}) <= primary ({})",
                self.secondary_pct, self.primary_pct
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipParams {
    /// e-folding time of a contribution's weight, in days
    pub decay_days: i64,
    pub policy: OwnershipPolicy,
    /// Include commits made under the file's earlier names
    pub follow_renames: bool,
    /// Reference instant ages are measured from
    pub now: OffsetDateTime,
}

impl OwnershipParams {
    pub fn new(decay_days: i64, now: OffsetDateTime) -> Self {
        Self {
            decay_days,
            policy: OwnershipPolicy::default(),
            follow_renames: true,
            now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.decay_days <= 0 || self.decay_days > i64::from(u32::MAX) {
            bail!(AnalyzeError::invalid_argument(format!(
                "decay_days must be a positive number of days, got {}",
                self.decay_days
            )));
        }
        self.policy.validate()
    }
}

/// `exp(-age / decay)`: 1.0 for today, 1/e after `decay_days`.
pub fn recency_weight(age_days: i64, decay_days: i64) -> f64 {
    (-(age_days as f64) / decay_days as f64).exp()
}

#[derive(Default)]
struct AuthorTally {
    raw_commits: usize,
    ages: Vec<i64>,
}

/// Score every author of `file` by recency-weighted commit count.
pub fn score_ownership(
    file: &str,
    index: &FileCommitIndex,
    table: &CommitTable,
    params: &OwnershipParams,
    deadline: &Deadline,
) -> Result<OwnershipResult> {
    params.validate()?;

    let history = file_history(
        file,
        index,
        table,
        params.follow_renames,
        deadline,
        Stage::Ownership,
    )?;

    let mut tallies: AHashMap<&str, AuthorTally> = AHashMap::new();
    for record in &history.commits {
        let tally = tallies.entry(record.author.as_str()).or_default();
        tally.raw_commits += 1;
        tally.ages.push(record.age_days(params.now));
    }

    // Shares use weights relative to the newest contribution; absolute weights underflow to
    // zero on histories much older than decay_days.
    let newest = tallies
        .values()
        .flat_map(|t| t.ages.iter().copied())
        .min()
        .unwrap_or(0);
    let shifted: Vec<(&str, f64)> = tallies
        .iter()
        .map(|(author, t)| {
            let score: f64 = t
                .ages
                .iter()
                .map(|&age| recency_weight(age - newest, params.decay_days))
                .sum();
            (*author, score)
        })
        .collect();
    let shifted_total: f64 = shifted.iter().map(|(_, s)| s).sum();

    let mut ownership: Vec<OwnershipEntry> = shifted
        .into_iter()
        .filter_map(|(author, shifted_score)| {
            let tally = tallies.get(author)?;
            let ownership_pct = if shifted_total > 0.0 {
                100.0 * (shifted_score / shifted_total)
            } else {
                0.0
            };
            let last_commit_days = tally.ages.iter().copied().min().unwrap_or(0);
            Some(OwnershipEntry {
                author: author.to_string(),
                raw_commits: tally.raw_commits,
                weighted_score: tally
                    .ages
                    .iter()
                    .map(|&age| recency_weight(age, params.decay_days))
                    .sum(),
                ownership_pct,
                classification: params.policy.classify(ownership_pct),
                last_commit_days,
                stale: last_commit_days > params.policy.stale_days,
            })
        })
        .collect();

    ownership.sort_by(|a, b| {
        b.ownership_pct
            .total_cmp(&a.ownership_pct)
            .then_with(|| a.author.cmp(&b.author))
    });

    Ok(OwnershipResult {
        file: file.to_string(),
        total_commits: history.commits.len(),
        decay_days: params.decay_days as u32,
        previous_paths: history.previous_paths,
        ownership,
    })
}

/// Files changed by commits whose author name or email contains `author`
/// (case-insensitive), with per-file commit counts.
pub fn analyze_expertise(
    author: &str,
    index: &FileCommitIndex,
    table: &CommitTable,
    deadline: &Deadline,
) -> Result<ExpertiseResult> {
    let needle = author.trim().to_lowercase();
    if needle.is_empty() {
        bail!(AnalyzeError::invalid_argument("author must not be empty"));
    }

    let mut counts: AHashMap<&str, usize> = AHashMap::new();
    for record in table.iter() {
        deadline.check(Stage::Ownership)?;
        if !matches_author(record, &needle) {
            continue;
        }
        let Some(files) = index.files_of(&record.hash) else {
            continue;
        };
        for path in files {
            *counts.entry(path.as_str()).or_insert(0) += 1;
        }
    }

    let mut files: Vec<ExpertiseFile> = counts
        .into_iter()
        .map(|(path, commits)| ExpertiseFile {
            path: path.to_string(),
            commits,
        })
        .collect();
    files.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.path.cmp(&b.path)));

    Ok(ExpertiseResult {
        author: author.trim().to_string(),
        total_files: files.len(),
        files,
    })
}

fn matches_author(record: &CommitRecord, needle: &str) -> bool {
    record.author.to_lowercase().contains(needle) || record.email.to_lowercase().contains(needle)
}

/// Commits that touched one file, newest first, and the names it had before.
pub(crate) struct FileHistory<'a> {
    pub commits: Vec<&'a CommitRecord>,
    /// Earlier names, newest rename first
    pub previous_paths: Vec<String>,
}

/// Walk history from the newest commit to the oldest, collecting commits that touched `file`.
///
/// With `follow_renames`, the walk switches to a file's old name at the commit that renamed it,
/// so an old name only counts for commits older than that rename. A later, unrelated file that
/// reuses the old name is not part of this history. A chain `a -> b -> c` queried as `c` yields
/// previous paths `[b, a]`.
pub(crate) fn file_history<'a>(
    file: &str,
    index: &FileCommitIndex,
    table: &'a CommitTable,
    follow_renames: bool,
    deadline: &Deadline,
    stage: Stage,
) -> Result<FileHistory<'a>> {
    let mut newest_first: Vec<&CommitRecord> = table.iter().collect();
    newest_first.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.hash.cmp(&b.hash)));

    let mut current = file.to_string();
    let mut history = FileHistory {
        commits: Vec::new(),
        previous_paths: Vec::new(),
    };
    for commit in newest_first {
        deadline.check(stage)?;
        let touched = index
            .files_of(&commit.hash)
            .is_some_and(|files| files.contains(&current));
        if !touched {
            continue;
        }
        history.commits.push(commit);
        if !follow_renames {
            continue;
        }
        let old = commit.changes.iter().find_map(|change| {
            (change.status == ChangeStatus::Renamed && change.path == current)
                .then_some(change.old_path.as_ref())
                .flatten()
        });
        if let Some(old) = old {
            if old != file && !history.previous_paths.contains(old) {
                history.previous_paths.push(old.clone());
            }
            current = old.clone();
        }
    }
    Ok(history)
}
