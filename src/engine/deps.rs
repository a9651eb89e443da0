//! Commit dependency discovery through shared files.
//!
//! Two commits are related when they change at least `threshold` of the same files. The
//! relation is a similarity graph, not the parent DAG, so it has cycles; traversal keeps an
//! explicit visited set keyed by commit hash.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::collections::hash_map::Entry;

use ahash::AHashMap;
use anyhow::{Result, bail};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::engine::budget::Deadline;
use crate::engine::index::FileCommitIndex;
use crate::error::{AnalyzeError, Stage};
use crate::models::commit::{CommitSummary, CommitTable};
use crate::models::deps::{
    CommitCoupling, CouplingResult, DependencyEdge, DependencyGraphResult, RelatedCommit,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyParams {
    /// Minimum number of shared files
    pub threshold: usize,
    /// Breadth-first levels to explore
    pub depth: usize,
    pub max_results: usize,
    /// Ignore candidate commits older than this
    pub since: Option<OffsetDateTime>,
}

impl DependencyParams {
    pub fn validate(&self) -> Result<()> {
        if self.threshold < 1 {
            bail!(AnalyzeError::invalid_argument(format!(
                "threshold must be >= 1, got {}",
                self.threshold
            )));
        }
        if self.depth < 1 {
            bail!(AnalyzeError::invalid_argument(format!(
                "depth must be >= 1, got {}",
                self.depth
            )));
        }
        Ok(())
    }
}

/// A candidate reached during one traversal level.
struct Hit<'a> {
    parent: &'a str,
    shared: Vec<&'a str>,
}

/// Find commits related to `root` within `params.depth` hops.
pub fn find_related(
    root: &str,
    index: &FileCommitIndex,
    table: &CommitTable,
    params: &DependencyParams,
    deadline: &Deadline,
) -> Result<DependencyGraphResult> {
    params.validate()?;
    let (Some(root_files), Some(root_record)) = (index.files_of(root), table.get(root)) else {
        bail!(AnalyzeError::invalid_commit(root));
    };

    let in_window = |hash: &str| match params.since {
        Some(since) => table.get(hash).is_some_and(|c| c.timestamp >= since),
        None => true,
    };

    let mut visited: HashSet<&str> = HashSet::from([root_record.hash.as_str()]);
    let mut frontier: Vec<&str> = vec![root_record.hash.as_str()];
    let mut found: Vec<(usize, &str, Hit<'_>)> = Vec::new();

    for level in 1..=params.depth {
        if frontier.is_empty() {
            break;
        }

        let mut hits: AHashMap<&str, Hit<'_>> = AHashMap::new();
        for &parent in &frontier {
            deadline.check(Stage::Traversal)?;
            for (candidate, shared) in overlaps(parent, index, |h| visited.contains(h)) {
                if shared.len() < params.threshold || !in_window(candidate) {
                    continue;
                }
                match hits.entry(candidate) {
                    Entry::Vacant(slot) => {
                        slot.insert(Hit { parent, shared });
                    }
                    Entry::Occupied(mut slot) => {
                        let best = slot.get();
                        let better = shared.len() > best.shared.len()
                            || (shared.len() == best.shared.len() && parent < best.parent);
                        if better {
                            slot.insert(Hit { parent, shared });
                        }
                    }
                }
            }
        }

        let mut next: Vec<&str> = hits.keys().copied().collect();
        next.sort_unstable();
        visited.extend(next.iter().copied());
        found.extend(hits.into_iter().map(|(hash, hit)| (level, hash, hit)));
        frontier = next;
    }

    found.sort_by(|(_, a, hit_a), (_, b, hit_b)| {
        hit_b
            .shared
            .len()
            .cmp(&hit_a.shared.len())
            .then_with(|| timestamp_of(table, b).cmp(&timestamp_of(table, a)))
            .then_with(|| a.cmp(b))
    });

    let total_related = found.len();
    let dependencies = found
        .into_iter()
        .take(params.max_results)
        .filter_map(|(level, hash, hit)| {
            let record = table.get(hash)?;
            Some(DependencyEdge {
                parent: hit.parent.to_string(),
                depth: level,
                overlap_count: hit.shared.len(),
                files: hit.shared.iter().map(|f| f.to_string()).collect(),
                info: CommitSummary::from(record),
            })
        })
        .collect();

    Ok(DependencyGraphResult {
        root_commit: root_record.hash.clone(),
        root: CommitSummary::from(root_record),
        root_files: root_files.len(),
        threshold: params.threshold,
        depth: params.depth,
        since: params.since.and_then(|s| s.format(&Rfc3339).ok()),
        total_related,
        dependencies,
    })
}

/// For every commit in the index, its direct (depth 1) related commits.
pub fn analyze_coupling(
    index: &FileCommitIndex,
    table: &CommitTable,
    threshold: usize,
    max_results: usize,
    since: Option<OffsetDateTime>,
    deadline: &Deadline,
) -> Result<CouplingResult> {
    if threshold < 1 {
        bail!(AnalyzeError::invalid_argument(format!(
            "threshold must be >= 1, got {threshold}"
        )));
    }
    let in_window = |hash: &str| match since {
        Some(since) => table.get(hash).is_some_and(|c| c.timestamp >= since),
        None => true,
    };

    let mut coupling = Vec::new();
    for (hash, _) in index.commits() {
        deadline.check(Stage::Traversal)?;
        let Some(record) = table.get(hash).filter(|_| in_window(hash)) else {
            continue;
        };

        let mut related: Vec<(&str, usize)> = overlaps(hash, index, |h| h == hash)
            .into_iter()
            .filter(|(h, shared)| shared.len() >= threshold && in_window(*h))
            .map(|(h, shared)| (h, shared.len()))
            .collect();
        if related.is_empty() {
            continue;
        }
        related.sort_by(|(a, na), (b, nb)| {
            nb.cmp(na)
                .then_with(|| timestamp_of(table, b).cmp(&timestamp_of(table, a)))
                .then_with(|| a.cmp(b))
        });

        let related_count = related.len();
        let best_overlap = related[0].1;
        let top_related = related
            .into_iter()
            .take(max_results)
            .filter_map(|(h, overlap)| {
                let other = table.get(h)?;
                Some(RelatedCommit {
                    hash: other.short_hash().to_string(),
                    subject: other.subject.clone(),
                    overlap,
                })
            })
            .collect();

        coupling.push((
            best_overlap,
            record.timestamp,
            CommitCoupling {
                hash: record.short_hash().to_string(),
                full_hash: record.hash.clone(),
                subject: record.subject.clone(),
                related_count,
                top_related,
            },
        ));
    }

    deadline.check(Stage::Aggregation)?;
    coupling.sort_by_key(|(best, ts, entry)| {
        (
            Reverse(entry.related_count),
            Reverse(*best),
            Reverse(*ts),
            entry.full_hash.clone(),
        )
    });

    Ok(CouplingResult {
        threshold,
        total_commits_with_dependencies: coupling.len(),
        coupling: coupling.into_iter().map(|(_, _, entry)| entry).collect(),
    })
}

/// Files shared between `hash` and every other commit touching one of its files.
///
/// Shared file lists come out sorted because the index iterates files in order.
fn overlaps<'a>(
    hash: &str,
    index: &'a FileCommitIndex,
    skip: impl Fn(&str) -> bool,
) -> AHashMap<&'a str, Vec<&'a str>> {
    let mut shared: AHashMap<&'a str, Vec<&'a str>> = AHashMap::new();
    let Some(files) = index.files_of(hash) else {
        return shared;
    };
    for file in files {
        for other in index.commits_of(file) {
            if !skip(other) {
                shared.entry(other).or_default().push(file.as_str());
            }
        }
    }
    shared
}

fn timestamp_of(table: &CommitTable, hash: &str) -> Option<OffsetDateTime> {
    table.get(hash).map(|c| c.timestamp)
}
