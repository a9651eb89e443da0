use serde::{Deserialize, Serialize};

use super::commit::CommitSummary;

/// A commit related to the traversal root through shared files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Commit this one was reached from (the root at depth 1)
    pub parent: String,
    /// Breadth-first level the commit was found at (1-based)
    pub depth: usize,
    /// Number of files shared with `parent`
    pub overlap_count: usize,
    /// The shared files, sorted
    pub files: Vec<String>,
    /// `hash` (short), `full_hash`, `subject`, `author`, `date`
    #[serde(flatten)]
    pub info: CommitSummary,
}

/// Result of a single-root dependency traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraphResult {
    pub root_commit: String,
    pub root: CommitSummary,
    /// Number of files changed by the root commit
    pub root_files: usize,
    pub threshold: usize,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    /// Related commits found before truncation to `max_results`
    pub total_related: usize,
    pub dependencies: Vec<DependencyEdge>,
}

/// A commit that overlaps another one, as listed in coupling output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedCommit {
    pub hash: String,
    pub subject: String,
    pub overlap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitCoupling {
    pub hash: String,
    pub full_hash: String,
    pub subject: String,
    pub related_count: usize,
    pub top_related: Vec<RelatedCommit>,
}

/// Repository-wide commit coupling: every commit with at least one related commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingResult {
    pub threshold: usize,
    pub total_commits_with_dependencies: usize,
    pub coupling: Vec<CommitCoupling>,
}
