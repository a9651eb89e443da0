use serde::{Deserialize, Serialize};

/// A pair of files that changed together in at least one commit.
///
/// `file_a` always sorts before `file_b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub file_a: String,
    pub file_b: String,
    /// Jaccard similarity of the two files' commit sets
    pub correlation: f64,
    /// Number of commits where both files changed
    pub co_changes: usize,
    /// Total changes for file_a
    pub changes_a: usize,
    /// Total changes for file_b
    pub changes_b: usize,
}

/// Result of co-change analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoChangeResult {
    /// Number of commits analyzed
    pub commits_analyzed: usize,
    pub threshold: usize,
    /// Pairs that passed every filter, before truncation
    pub total_pairs: usize,
    pub correlations: Vec<CorrelationPair>,
}
