use serde::{Deserialize, Serialize};

use super::commit::CommitSummary;

/// File-level churn metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChurn {
    pub file: String,
    pub total_commits: usize,
    pub unique_authors: usize,
    pub authors: Vec<String>,
    pub first_commit: Option<CommitSummary>,
    pub last_commit: Option<CommitSummary>,
    /// `total_commits * exp(-days_since_last / 90)`
    pub churn_score: f64,
}
