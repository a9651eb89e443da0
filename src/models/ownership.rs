use serde::{Deserialize, Serialize};

/// Ownership label derived from an author's share of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Primary,
    Secondary,
    Historical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipEntry {
    pub author: String,
    pub raw_commits: usize,
    pub weighted_score: f64,
    pub ownership_pct: f64,
    pub classification: Classification,
    /// Days since this author last touched the file
    pub last_commit_days: i64,
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipResult {
    pub file: String,
    pub total_commits: usize,
    pub decay_days: u32,
    /// Earlier names followed through renames, oldest last
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub previous_paths: Vec<String>,
    pub ownership: Vec<OwnershipEntry>,
}

/// Files an author has worked on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertiseFile {
    pub path: String,
    pub commits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertiseResult {
    pub author: String,
    pub total_files: usize,
    pub files: Vec<ExpertiseFile>,
}
