use serde::{Deserialize, Serialize};

/// Repository size tier, chosen from a cheap commit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoSize {
    Small,
    Medium,
    Large,
    Massive,
}

/// Facts about how a result was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub commits_analyzed: usize,
    pub repo_size: RepoSize,
    /// Budget the query ran under; absent when unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub elapsed_ms: u64,
    /// Commit records came from the on-disk cache
    pub cached: bool,
}

/// A finished analysis result plus its run metadata.
///
/// Renderers read everything they need from here; nothing is recomputed downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report<T> {
    #[serde(flatten)]
    pub result: T,
    pub meta: RunMetadata,
}

impl<T> Report<T> {
    pub fn new(result: T, meta: RunMetadata) -> Self {
        Self { result, meta }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cochange::CoChangeResult;

    #[test]
    fn report_flattens_result_fields() {
        let report = Report::new(
            CoChangeResult {
                commits_analyzed: 3,
                threshold: 1,
                total_pairs: 0,
                correlations: Vec::new(),
            },
            RunMetadata {
                commits_analyzed: 3,
                repo_size: RepoSize::Small,
                timeout_secs: Some(30),
                elapsed_ms: 4,
                cached: false,
            },
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["commits_analyzed"], 3);
        assert_eq!(json["total_pairs"], 0);
        assert!(json["correlations"].as_array().unwrap().is_empty());
        assert_eq!(json["meta"]["repo_size"], "small");
        assert_eq!(json["meta"]["timeout_secs"], 30);
    }

    #[test]
    fn unlimited_budget_omits_timeout() {
        let meta = RunMetadata {
            commits_analyzed: 0,
            repo_size: RepoSize::Massive,
            timeout_secs: None,
            elapsed_ms: 0,
            cached: true,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("timeout_secs").is_none());
        assert_eq!(json["repo_size"], "massive");
    }
}
