use serde::{Deserialize, Serialize};

use super::activity::ActivityGroup;

/// One NDJSON session request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeRequest {
    pub command: Command,
    /// Repository directory (default: ".")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Root commit (for deps)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Target file (for ownership / churn), or pair filter (for cochange)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Several target files (for ownership)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    /// Author name or email fragment (for expertise)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_correlation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_renames: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<ActivityGroup>,
    pub by_author: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_commits: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Deps,
    Coupling,
    Cochange,
    Ownership,
    Expertise,
    Churn,
    Activity,
    #[default]
    Doctor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_parses() {
        let req: AnalyzeRequest =
            serde_json::from_str(r#"{"command":"deps","commit":"abc123","depth":2}"#).unwrap();
        assert_eq!(req.command, Command::Deps);
        assert_eq!(req.commit.as_deref(), Some("abc123"));
        assert_eq!(req.depth, Some(2));
        assert!(req.dir.is_none());
        assert!(!req.by_author);
    }

    #[test]
    fn activity_group_parses_lowercase() {
        let req: AnalyzeRequest =
            serde_json::from_str(r#"{"command":"activity","group":"day","by_author":true}"#)
                .unwrap();
        assert_eq!(req.group, Some(ActivityGroup::Day));
        assert!(req.by_author);
    }

    #[test]
    fn negative_threshold_is_rejected_by_parser() {
        let err = serde_json::from_str::<AnalyzeRequest>(r#"{"command":"deps","threshold":-1}"#);
        assert!(err.is_err());
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<AnalyzeRequest>(r#"{"command":"blame"}"#).is_err());
    }
}
