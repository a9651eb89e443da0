use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityGroup {
    Hour,
    Day,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityBucket {
    /// `"00"`..`"23"` for hours, `"Mon"`..`"Sun"` for days
    pub label: String,
    pub commits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorActivity {
    pub author: String,
    pub buckets: Vec<ActivityBucket>,
}

/// Commit counts over the hours of a day or the days of a week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityResult {
    pub group: ActivityGroup,
    pub commits_analyzed: usize,
    pub buckets: Vec<ActivityBucket>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub authors: Vec<AuthorActivity>,
    pub observations: Vec<String>,
}

impl std::str::FromStr for ActivityGroup {
    type Err = crate::error::AnalyzeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hours" => Ok(Self::Hour),
            "day" | "days" => Ok(Self::Day),
            other => Err(crate::error::AnalyzeError::invalid_argument(format!(
                "group must be \"hour\" or \"day\", got {other:?}"
            ))),
        }
    }
}
