use std::collections::HashMap;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

use crate::error::AnalyzeError;

/// How a commit touched a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
}

impl ChangeStatus {
    /// Map a `git log --name-status` letter (e.g. `M`, `R100`) to a status.
    pub fn from_git(code: &str) -> Self {
        match code.chars().next() {
            Some('A') => Self::Added,
            Some('D') => Self::Deleted,
            Some('R') => Self::Renamed,
            Some('C') => Self::Copied,
            Some('T') => Self::TypeChanged,
            _ => Self::Modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub status: ChangeStatus,
    /// Previous path for renames and copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

impl FileChange {
    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ChangeStatus::Modified,
            old_path: None,
        }
    }

    pub fn renamed(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ChangeStatus::Renamed,
            old_path: Some(old_path.into()),
        }
    }
}

/// One commit as produced by a commit record source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub subject: String,
    pub changes: Vec<FileChange>,
}

impl CommitRecord {
    pub fn short_hash(&self) -> &str {
        &self.hash[..7.min(self.hash.len())]
    }

    /// Commit date as `YYYY-MM-DD` in the author's offset.
    pub fn date(&self) -> String {
        let fmt = format_description!("[year]-[month]-[day]");
        self.timestamp
            .format(&fmt)
            .unwrap_or_else(|_| self.timestamp.date().to_string())
    }

    /// Whole days between this commit and `now`, never negative.
    pub fn age_days(&self, now: OffsetDateTime) -> i64 {
        (now - self.timestamp).whole_days().max(0)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.path.as_str())
    }
}

/// Hash-keyed lookup over the commits of one query.
#[derive(Debug, Default)]
pub struct CommitTable {
    records: HashMap<String, CommitRecord>,
}

impl CommitTable {
    pub fn from_records(records: impl IntoIterator<Item = CommitRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.hash.clone(), r))
            .collect();
        Self { records }
    }

    pub fn get(&self, hash: &str) -> Option<&CommitRecord> {
        self.records.get(hash)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommitRecord> {
        self.records.values()
    }
}

/// Short, render-ready view of a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub hash: String,
    pub full_hash: String,
    pub subject: String,
    pub author: String,
    pub date: String,
}

impl From<&CommitRecord> for CommitSummary {
    fn from(record: &CommitRecord) -> Self {
        Self {
            hash: record.short_hash().to_string(),
            full_hash: record.hash.clone(),
            subject: record.subject.clone(),
            author: record.author.clone(),
            date: record.date(),
        }
    }
}

/// Whether `input` is a `"<n> <unit>(s) ago"` bound, which names a different instant on every run.
pub fn is_relative_since(input: &str) -> bool {
    input.trim().ends_with(" ago")
}

/// Parse a `since` bound: `YYYY-MM-DD`, RFC 3339, or `"<n> <unit>(s) ago"`.
pub fn parse_since(input: &str, now: OffsetDateTime) -> Result<OffsetDateTime> {
    let trimmed = input.trim();

    if let Ok(ts) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(ts);
    }

    let day_fmt = format_description!("[year]-[month]-[day]");
    if let Ok(date) = Date::parse(trimmed, &day_fmt) {
        return Ok(date.midnight().assume_utc());
    }

    if let Some(rest) = trimmed.strip_suffix(" ago") {
        let mut parts = rest.split_whitespace();
        if let (Some(n), Some(unit), None) = (parts.next(), parts.next(), parts.next())
            && let Ok(n) = n.parse::<i64>()
        {
            let days = match unit.trim_end_matches('s') {
                "day" => Some(n),
                "week" => Some(n * 7),
                "month" => Some(n * 30),
                "year" => Some(n * 365),
                _ => None,
            };
            if let Some(days) = days {
                return Ok(now - Duration::days(days));
            }
        }
    }

    bail!(AnalyzeError::invalid_argument(format!(
        "Unrecognized date for --since: {input:?} (expected YYYY-MM-DD, RFC 3339, or \"<n> days ago\")"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, error_code};
    use time::macros::datetime;

    fn record(hash: &str, ts: OffsetDateTime) -> CommitRecord {
        CommitRecord {
            hash: hash.to_string(),
            author: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            timestamp: ts,
            subject: "subject".to_string(),
            changes: vec![FileChange::modified("a.txt")],
        }
    }

    #[test]
    fn status_from_git_letters() {
        assert_eq!(ChangeStatus::from_git("A"), ChangeStatus::Added);
        assert_eq!(ChangeStatus::from_git("R087"), ChangeStatus::Renamed);
        assert_eq!(ChangeStatus::from_git("C100"), ChangeStatus::Copied);
        assert_eq!(ChangeStatus::from_git("T"), ChangeStatus::TypeChanged);
        assert_eq!(ChangeStatus::from_git("X"), ChangeStatus::Modified);
    }

    #[test]
    fn short_hash_and_date() {
        let r = record("0123456789abcdef", datetime!(2024-03-20 14:32:15 -4));
        assert_eq!(r.short_hash(), "0123456");
        assert_eq!(r.date(), "2024-03-20");
    }

    #[test]
    fn age_days_is_floored_and_clamped() {
        let r = record("abc", datetime!(2024-01-01 12:00 UTC));
        assert_eq!(r.age_days(datetime!(2024-01-11 11:00 UTC)), 9);
        assert_eq!(r.age_days(datetime!(2023-12-01 00:00 UTC)), 0);
    }

    #[test]
    fn record_roundtrips_through_json_with_offset() {
        let r = record("abc", datetime!(2024-03-20 14:32:15 -4));
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("2024-03-20T14:32:15-04:00"), "{json}");
        let back: CommitRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn parse_since_accepts_supported_forms() {
        let now = datetime!(2024-06-30 00:00 UTC);
        assert_eq!(
            parse_since("2024-01-15", now).unwrap(),
            datetime!(2024-01-15 00:00 UTC)
        );
        assert_eq!(
            parse_since("2024-01-15T10:00:00+02:00", now).unwrap(),
            datetime!(2024-01-15 10:00 +2)
        );
        assert_eq!(
            parse_since("3 weeks ago", now).unwrap(),
            datetime!(2024-06-09 00:00 UTC)
        );
        assert_eq!(
            parse_since("1 day ago", now).unwrap(),
            datetime!(2024-06-29 00:00 UTC)
        );
    }

    #[test]
    fn parse_since_rejects_garbage() {
        let now = datetime!(2024-06-30 00:00 UTC);
        for bad in ["yesterday-ish", "3 fortnights ago", "", "2024-13-40"] {
            let err = parse_since(bad, now).unwrap_err();
            assert_eq!(error_code(&err), Some(ErrorCode::InvalidArgument), "{bad}");
        }
    }

    #[test]
    fn commit_table_lookup() {
        let table = CommitTable::from_records(vec![
            record("aaa", datetime!(2024-01-01 00:00 UTC)),
            record("bbb", datetime!(2024-01-02 00:00 UTC)),
        ]);
        assert_eq!(table.len(), 2);
        assert!(table.get("bbb").is_some());
        assert!(table.get("ccc").is_none());
    }
}
