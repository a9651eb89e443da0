//! Commit record sources.
//!
//! The analysis engine never talks to a version-control backend directly. It asks a
//! [`CommitRecordSource`] for an ordered list of [`CommitRecord`]s and works on that.

pub mod git;

use anyhow::{Result, bail};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::AnalyzeError;
use crate::models::commit::CommitRecord;

pub use git::GitLogSource;

/// Which slice of history to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Starting point; `HEAD` when absent
    pub rev: Option<String>,
    /// Only commits at or after this instant
    pub since: Option<OffsetDateTime>,
    /// Only the newest N commits
    pub max_count: Option<usize>,
    /// `since` was given relative to now, so the window moves between runs
    pub floating: bool,
}

impl HistoryQuery {
    pub fn since(since: Option<OffsetDateTime>) -> Self {
        Self {
            since,
            ..Self::default()
        }
    }

    pub fn with_max_count(mut self, max_count: Option<usize>) -> Self {
        self.max_count = max_count;
        self
    }

    /// Stable text form, used as part of cache keys.
    pub fn fingerprint(&self) -> String {
        let since = self
            .since
            .and_then(|s| s.format(&Rfc3339).ok())
            .unwrap_or_default();
        format!(
            "rev={};since={};max={}",
            self.rev.as_deref().unwrap_or("HEAD"),
            since,
            self.max_count.map(|n| n.to_string()).unwrap_or_default()
        )
    }
}

/// Something that can list commits of a repository.
pub trait CommitRecordSource: Send + Sync {
    /// Stable identity of the repository (used for cache keys).
    fn identity(&self) -> String;

    /// Hash of the current HEAD commit.
    fn head(&self) -> Result<String>;

    /// Resolve a revision to a full commit hash.
    fn resolve(&self, rev: &str) -> Result<String>;

    /// Number of commits `load` would return. Expected to be cheap.
    fn count(&self, query: &HistoryQuery) -> Result<usize>;

    /// Commits matching `query`, newest first.
    fn load(&self, query: &HistoryQuery) -> Result<Vec<CommitRecord>>;

    /// A single commit by full hash.
    fn commit(&self, hash: &str) -> Result<CommitRecord>;
}

/// A fixed, in-memory history.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    commits: Vec<CommitRecord>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, mut commits: Vec<CommitRecord>) -> Self {
        // newest first, insertion order among equal timestamps
        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self {
            name: name.into(),
            commits,
        }
    }

    fn filtered(&self, query: &HistoryQuery) -> Result<Vec<&CommitRecord>> {
        let start = match &query.rev {
            Some(rev) => {
                let hash = self.resolve(rev)?;
                self.commits
                    .iter()
                    .position(|c| c.hash == hash)
                    .unwrap_or(0)
            }
            None => 0,
        };
        let limit = query.max_count.unwrap_or(usize::MAX);
        Ok(self.commits[start..]
            .iter()
            .filter(|c| query.since.is_none_or(|since| c.timestamp >= since))
            .take(limit)
            .collect())
    }
}

impl CommitRecordSource for MemorySource {
    fn identity(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn head(&self) -> Result<String> {
        match self.commits.first() {
            Some(c) => Ok(c.hash.clone()),
            None => bail!(AnalyzeError::source_unavailable(format!(
                "{} has no commits",
                self.identity()
            ))),
        }
    }

    fn resolve(&self, rev: &str) -> Result<String> {
        if rev == "HEAD" {
            return self
                .head()
                .map_err(|_| AnalyzeError::invalid_commit(rev).into());
        }
        if let Some(c) = self.commits.iter().find(|c| c.hash == rev) {
            return Ok(c.hash.clone());
        }
        let mut prefixed = self
            .commits
            .iter()
            .filter(|c| rev.len() >= 4 && c.hash.starts_with(rev));
        match (prefixed.next(), prefixed.next()) {
            (Some(c), None) => Ok(c.hash.clone()),
            _ => bail!(AnalyzeError::invalid_commit(rev)),
        }
    }

    fn count(&self, query: &HistoryQuery) -> Result<usize> {
        Ok(self.filtered(query)?.len())
    }

    fn load(&self, query: &HistoryQuery) -> Result<Vec<CommitRecord>> {
        Ok(self.filtered(query)?.into_iter().cloned().collect())
    }

    fn commit(&self, hash: &str) -> Result<CommitRecord> {
        self.commits
            .iter()
            .find(|c| c.hash == hash)
            .cloned()
            .ok_or_else(|| AnalyzeError::invalid_commit(hash).into())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{EPOCH, abc_history, commit};
    use super::*;
    use crate::error::{ErrorCode, error_code};
    use time::Duration;

    #[test]
    fn memory_source_orders_newest_first() {
        let source = MemorySource::new("abc", abc_history());
        let loaded = source.load(&HistoryQuery::default()).unwrap();
        let hashes: Vec<&str> = loaded.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes, ["c3", "c2", "c1"]);
        assert_eq!(source.head().unwrap(), "c3");
    }

    #[test]
    fn memory_source_applies_since_and_max_count() {
        let source = MemorySource::new("abc", abc_history());
        let query = HistoryQuery::since(Some(EPOCH + Duration::days(2)));
        assert_eq!(source.count(&query).unwrap(), 2);

        let query = HistoryQuery::default().with_max_count(Some(1));
        let loaded = source.load(&query).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].hash, "c3");
    }

    #[test]
    fn memory_source_starts_from_rev() {
        let source = MemorySource::new("abc", abc_history());
        let query = HistoryQuery {
            rev: Some("c2".to_string()),
            ..HistoryQuery::default()
        };
        let hashes: Vec<String> = source
            .load(&query)
            .unwrap()
            .into_iter()
            .map(|c| c.hash)
            .collect();
        assert_eq!(hashes, ["c2", "c1"]);
    }

    #[test]
    fn resolve_by_unique_prefix() {
        let source = MemorySource::new(
            "prefix",
            vec![
                commit("abcd1111", "A", 1, &["x"]),
                commit("abcd2222", "A", 2, &["x"]),
            ],
        );
        assert_eq!(source.resolve("abcd1").unwrap(), "abcd1111");
        assert_eq!(source.resolve("HEAD").unwrap(), "abcd2222");

        let ambiguous = source.resolve("abcd").unwrap_err();
        assert_eq!(error_code(&ambiguous), Some(ErrorCode::InvalidCommit));
        let missing = source.resolve("ffff").unwrap_err();
        assert_eq!(error_code(&missing), Some(ErrorCode::InvalidCommit));
    }

    #[test]
    fn empty_source_has_no_head() {
        let source = MemorySource::new("empty", Vec::new());
        let err = source.head().unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::SourceUnavailable));
        assert_eq!(source.count(&HistoryQuery::default()).unwrap(), 0);
    }

    #[test]
    fn fingerprint_distinguishes_bounds() {
        let a = HistoryQuery::default();
        let b = HistoryQuery::since(Some(EPOCH));
        let c = HistoryQuery::default().with_max_count(Some(10));
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint(), HistoryQuery::default().fingerprint());
    }
}
