use std::collections::{BTreeMap, BTreeSet};

use crate::models::commit::CommitRecord;

/// Bidirectional file ↔ commit index over one query's history.
///
/// Every `(file, commit)` pair is present in both maps. Commits without changed files
/// (e.g. merges) appear in `commit_files` with an empty set and never in `file_commits`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileCommitIndex {
    file_commits: BTreeMap<String, BTreeSet<String>>,
    commit_files: BTreeMap<String, BTreeSet<String>>,
}

impl FileCommitIndex {
    pub fn build<'a>(commits: impl IntoIterator<Item = &'a CommitRecord>) -> Self {
        let mut index = Self::default();
        for commit in commits {
            let files = index.commit_files.entry(commit.hash.clone()).or_default();
            for path in commit.paths() {
                files.insert(path.to_string());
                index
                    .file_commits
                    .entry(path.to_string())
                    .or_default()
                    .insert(commit.hash.clone());
            }
        }
        index
    }

    /// Files touched by `hash`, or `None` when the commit is not indexed.
    pub fn files_of(&self, hash: &str) -> Option<&BTreeSet<String>> {
        self.commit_files.get(hash)
    }

    /// Commits touching `path` (empty when never touched).
    pub fn commits_of(&self, path: &str) -> impl Iterator<Item = &str> {
        self.file_commits
            .get(path)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn change_count(&self, path: &str) -> usize {
        self.file_commits.get(path).map_or(0, BTreeSet::len)
    }

    pub fn contains_commit(&self, hash: &str) -> bool {
        self.commit_files.contains_key(hash)
    }

    pub fn commit_count(&self) -> usize {
        self.commit_files.len()
    }

    pub fn file_count(&self) -> usize {
        self.file_commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commit_files.is_empty()
    }

    /// `(commit, files)` in hash order.
    pub fn commits(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.commit_files.iter().map(|(h, f)| (h.as_str(), f))
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.file_commits.keys().map(String::as_str)
    }
}
