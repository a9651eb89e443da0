use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::commit::CommitRecord;

/// On-disk commit record cache, addressed with BLAKE3.
///
/// Each (repository, query) pair owns one slot. The entry in it is valid only for the HEAD it
/// was written at; any mismatch is a miss, and the next write replaces the entry wholesale.
pub struct CacheStore {
    dir: PathBuf,
}

/// Everything an entry was keyed on, stored alongside the records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    pub identity: String,
    pub head: String,
    pub query: String,
}

impl CacheKey {
    pub fn new(identity: impl Into<String>, head: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            head: head.into(),
            query: query.into(),
        }
    }

    /// BLAKE3 digest of the repository and query, naming the key's slot. HEAD is left out so a
    /// moved HEAD overwrites the old entry instead of adding one.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [&self.identity, &self.query] {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    key: CacheKey,
    commits: Vec<CommitRecord>,
}

impl CacheStore {
    pub fn new() -> Result<Self> {
        Self::at(cache_dir())
    }

    pub fn at(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cached records for `key`, or `None` on any miss, mismatch, or unreadable entry.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<CommitRecord>> {
        let path = self.cache_path(&key.digest());
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.key == *key => Some(entry.commits),
            Ok(_) => {
                debug!(path = %path.display(), "cache key mismatch");
                None
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    /// Store records for `key`, replacing whatever its slot held.
    pub fn put(&self, key: &CacheKey, commits: &[CommitRecord]) -> Result<()> {
        let path = self.cache_path(&key.digest());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entry = CacheEntry {
            key: key.clone(),
            commits: commits.to_vec(),
        };
        // write then rename so readers never see a half-written entry
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&entry)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Clear the entire cache.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn cache_path(&self, digest: &str) -> PathBuf {
        // Use first 2 chars as directory shard
        let (prefix, rest) = digest.split_at(2.min(digest.len()));
        self.dir.join(prefix).join(format!("{rest}.commits.json"))
    }
}

fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("hug-analyze")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::abc_history;

    fn store() -> (tempfile::TempDir, CacheStore) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::at(dir.path().join("cache")).unwrap();
        (dir, store)
    }

    #[test]
    fn put_then_get_returns_records() {
        let (_dir, store) = store();
        let key = CacheKey::new("/repo", "c3", "rev=HEAD;since=;max=");
        store.put(&key, &abc_history()).unwrap();
        assert_eq!(store.get(&key), Some(abc_history()));
    }

    #[test]
    fn any_key_change_is_a_miss() {
        let (_dir, store) = store();
        let key = CacheKey::new("/repo", "c3", "q");
        store.put(&key, &abc_history()).unwrap();

        assert!(store.get(&CacheKey::new("/other", "c3", "q")).is_none());
        assert!(store.get(&CacheKey::new("/repo", "c4", "q")).is_none());
        assert!(store.get(&CacheKey::new("/repo", "c3", "q2")).is_none());
    }

    #[test]
    fn digest_separates_parts() {
        let a = CacheKey::new("ab", "h", "c").digest();
        let b = CacheKey::new("a", "h", "bc").digest();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, CacheKey::new("ab", "h2", "c").digest());
    }

    fn entry_files(dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for shard in fs::read_dir(dir).unwrap() {
            let shard = shard.unwrap().path();
            if shard.is_dir() {
                for file in fs::read_dir(&shard).unwrap() {
                    files.push(file.unwrap().path());
                }
            }
        }
        files
    }

    #[test]
    fn new_head_replaces_entry() {
        let (_dir, store) = store();
        let old = CacheKey::new("/repo", "c3", "q");
        let new = CacheKey::new("/repo", "c4", "q");
        store.put(&old, &abc_history()).unwrap();
        store.put(&new, &abc_history()[..1]).unwrap();

        assert_eq!(entry_files(store.dir()).len(), 1);
        assert!(store.get(&old).is_none());
        assert_eq!(store.get(&new).map(|c| c.len()), Some(1));
    }

    #[test]
    fn queries_keep_separate_slots() {
        let (_dir, store) = store();
        store.put(&CacheKey::new("/repo", "c3", "q1"), &abc_history()).unwrap();
        store.put(&CacheKey::new("/repo", "c3", "q2"), &abc_history()).unwrap();
        assert_eq!(entry_files(store.dir()).len(), 2);
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let (_dir, store) = store();
        let key = CacheKey::new("/repo", "c3", "q");
        let path = store.cache_path(&key.digest());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{not json").unwrap();
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn clear_removes_entries() {
        let (_dir, store) = store();
        let key = CacheKey::new("/repo", "c3", "q");
        store.put(&key, &abc_history()).unwrap();
        store.clear().unwrap();
        assert!(store.get(&key).is_none());
        assert!(store.dir().exists());
    }
}
