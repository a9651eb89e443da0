use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Result, bail};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use super::{CommitRecordSource, HistoryQuery};
use crate::error::AnalyzeError;
use crate::models::commit::{ChangeStatus, CommitRecord, FileChange};

const RECORD_SEP: char = '\x1e';
const FIELD_SEP: char = '\x1f';
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%an%x1f%ae%x1f%aI%x1f%s";

/// Reads commit records by running the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitLogSource {
    root: PathBuf,
}

impl GitLogSource {
    /// Open the repository containing `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let output = run_git(dir, &["rev-parse", "--show-toplevel"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(AnalyzeError::source_unavailable(format!(
                "Not a git repository: {} ({})",
                dir.display(),
                stderr.trim()
            )));
        }
        let root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        debug!(root = %root.display(), "opened git repository");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        run_git(&self.root, args)
    }

    fn log(&self, query: &HistoryQuery, extra: &[&str]) -> Result<Vec<CommitRecord>> {
        let since = query.since.map(format_since).transpose()?;
        let max = query.max_count.map(|n| format!("--max-count={n}"));
        let rev = query.rev.as_deref().unwrap_or("HEAD");

        let mut args = vec!["log", LOG_FORMAT, "--name-status", "-M"];
        args.extend_from_slice(extra);
        if let Some(s) = &since {
            args.push(s);
        }
        if let Some(m) = &max {
            args.push(m);
        }
        args.push(rev);
        args.push("--");

        let output = self.git(&args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if query.rev.is_none() && is_unborn_head(&stderr) {
                return Ok(Vec::new());
            }
            bail!(AnalyzeError::source_unavailable(format!(
                "git log failed: {}",
                stderr.trim()
            )));
        }
        Ok(parse_log(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl CommitRecordSource for GitLogSource {
    fn identity(&self) -> String {
        self.root.to_string_lossy().to_string()
    }

    fn head(&self) -> Result<String> {
        let output = self.git(&["rev-parse", "HEAD"])?;
        if !output.status.success() {
            bail!(AnalyzeError::source_unavailable(
                "git rev-parse HEAD failed (empty repository?)"
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn resolve(&self, rev: &str) -> Result<String> {
        if rev.starts_with('-') {
            bail!(AnalyzeError::invalid_commit(rev));
        }
        let spec = format!("{rev}^{{commit}}");
        let output = self.git(&["rev-parse", "--verify", "--quiet", &spec])?;
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || hash.is_empty() {
            bail!(AnalyzeError::invalid_commit(rev));
        }
        Ok(hash)
    }

    fn count(&self, query: &HistoryQuery) -> Result<usize> {
        let since = query.since.map(format_since).transpose()?;
        let max = query.max_count.map(|n| format!("--max-count={n}"));
        let mut args = vec!["rev-list", "--count"];
        if let Some(s) = &since {
            args.push(s);
        }
        if let Some(m) = &max {
            args.push(m);
        }
        args.push(query.rev.as_deref().unwrap_or("HEAD"));
        args.push("--");

        let output = self.git(&args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if query.rev.is_none() && is_unborn_head(&stderr) {
                return Ok(0);
            }
            bail!(AnalyzeError::source_unavailable(format!(
                "git rev-list failed: {}",
                stderr.trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim().parse::<usize>().map_err(|e| {
            AnalyzeError::source_unavailable(format!("unexpected rev-list output {text:?}: {e}"))
                .into()
        })
    }

    fn load(&self, query: &HistoryQuery) -> Result<Vec<CommitRecord>> {
        let commits = self.log(query, &[])?;
        debug!(
            root = %self.root.display(),
            query = %query.fingerprint(),
            commits = commits.len(),
            "loaded git history"
        );
        Ok(commits)
    }

    fn commit(&self, hash: &str) -> Result<CommitRecord> {
        let query = HistoryQuery {
            rev: Some(hash.to_string()),
            ..HistoryQuery::default()
        };
        self.log(&query, &["--max-count=1"])?
            .into_iter()
            .next()
            .ok_or_else(|| AnalyzeError::invalid_commit(hash).into())
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<Output> {
    Command::new("git")
        .args(["-c", "core.quotepath=off"])
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| {
            let message = match e.kind() {
                ErrorKind::NotFound if !dir.exists() => {
                    format!("Directory not found: {}", dir.display())
                }
                ErrorKind::NotFound => "git executable not found on PATH".to_string(),
                _ => format!("Failed to run git: {e}"),
            };
            AnalyzeError::source_unavailable(message).into()
        })
}

fn format_since(since: OffsetDateTime) -> Result<String> {
    Ok(format!("--since={}", since.format(&Rfc3339)?))
}

fn is_unborn_head(stderr: &str) -> bool {
    stderr.contains("does not have any commits yet")
        || stderr.contains("ambiguous argument 'HEAD'")
        || stderr.contains("bad default revision 'HEAD'")
}

/// Parse `git log` output produced with [`LOG_FORMAT`] and `--name-status`.
pub fn parse_log(stdout: &str) -> Vec<CommitRecord> {
    let mut commits = Vec::new();

    for chunk in stdout.split(RECORD_SEP) {
        let mut lines = chunk.lines();
        let Some(header) = lines.next() else {
            continue;
        };
        if header.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = header.splitn(5, FIELD_SEP).collect();
        let [hash, author, email, date, subject] = fields[..] else {
            warn!(header = header, "skipping malformed commit header");
            continue;
        };
        let timestamp = match OffsetDateTime::parse(date, &Rfc3339) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(hash = hash, date = date, error = %e, "skipping commit with unparsable date");
                continue;
            }
        };

        let changes = lines.filter_map(parse_name_status).collect();

        commits.push(CommitRecord {
            hash: hash.to_string(),
            author: author.to_string(),
            email: email.to_string(),
            timestamp,
            subject: subject.to_string(),
            changes,
        });
    }

    commits
}

fn parse_name_status(line: &str) -> Option<FileChange> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }
    let mut parts = line.split('\t');
    let code = parts.next()?;
    let first = parts.next()?;
    let status = ChangeStatus::from_git(code);
    match (status, parts.next()) {
        (ChangeStatus::Renamed | ChangeStatus::Copied, Some(new_path)) => Some(FileChange {
            path: new_path.to_string(),
            status,
            old_path: Some(first.to_string()),
        }),
        _ => Some(FileChange {
            path: first.to_string(),
            status,
            old_path: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_log() -> String {
        let h1 = "1111111111111111111111111111111111111111";
        let h2 = "2222222222222222222222222222222222222222";
        let h3 = "3333333333333333333333333333333333333333";
        format!(
            "\x1e{h1}\x1fAlice Smith\x1falice@example.com\x1f2024-03-20T14:32:15-04:00\x1fAdd auth | tests\n\
             \n\
             M\tsrc/auth.rs\n\
             A\tsrc/auth/tests.rs\n\
             R087\tsrc/old name.rs\tsrc/new name.rs\n\
             \x1e{h2}\x1fBob\x1fbob@example.com\x1f2024-03-19T09:00:00Z\x1fMerge branch 'x'\n\
             \x1e{h3}\x1fCarol\x1fcarol@example.com\x1f2024-03-18T08:00:00+09:00\x1fInitial\n\
             \n\
             D\tREADME\n\
             C100\ta.rs\tb.rs\n"
        )
    }

    #[test]
    fn parses_headers_and_changes() {
        let commits = parse_log(&sample_log());
        assert_eq!(commits.len(), 3);

        let first = &commits[0];
        assert_eq!(first.author, "Alice Smith");
        assert_eq!(first.email, "alice@example.com");
        assert_eq!(first.subject, "Add auth | tests");
        assert_eq!(first.timestamp, datetime!(2024-03-20 14:32:15 -4));
        assert_eq!(first.changes.len(), 3);
        assert_eq!(first.changes[0], FileChange::modified("src/auth.rs"));
        assert_eq!(first.changes[1].status, ChangeStatus::Added);
        assert_eq!(
            first.changes[2],
            FileChange::renamed("src/old name.rs", "src/new name.rs")
        );
    }

    #[test]
    fn merge_commit_has_no_changes() {
        let commits = parse_log(&sample_log());
        assert_eq!(commits[1].subject, "Merge branch 'x'");
        assert!(commits[1].changes.is_empty());
    }

    #[test]
    fn copies_keep_source_path() {
        let commits = parse_log(&sample_log());
        let copy = &commits[2].changes[1];
        assert_eq!(copy.status, ChangeStatus::Copied);
        assert_eq!(copy.path, "b.rs");
        assert_eq!(copy.old_path.as_deref(), Some("a.rs"));
        assert_eq!(commits[2].changes[0].status, ChangeStatus::Deleted);
    }

    #[test]
    fn skips_malformed_headers() {
        let log = "\x1eonly\x1ftwo fields\n\nM\tx\n\x1e4444\x1fDan\x1fd@e.com\x1fnot-a-date\x1fs\n";
        assert!(parse_log(log).is_empty());
    }

    #[test]
    fn empty_output_yields_no_commits() {
        assert!(parse_log("").is_empty());
        assert!(parse_log("\n").is_empty());
    }

    #[test]
    fn open_rejects_non_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        // A fresh temp dir is not inside a repository unless TMPDIR itself is.
        if let Err(e) = GitLogSource::open(dir.path()) {
            assert_eq!(
                crate::error::error_code(&e),
                Some(crate::error::ErrorCode::SourceUnavailable)
            );
        }
    }

    #[test]
    fn unborn_head_detection() {
        assert!(is_unborn_head(
            "fatal: your current branch 'main' does not have any commits yet"
        ));
        assert!(!is_unborn_head("fatal: not a git repository"));
    }
}
