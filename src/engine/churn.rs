use std::collections::BTreeSet;

use anyhow::{Result, bail};
use time::OffsetDateTime;

use crate::engine::budget::Deadline;
use crate::engine::index::FileCommitIndex;
use crate::engine::ownership::file_history;
use crate::error::{AnalyzeError, Stage};
use crate::models::churn::FileChurn;
use crate::models::commit::{CommitSummary, CommitTable};

/// Recency constant for churn scores, in days.
pub const CHURN_DECAY_DAYS: f64 = 90.0;

/// How often `file` changed, by whom, and how recently.
pub fn analyze_churn(
    file: &str,
    index: &FileCommitIndex,
    table: &CommitTable,
    follow_renames: bool,
    now: OffsetDateTime,
    deadline: &Deadline,
) -> Result<FileChurn> {
    if file.trim().is_empty() {
        bail!(AnalyzeError::invalid_argument("file must not be empty"));
    }
    let mut commits = file_history(
        file,
        index,
        table,
        follow_renames,
        deadline,
        Stage::Aggregation,
    )?
    .commits;
    commits.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.hash.cmp(&b.hash)));

    let authors: BTreeSet<&str> = commits.iter().map(|c| c.author.as_str()).collect();
    let score = commits
        .last()
        .map_or(0.0, |last| churn_score(commits.len(), last.age_days(now)));

    Ok(FileChurn {
        file: file.to_string(),
        total_commits: commits.len(),
        unique_authors: authors.len(),
        authors: authors.into_iter().map(str::to_string).collect(),
        first_commit: commits.first().map(|c| CommitSummary::from(*c)),
        last_commit: commits.last().map(|c| CommitSummary::from(*c)),
        churn_score: score,
    })
}

/// `changes * exp(-days_since_last / 90)`
pub fn churn_score(changes: usize, days_since_last: i64) -> f64 {
    changes as f64 * (-(days_since_last as f64) / CHURN_DECAY_DAYS).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, error_code};
    use crate::models::commit::FileChange;
    use crate::source::testing::{EPOCH, abc_history, commit};
    use time::Duration;

    fn churn(file: &str, now: OffsetDateTime) -> FileChurn {
        let history = abc_history();
        let index = FileCommitIndex::build(&history);
        let table = CommitTable::from_records(history.iter().cloned());
        analyze_churn(file, &index, &table, true, now, &Deadline::unlimited()).unwrap()
    }

    #[test]
    fn counts_commits_and_authors() {
        let result = churn("b.txt", EPOCH + Duration::days(3));
        assert_eq!(result.total_commits, 3);
        assert_eq!(result.unique_authors, 2);
        assert_eq!(result.authors, ["Alice", "Bob"]);
        assert_eq!(result.first_commit.unwrap().full_hash, "c1");
        assert_eq!(result.last_commit.unwrap().full_hash, "c3");
        // last change today: no decay
        assert!((result.churn_score - 3.0).abs() < 1e-12);
    }

    #[test]
    fn score_decays_with_quiet_time() {
        let result = churn("b.txt", EPOCH + Duration::days(93));
        let expected = 3.0 * (-1.0f64).exp();
        assert!((result.churn_score - expected).abs() < 1e-12);
    }

    #[test]
    fn untouched_file_has_zero_churn() {
        let result = churn("nowhere.txt", EPOCH);
        assert_eq!(result.total_commits, 0);
        assert!(result.first_commit.is_none());
        assert_eq!(result.churn_score, 0.0);
    }

    #[test]
    fn empty_path_is_rejected() {
        let index = FileCommitIndex::default();
        let table = CommitTable::default();
        let err = analyze_churn("", &index, &table, true, EPOCH, &Deadline::unlimited())
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::InvalidArgument));
    }

    #[test]
    fn renamed_file_ignores_later_reuse_of_old_name() {
        let mut rename = commit("r1", "Bob", 2, &[]);
        rename.changes = vec![FileChange::renamed("a.rs", "b.rs")];
        let history = vec![
            commit("c0", "Alice", 0, &["a.rs"]),
            rename,
            commit("m5", "Mallory", 5, &["a.rs"]),
            commit("m6", "Mallory", 6, &["a.rs"]),
        ];
        let index = FileCommitIndex::build(&history);
        let table = CommitTable::from_records(history.iter().cloned());
        let now = EPOCH + Duration::days(2);

        let result =
            analyze_churn("b.rs", &index, &table, true, now, &Deadline::unlimited()).unwrap();
        assert_eq!(result.total_commits, 2);
        assert_eq!(result.authors, ["Alice", "Bob"]);
        assert_eq!(result.first_commit.unwrap().full_hash, "c0");
        assert_eq!(result.last_commit.unwrap().full_hash, "r1");
        assert!((result.churn_score - 2.0).abs() < 1e-12);
    }
}
