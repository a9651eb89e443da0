use anyhow::{Result, bail};
use rayon::prelude::*;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::cache::store::{CacheKey, CacheStore};
use crate::config::AnalysisSettings;
use crate::engine::budget::{self, Deadline, TimeBudget};
use crate::engine::cochange::{self, CoChangeParams};
use crate::engine::deps::{self, DependencyParams};
use crate::engine::index::FileCommitIndex;
use crate::engine::ownership::{self, OwnershipParams};
use crate::engine::{activity, churn};
use crate::error::{AnalyzeError, ErrorCode, Stage};
use crate::models::activity::{ActivityGroup, ActivityResult};
use crate::models::churn::FileChurn;
use crate::models::cochange::CoChangeResult;
use crate::models::commit::{CommitRecord, CommitTable, is_relative_since, parse_since};
use crate::models::deps::{CouplingResult, DependencyGraphResult};
use crate::models::ownership::{ExpertiseResult, OwnershipResult};
use crate::models::report::{Report, RunMetadata};
use crate::source::{CommitRecordSource, GitLogSource, HistoryQuery};

/// Environment variable naming the workspace root for sandboxed services.
pub const WORKSPACE_ENV: &str = "HUG_ANALYZE_WORKSPACE";

// ---------------------------------------------------------------------------
// AppService: unified core logic for CLI / Session / MCP
// ---------------------------------------------------------------------------

pub struct AppService {
    workspace_root: Option<PathBuf>,
    settings: AnalysisSettings,
    cache: Option<CacheStore>,
    now: Option<OffsetDateTime>,
}

/// Which part of history an analysis reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryBounds<'a> {
    /// `YYYY-MM-DD`, RFC 3339, or `"<n> days ago"`
    pub since: Option<&'a str>,
    /// Only the newest N commits
    pub max_commits: Option<usize>,
}

/// Parameters for dependency traversal. `None` falls back to configured defaults.
#[derive(Debug, Clone, Default)]
pub struct DepsParams<'a> {
    pub commit: &'a str,
    pub threshold: Option<usize>,
    pub depth: Option<usize>,
    pub max_results: Option<usize>,
    pub history: HistoryBounds<'a>,
}

#[derive(Debug, Clone, Default)]
pub struct CouplingParams<'a> {
    pub threshold: Option<usize>,
    pub max_results: Option<usize>,
    pub history: HistoryBounds<'a>,
}

#[derive(Debug, Clone, Default)]
pub struct CochangeParams<'a> {
    pub threshold: Option<usize>,
    pub max_results: Option<usize>,
    pub min_correlation: Option<f64>,
    pub file: Option<&'a str>,
    pub history: HistoryBounds<'a>,
}

#[derive(Debug, Clone, Default)]
pub struct OwnershipQuery<'a> {
    pub decay_days: Option<i64>,
    pub follow_renames: Option<bool>,
    pub history: HistoryBounds<'a>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityParams<'a> {
    pub group: Option<ActivityGroup>,
    pub by_author: bool,
    pub history: HistoryBounds<'a>,
}

/// Commit history loaded and indexed for one query.
struct History {
    records: Vec<CommitRecord>,
    index: FileCommitIndex,
    table: CommitTable,
    budget: TimeBudget,
    deadline: Deadline,
    cached: bool,
}

impl History {
    fn meta(&self) -> RunMetadata {
        RunMetadata {
            commits_analyzed: self.index.commit_count(),
            repo_size: self.budget.size,
            timeout_secs: self.budget.limit.map(|d| d.as_secs()),
            elapsed_ms: u64::try_from(self.deadline.elapsed().as_millis()).unwrap_or(u64::MAX),
            cached: self.cached,
        }
    }
}

impl Default for AppService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppService {
    /// Create an unrestricted service (CLI mode) with default settings and no cache.
    pub fn new() -> Self {
        Self {
            workspace_root: None,
            settings: AnalysisSettings::default(),
            cache: None,
            now: None,
        }
    }

    /// Create a sandboxed service (MCP mode) that restricts directories to `root`.
    pub fn sandboxed(root: PathBuf) -> Result<Self> {
        let canonical_root = std::fs::canonicalize(&root).map_err(|_| {
            AnalyzeError::new(
                ErrorCode::InvalidRequest,
                format!("Invalid workspace root: {}", root.display()),
            )
        })?;
        Ok(Self {
            workspace_root: Some(canonical_root),
            ..Self::new()
        })
    }

    /// Sandboxed to [`WORKSPACE_ENV`] when set (Session mode), unrestricted otherwise.
    pub fn from_env() -> Self {
        match std::env::var(WORKSPACE_ENV) {
            Ok(ws) if !ws.is_empty() => Self::sandboxed(PathBuf::from(&ws)).unwrap_or_else(|e| {
                warn!(workspace = %ws, error = %e, "ignoring invalid workspace root");
                Self::new()
            }),
            _ => Self::new(),
        }
    }

    pub fn with_settings(mut self, settings: AnalysisSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cache(mut self, cache: Option<CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    /// Measure commit ages from a fixed instant instead of the wall clock.
    pub fn at_time(mut self, now: OffsetDateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    fn now(&self) -> OffsetDateTime {
        self.now.unwrap_or_else(OffsetDateTime::now_utc)
    }

    // -----------------------------------------------------------------------
    // Validation helpers
    // -----------------------------------------------------------------------

    /// Validate and canonicalize a directory path. Returns the canonical path.
    fn validate_dir(&self, dir: &str) -> Result<PathBuf> {
        let canonical = std::fs::canonicalize(dir).map_err(|_| {
            warn!(dir = dir, "validate_dir: directory not found");
            AnalyzeError::new(
                ErrorCode::FileNotFound,
                format!("Directory not found: {dir}"),
            )
        })?;
        if let Some(root) = &self.workspace_root
            && !canonical.starts_with(root)
        {
            warn!(dir = dir, "validate_dir: directory outside workspace boundary");
            bail!(AnalyzeError::new(
                ErrorCode::PathOutOfBounds,
                format!("Directory outside workspace boundary: {dir}"),
            ));
        }
        Ok(canonical)
    }

    fn open(&self, dir: &str) -> Result<GitLogSource> {
        let canonical = self.validate_dir(dir)?;
        GitLogSource::open(&canonical)
    }

    fn history_query(&self, bounds: &HistoryBounds<'_>) -> Result<HistoryQuery> {
        let since = bounds
            .since
            .map(|s| parse_since(s, self.now()))
            .transpose()?;
        if bounds.max_commits == Some(0) {
            bail!(AnalyzeError::invalid_argument("max_commits must be >= 1"));
        }
        let mut query = HistoryQuery::since(since).with_max_count(bounds.max_commits);
        query.floating = bounds.since.is_some_and(is_relative_since);
        Ok(query)
    }

    /// Extract and index the commits of `query`.
    ///
    /// `root` is added when it falls outside the loaded window so that traversal can start
    /// from it.
    fn load<S: CommitRecordSource + ?Sized>(
        &self,
        source: &S,
        query: &HistoryQuery,
        root: Option<&str>,
    ) -> Result<History> {
        let count = source.count(query)?;
        let override_secs = budget::env_override().or(self.settings.timeout_secs);
        let budget = TimeBudget::resolve(count, override_secs);
        let deadline = budget.start();
        debug!(
            source = %source.identity(),
            commits = count,
            repo_size = ?budget.size,
            timeout = ?budget.limit,
            "history load started"
        );

        let (mut records, cached) = self.load_records(source, query)?;
        deadline.check(Stage::Extraction)?;

        if let Some(root) = root
            && !records.iter().any(|c| c.hash == root)
        {
            records.push(source.commit(root)?);
        }

        let index = FileCommitIndex::build(&records);
        let table = CommitTable::from_records(records.iter().cloned());
        deadline.check(Stage::Indexing)?;
        debug!(
            commits = index.commit_count(),
            files = index.file_count(),
            cached = cached,
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "history indexed"
        );

        Ok(History {
            records,
            index,
            table,
            budget,
            deadline,
            cached,
        })
    }

    fn load_records<S: CommitRecordSource + ?Sized>(
        &self,
        source: &S,
        query: &HistoryQuery,
    ) -> Result<(Vec<CommitRecord>, bool)> {
        let Some(cache) = self.cache.as_ref().filter(|_| !query.floating) else {
            return Ok((source.load(query)?, false));
        };
        // an unborn HEAD has nothing worth caching
        let Ok(head) = source.head() else {
            return Ok((source.load(query)?, false));
        };
        let key = CacheKey::new(source.identity(), head, query.fingerprint());
        if let Some(records) = cache.get(&key) {
            debug!(commits = records.len(), "commit cache hit");
            return Ok((records, true));
        }
        let records = source.load(query)?;
        if let Err(e) = cache.put(&key, &records) {
            warn!(error = %e, "failed to write commit cache");
        }
        Ok((records, false))
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    /// Commits related to `p.commit` through shared files.
    pub fn find_dependencies(
        &self,
        dir: &str,
        p: &DepsParams<'_>,
    ) -> Result<Report<DependencyGraphResult>> {
        debug!(
            dir = dir,
            commit = p.commit,
            threshold = ?p.threshold,
            depth = ?p.depth,
            max_results = ?p.max_results,
            since = ?p.history.since,
            "find_dependencies called"
        );
        self.dependency_params(p)?;
        let source = self.open(dir)?;
        self.find_dependencies_in(&source, p)
    }

    pub fn find_dependencies_in<S: CommitRecordSource + ?Sized>(
        &self,
        source: &S,
        p: &DepsParams<'_>,
    ) -> Result<Report<DependencyGraphResult>> {
        let params = self.dependency_params(p)?;
        let query = self.history_query(&p.history)?;
        let root = source.resolve(p.commit)?;

        let history = self.load(source, &query, Some(&root))?;
        let result = deps::find_related(
            &root,
            &history.index,
            &history.table,
            &params,
            &history.deadline,
        )?;
        debug!(
            root = root,
            total_related = result.total_related,
            returned = result.dependencies.len(),
            "find_dependencies completed"
        );
        Ok(Report::new(result, history.meta()))
    }

    fn dependency_params(&self, p: &DepsParams<'_>) -> Result<DependencyParams> {
        let params = DependencyParams {
            threshold: p.threshold.unwrap_or(self.settings.threshold),
            depth: p.depth.unwrap_or(self.settings.depth),
            max_results: p.max_results.unwrap_or(self.settings.max_results),
            since: p
                .history
                .since
                .map(|s| parse_since(s, self.now()))
                .transpose()?,
        };
        if p.commit.trim().is_empty() {
            bail!(AnalyzeError::invalid_argument("commit must not be empty"));
        }
        params.validate()?;
        Ok(params)
    }

    /// Every commit with its directly related commits.
    pub fn analyze_coupling(
        &self,
        dir: &str,
        p: &CouplingParams<'_>,
    ) -> Result<Report<CouplingResult>> {
        debug!(
            dir = dir,
            threshold = ?p.threshold,
            max_results = ?p.max_results,
            since = ?p.history.since,
            "analyze_coupling called"
        );
        let source = self.open(dir)?;
        self.analyze_coupling_in(&source, p)
    }

    pub fn analyze_coupling_in<S: CommitRecordSource + ?Sized>(
        &self,
        source: &S,
        p: &CouplingParams<'_>,
    ) -> Result<Report<CouplingResult>> {
        let threshold = p.threshold.unwrap_or(self.settings.threshold);
        let max_results = p.max_results.unwrap_or(self.settings.max_results);
        if threshold < 1 {
            bail!(AnalyzeError::invalid_argument(format!(
                "threshold must be >= 1, got {threshold}"
            )));
        }
        let query = self.history_query(&p.history)?;

        let history = self.load(source, &query, None)?;
        let result = deps::analyze_coupling(
            &history.index,
            &history.table,
            threshold,
            max_results,
            query.since,
            &history.deadline,
        )?;
        debug!(
            commits_with_dependencies = result.total_commits_with_dependencies,
            "analyze_coupling completed"
        );
        Ok(Report::new(result, history.meta()))
    }

    /// File pairs that change together.
    pub fn analyze_cochange(
        &self,
        dir: &str,
        p: &CochangeParams<'_>,
    ) -> Result<Report<CoChangeResult>> {
        debug!(
            dir = dir,
            threshold = ?p.threshold,
            max_results = ?p.max_results,
            min_correlation = ?p.min_correlation,
            file = ?p.file,
            since = ?p.history.since,
            "analyze_cochange called"
        );
        self.cochange_params(p).validate()?;
        let source = self.open(dir)?;
        self.analyze_cochange_in(&source, p)
    }

    pub fn analyze_cochange_in<S: CommitRecordSource + ?Sized>(
        &self,
        source: &S,
        p: &CochangeParams<'_>,
    ) -> Result<Report<CoChangeResult>> {
        let params = self.cochange_params(p);
        params.validate()?;
        let query = self.history_query(&p.history)?;

        let history = self.load(source, &query, None)?;
        let result = cochange::compute_correlations(&history.index, &params, &history.deadline)?;
        debug!(
            commits_analyzed = result.commits_analyzed,
            total_pairs = result.total_pairs,
            returned = result.correlations.len(),
            "analyze_cochange completed"
        );
        Ok(Report::new(result, history.meta()))
    }

    fn cochange_params(&self, p: &CochangeParams<'_>) -> CoChangeParams {
        CoChangeParams {
            threshold: p.threshold.unwrap_or(self.settings.cochange_threshold),
            max_results: p.max_results.unwrap_or(self.settings.max_results),
            min_correlation: p.min_correlation.unwrap_or(0.0),
            file: p.file.map(normalize_path),
        }
    }

    /// Recency-weighted ownership of one file.
    pub fn analyze_ownership(
        &self,
        dir: &str,
        file: &str,
        p: &OwnershipQuery<'_>,
    ) -> Result<Report<OwnershipResult>> {
        debug!(
            dir = dir,
            file = file,
            decay_days = ?p.decay_days,
            since = ?p.history.since,
            "analyze_ownership called"
        );
        file_arg(file)?;
        self.ownership_params(p).validate()?;
        let source = self.open(dir)?;
        self.analyze_ownership_in(&source, file, p)
    }

    pub fn analyze_ownership_in<S: CommitRecordSource + ?Sized>(
        &self,
        source: &S,
        file: &str,
        p: &OwnershipQuery<'_>,
    ) -> Result<Report<OwnershipResult>> {
        let file = file_arg(file)?;
        let params = self.ownership_params(p);
        params.validate()?;
        let query = self.history_query(&p.history)?;

        let history = self.load(source, &query, None)?;
        let result = score_file(&history, &file, &params)?;
        debug!(
            file = %file,
            total_commits = result.total_commits,
            authors = result.ownership.len(),
            "analyze_ownership completed"
        );
        Ok(Report::new(result, history.meta()))
    }

    /// Ownership of several files over one shared index, scored in parallel.
    ///
    /// Per-file failures are returned in place; loading failures fail the whole batch.
    pub fn analyze_ownership_batch(
        &self,
        dir: &str,
        files: &[String],
        p: &OwnershipQuery<'_>,
    ) -> Result<Vec<Result<Report<OwnershipResult>>>> {
        debug!(dir = dir, files = files.len(), "analyze_ownership_batch called");
        self.ownership_params(p).validate()?;
        let source = self.open(dir)?;
        self.analyze_ownership_batch_in(&source, files, p)
    }

    pub fn analyze_ownership_batch_in<S: CommitRecordSource + ?Sized>(
        &self,
        source: &S,
        files: &[String],
        p: &OwnershipQuery<'_>,
    ) -> Result<Vec<Result<Report<OwnershipResult>>>> {
        let params = self.ownership_params(p);
        params.validate()?;
        let query = self.history_query(&p.history)?;

        let history = self.load(source, &query, None)?;
        let results = files
            .par_iter()
            .map(|file| {
                score_file(&history, file, &params).map(|r| Report::new(r, history.meta()))
            })
            .collect();
        Ok(results)
    }

    fn ownership_params(&self, p: &OwnershipQuery<'_>) -> OwnershipParams {
        OwnershipParams {
            decay_days: p.decay_days.unwrap_or(self.settings.decay_days),
            policy: self.settings.ownership_policy(),
            follow_renames: p.follow_renames.unwrap_or(self.settings.follow_renames),
            now: self.now(),
        }
    }

    /// Files an author has worked on.
    pub fn analyze_expertise(
        &self,
        dir: &str,
        author: &str,
        history: &HistoryBounds<'_>,
    ) -> Result<Report<ExpertiseResult>> {
        debug!(dir = dir, author = author, since = ?history.since, "analyze_expertise called");
        if author.trim().is_empty() {
            bail!(AnalyzeError::invalid_argument("author must not be empty"));
        }
        let source = self.open(dir)?;
        self.analyze_expertise_in(&source, author, history)
    }

    pub fn analyze_expertise_in<S: CommitRecordSource + ?Sized>(
        &self,
        source: &S,
        author: &str,
        bounds: &HistoryBounds<'_>,
    ) -> Result<Report<ExpertiseResult>> {
        let query = self.history_query(bounds)?;
        let history = self.load(source, &query, None)?;
        let result =
            ownership::analyze_expertise(author, &history.index, &history.table, &history.deadline)?;
        debug!(author = author, files = result.total_files, "analyze_expertise completed");
        Ok(Report::new(result, history.meta()))
    }

    /// Change frequency and recency of one file.
    pub fn analyze_churn(
        &self,
        dir: &str,
        file: &str,
        history: &HistoryBounds<'_>,
    ) -> Result<Report<FileChurn>> {
        debug!(dir = dir, file = file, since = ?history.since, "analyze_churn called");
        file_arg(file)?;
        let source = self.open(dir)?;
        self.analyze_churn_in(&source, file, history)
    }

    pub fn analyze_churn_in<S: CommitRecordSource + ?Sized>(
        &self,
        source: &S,
        file: &str,
        bounds: &HistoryBounds<'_>,
    ) -> Result<Report<FileChurn>> {
        let file = file_arg(file)?;
        let query = self.history_query(bounds)?;
        let history = self.load(source, &query, None)?;
        let result = churn::analyze_churn(
            &file,
            &history.index,
            &history.table,
            self.settings.follow_renames,
            self.now(),
            &history.deadline,
        )?;
        debug!(
            file = %file,
            total_commits = result.total_commits,
            churn_score = result.churn_score,
            "analyze_churn completed"
        );
        Ok(Report::new(result, history.meta()))
    }

    /// Commit time-of-day or day-of-week histogram.
    pub fn analyze_activity(
        &self,
        dir: &str,
        p: &ActivityParams<'_>,
    ) -> Result<Report<ActivityResult>> {
        debug!(
            dir = dir,
            group = ?p.group,
            by_author = p.by_author,
            since = ?p.history.since,
            "analyze_activity called"
        );
        let source = self.open(dir)?;
        self.analyze_activity_in(&source, p)
    }

    pub fn analyze_activity_in<S: CommitRecordSource + ?Sized>(
        &self,
        source: &S,
        p: &ActivityParams<'_>,
    ) -> Result<Report<ActivityResult>> {
        let query = self.history_query(&p.history)?;
        let history = self.load(source, &query, None)?;
        let result = activity::analyze_activity(
            &history.records,
            p.group.unwrap_or(ActivityGroup::Hour),
            p.by_author,
            &history.deadline,
        )?;
        debug!(
            commits_analyzed = result.commits_analyzed,
            observations = result.observations.len(),
            "analyze_activity completed"
        );
        Ok(Report::new(result, history.meta()))
    }
}

fn score_file(history: &History, file: &str, params: &OwnershipParams) -> Result<OwnershipResult> {
    let file = file_arg(file)?;
    ownership::score_ownership(
        &file,
        &history.index,
        &history.table,
        params,
        &history.deadline,
    )
}

/// Normalized `file` argument; empty paths are rejected before any history is read.
fn file_arg(file: &str) -> Result<String> {
    let file = normalize_path(file);
    if file.is_empty() {
        bail!(AnalyzeError::invalid_argument("file must not be empty"));
    }
    Ok(file)
}

/// Repository-relative form of a user-supplied path (`./src/a.rs` -> `src/a.rs`).
fn normalize_path(path: &str) -> String {
    let mut path = path.trim();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.to_string()
}
