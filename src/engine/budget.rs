//! Time budgets for analyses over unbounded histories.

use std::time::{Duration, Instant};

use crate::error::{AnalyzeError, Stage};
use crate::models::report::RepoSize;

/// Environment variable overriding the timeout, in seconds (`0` disables it).
pub const TIMEOUT_ENV: &str = "HUG_ANALYZE_TIMEOUT";

impl RepoSize {
    pub fn classify(commit_count: usize) -> Self {
        match commit_count {
            0..100 => Self::Small,
            100..1_000 => Self::Medium,
            1_000..10_000 => Self::Large,
            _ => Self::Massive,
        }
    }

    pub fn default_budget(self) -> Duration {
        let secs = match self {
            Self::Small => 30,
            Self::Medium => 60,
            Self::Large => 90,
            Self::Massive => 120,
        };
        Duration::from_secs(secs)
    }
}

/// The budget an analysis runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    pub size: RepoSize,
    /// `None` means unlimited
    pub limit: Option<Duration>,
}

impl TimeBudget {
    /// Pick a budget from a commit count and an optional override in seconds.
    pub fn resolve(commit_count: usize, override_secs: Option<u64>) -> Self {
        let size = RepoSize::classify(commit_count);
        let limit = match override_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(size.default_budget()),
        };
        Self { size, limit }
    }

    pub fn start(&self) -> Deadline {
        Deadline {
            started: Instant::now(),
            limit: self.limit,
        }
    }
}

/// Read [`TIMEOUT_ENV`], ignoring values that are not whole seconds.
pub fn env_override() -> Option<u64> {
    std::env::var(TIMEOUT_ENV)
        .ok()
        .and_then(|v| v.trim().parse().ok())
}

/// A hard deadline checked between units of work.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn unlimited() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
        }
    }

    pub fn after(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self, stage: Stage) -> Result<(), AnalyzeError> {
        match self.limit {
            Some(limit) if self.started.elapsed() >= limit => {
                Err(AnalyzeError::timeout(stage, limit))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn classify_tiers() {
        assert_eq!(RepoSize::classify(0), RepoSize::Small);
        assert_eq!(RepoSize::classify(99), RepoSize::Small);
        assert_eq!(RepoSize::classify(100), RepoSize::Medium);
        assert_eq!(RepoSize::classify(9_999), RepoSize::Large);
        assert_eq!(RepoSize::classify(10_000), RepoSize::Massive);
    }

    #[test]
    fn larger_repositories_get_larger_budgets() {
        let tiers = [
            RepoSize::Small,
            RepoSize::Medium,
            RepoSize::Large,
            RepoSize::Massive,
        ];
        for pair in tiers.windows(2) {
            assert!(pair[0].default_budget() < pair[1].default_budget());
        }
    }

    #[test]
    fn override_replaces_tier_default() {
        let budget = TimeBudget::resolve(50, Some(5));
        assert_eq!(budget.size, RepoSize::Small);
        assert_eq!(budget.limit, Some(Duration::from_secs(5)));

        let budget = TimeBudget::resolve(5_000, None);
        assert_eq!(budget.limit, Some(Duration::from_secs(90)));
    }

    #[test]
    fn zero_override_disables_deadline() {
        let budget = TimeBudget::resolve(50, Some(0));
        assert_eq!(budget.limit, None);
        assert!(budget.start().check(Stage::Traversal).is_ok());
    }

    #[test]
    fn expired_deadline_reports_stage() {
        let deadline = Deadline::after(Duration::ZERO);
        let err = deadline.check(Stage::Indexing).unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(err.stage, Some(Stage::Indexing));
    }

    #[test]
    fn generous_deadline_passes() {
        let deadline = Deadline::after(Duration::from_secs(3600));
        assert!(deadline.check(Stage::Correlation).is_ok());
        assert!(Deadline::unlimited().check(Stage::Correlation).is_ok());
    }
}
