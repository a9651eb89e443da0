use std::collections::BTreeMap;

use anyhow::Result;

use crate::engine::budget::Deadline;
use crate::error::Stage;
use crate::models::activity::{ActivityBucket, ActivityGroup, ActivityResult, AuthorActivity};
use crate::models::commit::CommitRecord;

const DAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const LATE_NIGHT_HOURS: [usize; 7] = [22, 23, 0, 1, 2, 3, 4];
const LATE_NIGHT_PCT: f64 = 5.0;
const WEEKEND_PCT: f64 = 10.0;

impl ActivityGroup {
    fn bucket_count(self) -> usize {
        match self {
            Self::Hour => 24,
            Self::Day => 7,
        }
    }

    /// Bucket of `commit` in its author's own UTC offset.
    fn bucket_of(self, commit: &CommitRecord) -> usize {
        match self {
            Self::Hour => usize::from(commit.timestamp.hour()),
            Self::Day => usize::from(commit.timestamp.weekday().number_days_from_monday()),
        }
    }

    fn label(self, bucket: usize) -> String {
        match self {
            Self::Hour => format!("{bucket:02}"),
            Self::Day => DAY_LABELS[bucket].to_string(),
        }
    }
}

/// Histogram of commit times over hours of the day or days of the week.
pub fn analyze_activity(
    commits: &[CommitRecord],
    group: ActivityGroup,
    by_author: bool,
    deadline: &Deadline,
) -> Result<ActivityResult> {
    let mut totals = vec![0usize; group.bucket_count()];
    let mut per_author: BTreeMap<&str, Vec<usize>> = BTreeMap::new();

    for commit in commits {
        deadline.check(Stage::Aggregation)?;
        let bucket = group.bucket_of(commit);
        totals[bucket] += 1;
        if by_author {
            per_author
                .entry(commit.author.as_str())
                .or_insert_with(|| vec![0; group.bucket_count()])[bucket] += 1;
        }
    }

    let observations = observe(group, &totals);
    let to_buckets = |counts: &[usize]| -> Vec<ActivityBucket> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &commits)| ActivityBucket {
                label: group.label(i),
                commits,
            })
            .collect()
    };

    Ok(ActivityResult {
        group,
        commits_analyzed: commits.len(),
        buckets: to_buckets(&totals),
        authors: per_author
            .into_iter()
            .map(|(author, counts)| AuthorActivity {
                author: author.to_string(),
                buckets: to_buckets(&counts),
            })
            .collect(),
        observations,
    })
}

fn observe(group: ActivityGroup, totals: &[usize]) -> Vec<String> {
    let total: usize = totals.iter().sum();
    if total == 0 {
        return Vec::new();
    }
    let pct = |n: usize| n as f64 * 100.0 / total as f64;

    // first bucket wins ties
    let (peak, peak_count) = totals
        .iter()
        .copied()
        .enumerate()
        .fold((0, 0), |best, (i, n)| if n > best.1 { (i, n) } else { best });

    let mut observations = Vec::new();
    match group {
        ActivityGroup::Hour => {
            let late: usize = LATE_NIGHT_HOURS.iter().map(|&h| totals[h]).sum();
            if pct(late) > LATE_NIGHT_PCT {
                observations.push(format!(
                    "{:.1}% of commits during late night (10pm-4am)",
                    pct(late)
                ));
            }
            observations.push(format!(
                "Peak activity: {peak:02}:00 ({peak_count} commits)"
            ));
        }
        ActivityGroup::Day => {
            let weekend = totals[5] + totals[6];
            if pct(weekend) > WEEKEND_PCT {
                observations.push(format!("{:.1}% of commits on weekends", pct(weekend)));
            }
            observations.push(format!(
                "Most active day: {} ({peak_count} commits)",
                DAY_LABELS[peak]
            ));
        }
    }
    observations
}
