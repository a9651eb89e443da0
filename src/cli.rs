use clap::{Args, Parser, Subcommand};

use crate::models::activity::ActivityGroup;

#[derive(Parser)]
#[command(
    name = "hug-analyze",
    version,
    about = "Repository history analysis: commit dependencies, co-change, ownership"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pretty-print JSON output (default: compact)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Always read history from git instead of the commit cache
    #[arg(long, global = true)]
    pub no_cache: bool,
}

/// History window shared by every analysis.
#[derive(Args, Debug, Clone, Default)]
pub struct HistoryArgs {
    /// Only consider commits after this date (YYYY-MM-DD, RFC 3339, or "N days ago")
    #[arg(long)]
    pub since: Option<String>,

    /// Only read the newest N commits
    #[arg(long)]
    pub max_commits: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find commits related to a commit through shared files
    Deps {
        /// Root commit (hash, short hash, or ref)
        commit: String,

        /// Git repository directory
        #[arg(short, long, default_value = ".")]
        dir: String,

        /// Minimum shared files for two commits to be related (default from config: 2)
        #[arg(short, long)]
        threshold: Option<usize>,

        /// Breadth-first levels to explore (default from config: 1)
        #[arg(long)]
        depth: Option<usize>,

        /// Maximum related commits to return
        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        #[command(flatten)]
        history: HistoryArgs,
    },

    /// Show every commit together with its directly related commits
    Coupling {
        /// Git repository directory
        #[arg(short, long, default_value = ".")]
        dir: String,

        #[arg(short, long)]
        threshold: Option<usize>,

        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        #[command(flatten)]
        history: HistoryArgs,
    },

    /// Find file pairs that change together
    Cochange {
        /// Git repository directory
        #[arg(short, long, default_value = ".")]
        dir: String,

        /// Minimum shared commits for a pair (default from config: 1)
        #[arg(short, long)]
        threshold: Option<usize>,

        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        /// Minimum Jaccard correlation in [0, 1]
        #[arg(long)]
        min_correlation: Option<f64>,

        /// Only pairs that include this file
        #[arg(short, long)]
        file: Option<String>,

        #[command(flatten)]
        history: HistoryArgs,
    },

    /// Score recency-weighted ownership of a file
    Ownership {
        /// Repository-relative file path (single mode)
        #[arg(short, long)]
        file: Option<String>,

        /// Comma-separated file paths (batch mode, NDJSON output)
        #[arg(long, conflicts_with = "file")]
        paths: Option<String>,

        /// File containing paths, one per line (batch mode)
        #[arg(long, conflicts_with_all = ["file", "paths"])]
        paths_file: Option<String>,

        /// Git repository directory
        #[arg(short, long, default_value = ".")]
        dir: String,

        /// Days for a contribution's weight to fall to 1/e (default from config: 180)
        #[arg(long)]
        decay_days: Option<i64>,

        /// Ignore commits made under the file's earlier names
        #[arg(long)]
        no_follow_renames: bool,

        #[command(flatten)]
        history: HistoryArgs,
    },

    /// List the files an author has changed
    Expertise {
        /// Author name or email fragment (case-insensitive)
        author: String,

        /// Git repository directory
        #[arg(short, long, default_value = ".")]
        dir: String,

        #[command(flatten)]
        history: HistoryArgs,
    },

    /// Change frequency and recency of a file
    Churn {
        /// Repository-relative file path
        file: String,

        /// Git repository directory
        #[arg(short, long, default_value = ".")]
        dir: String,

        #[command(flatten)]
        history: HistoryArgs,
    },

    /// Commit histogram by hour of day or day of week
    Activity {
        /// Git repository directory
        #[arg(short, long, default_value = ".")]
        dir: String,

        /// Bucket by "hour" or "day"
        #[arg(long = "by", default_value = "hour")]
        group: ActivityGroup,

        /// Add a per-author breakdown
        #[arg(long)]
        by_author: bool,

        #[command(flatten)]
        history: HistoryArgs,
    },

    /// Check git availability and configuration paths
    Doctor,

    /// Start NDJSON streaming session (stdin/stdout)
    Session,

    /// Start MCP server (stdio transport)
    Mcp,

    /// Generate default configuration file
    Init {
        /// Custom path for the configuration file
        #[arg(long)]
        path: Option<std::path::PathBuf>,
    },
}
