use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::schemars;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use schemars::JsonSchema;
use serde::Deserialize;

use crate::cache::store::CacheStore;
use crate::config::Config;
use crate::doctor;
use crate::error::{AnalyzeError, ErrorCode};
use crate::models::activity::ActivityGroup;
use crate::service::{
    ActivityParams, AppService, CochangeParams, CouplingParams, DepsParams, HistoryBounds,
    OwnershipQuery,
};
use crate::session;

// ---------------------------------------------------------------------------
// Tool parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DepsFindParams {
    /// Git repository directory
    pub dir: String,
    /// Root commit (hash, short hash, or ref)
    pub commit: String,
    /// Minimum number of shared files for two commits to be related
    #[serde(default)]
    pub threshold: Option<usize>,
    /// Breadth-first levels to explore from the root (>= 1)
    #[serde(default)]
    pub depth: Option<usize>,
    /// Maximum number of related commits to return
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Only consider commits after this date (YYYY-MM-DD or "N days ago")
    #[serde(default)]
    pub since: Option<String>,
    /// Only read the newest N commits
    #[serde(default)]
    pub max_commits: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CouplingAnalyzeParams {
    /// Git repository directory
    pub dir: String,
    #[serde(default)]
    pub threshold: Option<usize>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub max_commits: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CochangeAnalyzeParams {
    /// Git repository directory
    pub dir: String,
    /// Minimum number of shared commits for a pair (default: 1)
    #[serde(default)]
    pub threshold: Option<usize>,
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Minimum Jaccard correlation in [0, 1]
    #[serde(default)]
    pub min_correlation: Option<f64>,
    /// Filter to pairs containing this file
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub max_commits: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OwnershipAnalyzeParams {
    /// Git repository directory
    pub dir: String,
    /// Repository-relative file path
    pub file: String,
    /// Days for a contribution's weight to fall to 1/e (default: 180)
    #[serde(default)]
    pub decay_days: Option<i64>,
    /// Include commits made under earlier names of the file
    #[serde(default)]
    pub follow_renames: Option<bool>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub max_commits: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExpertiseAnalyzeParams {
    /// Git repository directory
    pub dir: String,
    /// Author name or email fragment (case-insensitive)
    pub author: String,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub max_commits: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ChurnAnalyzeParams {
    /// Git repository directory
    pub dir: String,
    /// Repository-relative file path
    pub file: String,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub max_commits: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ActivityAnalyzeParams {
    /// Git repository directory
    pub dir: String,
    /// "hour" (default) or "day"
    #[serde(default)]
    pub group: Option<String>,
    /// Also break the histogram down per author
    #[serde(default)]
    pub by_author: bool,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub max_commits: Option<usize>,
}

fn bounds(since: Option<&str>, max_commits: Option<usize>) -> HistoryBounds<'_> {
    HistoryBounds { since, max_commits }
}

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct HugAnalyzeServer {
    tool_router: ToolRouter<Self>,
    service: Arc<AppService>,
    config: Arc<Config>,
    config_path: Option<PathBuf>,
}

#[tool_router]
impl HugAnalyzeServer {
    /// Server sandboxed to the current directory, using `config` for defaults.
    pub fn new(config: Config, config_path: Option<PathBuf>, use_cache: bool) -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        let service = AppService::sandboxed(cwd)
            .unwrap_or_else(|_| AppService::new())
            .with_settings(config.analysis.clone())
            .with_cache(if use_cache { CacheStore::new().ok() } else { None });
        Self::with_service(service, config, config_path)
    }

    pub fn with_service(service: AppService, config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service: Arc::new(service),
            config: Arc::new(config),
            config_path,
        }
    }

    #[tool(
        name = "deps_find",
        description = "Find commits related to a root commit through shared files, breadth-first up to a depth"
    )]
    async fn deps_find(
        &self,
        params: Parameters<DepsFindParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let deps = DepsParams {
            commit: &p.commit,
            threshold: p.threshold,
            depth: p.depth,
            max_results: p.max_results,
            history: bounds(p.since.as_deref(), p.max_commits),
        };
        Self::to_tool_result(self.service.find_dependencies(&p.dir, &deps))
    }

    #[tool(
        name = "coupling_analyze",
        description = "List every commit with the commits it shares at least `threshold` files with"
    )]
    async fn coupling_analyze(
        &self,
        params: Parameters<CouplingAnalyzeParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let coupling = CouplingParams {
            threshold: p.threshold,
            max_results: p.max_results,
            history: bounds(p.since.as_deref(), p.max_commits),
        };
        Self::to_tool_result(self.service.analyze_coupling(&p.dir, &coupling))
    }

    #[tool(
        name = "cochange_analyze",
        description = "Find file pairs that frequently change together, ranked by Jaccard correlation"
    )]
    async fn cochange_analyze(
        &self,
        params: Parameters<CochangeAnalyzeParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let cochange = CochangeParams {
            threshold: p.threshold,
            max_results: p.max_results,
            min_correlation: p.min_correlation,
            file: p.file.as_deref(),
            history: bounds(p.since.as_deref(), p.max_commits),
        };
        Self::to_tool_result(self.service.analyze_cochange(&p.dir, &cochange))
    }

    #[tool(
        name = "ownership_analyze",
        description = "Score authors' recency-weighted ownership of a file"
    )]
    async fn ownership_analyze(
        &self,
        params: Parameters<OwnershipAnalyzeParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let query = OwnershipQuery {
            decay_days: p.decay_days,
            follow_renames: p.follow_renames,
            history: bounds(p.since.as_deref(), p.max_commits),
        };
        Self::to_tool_result(self.service.analyze_ownership(&p.dir, &p.file, &query))
    }

    #[tool(
        name = "expertise_analyze",
        description = "List the files an author has changed, most changed first"
    )]
    async fn expertise_analyze(
        &self,
        params: Parameters<ExpertiseAnalyzeParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(self.service.analyze_expertise(
            &p.dir,
            &p.author,
            &bounds(p.since.as_deref(), p.max_commits),
        ))
    }

    #[tool(
        name = "churn_analyze",
        description = "Change frequency, recency and author count of a file"
    )]
    async fn churn_analyze(
        &self,
        params: Parameters<ChurnAnalyzeParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(self.service.analyze_churn(
            &p.dir,
            &p.file,
            &bounds(p.since.as_deref(), p.max_commits),
        ))
    }

    #[tool(
        name = "activity_analyze",
        description = "Histogram of commits by hour of day or day of week"
    )]
    async fn activity_analyze(
        &self,
        params: Parameters<ActivityAnalyzeParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let group = match p.group.as_deref().map(str::parse::<ActivityGroup>).transpose() {
            Ok(group) => group,
            Err(e) => return Self::to_tool_result::<()>(Err(e.into())),
        };
        let activity = ActivityParams {
            group,
            by_author: p.by_author,
            history: bounds(p.since.as_deref(), p.max_commits),
        };
        Self::to_tool_result(self.service.analyze_activity(&p.dir, &activity))
    }

    #[tool(
        name = "doctor",
        description = "Check git availability and report configuration paths"
    )]
    async fn doctor_tool(&self) -> Result<CallToolResult, McpError> {
        let report = doctor::run_doctor(&self.config, self.config_path.as_deref());
        Self::to_tool_result(Ok(report))
    }
}

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

impl HugAnalyzeServer {
    fn to_tool_result<T: serde::Serialize>(
        result: anyhow::Result<T>,
    ) -> Result<CallToolResult, McpError> {
        match result {
            Ok(value) => {
                let json = serde_json::to_string(&value)
                    .map_err(|e| McpError::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e) => {
                let data = Some(session::error_from(&e));
                match e.downcast_ref::<AnalyzeError>().map(|ae| ae.code) {
                    Some(
                        ErrorCode::InvalidArgument
                        | ErrorCode::InvalidCommit
                        | ErrorCode::InvalidRequest
                        | ErrorCode::PathOutOfBounds,
                    ) => Err(McpError::invalid_params(e.to_string(), data)),
                    _ => Err(McpError::internal_error(e.to_string(), data)),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ServerHandler implementation
// ---------------------------------------------------------------------------

#[tool_handler]
impl ServerHandler for HugAnalyzeServer {
    fn get_info(&self) -> ServerInfo {
        let mut capabilities = ServerCapabilities::default();
        capabilities.tools = Some(ToolsCapability::default());
        ServerInfo::new(capabilities)
            .with_protocol_version(ProtocolVersion::V_2024_11_05)
            .with_server_info(Implementation::new(
                "hug-analyze",
                env!("CARGO_PKG_VERSION"),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_names_the_server() {
        let server = HugAnalyzeServer::with_service(AppService::new(), Config::default(), None);
        let info = server.get_info();
        assert_eq!(info.server_info.name, "hug-analyze");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn argument_errors_become_invalid_params() {
        let err = HugAnalyzeServer::to_tool_result::<()>(Err(AnalyzeError::invalid_argument(
            "depth must be >= 1",
        )
        .into()))
        .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
        let data = err.data.unwrap();
        assert_eq!(data["error"]["code"], "INVALID_ARGUMENT");
    }

    #[test]
    fn other_errors_are_internal() {
        let err = HugAnalyzeServer::to_tool_result::<()>(Err(AnalyzeError::source_unavailable(
            "not a git repository",
        )
        .into()))
        .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
    }
}
