use anyhow::Result;
use clap::Parser;

use hug_analyze::cache::store::CacheStore;
use hug_analyze::cli::{Cli, Commands, HistoryArgs};
use hug_analyze::config::{Config, ConfigService};
use hug_analyze::doctor;
use hug_analyze::error::{AnalyzeError, ErrorCode};
use hug_analyze::models::request::AnalyzeRequest;
use hug_analyze::service::{
    ActivityParams, AppService, CochangeParams, CouplingParams, DepsParams, HistoryBounds,
    OwnershipQuery,
};
use hug_analyze::session;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[cfg(not(feature = "dhat-heap"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        println!("{}", make_error_line(&e));
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn serialize_output(value: &impl serde::Serialize, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn make_error_line(e: &anyhow::Error) -> String {
    session::error_from(e).to_string()
}

fn history(args: &HistoryArgs) -> HistoryBounds<'_> {
    HistoryBounds {
        since: args.since.as_deref(),
        max_commits: args.max_commits,
    }
}

enum PathInput {
    Single(String),
    Batch(Vec<String>),
}

fn resolve_paths(
    file: Option<&str>,
    paths: Option<&str>,
    paths_file: Option<&str>,
) -> Result<PathInput> {
    if let Some(f) = file {
        Ok(PathInput::Single(f.to_string()))
    } else if let Some(ps) = paths {
        let list: Vec<String> = ps
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(PathInput::Batch(list))
    } else if let Some(pf) = paths_file {
        let content = std::fs::read_to_string(pf)?;
        let list: Vec<String> = content
            .lines()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(PathInput::Batch(list))
    } else {
        Err(AnalyzeError::new(
            ErrorCode::InvalidRequest,
            "One of --file, --paths, or --paths-file is required",
        )
        .into())
    }
}

fn print_json(value: &impl serde::Serialize, pretty: bool) -> Result<()> {
    let output = serialize_output(value, pretty)?;
    println!("{output}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

fn run(cli: Cli) -> Result<()> {
    let pretty = cli.pretty;

    // Load configuration
    let config = ConfigService::load(cli.config.as_deref())?;

    // Initialize logging if debug mode (CLI flag or config); the guard flushes on exit
    let _log_guard = if cli.debug || config.debug {
        Some(hug_analyze::logger::init(&config)?)
    } else {
        None
    };

    // Handle early-exit commands before creating AppService
    match &cli.command {
        Commands::Init { path } => {
            let config_path = if let Some(p) = path {
                ConfigService::generate_at(p)?;
                p.clone()
            } else {
                ConfigService::generate_default()?
            };
            eprintln!("Configuration file created at: {}", config_path.display());
            return Ok(());
        }
        Commands::Doctor => {
            let report = doctor::run_doctor(&config, cli.config.as_deref());
            return print_json(&report, pretty);
        }
        Commands::Session => return cmd_session(&config, cli.config.as_deref(), cli.no_cache),
        Commands::Mcp => return cmd_mcp(config, cli.config.clone(), cli.no_cache),
        _ => {}
    }

    let service = build_service(AppService::new(), &config, cli.no_cache);

    match cli.command {
        Commands::Deps {
            commit,
            dir,
            threshold,
            depth,
            max_results,
            history: h,
        } => {
            let params = DepsParams {
                commit: &commit,
                threshold,
                depth,
                max_results,
                history: history(&h),
            };
            print_json(&service.find_dependencies(&dir, &params)?, pretty)
        }
        Commands::Coupling {
            dir,
            threshold,
            max_results,
            history: h,
        } => {
            let params = CouplingParams {
                threshold,
                max_results,
                history: history(&h),
            };
            print_json(&service.analyze_coupling(&dir, &params)?, pretty)
        }
        Commands::Cochange {
            dir,
            threshold,
            max_results,
            min_correlation,
            file,
            history: h,
        } => {
            let params = CochangeParams {
                threshold,
                max_results,
                min_correlation,
                file: file.as_deref(),
                history: history(&h),
            };
            print_json(&service.analyze_cochange(&dir, &params)?, pretty)
        }
        Commands::Ownership {
            file,
            paths,
            paths_file,
            dir,
            decay_days,
            no_follow_renames,
            history: h,
        } => {
            let query = OwnershipQuery {
                decay_days,
                follow_renames: no_follow_renames.then_some(false),
                history: history(&h),
            };
            let input = resolve_paths(file.as_deref(), paths.as_deref(), paths_file.as_deref())?;
            match input {
                PathInput::Single(f) => {
                    print_json(&service.analyze_ownership(&dir, &f, &query)?, pretty)
                }
                PathInput::Batch(files) => batch_ownership(&service, &dir, &files, &query),
            }
        }
        Commands::Expertise {
            author,
            dir,
            history: h,
        } => print_json(
            &service.analyze_expertise(&dir, &author, &history(&h))?,
            pretty,
        ),
        Commands::Churn {
            file,
            dir,
            history: h,
        } => print_json(&service.analyze_churn(&dir, &file, &history(&h))?, pretty),
        Commands::Activity {
            dir,
            group,
            by_author,
            history: h,
        } => {
            let params = ActivityParams {
                group: Some(group),
                by_author,
                history: history(&h),
            };
            print_json(&service.analyze_activity(&dir, &params)?, pretty)
        }
        Commands::Init { .. } | Commands::Doctor | Commands::Session | Commands::Mcp => {
            unreachable!("handled above")
        }
    }
}

fn build_service(service: AppService, config: &Config, no_cache: bool) -> AppService {
    let cache = if no_cache {
        None
    } else {
        CacheStore::new().ok()
    };
    service
        .with_settings(config.analysis.clone())
        .with_cache(cache)
}

fn cmd_session(config: &Config, config_path: Option<&std::path::Path>, no_cache: bool) -> Result<()> {
    let service = build_service(AppService::from_env(), config, no_cache);
    session::run_session(|req| handle_request(&service, config, config_path, req))
}

fn cmd_mcp(config: Config, config_path: Option<std::path::PathBuf>, no_cache: bool) -> Result<()> {
    use rmcp::ServiceExt;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let server = hug_analyze::mcp::HugAnalyzeServer::new(config, config_path, !no_cache);
        let transport = rmcp::transport::io::stdio();
        let service = server
            .serve(transport)
            .await
            .map_err(|e| anyhow::anyhow!("MCP server initialization failed: {e}"))?;
        service
            .waiting()
            .await
            .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Batch processing (NDJSON output, rayon parallel inside the service)
// ---------------------------------------------------------------------------

fn batch_ownership(
    service: &AppService,
    dir: &str,
    files: &[String],
    query: &OwnershipQuery<'_>,
) -> Result<()> {
    let results = service.analyze_ownership_batch(dir, files, query)?;
    for result in &results {
        let line = match result {
            Ok(report) => {
                serde_json::to_string(report).unwrap_or_else(|e| make_error_line(&e.into()))
            }
            Err(e) => make_error_line(e),
        };
        println!("{line}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Session handler
// ---------------------------------------------------------------------------

fn handle_request(
    service: &AppService,
    config: &Config,
    config_path: Option<&std::path::Path>,
    req: AnalyzeRequest,
) -> Result<serde_json::Value> {
    use hug_analyze::models::request::Command;

    let dir = req.dir.as_deref().unwrap_or(".");
    let bounds = HistoryBounds {
        since: req.since.as_deref(),
        max_commits: req.max_commits,
    };

    match req.command {
        Command::Deps => {
            let params = DepsParams {
                commit: req.commit.as_deref().unwrap_or(""),
                threshold: req.threshold,
                depth: req.depth,
                max_results: req.max_results,
                history: bounds,
            };
            Ok(serde_json::to_value(service.find_dependencies(dir, &params)?)?)
        }
        Command::Coupling => {
            let params = CouplingParams {
                threshold: req.threshold,
                max_results: req.max_results,
                history: bounds,
            };
            Ok(serde_json::to_value(service.analyze_coupling(dir, &params)?)?)
        }
        Command::Cochange => {
            let params = CochangeParams {
                threshold: req.threshold,
                max_results: req.max_results,
                min_correlation: req.min_correlation,
                file: req.file.as_deref(),
                history: bounds,
            };
            Ok(serde_json::to_value(service.analyze_cochange(dir, &params)?)?)
        }
        Command::Ownership => {
            let query = OwnershipQuery {
                decay_days: req.decay_days,
                follow_renames: req.follow_renames,
                history: bounds,
            };
            match (&req.file, &req.files) {
                (_, Some(files)) => {
                    let results = service.analyze_ownership_batch(dir, files, &query)?;
                    let values = results
                        .iter()
                        .map(|r| match r {
                            Ok(report) => serde_json::to_value(report)
                                .unwrap_or_else(|e| session::error_from(&e.into())),
                            Err(e) => session::error_from(e),
                        })
                        .collect();
                    Ok(serde_json::Value::Array(values))
                }
                (Some(file), None) => {
                    Ok(serde_json::to_value(service.analyze_ownership(dir, file, &query)?)?)
                }
                (None, None) => Err(AnalyzeError::invalid_argument(
                    "ownership requires \"file\" or \"files\"",
                )
                .into()),
            }
        }
        Command::Expertise => {
            let author = req.author.as_deref().unwrap_or("");
            Ok(serde_json::to_value(service.analyze_expertise(dir, author, &bounds)?)?)
        }
        Command::Churn => {
            let file = req.file.as_deref().unwrap_or("");
            Ok(serde_json::to_value(service.analyze_churn(dir, file, &bounds)?)?)
        }
        Command::Activity => {
            let params = ActivityParams {
                group: req.group,
                by_author: req.by_author,
                history: bounds,
            };
            Ok(serde_json::to_value(service.analyze_activity(dir, &params)?)?)
        }
        Command::Doctor => {
            let report = doctor::run_doctor(config, config_path);
            Ok(serde_json::to_value(report)?)
        }
    }
}
