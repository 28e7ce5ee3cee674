//! docproc — 批量文档分析命令行工具
//!
//! Usage:
//!   docproc run <dir> [--provider P] [--model M] [--config FILE]
//!   docproc version
//!   docproc help

use ai_lib_docproc::batch::{BatchScheduler, DocumentTask};
use ai_lib_docproc::cache::CacheStore;
use ai_lib_docproc::telemetry::TracingMetricsSink;
use ai_lib_docproc::transport::HttpCompletionBackend;
use ai_lib_docproc::EngineConfig;
use anyhow::{bail, Context};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct RunArgs {
    dir: PathBuf,
    provider: Option<String>,
    model: Option<String>,
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let outcome = match args[1].as_str() {
        "run" => match parse_run_args(&args[2..]) {
            Ok(run_args) => cmd_run(run_args).await,
            Err(e) => Err(e),
        },
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = outcome {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"docproc — AI 文档批量分析工具

USAGE:
    docproc <COMMAND> [OPTIONS]

COMMANDS:
    run <dir>                   Analyse every file in <dir> and print a JSON report
        --provider <name>       Provider id (default from config, e.g. openai)
        --model <name>          Model id (default from config)
        --config <file>         YAML engine configuration
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    <PROVIDER>_BASE_URL         Completion endpoint base URL (required)
    <PROVIDER>_API_KEY          Bearer token for the endpoint
    AI_DOC_*                    Scheduler and cache overrides
    RUST_LOG                    Log filter (default: info)"#
    );
}

fn cmd_version() {
    println!("docproc {}", env!("CARGO_PKG_VERSION"));
}

fn parse_run_args(args: &[String]) -> anyhow::Result<RunArgs> {
    let mut out = RunArgs::default();
    let mut dir = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--provider" => out.provider = Some(value("--provider")?),
            "--model" => out.model = Some(value("--model")?),
            "--config" => out.config = Some(PathBuf::from(value("--config")?)),
            flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
            positional => {
                if dir.is_some() {
                    bail!("unexpected argument: {positional}");
                }
                dir = Some(PathBuf::from(positional));
            }
        }
    }
    out.dir = dir.context("run requires a document directory")?;
    Ok(out)
}

async fn load_tasks(dir: &Path) -> anyhow::Result<Vec<DocumentTask>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot read directory {}", dir.display()))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut tasks = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => tasks.push(DocumentTask::new(name.clone(), name, content)),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }
    Ok(tasks)
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).await?,
        None => EngineConfig::default(),
    }
    .apply_env();
    if let Some(p) = args.provider {
        config.scheduler.provider = p;
    }
    if let Some(m) = args.model {
        config.scheduler.model = m;
    }
    config.validate()?;

    let tasks = load_tasks(&args.dir).await?;
    if tasks.is_empty() {
        bail!("no documents found in {}", args.dir.display());
    }
    info!(documents = tasks.len(), dir = %args.dir.display(), "loaded documents");

    let sink = Arc::new(TracingMetricsSink);
    let cache = Arc::new(CacheStore::new(config.cache.clone())?.with_metrics(sink.clone()));
    let cancel = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(cancel.child_token());

    let backend = Arc::new(HttpCompletionBackend::from_env(&config.scheduler.provider)?);
    let scheduler =
        BatchScheduler::new(config.scheduler, backend, Some(cache.clone()))?.with_metrics(sink);

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            ctrl_c.cancel();
        }
    });

    let result = scheduler.process_documents(tasks, &cancel).await?;
    cancel.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }

    let report = json!({
        "run": result,
        "cache": cache.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !result.failed.is_empty() {
        bail!("{} of {} tasks failed", result.failed.len(), result.task_count());
    }
    Ok(())
}
