//! ares-research binary
//!
//! Offline runner: loads `ares-research.toml`, wires the replay gateway,
//! prints progress to stderr and writes the markdown report.

use anyhow::{Context, Result};
use ares_research::cli::init::{self, InitConfig, InitResult};
use ares_research::cli::output::Output;
use ares_research::cli::{Cli, Commands};
use ares_research::utils::toml_config::{ConfigError, LogFormat, LoggingConfig, ResearchConfig};
use ares_research::{gateway, EventLog, ReportMode, ResearchEngine, RunRequest};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Arguments of `ares-research run`
struct RunArgs {
    query: String,
    mode: ReportMode,
    depth: Option<u32>,
    breadth: Option<usize>,
    concurrency: Option<usize>,
    output: Option<PathBuf>,
    fixture: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    if let Commands::Init { path, force } = &cli.command {
        return match init::run(
            InitConfig {
                path: path.clone(),
                force: *force,
            },
            &output,
        ) {
            InitResult::Success | InitResult::AlreadyExists => Ok(()),
            InitResult::Error(e) => Err(anyhow::anyhow!(e)),
        };
    }

    let (config, missing) = match ResearchConfig::load(&cli.config) {
        Ok(config) => (config, false),
        Err(ConfigError::FileNotFound(_)) => (ResearchConfig::default(), true),
        Err(e) => {
            output.error(&format!("{}: {}", cli.config.display(), e));
            return Err(e.into());
        }
    };
    init_tracing(&config.logging, cli.verbose);
    if missing {
        tracing::warn!(path = %cli.config.display(), "configuration file not found, using defaults");
    }

    match cli.command {
        Commands::Config { validate } => show_config(&cli.config, &config, missing, validate, &output),
        Commands::Run {
            query,
            mode,
            depth,
            breadth,
            concurrency,
            output: report_path,
            fixture,
        } => {
            let args = RunArgs {
                query,
                mode,
                depth,
                breadth,
                concurrency,
                output: report_path,
                fixture,
            };
            run_query(&cli.config, config, args, &output).await
        }
        Commands::Init { .. } => Ok(()),
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn show_config(
    path: &Path,
    config: &ResearchConfig,
    missing: bool,
    validate: bool,
    output: &Output,
) -> Result<()> {
    if validate {
        if missing {
            output.error(&format!("{} not found", path.display()));
            anyhow::bail!("configuration file not found: {}", path.display());
        }
        output.success(&format!("{} is valid", path.display()));
        return Ok(());
    }

    output.header("Configuration");
    output.kv("file", &path.display().to_string());
    output.kv(
        "limits",
        &format!(
            "depth {} / breadth {} / concurrency {}",
            config.research.max_depth, config.research.max_breadth, config.research.max_concurrency
        ),
    );
    output.header("Agent roster");
    for spec in config.roster().specs() {
        match &spec.instructions {
            Some(instructions) => output.list_item(&format!("{}: {}", spec.role, instructions)),
            None => output.list_item(&spec.role.to_string()),
        }
    }
    println!("{}", config.to_toml()?);
    Ok(())
}

async fn run_query(
    config_path: &Path,
    mut config: ResearchConfig,
    args: RunArgs,
    output: &Output,
) -> Result<()> {
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    config.gateway.fixture = match args.fixture {
        Some(fixture) => Some(fixture),
        None => config.gateway.fixture.map(|f| resolve(base, f)),
    };
    let event_log_dir = config.progress.event_log_dir.clone().map(|d| resolve(base, d));

    let gateways = gateway::from_config(&config.gateway)
        .await
        .context("failed to set up gateways")?;
    let engine = ResearchEngine::new(gateways, &config);

    let mut request = RunRequest::new(args.query.clone(), args.mode);
    request.max_depth = args.depth;
    request.max_breadth = args.breadth;
    request.max_concurrency = args.concurrency;

    output.banner();
    output.info(&format!("researching \"{}\" ({})", args.query.trim(), args.mode));

    let progress = engine.progress();
    let event_log = event_log_dir
        .map(|dir| EventLog::new(dir).spawn(&progress, request.run_id, args.query.trim()));

    let events = progress.subscribe();
    let colored = output.colored;
    let printer = tokio::spawn(async move {
        let output = if colored {
            Output::new()
        } else {
            Output::no_color()
        };
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            output.event(&event);
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing with the sections done so far");
            on_interrupt.cancel();
        }
    });

    let result = engine.run(request, cancel).await;
    progress.close();
    if printer.await.is_err() {
        tracing::warn!("progress printer stopped early");
    }
    if let Some(handle) = event_log {
        match handle.await {
            Ok(Ok(path)) => output.info(&format!("event log: {}", path.display())),
            Ok(Err(e)) => output.warning(&format!("event log not written: {}", e)),
            Err(e) => output.warning(&format!("event log task failed: {}", e)),
        }
    }

    let draft = match result {
        Ok(draft) => draft,
        Err(e) => {
            output.error(&e.to_string());
            return Err(e.into());
        }
    };

    let markdown = draft.to_markdown();
    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &markdown)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            output.created("report", &path.display().to_string());
        }
        None => println!("{}", markdown),
    }

    if draft.is_incomplete() {
        output.warning("run was interrupted; the report is marked incomplete");
    } else {
        output.complete(&format!(
            "{} section(s), {} reference(s)",
            draft.sections().len(),
            draft.references().len()
        ));
    }
    let usage = draft.usage();
    if usage.total_tokens > 0 {
        output.kv(
            "tokens",
            &format!(
                "{} ({} prompt / {} completion)",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            ),
        );
    }
    Ok(())
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
