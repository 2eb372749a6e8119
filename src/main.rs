//! Interrogator binary
//!
//! - `serve` (default): the simulation API with SSE event streams
//! - `evaluate`: run every case of a dataset and write per-case results
//! - `stream`: run one simulation and print its progress

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use interrogator::config::AppConfig;
use interrogator::console;
use interrogator::evaluation::{self, Evaluator};
use interrogator::openai::OpenAiGenerator;
use interrogator::server;
use interrogator::testing::ScriptedGenerator;
use interrogator::{RunRegistry, SimulationRequest, StakeholderCatalog, TextGenerator};

const DEFAULT_STREAM_INPUT: &str = "Our B2B SaaS trial-to-paid conversion dropped from 22% \
     to 14% after we changed onboarding. We need to understand what is causing the drop \
     and what to fix first.";

const DEFAULT_STREAM_STAKEHOLDER: &str = "VP Product at a mid-market B2B SaaS company. \
     Priorities: conversion, retention, sales handoff quality. Constraints: small \
     engineering bandwidth this quarter.";

/// Interrogator CLI
#[derive(Parser)]
#[command(name = "interrogator")]
#[command(about = "Simulated customer-interview runs with live event streaming", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "INTERROGATOR_CONFIG")]
    config: Option<String>,

    /// Log level, overrides the configured one
    #[arg(long, global = true, env = "INTERROGATOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, global = true, env = "INTERROGATOR_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve(ServeArgs),
    /// Run a dataset of cases and save detailed results
    Evaluate(EvaluateArgs),
    /// Run one simulation and print its progress
    Stream(StreamArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Listen address, overrides the configured one
    #[arg(short, long, env = "INTERROGATOR_LISTEN_ADDR")]
    listen: Option<String>,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Dataset file (.json array or .jsonl)
    #[arg(long)]
    input: PathBuf,

    /// Results file (.jsonl writes one result per line)
    #[arg(long, default_value = "data/evaluation_results.jsonl")]
    output: PathBuf,

    /// Default message ceiling, overridable per case
    #[arg(long)]
    max_interview_messages: Option<u32>,

    /// Run only the first N cases (0 means all)
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Stop at the first failed case
    #[arg(long)]
    fail_fast: bool,

    /// Use scripted generation instead of the configured backend
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct StreamArgs {
    /// Problem statement
    #[arg(long, default_value = DEFAULT_STREAM_INPUT)]
    user_input: String,

    /// Stakeholder profile
    #[arg(long, default_value = DEFAULT_STREAM_STAKEHOLDER)]
    stakeholder: String,

    /// Message ceiling per hypothesis
    #[arg(long)]
    max_interview_messages: Option<u32>,

    /// Use scripted generation instead of the configured backend
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing(level: &str, json: bool) {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Registry over the configured backend, or over scripted replies for dry runs
fn build_registry(config: &AppConfig, dry_run: bool) -> anyhow::Result<RunRegistry> {
    let catalog = match StakeholderCatalog::load(&config.simulation.stakeholder_file) {
        Ok(catalog) => catalog,
        Err(e) if dry_run => {
            warn!(error = %e, "Stakeholder catalog unavailable, continuing without it");
            StakeholderCatalog::default()
        }
        Err(e) => return Err(e).context("failed to load stakeholder catalog"),
    };

    let generator: Arc<dyn TextGenerator> = if dry_run {
        info!("Dry run: using scripted generation");
        Arc::new(ScriptedGenerator::new())
    } else {
        let generator =
            OpenAiGenerator::new(&config.generation).context("failed to build generator")?;
        info!(
            endpoint = generator.endpoint(),
            model = %config.generation.model,
            "Text generation configured"
        );
        Arc::new(generator)
    };

    Ok(RunRegistry::new(generator, catalog)
        .with_default_max_interview_messages(config.simulation.default_max_interview_messages))
}

async fn serve(config: AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    let mut config = config;
    if let Some(listen) = &args.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("invalid listen address '{listen}'"))?;
    }

    let registry = build_registry(&config, false)?;
    let router = server::create_router(registry, &config.server.cors_allow_origins);
    server::serve(config.server.listen_addr, router).await
}

async fn evaluate(config: AppConfig, args: EvaluateArgs) -> anyhow::Result<()> {
    let mut registry = build_registry(&config, args.dry_run)?;
    if let Some(max) = args.max_interview_messages {
        registry = registry.with_default_max_interview_messages(max);
    }

    let cases = evaluation::load_dataset(&args.input)?;
    let report = Evaluator::new(registry)
        .with_limit(args.limit)
        .with_fail_fast(args.fail_fast)
        .run(cases)
        .await;
    evaluation::write_results(&args.output, &report.results)?;

    println!(
        "Evaluation finished. total={} succeeded={} failed={}",
        report.results.len(),
        report.succeeded,
        report.failed
    );
    println!("Results written to: {}", args.output.display());
    Ok(())
}

async fn stream(config: AppConfig, args: StreamArgs) -> anyhow::Result<()> {
    let registry = build_registry(&config, args.dry_run)?;

    let mut request =
        SimulationRequest::new(args.user_input).stakeholder_profile(args.stakeholder);
    if let Some(max) = args.max_interview_messages {
        request = request.max_interview_messages(max);
    }
    let id = registry.create(&request)?;

    println!("Streaming run {id} started (dry_run={})", args.dry_run);
    let mut events = registry.subscribe(id)?;
    while let Some(event) = events.next().await {
        if let Some(text) = console::render_event(&event) {
            print!("{text}");
        }
    }

    let run = registry.get(id)?;
    print!("{}", console::render_summary(&run));
    match run.error {
        Some(error) => anyhow::bail!("run failed: {error}"),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    init_tracing(&config.logging.level, config.logging.json);

    match cli.command {
        Some(Command::Serve(args)) => serve(config, args).await,
        Some(Command::Evaluate(args)) => evaluate(config, args).await,
        Some(Command::Stream(args)) => stream(config, args).await,
        None => serve(config, ServeArgs::default()).await,
    }
}
