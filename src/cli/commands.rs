//! CLI command definitions for mecheval.
//!
//! `run` drives a live target agent through a task file, `score` grades
//! replies recorded elsewhere, `stats` aggregates a report and `ping` checks
//! that a target is reachable.

use crate::config::BenchConfig;
use crate::evaluation::{
    aggregate_records, compare_models, judge_from_config, read_records, read_responses,
    write_records, EvaluationRecord, Evaluator, RunSummary, DEFAULT_CRITERION,
};
use crate::metrics::{export_metrics, init_metrics};
use crate::statistics::Bootstrap;
use crate::target::{A2aClient, TargetAgent};
use crate::task::{load_tasks, TaskInstance};
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default report written by `run` and `score`.
const DEFAULT_REPORT: &str = "./mecheval-report.jsonl";

/// Model name recorded when none is given.
const DEFAULT_MODEL_NAME: &str = "target";

/// Benchmark for engineering agents reached over agent-to-agent messaging.
#[derive(Parser)]
#[command(name = "mecheval")]
#[command(about = "Evaluate AI agents on multi-tier mechanical engineering tasks")]
#[command(version)]
#[command(
    long_about = "mecheval drives a target agent through knowledge-check, calculation and design tasks,\nextracts its answers, re-runs its numeric code and scores the results.\n\nExample usage:\n  mecheval run --target-url http://localhost:9009 --tasks tasks.yaml --output report.jsonl\n  mecheval stats --report report.jsonl --compare agent-a agent-b"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Evaluate a live target agent on a task file.
    #[command(alias = "eval")]
    Run(RunArgs),

    /// Score recorded replies without contacting a target.
    Score(ScoreArgs),

    /// Aggregate a JSONL report by task and model.
    Stats(StatsArgs),

    /// Check that a target agent serves its agent card.
    Ping(PingArgs),
}

/// Arguments for `mecheval run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Base or routing URL of the target agent.
    #[arg(long, env = "MECHEVAL_TARGET_URL")]
    pub target_url: Option<String>,

    /// Task file (.json, .yaml or .yml).
    #[arg(short, long)]
    pub tasks: PathBuf,

    /// Name recorded for the evaluated model.
    #[arg(short = 'm', long, default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,

    /// JSONL report to write.
    #[arg(short, long, default_value = DEFAULT_REPORT)]
    pub output: PathBuf,

    /// Turn budget per task instance.
    #[arg(long)]
    pub max_turns: Option<usize>,

    /// Use neutral rubric scores instead of calling the judge.
    #[arg(long)]
    pub no_judge: bool,

    /// Model used by the rubric judge.
    #[arg(long)]
    pub judge_model: Option<String>,

    /// API key for the judge (can also be set via OPENROUTER_API_KEY).
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub judge_api_key: Option<String>,

    /// Task instances evaluated concurrently. Report order is unaffected.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Write Prometheus metrics to this file after the run.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    /// YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `mecheval score`.
#[derive(Parser, Debug)]
pub struct ScoreArgs {
    /// Task file the replies belong to.
    #[arg(short, long)]
    pub tasks: PathBuf,

    /// JSONL file of `{"task_instance_id": ..., "response": ...}` lines.
    #[arg(short, long)]
    pub responses: PathBuf,

    /// Model name for lines that do not carry one.
    #[arg(short = 'm', long, default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,

    /// JSONL report to write.
    #[arg(short, long, default_value = DEFAULT_REPORT)]
    pub output: PathBuf,

    /// Use neutral rubric scores instead of calling the judge.
    #[arg(long)]
    pub no_judge: bool,

    /// API key for the judge (can also be set via OPENROUTER_API_KEY).
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub judge_api_key: Option<String>,

    /// YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `mecheval stats`.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// JSONL report produced by `run` or `score`.
    #[arg(short, long)]
    pub report: PathBuf,

    /// Criterion to aggregate; `success` reads as 0 or 1.
    #[arg(long, default_value = DEFAULT_CRITERION)]
    pub criterion: String,

    /// Compare two models with a two-sample bootstrap.
    #[arg(long, num_args = 2, value_names = ["MODEL_A", "MODEL_B"])]
    pub compare: Option<Vec<String>>,

    /// Seed for reproducible intervals.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Bootstrap iterations.
    #[arg(long)]
    pub iterations: Option<usize>,

    /// YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `mecheval ping`.
#[derive(Parser, Debug)]
pub struct PingArgs {
    /// Base or routing URL of the target agent.
    #[arg(long, env = "MECHEVAL_TARGET_URL")]
    pub target_url: String,

    /// Attempts before giving up.
    #[arg(long, default_value = "1")]
    pub attempts: u32,

    /// Seconds between attempts.
    #[arg(long, default_value = "2")]
    pub interval_secs: u64,

    /// YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Parse CLI arguments and return the Cli struct.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI application.
///
/// Parses command-line arguments and executes the appropriate command.
pub async fn run() -> anyhow::Result<()> {
    let cli = parse_cli();
    run_with_cli(cli).await
}

/// Run the CLI application with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_evaluation_command(args).await,
        Commands::Score(args) => run_score_command(args).await,
        Commands::Stats(args) => run_stats_command(args),
        Commands::Ping(args) => run_ping_command(args).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BenchConfig> {
    BenchConfig::load(path).context("Failed to load configuration")
}

fn load_task_file(path: &Path) -> anyhow::Result<Vec<TaskInstance>> {
    let tasks = load_tasks(path)
        .with_context(|| format!("Failed to load tasks from {}", path.display()))?;
    anyhow::ensure!(!tasks.is_empty(), "No tasks found in {}", path.display());
    info!(path = %path.display(), count = tasks.len(), "Loaded tasks");
    Ok(tasks)
}

fn print_summary(title: &str, summary: &RunSummary, output: &Path, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("\n=== {} ===", title);
    println!("Instances:      {}", summary.total);
    println!(
        "Succeeded:      {} ({:.1}%)",
        summary.succeeded,
        summary.success_rate * 100.0
    );
    println!("Errored:        {}", summary.errored);
    if summary.mean_turns > 0.0 {
        println!("Mean turns:     {:.1}", summary.mean_turns);
    }
    if summary.total_cost > 0.0 {
        println!("Target cost:    {:.4}", summary.total_cost);
    }
    for (kind, counts) in &summary.by_kind {
        println!(
            "  {:<18} {}/{} succeeded, {} errored",
            kind, counts.succeeded, counts.total, counts.errored
        );
    }
    println!("Report:         {}", output.display());
    Ok(())
}

// ============================================================================
// run
// ============================================================================

async fn run_evaluation_command(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(url) = args.target_url {
        config = config.with_target_url(url);
    }
    if let Some(max_turns) = args.max_turns {
        config = config.with_max_turns(max_turns);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(model) = args.judge_model {
        config.judge.model = model;
    }
    if config.judge.api_key.is_none() {
        config.judge.api_key = args.judge_api_key;
    }
    if args.no_judge {
        config = config.with_judge_enabled(false);
    }
    config.validate()?;

    let target_url = config
        .target_url
        .clone()
        .context("No target URL: pass --target-url or set MECHEVAL_TARGET_URL")?;
    let tasks = load_task_file(&args.tasks)?;

    if args.metrics_out.is_some() {
        init_metrics().context("Failed to register metrics")?;
    }

    let judge = judge_from_config(&config.judge).context("Failed to set up the rubric judge")?;
    let evaluator = Evaluator::from_config(&config, judge, &args.model_name)?;
    let target = A2aClient::new(&target_url, &config.transport);

    match target.agent_card().await {
        Ok(card) => info!(agent = %card.name, version = %card.version, "Connected to target agent"),
        Err(e) => warn!(url = %target_url, error = %e, "Agent card unavailable, continuing"),
    }

    let records = evaluator.evaluate_batch(&target, &tasks).await;
    write_records(&args.output, &records)
        .with_context(|| format!("Failed to write report {}", args.output.display()))?;

    if let Some(path) = &args.metrics_out {
        fs::write(path, export_metrics())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    print_summary(
        "Evaluation Results",
        &RunSummary::from_records(&records),
        &args.output,
        args.json,
    )
}

// ============================================================================
// score
// ============================================================================

async fn run_score_command(args: ScoreArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if config.judge.api_key.is_none() {
        config.judge.api_key = args.judge_api_key;
    }
    if args.no_judge {
        config = config.with_judge_enabled(false);
    }

    let tasks = load_task_file(&args.tasks)?;
    let by_id: HashMap<&str, &TaskInstance> =
        tasks.iter().map(|task| (task.id.as_str(), task)).collect();
    let responses = read_responses(&args.responses)
        .with_context(|| format!("Failed to read {}", args.responses.display()))?;

    let judge = judge_from_config(&config.judge).context("Failed to set up the rubric judge")?;
    let evaluator = Evaluator::from_config(&config, judge, &args.model_name)?;

    let mut records: Vec<EvaluationRecord> = Vec::with_capacity(responses.len());
    for recorded in &responses {
        let Some(task) = by_id.get(recorded.task_instance_id.as_str()) else {
            warn!(task = %recorded.task_instance_id, "No task with this id, skipping reply");
            continue;
        };
        records.push(
            evaluator
                .score_response(task, &recorded.response, recorded.model_name.as_deref())
                .await,
        );
    }

    write_records(&args.output, &records)
        .with_context(|| format!("Failed to write report {}", args.output.display()))?;
    print_summary(
        "Scoring Results",
        &RunSummary::from_records(&records),
        &args.output,
        args.json,
    )
}

// ============================================================================
// stats
// ============================================================================

#[derive(Debug, Serialize)]
struct StatsRow {
    task_id: String,
    model: String,
    #[serde(flatten)]
    stat: crate::statistics::AggregateStat,
}

fn run_stats_command(args: StatsArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let records = read_records(&args.report)
        .with_context(|| format!("Failed to read report {}", args.report.display()))?;

    let mut bootstrap = Bootstrap::from_config(&config);
    if let Some(iterations) = args.iterations {
        anyhow::ensure!(iterations > 0, "--iterations must be at least 1");
        bootstrap = Bootstrap::new(iterations, bootstrap.confidence_level());
        if let Some(seed) = config.seed {
            bootstrap = bootstrap.with_seed(seed);
        }
    }
    if let Some(seed) = args.seed {
        bootstrap = bootstrap.with_seed(seed);
    }

    let stats = aggregate_records(&records, &args.criterion, &bootstrap);
    let rows: Vec<StatsRow> = stats
        .into_iter()
        .map(|(key, stat)| StatsRow {
            task_id: key.task_id,
            model: key.model,
            stat,
        })
        .collect();

    let comparison = args.compare.as_ref().and_then(|models| match models.as_slice() {
        [first, second] => Some((
            first.clone(),
            second.clone(),
            compare_models(&records, &args.criterion, first, second, &bootstrap),
        )),
        _ => None,
    });

    if args.json {
        let output = serde_json::json!({
            "criterion": args.criterion,
            "groups": rows,
            "comparison": comparison.as_ref().map(|(a, b, test)| serde_json::json!({
                "first": a,
                "second": b,
                "test": test,
            })),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "\n=== {} by task and model ({} records) ===",
        args.criterion,
        records.len()
    );
    if rows.is_empty() {
        println!("No records carry criterion '{}'", args.criterion);
    }
    for row in &rows {
        println!(
            "{:<20} {:<20} n={:<4} mean={:.3} std={:.3} ci=[{:.3}, {:.3}] min={:.3} max={:.3}",
            row.task_id,
            row.model,
            row.stat.n,
            row.stat.mean,
            row.stat.std,
            row.stat.ci_lower,
            row.stat.ci_upper,
            row.stat.min,
            row.stat.max
        );
    }
    if let Some((first, second, test)) = comparison {
        println!("\n{} vs {}:", first, second);
        println!("  difference:   {:+.3}", test.observed_diff);
        println!("  ci:           [{:.3}, {:.3}]", test.ci_lower, test.ci_upper);
        println!("  p-value:      {:.4}", test.p_value);
        println!(
            "  significant:  {}",
            if test.significant { "yes" } else { "no" }
        );
    }
    Ok(())
}

// ============================================================================
// ping
// ============================================================================

async fn run_ping_command(args: PingArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let client = A2aClient::new(&args.target_url, &config.transport);
    let card = client
        .wait_ready(args.attempts.max(1), Duration::from_secs(args.interval_secs))
        .await?;

    println!("✓ {} is ready", client.base_url());
    println!("  Agent:   {}", card.name);
    if !card.version.is_empty() {
        println!("  Version: {}", card.version);
    }
    if !card.description.is_empty() {
        println!("  About:   {}", card.description);
    }
    Ok(())
}
