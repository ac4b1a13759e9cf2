//! JudgeAI CLI

mod demo;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value as JsonValue;

use judgeai_core::{BatchSummary, DriftResult, EvaluationPair, Metadata};
use judgeai_runtime::{JudgeConfig, ProviderRegistry, SemanticJudge};

#[derive(Parser)]
#[command(name = "judgeai")]
#[command(version, about = "LLM-as-a-judge semantic alignment scoring", long_about = None)]
struct Cli {
    /// Config file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Provider type (openai, anthropic)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Judge model
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Sampling temperature
    #[arg(short, long, global = true)]
    temperature: Option<f32>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score how well ACTUAL preserves the meaning of EXPECTED
    Evaluate {
        /// Text produced by the system under test
        #[arg(short, long)]
        actual: String,

        /// Reference text
        #[arg(short, long)]
        expected: String,

        /// Metadata entry copied into the result (key=value, repeatable)
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, JsonValue)>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate every pair in a JSON or YAML file
    Batch {
        /// File holding a list of {actual, expected, metadata?} entries
        file: PathBuf,

        /// Pairs in flight at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print results and summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the bundled usage examples against the configured provider
    Demo,

    /// List compiled-in providers
    Providers,
}

/// `--meta` values that parse as JSON keep their type; anything else is a string.
fn parse_meta(raw: &str) -> Result<(String, JsonValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Config file (or defaults) plus env, then command-line flags on top.
fn load_config(cli: &Cli) -> Result<JudgeConfig> {
    let mut config = match &cli.config {
        Some(path) => JudgeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => JudgeConfig::from_env()?,
    };

    if let Some(provider) = &cli.provider {
        config.provider = provider.clone();
    }
    if let Some(model) = &cli.model {
        config.model = Some(model.clone());
    }
    if let Some(temperature) = cli.temperature {
        config.temperature = temperature;
    }
    Ok(config)
}

fn print_result(result: &DriftResult) {
    println!("Alignment Score: {:.3}", result.score);
    println!("Semantic Drift:  {:.3}", result.drift());
    println!("Reasoning: {}", result.reasoning);
    match result.tokens_used() {
        Some(tokens) => println!("Tokens Used: {}", tokens),
        None => println!("Tokens Used: N/A"),
    }
}

fn print_summary(summary: &BatchSummary) {
    println!("Pairs: {}", summary.count);
    if let (Some(mean), Some(min), Some(max)) =
        (summary.mean_score, summary.min_score, summary.max_score)
    {
        println!("Average Alignment Score: {:.3}", mean);
        println!("Range: {:.3} - {:.3}", min, max);
    }
    println!(
        "Total Tokens: {} ({} cached)",
        summary.total_tokens, summary.cached
    );
}

#[derive(Serialize)]
struct BatchOutput<'a> {
    results: &'a [DriftResult],
    summary: &'a BatchSummary,
}

async fn run_evaluate(
    config: JudgeConfig,
    actual: &str,
    expected: &str,
    meta: Vec<(String, JsonValue)>,
    json: bool,
) -> Result<()> {
    let judge = SemanticJudge::from_config(config)?;
    let metadata: Option<Metadata> = (!meta.is_empty()).then(|| meta.into_iter().collect());

    let result = judge.evaluate(actual, expected, metadata).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

async fn run_batch(mut config: JudgeConfig, file: &Path, concurrency: Option<usize>, json: bool) -> Result<()> {
    let pairs = EvaluationPair::list_from_file(file)
        .with_context(|| format!("Failed to read pairs from {}", file.display()))?;
    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
    }

    let judge = SemanticJudge::from_config(config)?;
    let results = judge.batch_evaluate(pairs).await?;
    let summary = BatchSummary::from_results(&results);

    if json {
        let output = BatchOutput {
            results: &results,
            summary: &summary,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("\nPair {}:", i + 1);
        println!("  Score: {:.3}", result.score);
        println!("  Actual: {}", result.actual);
        println!("  Expected: {}", result.expected);
        println!("  Reasoning: {}", result.reasoning);
    }
    println!();
    print_summary(&summary);
    Ok(())
}

fn run_providers() {
    let registry = ProviderRegistry::with_defaults();
    for factory in registry.factories() {
        println!(
            "{:<10} {:<20} {}",
            factory.provider_type(),
            factory.default_model(),
            factory.description()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; variables may come from the shell.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Evaluate {
            actual,
            expected,
            meta,
            json,
        } => {
            let config = load_config(&cli)?;
            run_evaluate(config, actual, expected, meta.clone(), *json).await?;
        }
        Commands::Batch {
            file,
            concurrency,
            json,
        } => {
            if matches!(concurrency, Some(0)) {
                bail!("--concurrency must be at least 1");
            }
            let config = load_config(&cli)?;
            run_batch(config, file, *concurrency, *json).await?;
        }
        Commands::Demo => {
            let config = load_config(&cli)?;
            demo::run(config).await?;
        }
        Commands::Providers => run_providers(),
    }

    Ok(())
}
