//! `judgeai demo`: four worked evaluations against the configured provider.

use std::io::{self, Write};

use serde_json::json;

use judgeai_core::{BatchSummary, Metadata};
use judgeai_runtime::providers::{any_key_configured, JUDGEAI_API_KEY_ENV, OPENAI_API_KEY_ENV};
use judgeai_runtime::{JudgeConfig, SemanticJudge};

const RULE: &str = "============================================================";

fn header(out: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "{}", title)?;
    writeln!(out, "{}", RULE)
}

/// Run every example on stdout, checking the process environment for a key.
pub async fn run(config: JudgeConfig) -> io::Result<()> {
    let mut out = io::stdout();
    run_with(config, any_key_configured(), &mut out).await
}

/// Run every example. Without a key no judge is built and nothing is sent.
pub async fn run_with(config: JudgeConfig, key_present: bool, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "\n{}", RULE)?;
    writeln!(out, "JUDGEAI - EXAMPLE USAGE")?;
    writeln!(out, "{}\n", RULE)?;

    if !key_present {
        writeln!(out, "WARNING: No API key found!")?;
        writeln!(
            out,
            "Set {} or {} environment variable",
            OPENAI_API_KEY_ENV, JUDGEAI_API_KEY_ENV
        )?;
        writeln!(out, "or create a .env file with your API key.")?;
        writeln!(out, "\nExamples will show structure but won't make actual API calls.\n")?;
        return Ok(());
    }

    match run_examples(config, out).await {
        Ok(()) => {
            writeln!(out, "{}", RULE)?;
            writeln!(out, "All examples completed successfully!")?;
            writeln!(out, "{}", RULE)?;
        }
        Err(e) => {
            writeln!(out, "\nError: {}", e)?;
            writeln!(out, "\nMake sure you have set your API key:")?;
            writeln!(out, "  export {}='your-key-here'", OPENAI_API_KEY_ENV)?;
            writeln!(out, "  or")?;
            writeln!(out, "  export {}='your-key-here'", JUDGEAI_API_KEY_ENV)?;
        }
    }
    Ok(())
}

async fn run_examples(config: JudgeConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let judge = SemanticJudge::from_config(config)?;

    header(out, "Example 1: Basic Semantic Evaluation")?;
    let result = judge
        .evaluate(
            "The machine learning model achieved 95% accuracy on the test dataset",
            "The ML model reached 95% test accuracy",
            None,
        )
        .await?;
    writeln!(out, "Alignment Score: {:.3}", result.score)?;
    writeln!(out, "Semantic Drift: {:.3}", result.drift())?;
    writeln!(out, "Reasoning: {}", result.reasoning)?;
    match result.tokens_used() {
        Some(tokens) => writeln!(out, "Tokens Used: {}\n", tokens)?,
        None => writeln!(out, "Tokens Used: N/A\n")?,
    }

    header(out, "Example 2: Different Semantic Meanings")?;
    let result = judge
        .evaluate(
            "The experiment failed with 30% accuracy",
            "The experiment succeeded with 95% accuracy",
            None,
        )
        .await?;
    writeln!(out, "Alignment Score: {:.3}", result.score)?;
    writeln!(out, "Reasoning: {}\n", result.reasoning)?;

    header(out, "Example 3: Evaluation with Metadata")?;
    let metadata: Metadata = [
        ("task_type", json!("classification")),
        ("domain", json!("medical")),
        ("experiment_id", json!("exp_001")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let result = judge
        .evaluate(
            "Patient exhibits fever and cough",
            "Patient has pyrexia and coughing symptoms",
            Some(metadata),
        )
        .await?;
    writeln!(out, "Alignment Score: {:.3}", result.score)?;
    writeln!(out, "Metadata: {}\n", json!(result.metadata))?;

    header(out, "Example 4: Batch Evaluation")?;
    let results = judge
        .batch_evaluate([
            ("The system works correctly", "The system functions properly"),
            ("Error occurred during processing", "Processing completed successfully"),
            ("User authentication passed", "User login was successful"),
        ])
        .await?;
    for (i, result) in results.iter().enumerate() {
        writeln!(out, "\nPair {}:", i + 1)?;
        writeln!(out, "  Score: {:.3}", result.score)?;
        writeln!(out, "  Actual: {}", result.actual)?;
        writeln!(out, "  Expected: {}", result.expected)?;
    }
    if let Some(mean) = BatchSummary::from_results(&results).mean_score {
        writeln!(out, "\nAverage Alignment Score: {:.3}\n", mean)?;
    }

    Ok(())
}
