#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front-end that runs one report-generation session end to
//! end.
//!
//! ```text
//! report_agent generate --prompt-id 3 "Summarize last month's bugs" [--jql ...]
//! report_agent latest --prompt-id 3
//! report_agent history --prompt-id 3
//! report_agent render <template-file>
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use report_agent_cache::{parser, ExecutionCache};
use report_agent_core::agent::{run_agent, MAX_ITERATIONS};
use report_agent_core::cancellation::CancellationToken;
use report_agent_core::providers::create_provider_from_env;
use report_agent_core::rate_limiter::RateLimiter;
use report_agent_core::registry::default_registry;
use report_agent_jira::HttpJiraClient;

/// Default path for the execution cache database.
const DEFAULT_DB_PATH: &str = "data/report_agent.db";

/// Default rate-limit ceiling applied to the configured LLM provider.
const DEFAULT_MAX_REQUESTS_PER_MINUTE: u32 = 30;

#[derive(Parser)]
#[command(name = "report_agent", about = "Generate report content with an LLM agent over Jira issues")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one agent session for a prompt and cache its output.
    Generate {
        /// Prompt id this run answers; later templates reference it via `{{prompt:ID}}`.
        #[arg(long)]
        prompt_id: String,
        /// The user question/instruction to send to the model.
        question: String,
        /// Maximum loop iterations before giving up.
        #[arg(long, default_value_t = MAX_ITERATIONS)]
        max_iterations: u32,
        /// Maximum LLM calls per minute.
        #[arg(long, default_value_t = DEFAULT_MAX_REQUESTS_PER_MINUTE)]
        max_requests_per_minute: u32,
    },
    /// Print the most recently cached run for a prompt.
    Latest {
        /// Prompt id to look up.
        prompt_id: String,
    },
    /// List every cached run for a prompt, newest first.
    History {
        /// Prompt id to look up.
        prompt_id: String,
    },
    /// Render a template file, substituting `{{prompt:N}}` placeholders
    /// from the cache.
    Render {
        /// Path to the template file.
        template_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let cache = ExecutionCache::open(Path::new(DEFAULT_DB_PATH)).await?;

    match cli.command {
        Commands::Generate {
            prompt_id,
            question,
            max_iterations,
            max_requests_per_minute,
        } => generate(&cache, &prompt_id, &question, max_iterations, max_requests_per_minute).await?,
        Commands::Latest { prompt_id } => match cache.latest_for(&prompt_id).await? {
            Some(run) => println!("{}", run.html_output),
            None => {
                eprintln!("No cached run for prompt {prompt_id}");
                std::process::exit(1);
            }
        },
        Commands::History { prompt_id } => {
            let runs = cache.all_for(&prompt_id).await?;
            if runs.is_empty() {
                println!("No cached runs for prompt {prompt_id}.");
                return Ok(());
            }
            println!("{:<38} {:<25} PROMPT", "ID", "EXECUTED AT");
            println!("{}", "-".repeat(80));
            for run in &runs {
                println!("{:<38} {:<25} {}", run.id, run.executed_at.to_rfc3339(), run.prompt_id);
            }
        }
        Commands::Render { template_path } => {
            let template = std::fs::read_to_string(&template_path)?;
            let overrides = std::collections::HashMap::new();
            let parsed = parser::parse_template(&template, Some(&cache), &overrides).await?;

            if !parsed.missing_executions.is_empty() {
                eprintln!(
                    "Warning: missing cached executions for prompts: {}",
                    parsed.missing_executions.join(", ")
                );
            }

            println!("{}", parsed.html);
        }
    }

    Ok(())
}

async fn generate(
    cache: &ExecutionCache,
    prompt_id: &str,
    question: &str,
    max_iterations: u32,
    max_requests_per_minute: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let provider = create_provider_from_env()?;
    let tracker = HttpJiraClient::from_env()?;
    let registry = default_registry();
    let limiter = RateLimiter::new(max_requests_per_minute);
    let (tx, mut rx) = tokio::sync::mpsc::channel(32);

    let system_prompt = "You are a reporting assistant. Use the available tools to gather and \
        summarize Jira issue data, then respond with a single HTML fragment. Do not include \
        markdown, code fences, or commentary outside the fragment.";

    let cancellation = CancellationToken::new();
    let loop_cancellation = cancellation.clone();

    ctrlc_shutdown(cancellation);

    let question = question.to_string();
    let run = tokio::spawn(async move {
        run_agent(
            provider.as_ref(),
            &registry,
            &tracker,
            &limiter,
            system_prompt,
            &question,
            max_iterations,
            &loop_cancellation,
            &tx,
        )
        .await
    });

    while let Some(event) = rx.recv().await {
        log::info!("{event:?}");
    }

    let outcome = run.await??;

    if outcome.success {
        if let Some(result) = outcome.result {
            let id = cache
                .store_run(prompt_id, &result, &outcome.history, &outcome.metadata)
                .await?;
            println!("Stored run {id} for prompt {prompt_id}");
            println!("{result}");
        } else {
            eprintln!("Agent run finished without a final answer");
            std::process::exit(1);
        }
    } else {
        eprintln!(
            "Agent run did not complete: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }

    Ok(())
}

/// Spawns a background task that trips `cancellation` if the process
/// receives Ctrl-C while a run is in flight.
fn ctrlc_shutdown(cancellation: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Received interrupt, cancelling the in-flight run");
            cancellation.cancel();
        }
    });
}
