use anyhow::{Context, Result};
use blogcrew_core::{BlogCrew, CrewConfig, TelemetryOptions, init_telemetry};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "blogcrew-cli",
    version,
    about = "Research a topic and write a blog post about it"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the research and writing crew once.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Topic to research and write about.
    #[arg(long)]
    topic: String,

    /// Directory the article is written to (overrides BLOGCREW_OUTPUT_DIR).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print every task's output and the token usage as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_telemetry(TelemetryOptions {
        to_stderr: true,
        ..TelemetryOptions::default()
    })?;

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let topic = args.topic.trim();
    anyhow::ensure!(!topic.is_empty(), "--topic must not be blank");

    let mut config = CrewConfig::from_env()?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    let crew = BlogCrew::from_config(&config)?;
    let output = crew
        .run(topic)
        .await
        .with_context(|| format!("crew run for {topic:?} failed"))?;

    if let Some(path) = output
        .tasks_output
        .last()
        .and_then(|task| task.output_path.as_ref())
    {
        info!(path = %path.display(), "article saved");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{output}");
    }

    Ok(())
}
