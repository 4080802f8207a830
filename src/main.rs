//! Index Preflight - verify the host before starting the deployment

use anyhow::{Context, Result};
use clap::Parser;
use index_preflight::preflight::{PreflightOutcome, StageResult};
use index_preflight::{Preflight, PreflightConfig, runner};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "index-preflight")]
#[command(about = "Verify tooling, GPU and cached models for the code-embedding deployment", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write resolved snapshot directories to this env file
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Use this model cache root instead of querying the hub CLI
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Directory holding bundled tokenizer assets
    #[arg(long)]
    asset_dir: Option<PathBuf>,

    /// Report asset copies without performing them
    #[arg(long)]
    test_mode: bool,

    /// Force a runtime (bash, sh, pwsh, cmd, direct)
    #[arg(long)]
    runtime: Option<String>,

    /// Download missing models instead of only printing the command
    #[arg(long)]
    download_missing: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    log_format: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for diagnostics
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let mut config = PreflightConfig::load(cli.config).context("Failed to load configuration")?;

    // CLI overrides
    if let Some(env_file) = cli.env_file {
        config.env_file = Some(env_file);
    }
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = Some(cache_dir);
    }
    if let Some(asset_dir) = cli.asset_dir {
        config.asset_dir = asset_dir;
    }
    if let Some(runtime) = cli.runtime {
        config.runtime = Some(runtime);
    }
    config.test_mode |= cli.test_mode;
    config.download_missing |= cli.download_missing;

    config.validate()?;

    let runner = runner::select_runner(
        config.runtime.as_deref(),
        config.command_timeout(),
        &runner::system_path(),
    )
    .context("Failed to select a command runtime")?;

    let preflight = Preflight::new(config, runner);
    let outcome = preflight.run().await;

    print_outcome(&outcome);
    std::process::exit(outcome.exit_code());
}

fn print_outcome(outcome: &PreflightOutcome) {
    for stage in &outcome.stages {
        print_stage(stage);
    }

    match &outcome.report {
        Some(report) => {
            println!();
            println!("All checks passed. Model snapshots:");
            for model in &report.models {
                println!("  {}: {}", model.id, model.paths.snapshot_dir.display());
            }
            if let Some(env_file) = &report.env_file {
                println!("Snapshot paths recorded in {}", env_file.display());
            }
        }
        None => {
            if let Some(failed) = outcome.failed_stage() {
                println!();
                println!("Preflight failed at the {} stage.", failed.stage);
                if !failed.remediation.is_empty() {
                    println!("To fix, run:");
                    for command in &failed.remediation {
                        println!("  {}", command);
                    }
                }
            }
        }
    }
}

fn print_stage(stage: &StageResult) {
    let mark = if stage.check.success { "ok" } else { "FAILED" };
    println!("[{}] {}", mark, stage.stage);
    for message in &stage.check.messages {
        println!("    {}", message);
    }
}
