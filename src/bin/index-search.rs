//! Interactive vector search against the running deployment

use anyhow::{Context, Result};
use clap::Parser;
use index_preflight::search::{SearchClient, run_session};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "index-search")]
#[command(about = "Search indexed code through the embedding proxy", long_about = None)]
#[command(version)]
struct Args {
    /// Vector database base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    db_url: String,

    /// Embedding/search proxy base URL
    #[arg(long, env = "EMBEDDING_PROXY_URL", default_value = "http://localhost:8000")]
    proxy_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "INDEX_SEARCH_TIMEOUT", default_value = "120")]
    timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let client = SearchClient::new(
        &args.db_url,
        &args.proxy_url,
        Duration::from_secs(args.timeout_secs),
    )
    .context("Failed to build HTTP client")?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();

    run_session(&client, stdin, &mut stdout)
        .await
        .with_context(|| format!("Search session against {} failed", args.db_url))
}
