//! CLI entry point for the novelkeeper tool.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use novelkeeper_core::{BookStore, Database, ResilientClient, SiteConfig};
use tracing::{debug, info};
use url::Url;

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match args.command {
        Command::Init => init(&args.db, args.config.as_deref()).await,
        Command::Stats { site, json } => stats(&args.db, &site, json).await,
        Command::Probe { url } => probe(args.config.as_deref(), &url).await,
    }
}

/// Creates the database file and applies pending migrations.
///
/// When `--config` names a path that does not exist yet, a commented
/// starter site configuration is written there; an existing file is
/// never touched.
async fn init(db_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let db = Database::new(db_path)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    db.close().await;
    info!(path = %db_path.display(), "database ready");

    if let Some(path) = config_path {
        if path.exists() {
            info!(path = %path.display(), "config file already exists, leaving it as is");
        } else {
            fs::write(path, SiteConfig::sample_toml())
                .with_context(|| format!("failed to write starter config to {}", path.display()))?;
            info!(path = %path.display(), "starter config written");
        }
    }
    Ok(())
}

/// Prints the tracking summary for one site.
async fn stats(db_path: &Path, site: &str, json: bool) -> Result<()> {
    let db = Database::new(db_path)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    let store = BookStore::new(db.clone());
    let summary = store
        .stats(site)
        .await
        .with_context(|| format!("failed to read statistics for site {site}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("site:            {site}");
        println!("editions:        {}", summary.book_count);
        println!("unique books:    {}", summary.unique_book_count);
        println!("writers:         {}", summary.writer_count);
        println!("errors:          {}", summary.error_count);
        println!("downloaded:      {}", summary.download_count);
        println!("max book id:     {}", summary.max_book_id);
        println!("latest success:  {}", summary.latest_success_id);
        for (status, count) in &summary.status_count {
            println!("status {status}: {count}");
        }
    }

    db.close().await;
    Ok(())
}

/// Fetches one URL through the resilient client and reports the outcome.
///
/// With `--config` the client carries the site's retry, breaker, and
/// concurrency settings; without it the built-in defaults apply.
async fn probe(config_path: Option<&Path>, raw_url: &str) -> Result<()> {
    let url = Url::parse(raw_url).with_context(|| format!("invalid probe URL {raw_url}"))?;
    ensure!(
        matches!(url.scheme(), "http" | "https"),
        "probe URL must be http(s), got {}",
        url.scheme()
    );

    let client = match config_path {
        Some(path) => {
            let config = SiteConfig::from_toml_path(path)?;
            ResilientClient::from_config(&config)
        }
        None => ResilientClient::new(),
    };

    let started = Instant::now();
    match client.fetch(url.as_str()).await {
        Ok(body) => {
            println!(
                "ok: {} bytes in {}ms",
                body.len(),
                started.elapsed().as_millis()
            );
            Ok(())
        }
        Err(error) => {
            println!(
                "failed after {}ms: {error}",
                started.elapsed().as_millis()
            );
            Err(error.into())
        }
    }
}
