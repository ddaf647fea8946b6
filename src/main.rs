//! Site-Walker main entry point
//!
//! This is the command-line interface for the Site-Walker continuous crawler.

use clap::Parser;
use site_walker::config::{load_config_with_hash, Config};
use site_walker::crawler::{Hooks, Status, Walker};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Site-Walker: a continuous same-origin site crawler
///
/// Site-Walker walks a website from its seed paths, follows links that stay
/// within the configured policy and starts over every time a pass completes.
#[derive(Parser, Debug)]
#[command(name = "site-walker")]
#[command(version = "1.0.0")]
#[command(about = "A continuous same-origin site crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Stop after this many completed loops (default: run until interrupted)
    #[arg(long, value_name = "N")]
    loops: Option<u32>,

    /// Seconds between status lines
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    status_interval: u64,

    /// Validate config and show what would be walked without walking
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_walk(config, cli.loops, Duration::from_secs(cli.status_interval.max(1))).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_walker=info,warn"),
            1 => EnvFilter::new("site_walker=debug,info"),
            2 => EnvFilter::new("site_walker=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Site-Walker Dry Run ===\n");

    println!("Target:");
    println!("  Base URL: {}", config.target.base_url);
    for path in &config.target.paths {
        println!("    * {}", path);
    }

    println!("\nClients:");
    println!("  Agent: {}", config.agent);
    println!("  Concurrency: {}", config.concurrency);
    println!("  Cookies: {}", config.use_cookies);
    println!("  Accept invalid certs: {}", config.accept_invalid_certs);

    println!("\nLink policy:");
    println!(
        "  Depth: {}",
        if config.depth == 0 {
            "unlimited".to_string()
        } else {
            config.depth.to_string()
        }
    );
    println!("  Paging: {}", config.paging);
    println!("  Ignore robots: {}", config.ignore_robots);
    println!("  Ignore all queries: {}", config.ignore_all_queries);
    println!("  Ignored query parameters: {:?}", config.ignore_queries_with);
    println!("  Ignored prefixes: {:?}", config.ignore);
    if let Some(header) = &config.group_header {
        println!("  Group header: {}", header);
    }

    println!("\n✓ Configuration is valid");
}

/// Runs the walker until the requested number of loops completed or Ctrl-C
async fn handle_walk(
    config: Config,
    max_loops: Option<u32>,
    status_interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let walker = Walker::new();

    tracing::info!(
        "Walking {} ({} seed path(s), concurrency {})",
        config.target.base_url,
        config.target.paths.len(),
        config.concurrency
    );

    let mut completions = match walker.start(config, Hooks::default()).await {
        Ok(completions) => completions,
        Err(e) => {
            tracing::error!("Walk failed to start: {}", e);
            return Err(e.into());
        }
    };

    let mut ticker = tokio::time::interval(status_interval);
    ticker.tick().await;
    let mut loops = 0u32;

    loop {
        tokio::select! {
            completed = completions.recv() => {
                let Some(status) = completed else {
                    tracing::warn!("Walker stopped publishing loops");
                    break;
                };
                loops += 1;
                log_loop_summary(loops, &status);
                if max_loops.map_or(false, |max| loops >= max) {
                    break;
                }
            }
            _ = ticker.tick() => {
                let status = walker.status().await?;
                log_status_line(&status);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping walker");
                break;
            }
        }
    }

    let status = walker.stop().await?;
    tracing::info!(
        "Final status: {} results, {} open jobs",
        status.results.len(),
        status.jobs.len()
    );

    Ok(())
}

fn log_status_line(status: &Status) {
    tracing::info!(
        "jobs: {} ({} active), results: {}, speed: {:.2} req/s (window {}s), average: {:.2} req/s",
        status.jobs.len(),
        status.active_jobs(),
        status.results.len(),
        status.scrape_speed,
        status.scrape_window_seconds,
        status.scrape_speed_average
    );
}

fn log_loop_summary(loop_number: u32, status: &Status) {
    tracing::info!(
        "Loop {} complete: {} results in {}s",
        loop_number,
        status.scrape_total_requests,
        status.scrape_total_seconds
    );

    let mut codes: Vec<_> = status.code_counts.iter().collect();
    codes.sort();
    for (code, count) in codes {
        tracing::info!("  status {}: {}", code, count);
    }

    for result in status.failures() {
        tracing::warn!(
            "  failed: {} {} {}",
            result.code,
            result.target_url,
            result.error.as_deref().unwrap_or_default()
        );
    }

    for result in status.dead_links() {
        tracing::warn!("  dead link: {}", result.target_url);
    }

    for (group, buckets) in status.duration_buckets() {
        tracing::debug!("  group {}", group);
        for bucket in buckets.iter().filter(|b| b.count > 0) {
            tracing::debug!(
                "    {:>5} {:>3}% ({:?} => {:?}) {}",
                bucket.count,
                bucket.percent(),
                bucket.bucket.from,
                bucket.bucket.to,
                bucket.bucket.name
            );
        }
    }
}
