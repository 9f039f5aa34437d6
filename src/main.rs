mod cli;
mod config;
mod coordinator;
mod error;
mod fetcher;
mod planner;
mod progress;
mod source;
mod utils;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Args;
use crate::config::DownloadConfig;
use crate::coordinator::{DownloadCoordinator, DownloadOutcome, DownloadTarget};
use crate::source::HttpSource;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(args: Args) -> Result<()> {
    let path = utils::destination_path(&args.url, &args.download_dir, args.output)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create download directory")?;
        }
    }

    let config = DownloadConfig::default().with_progress(!args.quiet);
    let coordinator = DownloadCoordinator::new(HttpSource::new(&config), config);
    let target = DownloadTarget::new(args.url, path);

    let outcome = coordinator
        .run(&target, args.split)
        .await
        .with_context(|| format!("Failed to download {}", target.url))?;

    match outcome {
        DownloadOutcome::AlreadyComplete { total_bytes, existing_bytes } => {
            println!(
                "File already exists: {} ({} of {} bytes)",
                target.path.display(),
                existing_bytes,
                total_bytes
            );
        }
        DownloadOutcome::Completed(stats) => {
            println!();
            if stats.resumed_from > 0 {
                println!("Resumed from byte {}", stats.resumed_from);
            }
            println!(
                "Download complete in {:.2} seconds ({:.2} MB/s)",
                stats.elapsed.as_secs_f64(),
                stats.throughput_mbps()
            );
            println!(
                "Estimated completion time: {:.2} seconds",
                stats.estimated_remaining().as_secs_f64()
            );
        }
        DownloadOutcome::Failed { stats, errors } => {
            println!();
            println!(
                "Download failed after {:.2} seconds ({:.2} MB/s), {} of {} bytes on disk",
                stats.elapsed.as_secs_f64(),
                stats.throughput_mbps(),
                stats.completed_bytes,
                stats.total_bytes
            );
            println!(
                "Estimated completion time: {:.2} seconds",
                stats.estimated_remaining().as_secs_f64()
            );
            for e in &errors {
                eprintln!("  {}", e);
            }
            bail!("{} of the ranges failed; run again to resume", errors.len());
        }
    }

    Ok(())
}
