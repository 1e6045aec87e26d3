mod cli;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sa_engine::SaConfig;
use sa_report::{analyze_file, BatchOptions, BatchRunner};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, InspectArgs, RunArgs};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_batch(args),
        Commands::Inspect(args) => inspect(args),
    }
}

fn run_batch(args: RunArgs) -> Result<()> {
    let config = Arc::new(SaConfig::load_or_default(&args.config));
    let options = BatchOptions {
        batch_size: args.batch_size,
        workers: args.workers,
        file_timeout: args.timeout_secs.map(Duration::from_secs),
    };

    let progress = |line: &str| println!("{line}");
    let summary = BatchRunner::new(config)
        .with_options(options)
        .run(&args.folder, &progress)
        .with_context(|| format!("Batch run over {} failed", args.folder.display()))?;

    for failed in &summary.failed {
        info!(file = %failed.file, reason = %failed.reason, "failed file");
    }

    if let Some(path) = &args.summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!(path = %path.display(), "wrote batch summary");
    }

    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    let config = SaConfig::load_or_default(&args.config);
    let analysis = analyze_file(&args.file, &config)
        .with_context(|| format!("Failed to analyze {}", args.file.display()))?;

    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}
