use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "aec-audit",
    version,
    about = "Aggregate sensitivity-analyzer recommendations from AEC/AWB dumps"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process every unprocessed dump in a folder
    Run(RunArgs),
    /// Aggregate a single dump and print the result as JSON
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub folder: PathBuf,

    #[arg(long, default_value = "SA.ini")]
    pub config: PathBuf,

    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Fail a file that takes longer than this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Also write the batch summary as JSON
    #[arg(long)]
    pub summary_json: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[arg(long)]
    pub file: PathBuf,

    #[arg(long, default_value = "SA.ini")]
    pub config: PathBuf,
}
