use std::{error::Error, path::PathBuf};

use clap::Parser;
use log::info;
use netcalc::batch;

/// Solves every `.equ` equation file in a directory.
///
/// Solved files keep their name and land in the output directory.
#[derive(Debug, Parser)]
struct Cli {
    /// Directory to read unsolved equation files from
    input: PathBuf,
    /// Directory to write solved equation files to
    output: PathBuf,
    /// Number of worker threads to use
    #[arg(short = 'n', long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..))]
    threads: u8,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let summary = batch::solve_directory(&cli.input, &cli.output, cli.threads)?;

    info!("{} files solved, {} failed", summary.solved, summary.failed);
    Ok(())
}
