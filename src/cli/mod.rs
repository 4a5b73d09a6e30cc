pub mod commands;
pub mod output;
pub mod progress;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ap-moss",
    version,
    about = "Checks for code similarity in course repositories using MOSS",
    after_help = "In case you don't have a MOSS user id visit http://theory.stanford.edu/~aiken/moss/"
)]
pub struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect repositories, run MOSS and fetch the report
    Run(commands::run::RunArgs),
    /// Delete a project's downloaded repositories and reports
    Clean(commands::clean::CleanArgs),
    /// Write an ap-moss.yml configuration template
    Init(commands::init::InitArgs),
}
