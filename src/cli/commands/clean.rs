use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use crate::core::workspace::Workspace;

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Name of the project to clean
    #[arg(value_name = "PROJECT_NAME")]
    pub project: String,

    /// Path the project was downloaded to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Keep saved reports and only delete repositories
    #[arg(long)]
    pub keep_reports: bool,
}

pub async fn execute(args: &CleanArgs) -> Result<()> {
    let workspace = Workspace::new(&args.output, &args.project);
    if args.keep_reports {
        workspace.cleanup_repos()?;
    } else {
        workspace.cleanup()?;
    }
    println!(
        "  {} Removed files of {}",
        "DONE".green(),
        args.project.cyan()
    );
    Ok(())
}
