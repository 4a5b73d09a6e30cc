use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use crate::core::config::{CONFIG_FILE, DEFAULT_MOSS_SERVER, DEFAULT_SOURCE_PATH};
use crate::forge::ForgeKind;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Output directory the config is written to (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Forge the course repositories live on
    #[arg(long, value_enum, default_value_t = ForgeKind::Github)]
    pub forge: ForgeKind,

    /// Organization (GitHub) or group (GitLab) to fill in
    #[arg(long)]
    pub org: Option<String>,

    /// Overwrite existing ap-moss.yml
    #[arg(long)]
    pub force: bool,
}

pub async fn execute(args: &InitArgs) -> Result<()> {
    let config_path = args.path.join(CONFIG_FILE);

    if config_path.exists() && !args.force {
        println!(
            "  {} {} already exists. Use {} to overwrite.",
            "SKIP".yellow(),
            CONFIG_FILE,
            "--force".bold()
        );
        return Ok(());
    }

    std::fs::create_dir_all(&args.path)
        .with_context(|| format!("Failed to create {}", args.path.display()))?;
    std::fs::write(&config_path, generate_config(args.forge, args.org.as_deref()))
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!(
        "  {} {} created for {}",
        "DONE".green(),
        CONFIG_FILE,
        args.forge.to_string().cyan()
    );
    println!(
        "  Edit {} to set the organization and MOSS options.",
        config_path.display()
    );

    Ok(())
}

fn generate_config(forge: ForgeKind, org: Option<&str>) -> String {
    let org_line = match org {
        Some(org) => format!("org: {}", org),
        None => "# org: my-course".to_string(),
    };
    let forge_url = forge.default_url();

    format!(
        r#"# ap-moss configuration
# Command-line flags and environment variables override these values.

forge: {forge}
forge_url: {forge_url}
{org_line}

# Directory inside each repository holding the graded sources
source_path: {DEFAULT_SOURCE_PATH}

# Members that are not students
exclude: []

moss:
  server: {DEFAULT_MOSS_SERVER}
  language: java
  max_matches: 250
  directory_mode: true
  experimental: false
"#
    )
}
