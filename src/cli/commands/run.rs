use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::Args;
use std::path::PathBuf;

use crate::cli::output::{self, OutputFormatter, RunReport};
use crate::cli::progress::{CollectProgress, WaitSpinner};
use crate::comparators::{build_comparator, CompareOptions, Comparator, EngineKind};
use crate::core::collector::{CollectError, Collector};
use crate::core::config::{
    resolve_credentials, resolve_moss_id, resolve_org, Config, CONFIG_FILE,
};
use crate::core::deadline::{resolve_deadline, DEADLINE_FORMAT};
use crate::core::workspace::Workspace;
use crate::forge::{Connector, Credentials, ForgeConnector, ForgeKind};
use crate::reporters::download::{HttpFetcher, PageFetcher};
use crate::reporters::{obtain_report, ReportMode, ReportOutcome};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Name of the project on the organization
    #[arg(value_name = "PROJECT_NAME")]
    pub project: String,

    /// Forge username; when given, password authentication is used instead of a token
    #[arg(short, long, env = "AP_MOSS_USER")]
    pub username: Option<String>,

    /// Forge password
    #[arg(short, long, env = "AP_MOSS_PWD", hide_env_values = true)]
    pub password: Option<String>,

    /// Forge access token
    #[arg(short, long, env = "AP_MOSS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Forge hosting the repositories
    #[arg(long, value_enum, env = "AP_MOSS_FORGE")]
    pub forge: Option<ForgeKind>,

    /// Base URL of the forge (API root for GitHub, instance root for GitLab)
    #[arg(long, env = "AP_MOSS_FORGE_URL")]
    pub forge_url: Option<String>,

    /// Organization (GitHub) or group (GitLab) owning the repositories
    #[arg(long, env = "AP_MOSS_ORG")]
    pub org: Option<String>,

    /// Path for storing downloaded repos and reports
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Delete the project's previous repos and reports before collecting
    #[arg(short, long)]
    pub force_cleanup: bool,

    /// Delete downloaded repo files after the run
    #[arg(long)]
    pub cleanup_after: bool,

    /// Homework deadline in local time. Defaults to now
    #[arg(long, value_name = DEADLINE_FORMAT)]
    pub due: Option<String>,

    /// Skip downloading repositories and use the files already in the output directory
    #[arg(short, long)]
    pub skip_collection: bool,

    /// MOSS user id
    #[arg(long = "mid", value_name = "MOSS_ID", env = "MOSS_ID", hide_env_values = true)]
    pub moss_id: Option<String>,

    /// Passages shared by more than this many files are ignored
    #[arg(short = 'm', default_value_t = 4)]
    pub ignore_limit: u32,

    /// Comparison engine
    #[arg(long, value_enum, default_value_t = EngineKind::Service)]
    pub engine: EngineKind,

    /// Local moss script used with --engine script
    #[arg(long, default_value = "moss")]
    pub moss_script: PathBuf,

    /// Open the report in a browser instead of downloading it
    #[arg(long)]
    pub skip_report: bool,

    /// Only print the report url
    #[arg(long, conflicts_with = "skip_report")]
    pub print_only: bool,

    /// Configuration file (defaults to <output>/ap-moss.yml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Summary format
    #[arg(long, default_value = "table", value_parser = ["table", "json"])]
    pub format: String,
}

/// What to fetch from the forge. Absent with `--skip-collection`.
#[derive(Debug)]
pub struct CollectionPlan {
    pub credentials: Credentials,
    pub forge: ForgeKind,
    pub forge_url: Option<String>,
    pub org: String,
    pub source_path: String,
    pub exclude: Vec<String>,
    pub deadline: DateTime<Utc>,
    pub force_cleanup: bool,
}

/// A fully resolved run. Building one has no side effects beyond reading the
/// configuration file.
#[derive(Debug)]
pub struct RunPlan {
    pub project: String,
    pub output: PathBuf,
    pub collection: Option<CollectionPlan>,
    pub engine: EngineKind,
    pub moss_id: String,
    pub moss_server: String,
    pub moss_script: PathBuf,
    pub compare: CompareOptions,
    pub report_mode: ReportMode,
    pub cleanup_after: bool,
}

impl RunPlan {
    pub fn resolve(args: &RunArgs) -> Result<Self> {
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| args.output.join(CONFIG_FILE));
        let config = Config::load(&config_path)?;

        let collection = if args.skip_collection {
            None
        } else {
            let credentials = resolve_credentials(
                args.username.as_deref(),
                args.password.as_deref(),
                args.token.as_deref(),
            )?;
            let org = resolve_org(args.org.as_deref(), &config)?;
            let deadline = resolve_deadline(args.due.as_deref())?;
            Some(CollectionPlan {
                credentials,
                forge: args.forge.or(config.forge).unwrap_or_default(),
                forge_url: args.forge_url.clone().or_else(|| config.forge_url.clone()),
                org,
                source_path: config.source_path().to_string(),
                exclude: config.exclude.clone().unwrap_or_default(),
                deadline,
                force_cleanup: args.force_cleanup,
            })
        };

        // the local script carries its own user id
        let moss_id = match args.engine {
            EngineKind::Service => resolve_moss_id(args.moss_id.as_deref())?,
            EngineKind::Script => args.moss_id.clone().unwrap_or_default(),
        };

        let report_mode = if args.print_only {
            ReportMode::Print
        } else if args.skip_report {
            ReportMode::Open
        } else {
            ReportMode::Download
        };

        let mut compare = config.compare_options(args.ignore_limit);
        if compare.comment.is_empty() {
            compare.comment = args.project.clone();
        }

        Ok(Self {
            project: args.project.clone(),
            output: args.output.clone(),
            collection,
            engine: args.engine,
            moss_id,
            moss_server: config.moss_server().to_string(),
            moss_script: args.moss_script.clone(),
            compare,
            report_mode,
            cleanup_after: args.cleanup_after,
        })
    }
}

/// Forge, comparison engine and report fetcher for one run.
pub struct Engines {
    pub connector: Box<dyn Connector>,
    pub comparator: Box<dyn Comparator>,
    pub fetcher: Box<dyn PageFetcher>,
}

impl Engines {
    pub fn for_plan(plan: &RunPlan) -> Result<Self> {
        let connector = ForgeConnector {
            kind: plan
                .collection
                .as_ref()
                .map(|c| c.forge)
                .unwrap_or_default(),
            base_url: plan.collection.as_ref().and_then(|c| c.forge_url.clone()),
        };
        Ok(Self {
            connector: Box::new(connector),
            comparator: build_comparator(
                plan.engine,
                &plan.moss_id,
                &plan.moss_server,
                &plan.moss_script,
            ),
            fetcher: Box::new(HttpFetcher::new()?),
        })
    }
}

pub async fn execute(args: &RunArgs) -> Result<()> {
    let report = resolve_and_run(args, Engines::for_plan).await?;
    OutputFormatter::new(&args.format).display(&report);
    Ok(())
}

/// Resolve the plan, then build the engines and run. Engines are built only
/// once every required value is known.
pub async fn resolve_and_run<F>(args: &RunArgs, engines: F) -> Result<RunReport>
where
    F: FnOnce(&RunPlan) -> Result<Engines>,
{
    let plan = RunPlan::resolve(args)?;
    let engines = engines(&plan)?;
    run_pipeline(
        &plan,
        engines.connector.as_ref(),
        engines.comparator.as_ref(),
        engines.fetcher.as_ref(),
    )
    .await
}

/// The collection → comparison → report pipeline.
pub async fn run_pipeline(
    plan: &RunPlan,
    connector: &dyn Connector,
    comparator: &dyn Comparator,
    fetcher: &dyn PageFetcher,
) -> Result<RunReport> {
    let workspace = Workspace::new(&plan.output, &plan.project);
    let mut report = RunReport::new(&plan.project);

    match &plan.collection {
        Some(collection) => {
            if collection.force_cleanup {
                output::step("Cleaning up previous files");
                workspace.cleanup()?;
            }
            output::step("Setting up directories");
            workspace.setup()?;

            let forge = match connector.connect(&collection.credentials).await {
                Ok(forge) => forge,
                Err(e) => {
                    terminate(&workspace);
                    return Err(e).context(format!(
                        "Could not authenticate with {} using {}",
                        collection.forge,
                        collection.credentials.mode()
                    ));
                }
            };
            output::done(&format!("Authenticated with {}", forge.name()));

            let collector = Collector::new(
                forge.as_ref(),
                &workspace,
                &collection.org,
                &collection.source_path,
            )
            .with_exclude(collection.exclude.clone())
            .with_progress(CollectProgress::new());

            let starter = collector.collect_starter().await.map_err(collection_failed)?;
            output::done(&format!("Downloaded {} starter files", starter));

            output::step(&format!(
                "Collecting submissions due {}",
                collection
                    .deadline
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
            ));
            let summary = collector
                .collect_students(collection.deadline)
                .await
                .map_err(collection_failed)?;
            output::print_counters(&summary);
            report.record_collection(&summary);
        }
        None => output::skip("Using previously downloaded repositories"),
    }

    let input = workspace.comparison_input();
    report.baseline_files = input.baseline.len();
    report.candidate_files = input.candidates.len();
    if plan.collection.is_none() && input.baseline.is_empty() && input.candidates.is_empty() {
        bail!(
            "Nothing to compare under {}; run without --skip-collection first",
            workspace.repos_dir().display()
        );
    }

    let spinner = WaitSpinner::new(&format!("Running {}", comparator.name()));
    let compared = comparator.compare(&input, &plan.compare).await;
    spinner.finish();
    let url = compared.with_context(|| format!("{} failed", comparator.name()))?;
    println!("  Report url: {}", url);
    report.report_url = Some(url.clone());

    match obtain_report(&url, &workspace.outs_dir(), plan.report_mode, fetcher).await {
        Ok(ReportOutcome::Saved { index, pages }) => {
            output::done(&format!("Saved report ({} pages) to {}", pages, index.display()));
            report.report_path = Some(index);
        }
        Ok(ReportOutcome::Opened) => output::done("Opened report in browser"),
        Ok(ReportOutcome::Printed) => {}
        Err(e) => output::warn(&format!(
            "Could not save report: {:#}. The report is still available at {}",
            e, url
        )),
    }

    if plan.cleanup_after {
        output::step("Cleaning up repo directories");
        workspace.cleanup_repos()?;
    }

    Ok(report)
}

/// The collector has already removed the workspace when this runs.
fn collection_failed(e: CollectError) -> CollectError {
    output::fail("Cleaned up created directories before terminating!");
    if e.is_auth() {
        output::warn("The forge rejected the credentials; check the token or username/password");
    }
    e
}

/// Best-effort removal of the project's directories before a fatal exit.
fn terminate(workspace: &Workspace) {
    output::fail("Cleaning up created directories before terminating!");
    if let Err(e) = workspace.cleanup() {
        output::warn(&format!("Cleanup failed: {:#}", e));
    }
}
