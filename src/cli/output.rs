use colored::*;
use serde::Serialize;
use std::path::PathBuf;

use crate::core::collector::{CollectSummary, StudentOutcome};

pub fn step(msg: &str) {
    println!("  {} {}", "....".cyan(), msg);
}

pub fn done(msg: &str) {
    println!("  {} {}", "DONE".green(), msg);
}

pub fn skip(msg: &str) {
    println!("  {} {}", "SKIP".yellow(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("  {} {}", "WARN".yellow().bold(), msg);
}

pub fn fail(msg: &str) {
    eprintln!("  {} {}", "FAIL".red().bold(), msg);
}

/// Everything a run produced, for the final summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub project: String,
    pub students: Vec<StudentLine>,
    pub collected: usize,
    pub empty_or_no_repo: usize,
    pub no_valid_commit: usize,
    pub baseline_files: usize,
    pub candidate_files: usize,
    pub report_url: Option<String>,
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentLine {
    pub login: String,
    pub status: String,
    pub files: usize,
}

impl RunReport {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            ..Self::default()
        }
    }

    pub fn record_collection(&mut self, summary: &CollectSummary) {
        self.collected = summary.collected;
        self.empty_or_no_repo = summary.empty_or_no_repo;
        self.no_valid_commit = summary.no_valid_commit;
        self.students = summary
            .outcomes
            .iter()
            .map(|(login, outcome)| {
                let (status, files) = match outcome {
                    StudentOutcome::Collected(n) => ("collected", *n),
                    StudentOutcome::EmptyOrNoRepo => ("empty/no repo", 0),
                    StudentOutcome::NoValidCommit => ("no commit before deadline", 0),
                };
                StudentLine {
                    login: login.clone(),
                    status: status.to_string(),
                    files,
                }
            })
            .collect();
    }
}

/// Prints the counters right after collection, as the operator expects them.
pub fn print_counters(summary: &CollectSummary) {
    println!(
        "  {} with empty/no repos; {} with no commits before deadline",
        summary.empty_or_no_repo.to_string().yellow(),
        summary.no_valid_commit.to_string().yellow()
    );
}

pub struct OutputFormatter {
    format: String,
}

impl OutputFormatter {
    pub fn new(format: &str) -> Self {
        Self {
            format: format.to_string(),
        }
    }

    pub fn display(&self, report: &RunReport) {
        match self.format.as_str() {
            "json" => self.display_json(report),
            _ => self.display_table(report),
        }
    }

    fn display_json(&self, report: &RunReport) {
        match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{}", json),
            Err(e) => fail(&format!("Could not serialize summary: {}", e)),
        }
    }

    fn display_table(&self, report: &RunReport) {
        println!();
        println!(
            "{}",
            format!("ap-moss v{}", env!("CARGO_PKG_VERSION")).bold()
        );
        println!("{}", "─".repeat(64));
        println!();
        println!("  Project:  {}", report.project.cyan());
        println!(
            "  Files:    {} baseline, {} submitted",
            report.baseline_files, report.candidate_files
        );
        println!();

        if !report.students.is_empty() {
            println!(
                "  {:<24} {:<8} {}",
                "Student".bold(),
                "Files".bold(),
                "Status".bold()
            );
            println!("  {}", "─".repeat(58));
            for line in &report.students {
                let status = match line.status.as_str() {
                    "collected" => line.status.green(),
                    _ => line.status.yellow(),
                };
                println!("  {:<24} {:<8} {}", line.login, line.files, status);
            }
            println!();
            println!("{}", "─".repeat(64));
        }

        println!();
        println!("  SUMMARY");
        println!(
            "    {} collected, {} empty/no repo, {} no commit before deadline",
            report.collected, report.empty_or_no_repo, report.no_valid_commit
        );
        if let Some(url) = &report.report_url {
            println!("    Report url: {}", url.cyan());
        }
        if let Some(path) = &report.report_path {
            println!("    Saved to:   {}", path.display());
        }
        println!();
    }
}
