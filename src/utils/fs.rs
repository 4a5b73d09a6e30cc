use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

fn java_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\w*\.java$").expect("valid source pattern"))
}

/// Whether a file name belongs to the collected source set.
pub fn is_source_file(name: &str) -> bool {
    java_pattern().is_match(name)
}

/// Regular files directly inside `dir`, sorted. Missing directories yield nothing.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut results: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    results.sort();
    results
}

/// Source files exactly two levels below `dir` (`<dir>/<student>/<File>.java`), sorted.
pub fn find_submission_files(dir: &Path) -> Vec<PathBuf> {
    let mut results: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_source_file(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect();
    results.sort();
    results
}

/// Remove a directory tree, treating "does not exist" as success.
pub fn remove_dir_if_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
