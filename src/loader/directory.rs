use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::{ParallelLoader, RecordSource};
use crate::store::GroupKey;

/// Matches `<base>-<index>-report.json`.
pub const DEFAULT_REPORT_PATTERN: &str = r"^(.*?)-(\d+)-report\.json$";

static DEFAULT_REPORT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_REPORT_PATTERN).expect("Valid regex pattern"));

/// Splits report file names into key components.
///
/// A name matching the pattern contributes two labels, the base name and the
/// run index (leading zeros stripped); any other name contributes itself.
#[derive(Debug, Clone)]
pub struct ReportNamePattern(Regex);

impl ReportNamePattern {
    /// `pattern` must capture the base name and the index as groups 1 and 2.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self(Regex::new(pattern)?))
    }

    pub fn key_components(&self, file_name: &str) -> GroupKey {
        match self.0.captures(file_name) {
            Some(caps) => {
                let base = caps.get(1).map_or("", |m| m.as_str());
                let index = caps.get(2).map_or("", |m| m.as_str());
                let index = match index.trim_start_matches('0') {
                    "" => "0",
                    trimmed => trimmed,
                };
                vec![base.to_string(), index.to_string()]
            }
            None => vec![file_name.to_string()],
        }
    }
}

impl Default for ReportNamePattern {
    fn default() -> Self {
        Self(DEFAULT_REPORT_REGEX.clone())
    }
}

/// What a directory scan queued and noticed.
#[derive(Debug, Default)]
pub struct DirectoryScan {
    pub queued: usize,
    pub mixed_directories: Vec<PathBuf>,
}

/// Walks `directory` recursively and submits every `*.json` file to `loader`.
///
/// Each directory name, starting with `directory` itself, becomes a key
/// component; the file name adds one or two more (see [`ReportNamePattern`]).
/// Entries are visited in name order.
pub fn scan_directory<S: RecordSource + 'static>(
    loader: &mut ParallelLoader<S>,
    directory: &Path,
    pattern: &ReportNamePattern,
) -> Result<DirectoryScan> {
    let mut scan = DirectoryScan::default();
    visit(loader, directory, &[], pattern, &mut scan)?;
    Ok(scan)
}

fn visit<S: RecordSource + 'static>(
    loader: &mut ParallelLoader<S>,
    directory: &Path,
    parents: &[String],
    pattern: &ReportNamePattern,
    scan: &mut DirectoryScan,
) -> Result<()> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    for entry in fs::read_dir(directory)
        .with_context(|| format!("failed to read directory {}", directory.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            dirs.push(path);
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    dirs.sort();
    files.sort();

    if !dirs.is_empty() && !files.is_empty() {
        warn!(directory = %directory.display(), "Directory contains both json files and directories");
        scan.mixed_directories.push(directory.to_path_buf());
    }

    let mut parents = parents.to_vec();
    parents.push(directory_label(directory));

    for file in files {
        let Some(file_name) = file.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %file.display(), "Skipping file with a non UTF-8 name");
            continue;
        };
        let mut key = parents.clone();
        key.extend(pattern.key_components(file_name));
        debug!(path = %file.display(), key = ?key, "Queueing report");
        loader.submit(key, file.clone());
        scan.queued += 1;
    }

    for dir in dirs {
        visit(loader, &dir, &parents, pattern, scan)?;
    }

    Ok(())
}

fn directory_label(directory: &Path) -> String {
    directory
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| directory.display().to_string())
}
