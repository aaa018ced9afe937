//! Concurrent construction of report records.
//!
//! Files are parsed on tokio tasks bounded by a semaphore. Inserting into the
//! [`GroupedStore`] happens only at the [`ParallelLoader::wait_for_completion`]
//! barrier, which is the single writer of the store's axis labels.

mod directory;
mod fs;
mod source;

pub use directory::{DirectoryScan, ReportNamePattern, scan_directory};
pub use fs::FsSource;
pub use source::RecordSource;

use anyhow::{Result, anyhow};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::parser::parse_report;
use crate::record::ReportRecord;
use crate::store::{GroupKey, GroupedStore};

struct PendingRecord {
    key: GroupKey,
    path: PathBuf,
    task: JoinHandle<Result<ReportRecord>>,
}

/// Fans record parsing out to a bounded pool and files the results into a
/// store once everything has finished.
pub struct ParallelLoader<S> {
    source: Arc<S>,
    permits: Arc<Semaphore>,
    pending: Vec<PendingRecord>,
}

impl<S: RecordSource + 'static> ParallelLoader<S> {
    /// `workers` is the maximum number of files read and parsed at once.
    pub fn new(source: S, workers: usize) -> Self {
        Self {
            source: Arc::new(source),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            pending: Vec::new(),
        }
    }

    /// Starts parsing `path` in the background; the record will be filed
    /// under `key`. Must be called from within a tokio runtime.
    pub fn submit(&mut self, key: GroupKey, path: PathBuf) {
        let source = Arc::clone(&self.source);
        let permits = Arc::clone(&self.permits);
        let task_path = path.clone();
        let span = tracing::debug_span!("parse_report", path = %path.display());

        let task = tokio::spawn(
            async move {
                let _permit = permits.acquire().await?;
                let bytes = source.read(&task_path).await?;
                let name = task_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                let record = parse_report(&bytes, name)?;
                debug!(frames = record.len(), "Report parsed");
                Ok::<_, anyhow::Error>(record)
            }
            .instrument(span),
        );

        self.pending.push(PendingRecord { key, path, task });
    }

    /// Number of submitted files not yet collected by the barrier.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Load barrier: waits for every submitted file and adds the parsed
    /// records to `store` in submission order.
    ///
    /// A failing file is recorded in the returned report and does not stop
    /// the rest of the load.
    pub async fn wait_for_completion(&mut self, store: &mut GroupedStore) -> LoadReport {
        let mut report = LoadReport::default();

        for PendingRecord { key, path, task } in std::mem::take(&mut self.pending) {
            let outcome = match task.await {
                Ok(result) => result,
                Err(e) => Err(anyhow!("parse task failed: {e}")),
            };
            let filed = outcome.and_then(|record| Ok(store.add(key, record)?));

            match filed {
                Ok(()) => report.loaded += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load report");
                    report.failures.push(LoadFailure {
                        path,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        info!(
            loaded = report.loaded,
            failed = report.failures.len(),
            depth = store.depth(),
            "Load complete"
        );
        report
    }
}

/// A file that could not be turned into a record.
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a load, for the caller to surface to the user.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub failures: Vec<LoadFailure>,
    /// Directories holding both report files and subdirectories
    pub mixed_directories: Vec<PathBuf>,
}

impl LoadReport {
    pub fn has_warnings(&self) -> bool {
        !self.failures.is_empty() || !self.mixed_directories.is_empty()
    }

    /// One-paragraph summary of everything that went wrong.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} report(s) loaded, {} failed",
            self.loaded,
            self.failures.len()
        );
        for failure in &self.failures {
            text.push_str(&format!("\n - {}: {}", failure.path.display(), failure.error));
        }
        for dir in &self.mixed_directories {
            text.push_str(&format!(
                "\n - {} contains both report files and directories",
                dir.display()
            ));
        }
        text
    }
}

/// Scans `directory` for reports and loads them from the filesystem.
#[tracing::instrument(skip_all, fields(directory = %directory.display(), workers = workers))]
pub async fn load_directory(directory: &Path, workers: usize) -> Result<(GroupedStore, LoadReport)> {
    let mut loader = ParallelLoader::new(FsSource::new(), workers);
    let pattern = ReportNamePattern::default();
    let scan = scan_directory(&mut loader, directory, &pattern)?;
    info!(files = scan.queued, "Reports queued for parsing");

    let mut store = GroupedStore::new();
    let mut report = loader.wait_for_completion(&mut store).await;
    report.mixed_directories = scan.mixed_directories;

    Ok((store, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MemorySource(HashMap<PathBuf, String>);

    #[async_trait]
    impl RecordSource for MemorySource {
        async fn read(&self, path: &Path) -> Result<Vec<u8>> {
            self.0
                .get(path)
                .map(|s| s.as_bytes().to_vec())
                .ok_or_else(|| anyhow!("no such file: {}", path.display()))
        }
    }

    #[tokio::test]
    async fn test_barrier_files_records_in_submission_order() {
        let source = memory_source(&[
            ("a.json", r#"{"Timings": "0.010,0.020"}"#),
            ("b.json", r#"{"Timings": "0.030"}"#),
        ]);
        let mut loader = ParallelLoader::new(source, 2);
        loader.submit(key(&["dev", "1"]), PathBuf::from("a.json"));
        loader.submit(key(&["dev", "2"]), PathBuf::from("b.json"));
        assert_eq!(loader.pending(), 2);

        let mut store = GroupedStore::new();
        let report = loader.wait_for_completion(&mut store).await;

        assert_eq!(report.loaded, 2);
        assert!(report.failures.is_empty());
        assert_eq!(loader.pending(), 0);
        assert_eq!(store.depth(), 2);
        let record = store.lookup(&key(&["dev", "2"])).unwrap();
        assert_eq!(record.source, "b.json");
        assert!((record.timings[0] - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let source = memory_source(&[
            ("good.json", r#"{"Timings": "0.016"}"#),
            ("bad.json", r#"{"Timings": "x"}"#),
        ]);
        let mut loader = ParallelLoader::new(source, 1);
        loader.submit(key(&["good"]), PathBuf::from("good.json"));
        loader.submit(key(&["bad"]), PathBuf::from("bad.json"));
        loader.submit(key(&["missing"]), PathBuf::from("missing.json"));

        let mut store = GroupedStore::new();
        let report = loader.wait_for_completion(&mut store).await;

        assert_eq!(report.loaded, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.has_warnings());
        assert!(report.summary().contains("bad.json"));
        assert_eq!(store.leaf_count(), 1);
        assert_eq!(store.axes()[0].len(), 1);
    }

    #[tokio::test]
    async fn test_mode_conflict_is_a_load_failure() {
        let source = memory_source(&[("a.json", r#"{"Timings": "0.016"}"#)]);
        let mut loader = ParallelLoader::new(source, 4);
        loader.submit(key(&["x"]), PathBuf::from("a.json"));
        loader.submit(vec![], PathBuf::from("a.json"));

        let mut store = GroupedStore::new();
        let report = loader.wait_for_completion(&mut store).await;

        assert_eq!(report.loaded, 1);
        assert_eq!(report.failures.len(), 1);
    }

    // Helper functions for tests
    fn memory_source(files: &[(&str, &str)]) -> MemorySource {
        MemorySource(
            files
                .iter()
                .map(|(path, body)| (PathBuf::from(path), body.to_string()))
                .collect(),
        )
    }

    fn key(labels: &[&str]) -> GroupKey {
        labels.iter().map(|s| s.to_string()).collect()
    }
}
