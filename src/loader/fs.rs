use super::source::RecordSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

/// Reads report files from the local filesystem.
pub struct FsSource;

impl FsSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordSource for FsSource {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
    }
}
