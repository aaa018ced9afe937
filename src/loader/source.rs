use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Where report bytes come from. The filesystem in production, memory in tests.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
}
