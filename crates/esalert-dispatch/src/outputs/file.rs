//! File output: appends one JSON line per alert.

use async_trait::async_trait;
use esalert_core::{AlertError, AlertMethod, Record, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use super::AlertPayload;

#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    /// Target path; `~` and env vars are expanded.
    pub file: String,
}

pub struct FileMethod {
    path: PathBuf,
}

impl FileMethod {
    pub fn new(config: FileConfig) -> Self {
        Self {
            path: PathBuf::from(esalert_core::config::expand_path(&config.file)),
        }
    }
}

#[async_trait]
impl AlertMethod for FileMethod {
    fn name(&self) -> &str {
        "file"
    }

    async fn write(&self, rule_name: &str, records: &[Record]) -> Result<()> {
        let mut line = serde_json::to_string(&AlertPayload::new(rule_name, records))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AlertError::delivery("file", format!("open {}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AlertError::delivery("file", format!("write {}: {e}", self.path.display())))?;
        file.flush().await?;

        tracing::debug!("📝 Alert for '{}' written to {}", rule_name, self.path.display());
        Ok(())
    }
}
