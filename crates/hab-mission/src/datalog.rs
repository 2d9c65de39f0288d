use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;

/// `<prefix>-<RFC3339>.log`, the naming shared by the mission log and the
/// data log.
pub fn timestamped_name(prefix: &str, now: OffsetDateTime) -> String {
    let stamp = now.format(&Rfc3339).unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("{}-{}.log", prefix, stamp)
}

/// Append-only CSV telemetry archive, one line per beacon.
pub struct DataLog {
    path: PathBuf,
}

impl DataLog {
    pub async fn create(dir: &Path, prefix: &str) -> Result<Self> {
        let path = dir.join(timestamped_name(prefix, OffsetDateTime::now_utc()));
        tokio::fs::File::create(&path).await.with_context(|| format!("create data log {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Each line is flushed to disk before returning.
    pub async fn append(&mut self, line: &str) -> Result<()> {
        let mut f = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open data log {}", self.path.display()))?;
        f.write_all(line.as_bytes()).await?;
        f.write_all(b"\n").await?;
        f.sync_data().await.context("sync data log")?;
        Ok(())
    }
}
