use super::archive::ArchiveRecord;
use crate::error::ArchiveError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::info;

/// Cold tier persistence backend.
#[async_trait]
pub trait ArchiveStore: std::fmt::Debug + Send {
    /// Persist the batch in order. A failed batch may be retried as a whole.
    async fn write_batch(&mut self, batch: &[ArchiveRecord]) -> Result<(), ArchiveError>;

    async fn flush(&mut self) -> Result<(), ArchiveError> {
        Ok(())
    }
}

/// Appends one JSON object per line to a local file.
#[derive(Debug)]
pub struct JsonLinesArchive {
    path: PathBuf,
    file: Option<File>,
    buffer: Vec<u8>,
}

impl JsonLinesArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn file(&mut self) -> Result<&mut File, ArchiveError> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            info!(path = %self.path.display(), "opened liquidation archive");
            self.file = Some(file);
        }

        self.file
            .as_mut()
            .ok_or_else(|| ArchiveError::Unavailable(self.path.display().to_string()))
    }
}

#[async_trait]
impl ArchiveStore for JsonLinesArchive {
    async fn write_batch(&mut self, batch: &[ArchiveRecord]) -> Result<(), ArchiveError> {
        self.buffer.clear();
        for record in batch {
            serde_json::to_writer(&mut self.buffer, record)?;
            self.buffer.push(b'\n');
        }

        let buffer = std::mem::take(&mut self.buffer);
        let result = async {
            let file = self.file().await?;
            file.write_all(&buffer).await?;
            file.flush().await?;
            Ok::<_, ArchiveError>(())
        }
        .await;
        self.buffer = buffer;

        if result.is_err() {
            // reopen on the next attempt
            self.file = None;
        }
        result
    }

    async fn flush(&mut self) -> Result<(), ArchiveError> {
        if let Some(file) = self.file.as_mut() {
            file.sync_all().await?;
        }
        Ok(())
    }
}

/// In-memory [`ArchiveStore`] that can be told to fail, for tests & dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    records: Arc<Mutex<Vec<ArchiveRecord>>>,
    fail_next: Arc<AtomicU32>,
}

impl MemoryArchive {
    /// Fail the next `count` writes.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::Relaxed);
    }

    pub fn records(&self) -> Vec<ArchiveRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    async fn write_batch(&mut self, batch: &[ArchiveRecord]) -> Result<(), ArchiveError> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();

        if failing {
            return Err(ArchiveError::Unavailable("memory archive".to_string()));
        }

        self.records.lock().extend_from_slice(batch);
        Ok(())
    }
}
