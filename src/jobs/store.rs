//! Job persistence behind a small key-value contract.
//!
//! Writers to the same id are not coordinated beyond the backend's own
//! last-write-wins; the only mutation besides `put` is the merge-style
//! [`JobStore::update`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use super::job::{Job, JobUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("failed to (de)serialize job: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Writes the whole record, replacing any existing one with the same id.
    async fn put(&self, job: &Job) -> Result<(), StoreError>;

    /// Reads a record; `Ok(None)` when the id is unknown.
    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Merges `update` into an existing record and refreshes `updatedAt`.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if no record exists for `id`.
    async fn update(&self, id: &str, update: JobUpdate) -> Result<(), StoreError>;
}

/// In-memory job table. The default backend; contents die with the process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, update: JobUpdate) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        update.apply(job, Utc::now());
        Ok(())
    }
}

/// One JSON document per job under a directory.
///
/// Updates are read-modify-write, serialized by an in-process lock; separate
/// processes sharing the directory get last-write-wins.
#[derive(Debug)]
pub struct FileJobStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileJobStore {
    /// Opens (and creates if needed) the store directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Path for `id`, or `None` if the id could escape the directory.
    fn path_for(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.dir.join(format!("{id}.json")))
    }

    async fn read(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let Some(path) = self.path_for(id) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, job: &Job) -> Result<(), StoreError> {
        let path = self
            .path_for(&job.id)
            .ok_or_else(|| StoreError::Backend(format!("invalid job id '{}'", job.id)))?;
        let bytes = serde_json::to_vec_pretty(job)?;
        // Write-then-rename so readers never see a half-written document.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(job).await
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        self.read(id).await
    }

    async fn update(&self, id: &str, update: JobUpdate) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut job = self
            .read(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        update.apply(&mut job, Utc::now());
        self.write(&job).await
    }
}
