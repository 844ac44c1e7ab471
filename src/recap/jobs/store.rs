use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::error::JobError;
use super::types::{Job, JobStatus};
use crate::recap::config::JobDirectories;

/// Persistence for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &Job) -> Result<()>;

    /// Fails with [`JobError::NotFound`] for unknown ids
    async fn get(&self, id: &str) -> Result<Job>;

    async fn save(&self, job: &Job) -> Result<()>;

    /// All jobs, newest first
    async fn list(&self) -> Result<Vec<Job>>;

    /// Remove the record together with its upload and output directories
    async fn delete(&self, id: &str) -> Result<()>;

    /// Atomically move a `pending` job to `validating` and return it. Any other
    /// status, or a concurrent claim that got there first, is
    /// [`JobError::AlreadyStarted`].
    async fn claim_pending(&self, id: &str) -> Result<Job>;

    /// Return a `failed` job to `pending` so it can run again from scratch
    async fn reset_failed(&self, id: &str) -> Result<Job>;
}

/// One JSON file per job under `<data_dir>/jobs`.
pub struct FileJobStore {
    dirs: JobDirectories,
    lock: Mutex<()>,
}

impl FileJobStore {
    pub fn new(dirs: JobDirectories) -> Result<Self> {
        dirs.ensure()?;
        Ok(Self {
            dirs,
            lock: Mutex::new(()),
        })
    }

    pub fn directories(&self) -> &JobDirectories {
        &self.dirs
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dirs.jobs_dir().join(format!("{}.json", id))
    }

    fn claim_path(&self, id: &str) -> PathBuf {
        self.dirs.jobs_dir().join(format!("{}.claim", id))
    }

    async fn read(&self, id: &str) -> Result<Job> {
        let path = self.record_path(id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(JobError::NotFound(id.to_string()).into());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read job record {}", path.display()));
            }
        };
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse job record {}", path.display()))
    }

    /// Write through a temp file and rename so readers never see a partial record.
    async fn write(&self, job: &Job) -> Result<()> {
        let path = self.record_path(&job.id);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(job).context("Failed to serialize job record")?;
        tokio::fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to move {} into place", tmp_path.display()))?;
        Ok(())
    }

    /// Create the claim marker; `false` when another process holds it.
    async fn take_claim_marker(&self, id: &str) -> Result<bool> {
        let path = self.claim_path(id);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to create claim marker {}", path.display())),
        }
    }

    async fn remove_if_exists(path: PathBuf) -> Result<()> {
        let result = if path.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, job: &Job) -> Result<()> {
        let _guard = self.lock.lock().await;
        if self.record_path(&job.id).exists() {
            anyhow::bail!("job '{}' already exists", job.id);
        }
        self.write(job).await
    }

    async fn get(&self, id: &str) -> Result<Job> {
        self.read(id).await
    }

    async fn save(&self, job: &Job) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write(job).await
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let jobs_dir = self.dirs.jobs_dir();
        let mut entries = tokio::fs::read_dir(&jobs_dir)
            .await
            .with_context(|| format!("Failed to read {}", jobs_dir.display()))?;

        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.read(id).await {
                Ok(job) => jobs.push(job),
                // deleted between read_dir and read
                Err(e) if matches!(e.downcast_ref::<JobError>(), Some(JobError::NotFound(_))) => {}
                Err(e) => return Err(e),
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        if !self.record_path(id).exists() {
            return Err(JobError::NotFound(id.to_string()).into());
        }
        Self::remove_if_exists(self.record_path(id)).await?;
        Self::remove_if_exists(self.claim_path(id)).await?;
        Self::remove_if_exists(self.dirs.uploads_dir(id)).await?;
        Self::remove_if_exists(self.dirs.outputs_dir(id)).await?;
        Ok(())
    }

    async fn claim_pending(&self, id: &str) -> Result<Job> {
        let _guard = self.lock.lock().await;
        let mut job = self.read(id).await?;
        if job.status != JobStatus::Pending {
            return Err(JobError::AlreadyStarted {
                id: id.to_string(),
                status: job.status,
            }
            .into());
        }
        if !self.take_claim_marker(id).await? {
            return Err(JobError::AlreadyStarted {
                id: id.to_string(),
                status: JobStatus::Validating,
            }
            .into());
        }

        job.enter_stage(JobStatus::Validating);
        if let Err(e) = self.write(&job).await {
            Self::remove_if_exists(self.claim_path(id)).await?;
            return Err(e);
        }
        Ok(job)
    }

    async fn reset_failed(&self, id: &str) -> Result<Job> {
        let _guard = self.lock.lock().await;
        let mut job = self.read(id).await?;
        if job.status != JobStatus::Failed {
            return Err(JobError::NotFailed {
                id: id.to_string(),
                status: job.status,
            }
            .into());
        }
        job.reset();
        Self::remove_if_exists(self.dirs.outputs_dir(id)).await?;
        Self::remove_if_exists(self.claim_path(id)).await?;
        self.write(&job).await?;
        Ok(job)
    }
}
