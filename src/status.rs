use crate::{
    error::{JobError, Result},
    util::{ensure_dir, write_atomic},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Preparing,
    Processing,
    Completed,
    Aborted,
    Cancelled,
}

/// Externally visible progress of a job. Items are chunks, and
/// `number_of_errors` counts chunks that had at least one failed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub number_of_errors: u32,
    pub items_processed: u32,
    pub total_items: u32,
    #[serde(default)]
    pub extended_status: Option<String>,
    pub updated_at: String,
}

pub trait StatusStore {
    fn write(&self, record: &JobStatusRecord) -> Result<()>;
    fn read(&self, job_id: &str) -> Result<Option<JobStatusRecord>>;
}

#[derive(Default)]
pub struct MemoryStatusStore {
    records: Mutex<HashMap<String, JobStatusRecord>>,
    history: Mutex<Vec<JobStatusRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record written, oldest first.
    pub fn history(&self) -> Vec<JobStatusRecord> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn write(&self, record: &JobStatusRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| JobError::Status("status lock poisoned".into()))?
            .insert(record.job_id.clone(), record.clone());
        if let Ok(mut h) = self.history.lock() {
            h.push(record.clone());
        }
        Ok(())
    }

    fn read(&self, job_id: &str) -> Result<Option<JobStatusRecord>> {
        Ok(self
            .records
            .lock()
            .map_err(|_| JobError::Status("status lock poisoned".into()))?
            .get(job_id)
            .cloned())
    }
}

/// One `<job_id>.json` file per job.
pub struct DirStatusStore {
    dir: PathBuf,
}

impl DirStatusStore {
    pub fn new(dir: &Path) -> Result<Self> {
        ensure_dir(dir).map_err(|e| JobError::Status(format!("{e:#}")))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, job_id: &str) -> Result<PathBuf> {
        let safe = job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if job_id.is_empty() || !safe {
            return Err(JobError::Status(format!("invalid job id: '{job_id}'")));
        }
        Ok(self.dir.join(format!("{job_id}.json")))
    }
}

impl StatusStore for DirStatusStore {
    fn write(&self, record: &JobStatusRecord) -> Result<()> {
        let path = self.path_for(&record.job_id)?;
        write_atomic(&path, &serde_json::to_vec_pretty(record)?)?;
        Ok(())
    }

    fn read(&self, job_id: &str) -> Result<Option<JobStatusRecord>> {
        let path = self.path_for(job_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}
