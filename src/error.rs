use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobError>;

/// Job-level failures. Per-record failures are [`RecordError`] values and are
/// never raised.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<&'static str>,
    },

    #[error("source error: {0}")]
    Source(String),

    #[error("all-or-none violation in chunk {chunk}: {cause}")]
    AllOrNoneViolation { chunk: u32, cause: String },

    #[error("executor failed on chunk {chunk}: {message}")]
    Execution { chunk: u32, message: String },

    #[error("chunk {chunk} exceeded its budget ({elapsed_ms}ms > {budget_ms}ms)")]
    ChunkBudgetExceeded {
        chunk: u32,
        elapsed_ms: u128,
        budget_ms: u64,
    },

    #[error("job timeout exceeded: {0}s")]
    JobTimeout(u64),

    #[error("report delivery failed: {0}")]
    ReportDelivery(String),

    #[error("status store error: {0}")]
    Status(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JobError {
    pub fn config(key: &'static str, message: impl Into<String>) -> Self {
        JobError::Configuration {
            message: message.into(),
            key: Some(key),
        }
    }

    /// Short machine-readable kind, used in status records and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Configuration { .. } => "configuration",
            JobError::Source(_) => "source",
            JobError::AllOrNoneViolation { .. } => "all_or_none_violation",
            JobError::Execution { .. } => "execution",
            JobError::ChunkBudgetExceeded { .. } => "chunk_budget_exceeded",
            JobError::JobTimeout(_) => "job_timeout",
            JobError::ReportDelivery(_) => "report_delivery",
            JobError::Status(_) => "status",
            JobError::Io(_) => "io",
            JobError::Json(_) => "json",
        }
    }
}

/// Why a single record could not be mutated (validation rule, lock, permission).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl RecordError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }
}
