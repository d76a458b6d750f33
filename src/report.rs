use crate::{
    error::{JobError, Result},
    job::JobConfiguration,
    state::{ErrorEntry, JobState},
    status::JobStatus,
    util::{ensure_dir, format_duration, rfc3339, write_atomic},
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Complete,
    Aborted,
    Cancelled,
}

impl TerminalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalStatus::Complete => "COMPLETE",
            TerminalStatus::Aborted => "ABORTED",
            TerminalStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn job_status(self) -> JobStatus {
        match self {
            TerminalStatus::Complete => JobStatus::Completed,
            TerminalStatus::Aborted => JobStatus::Aborted,
            TerminalStatus::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// Final, serializable view of a job used for both the text report and `report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: TerminalStatus,
    pub selection_query: String,
    pub started_at: String,
    pub finished_at: String,
    pub duration: String,
    pub dry_run: bool,
    pub hard_delete: bool,
    pub irreversible: bool,
    pub total_processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub chunks_processed: u32,
    pub errors: Vec<ErrorEntry>,
    pub errors_not_logged: u64,
    pub failure: Option<String>,
}

impl JobSummary {
    pub fn new(
        job_id: &str,
        status: TerminalStatus,
        job: &JobConfiguration,
        state: &JobState,
        finished_at: OffsetDateTime,
        failure: Option<&JobError>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            selection_query: job.selection_query().raw().to_string(),
            started_at: rfc3339(state.started_at()),
            finished_at: rfc3339(finished_at),
            duration: format_duration(finished_at - state.started_at()),
            dry_run: job.dry_run(),
            hard_delete: job.hard_delete(),
            irreversible: state.irreversible(),
            total_processed: state.total_processed(),
            succeeded: state.succeeded(),
            failed: state.failed(),
            chunks_processed: state.chunks_processed(),
            errors: state.error_log().to_vec(),
            errors_not_logged: state.errors_not_logged(),
            failure: failure.map(|e| e.to_string()),
        }
    }

    pub fn subject(&self) -> String {
        let dry = if self.dry_run { " [DRY RUN]" } else { "" };
        format!(
            "Bulk delete {} {}{}: {} deleted, {} failed",
            self.job_id,
            self.status.as_str(),
            dry,
            self.succeeded,
            self.failed
        )
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Bulk delete job {}", self.job_id);
        let _ = writeln!(out, "Status: {}", self.status.as_str());
        if self.dry_run {
            let _ = writeln!(out, "DRY RUN: no records were modified");
        }
        let _ = writeln!(out, "Query: {}", self.selection_query);
        let _ = writeln!(out, "Started: {}", self.started_at);
        let _ = writeln!(out, "Duration: {}", self.duration);
        let mode = match (self.hard_delete, self.irreversible) {
            (true, true) => "hard delete (irreversible, recycle bin bypassed)",
            (true, false) => "hard delete",
            (false, _) => "soft delete (recoverable from recycle bin)",
        };
        let _ = writeln!(out, "Mode: {mode}");
        let _ = writeln!(out, "Total processed: {}", self.total_processed);
        let _ = writeln!(out, "Succeeded: {}", self.succeeded);
        let _ = writeln!(out, "Failed: {}", self.failed);
        if let Some(reason) = &self.failure {
            let _ = writeln!(out, "Failure: {reason}");
        }

        if !self.errors.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Errors:");
            for e in &self.errors {
                let _ = writeln!(
                    out,
                    "  {}: {} (fields: {})",
                    e.identifier,
                    e.error_code,
                    e.failed_fields.join(", ")
                );
            }
            if self.errors_not_logged > 0 {
                let _ = writeln!(out, "  ... and {} more not shown", self.errors_not_logged);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Production,
    Sandbox,
    Test,
}

/// Delivery channel for finished-job reports.
pub trait Notifier {
    fn deliver(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Emits the report through `tracing`.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        info!(recipient, subject, "job report\n{body}");
        Ok(())
    }
}

/// Writes each report as a plain-text message file into a directory.
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

impl Notifier for OutboxNotifier {
    fn deliver(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        ensure_dir(&self.dir).map_err(|e| JobError::ReportDelivery(format!("{e:#}")))?;
        let stamp = OffsetDateTime::now_utc().unix_timestamp_nanos();
        let path = self.dir.join(format!("{stamp}.txt"));
        let msg = format!("To: {recipient}\nSubject: {subject}\n\n{body}");
        write_atomic(&path, msg.as_bytes()).map_err(|e| JobError::ReportDelivery(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { recipient: String },
    Suppressed,
    Failed(String),
}

pub struct Reporter {
    notifier: Box<dyn Notifier>,
    principal_address: String,
    environment: Environment,
    deliver_outside_production: bool,
}

impl Reporter {
    pub fn new(notifier: Box<dyn Notifier>, principal_address: &str) -> Self {
        Self {
            notifier,
            principal_address: principal_address.to_string(),
            environment: Environment::Production,
            deliver_outside_production: false,
        }
    }

    pub fn environment(mut self, env: Environment) -> Self {
        self.environment = env;
        self
    }

    pub fn deliver_outside_production(mut self, on: bool) -> Self {
        self.deliver_outside_production = on;
        self
    }

    /// Sends the report. Never fails: delivery problems are logged and returned.
    pub fn dispatch(&self, job: &JobConfiguration, summary: &JobSummary) -> Delivery {
        if self.environment != Environment::Production && !self.deliver_outside_production {
            info!(
                "report for {} suppressed in {:?} environment",
                summary.job_id, self.environment
            );
            return Delivery::Suppressed;
        }

        let recipient = job
            .notification_target()
            .unwrap_or(self.principal_address.as_str())
            .to_string();
        match self
            .notifier
            .deliver(&recipient, &summary.subject(), &summary.render())
        {
            Ok(()) => {
                info!("report for {} sent to {}", summary.job_id, recipient);
                Delivery::Sent { recipient }
            }
            Err(err) => {
                let err = match err {
                    e @ JobError::ReportDelivery(_) => e,
                    other => JobError::ReportDelivery(other.to_string()),
                };
                warn!("{err}");
                Delivery::Failed(err.to_string())
            }
        }
    }
}
