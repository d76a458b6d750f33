use crate::{executor::ChunkResult, source::RecordId};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Aggregate outcome of a job, owned by the runner and folded once per chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    total_processed: u64,
    succeeded: u64,
    failed: u64,
    chunks_processed: u32,
    chunks_failed: u32,
    irreversible: bool,
    error_log: Vec<ErrorEntry>,
    error_log_cap: usize,
    #[serde(with = "time::serde::rfc3339")]
    started_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub identifier: RecordId,
    pub error_code: String,
    pub message: String,
    pub failed_fields: Vec<String>,
}

/// Per-chunk counts returned by [`JobState::fold`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkTally {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl ChunkTally {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl JobState {
    pub fn new(error_log_cap: usize, started_at: OffsetDateTime) -> Self {
        Self {
            total_processed: 0,
            succeeded: 0,
            failed: 0,
            chunks_processed: 0,
            chunks_failed: 0,
            irreversible: false,
            error_log: Vec::new(),
            error_log_cap,
            started_at,
        }
    }

    pub fn fold(&mut self, result: &ChunkResult) -> ChunkTally {
        let mut tally = ChunkTally::default();
        for outcome in &result.outcomes {
            tally.processed += 1;
            if outcome.success {
                tally.succeeded += 1;
                continue;
            }
            tally.failed += 1;
            // past the cap failures are still counted, just not kept
            if self.error_log.len() < self.error_log_cap {
                let (code, message, fields) = match &outcome.error {
                    Some(e) => (e.code.clone(), e.message.clone(), e.fields.clone()),
                    None => ("UNKNOWN_ERROR".to_string(), String::new(), Vec::new()),
                };
                self.error_log.push(ErrorEntry {
                    identifier: outcome.id.clone(),
                    error_code: code,
                    message,
                    failed_fields: fields,
                });
            }
        }

        self.total_processed += tally.processed;
        self.succeeded += tally.succeeded;
        self.failed += tally.failed;
        self.chunks_processed += 1;
        if tally.has_failures() {
            self.chunks_failed += 1;
        }
        if result.irreversible && tally.succeeded > 0 {
            self.irreversible = true;
        }
        tally
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn chunks_processed(&self) -> u32 {
        self.chunks_processed
    }

    pub fn chunks_failed(&self) -> u32 {
        self.chunks_failed
    }

    /// True once any applied chunk bypassed the recycle bin.
    pub fn irreversible(&self) -> bool {
        self.irreversible
    }

    pub fn error_log(&self) -> &[ErrorEntry] {
        &self.error_log
    }

    pub fn error_log_cap(&self) -> usize {
        self.error_log_cap
    }

    /// Failures counted but not kept in the error log.
    pub fn errors_not_logged(&self) -> u64 {
        self.failed.saturating_sub(self.error_log.len() as u64)
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }
}
