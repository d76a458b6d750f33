use crate::{error::RecordError, executor::ROLLED_BACK_CODE, source::RecordId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub id: RecordId,
    pub success: bool,
    #[serde(default)]
    pub error: Option<RecordError>,
}

impl RecordOutcome {
    pub fn ok(id: RecordId) -> Self {
        Self {
            id,
            success: true,
            error: None,
        }
    }

    pub fn failed(id: RecordId, error: RecordError) -> Self {
        Self {
            id,
            success: false,
            error: Some(error),
        }
    }
}

/// One entry per submitted identifier, in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_index: u32,
    pub outcomes: Vec<RecordOutcome>,
    pub dry_run: bool,
    /// Set when the mutation bypassed the recycle bin.
    pub irreversible: bool,
}

impl ChunkResult {
    /// The error that caused the chunk to fail, preferring a record's own
    /// error over a rollback relabel.
    pub fn first_error(&self) -> Option<&RecordError> {
        root_cause(&self.outcomes)
    }
}

pub(crate) fn has_failures(outcomes: &[RecordOutcome]) -> bool {
    outcomes.iter().any(|o| !o.success)
}

pub(crate) fn root_cause(outcomes: &[RecordOutcome]) -> Option<&RecordError> {
    let mut errors = outcomes
        .iter()
        .filter(|o| !o.success)
        .filter_map(|o| o.error.as_ref());
    let first = errors.clone().next();
    errors.find(|e| e.code != ROLLED_BACK_CODE).or(first)
}
