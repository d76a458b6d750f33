pub mod types;

use crate::{
    error::{JobError, RecordError, Result},
    job::{DeleteMode, JobConfiguration},
    source::{Chunk, RecordId},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub use types::{ChunkResult, RecordOutcome};

pub const ROLLED_BACK_CODE: &str = "ALL_OR_NONE_OPERATION_ROLLED_BACK";
pub const MISSING_RESULT_CODE: &str = "MISSING_RESULT";

/// Applies the job's operation to one chunk.
pub trait MutationExecutor {
    fn execute(&self, chunk: &Chunk, job: &JobConfiguration) -> Result<ChunkResult>;
}

/// The delete primitive of an external record store.
pub trait RecordStore {
    /// Deletes `ids` from `source` only. With `all_or_none`, either every id
    /// is deleted or none is; a rejected batch reports every id as failed.
    fn delete(
        &self,
        source: &str,
        ids: &[RecordId],
        mode: DeleteMode,
        all_or_none: bool,
    ) -> Result<Vec<RecordOutcome>>;
}

impl<T: RecordStore + ?Sized> RecordStore for &T {
    fn delete(
        &self,
        source: &str,
        ids: &[RecordId],
        mode: DeleteMode,
        all_or_none: bool,
    ) -> Result<Vec<RecordOutcome>> {
        (**self).delete(source, ids, mode, all_or_none)
    }
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn delete(
        &self,
        source: &str,
        ids: &[RecordId],
        mode: DeleteMode,
        all_or_none: bool,
    ) -> Result<Vec<RecordOutcome>> {
        (**self).delete(source, ids, mode, all_or_none)
    }
}

pub struct StoreExecutor<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> StoreExecutor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: RecordStore> MutationExecutor for StoreExecutor<S> {
    fn execute(&self, chunk: &Chunk, job: &JobConfiguration) -> Result<ChunkResult> {
        if job.dry_run() {
            debug!("dry run: simulating {} deletes", chunk.ids.len());
            return Ok(ChunkResult {
                chunk_index: chunk.index,
                outcomes: chunk.ids.iter().cloned().map(RecordOutcome::ok).collect(),
                dry_run: true,
                irreversible: false,
            });
        }

        let mode = job.delete_mode();
        let raw = self
            .store
            .delete(
                job.selection_query().source(),
                &chunk.ids,
                mode,
                job.all_or_none(),
            )
            .map_err(|e| JobError::Execution {
                chunk: chunk.index,
                message: e.to_string(),
            })?;

        let mut outcomes = align_outcomes(&chunk.ids, raw);
        if job.all_or_none() {
            mark_rolled_back(chunk.index, &mut outcomes)?;
        }

        Ok(ChunkResult {
            chunk_index: chunk.index,
            outcomes,
            dry_run: false,
            irreversible: mode == DeleteMode::Hard,
        })
    }
}

/// Exactly one outcome per submitted id, in submission order.
fn align_outcomes(ids: &[RecordId], raw: Vec<RecordOutcome>) -> Vec<RecordOutcome> {
    let mut by_id: HashMap<RecordId, RecordOutcome> = HashMap::with_capacity(raw.len());
    for o in raw {
        if by_id.contains_key(&o.id) {
            warn!("store reported {} more than once; keeping the first", o.id);
            continue;
        }
        by_id.insert(o.id.clone(), o);
    }

    let out = ids
        .iter()
        .map(|id| {
            by_id.remove(id).unwrap_or_else(|| {
                RecordOutcome::failed(
                    id.clone(),
                    RecordError::new(MISSING_RESULT_CODE, "store returned no result for record"),
                )
            })
        })
        .collect();

    if !by_id.is_empty() {
        warn!(
            "store reported {} ids that were not submitted; dropped",
            by_id.len()
        );
    }
    out
}

/// Any failure fails the whole chunk. A store that applied part of a
/// rejected batch broke the contract, and that is fatal.
fn mark_rolled_back(chunk_index: u32, outcomes: &mut [RecordOutcome]) -> Result<()> {
    if !types::has_failures(outcomes) {
        return Ok(());
    }
    let applied = outcomes.iter().filter(|o| o.success).count();
    if applied > 0 {
        warn!(
            "chunk {}: store applied {} deletes of a failed all-or-none batch",
            chunk_index, applied
        );
        return Err(JobError::Execution {
            chunk: chunk_index,
            message: format!(
                "store violated all-or-none: {} of {} records applied despite failures",
                applied,
                outcomes.len()
            ),
        });
    }

    let cause = match types::root_cause(outcomes) {
        Some(e) => format!("{}: {}", e.code, e.message),
        None => "record failed without a reported cause".to_string(),
    };
    for o in outcomes.iter_mut().filter(|o| o.error.is_none()) {
        o.error = Some(RecordError::new(
            ROLLED_BACK_CODE,
            format!("rolled back: {cause}"),
        ));
    }
    Ok(())
}
