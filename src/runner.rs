use crate::{
    error::JobError,
    executor::MutationExecutor,
    job::JobConfiguration,
    report::{Delivery, JobSummary, Reporter, TerminalStatus},
    source::{Checkpoint, ChunkCursor, ChunkSource, planned_chunks},
    state::JobState,
    status::{JobStatus, JobStatusRecord, StatusStore},
    util::{derive_job_id, now_rfc3339},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Running,
    Finalizing,
    Aborted,
    Done,
}

/// Cooperative cancellation, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Host-imposed budgets; zero disables a limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLimits {
    pub job_timeout_seconds: u64,
    pub chunk_budget_ms: u64,
}

pub struct JobOutcome {
    pub job_id: String,
    pub status: TerminalStatus,
    pub state: JobState,
    pub failure: Option<JobError>,
    pub summary: JobSummary,
    pub delivery: Option<Delivery>,
    /// Cursor position when the job stopped.
    pub checkpoint: Checkpoint,
}

impl JobOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == TerminalStatus::Complete
    }
}

pub struct BatchJobRunner<S: ChunkSource, E: MutationExecutor> {
    job: JobConfiguration,
    source: S,
    executor: E,
    job_id: Option<String>,
    reporter: Option<Reporter>,
    status: Option<Arc<dyn StatusStore>>,
    limits: RunLimits,
    cancel: CancelHandle,
    resume: Checkpoint,
}

struct Stop {
    status: TerminalStatus,
    failure: Option<JobError>,
    checkpoint: Checkpoint,
}

impl<S: ChunkSource, E: MutationExecutor> BatchJobRunner<S, E> {
    pub fn new(job: JobConfiguration, source: S, executor: E) -> Self {
        Self {
            job,
            source,
            executor,
            job_id: None,
            reporter: None,
            status: None,
            limits: RunLimits::default(),
            cancel: CancelHandle::default(),
            resume: Checkpoint::default(),
        }
    }

    pub fn job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    pub fn reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn status_store(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.status = Some(store);
        self
    }

    pub fn limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Continues a cursor from an earlier run instead of the first record.
    pub fn resume_from(mut self, checkpoint: Checkpoint) -> Self {
        self.resume = checkpoint;
        self
    }

    /// Shares an existing handle, e.g. one a collaborator already holds.
    pub fn with_cancel(mut self, handle: CancelHandle) -> Self {
        self.cancel = handle;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn run(mut self) -> JobOutcome {
        let launched = OffsetDateTime::now_utc();
        let job_id = self.job_id.take().unwrap_or_else(|| {
            derive_job_id(
                self.job.selection_query().raw(),
                &format!(
                    "aon={} hard={} dry={} size={}",
                    self.job.all_or_none(),
                    self.job.hard_delete(),
                    self.job.dry_run(),
                    self.job.chunk_size()
                ),
                launched,
            )
        });

        let mut phase = Phase::Init;
        let mut state = JobState::new(self.job.error_log_cap(), launched);
        info!(
            "job {} starting: query=\"{}\" chunk_size={} all_or_none={} hard_delete={} dry_run={}",
            job_id,
            self.job.selection_query().raw(),
            self.job.chunk_size(),
            self.job.all_or_none(),
            self.job.hard_delete(),
            self.job.dry_run()
        );
        self.write_status(&job_id, JobStatus::Preparing, &state, 0, None);

        let mut total_items = 0u32;
        let stop = self.process(&job_id, &mut state, &mut phase, &mut total_items);

        transition(
            &mut phase,
            if stop.status == TerminalStatus::Aborted {
                Phase::Aborted
            } else {
                Phase::Finalizing
            },
        );
        self.finalize(job_id, state, stop, total_items, &mut phase)
    }

    fn process(
        &self,
        job_id: &str,
        state: &mut JobState,
        phase: &mut Phase,
        total_items: &mut u32,
    ) -> Stop {
        let query = self.job.selection_query();
        let chunk_size = self.job.chunk_size();

        let total = match self.source.count(query) {
            Ok(n) => n,
            Err(err) => {
                error!("job {job_id}: cannot open selection: {err}");
                return Stop {
                    status: TerminalStatus::Aborted,
                    failure: Some(err),
                    checkpoint: self.resume.clone(),
                };
            }
        };
        *total_items = u32::try_from(planned_chunks(total, chunk_size)).unwrap_or(u32::MAX);
        info!(
            "job {job_id}: {total} records match, {} chunks of up to {chunk_size}",
            total_items
        );

        let mut cursor = ChunkCursor::resume(&self.source, query, chunk_size, self.resume.clone());
        transition(phase, Phase::Running);
        self.write_status(job_id, JobStatus::Processing, state, *total_items, None);

        let started = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                warn!("job {job_id}: cancelled after {} chunks", state.chunks_processed());
                return stop_at(TerminalStatus::Cancelled, None, &cursor);
            }
            let timeout = self.limits.job_timeout_seconds;
            if timeout > 0 && started.elapsed().as_secs() >= timeout {
                return stop_at(
                    TerminalStatus::Aborted,
                    Some(JobError::JobTimeout(timeout)),
                    &cursor,
                );
            }

            let chunk = match cursor.next_chunk() {
                Ok(Some(c)) => c,
                Ok(None) => break,
                Err(err) => {
                    error!("job {job_id}: cursor failed: {err}");
                    return stop_at(TerminalStatus::Aborted, Some(err), &cursor);
                }
            };

            debug!("job {job_id}: chunk {} with {} ids", chunk.index, chunk.ids.len());
            let chunk_started = Instant::now();
            let result = match self.executor.execute(&chunk, &self.job) {
                Ok(r) => r,
                Err(err) => {
                    error!("job {job_id}: {err}");
                    return stop_at(TerminalStatus::Aborted, Some(err), &cursor);
                }
            };
            let elapsed = chunk_started.elapsed();

            let tally = state.fold(&result);
            debug_assert_eq!(state.total_processed(), state.succeeded() + state.failed());
            info!(
                "job {job_id}: chunk {} done: {} ok, {} failed ({}ms); totals {}/{}/{}",
                chunk.index,
                tally.succeeded,
                tally.failed,
                elapsed.as_millis(),
                state.total_processed(),
                state.succeeded(),
                state.failed()
            );
            self.write_status(job_id, JobStatus::Processing, state, *total_items, None);

            if tally.has_failures() && self.job.aborts_on_failure() {
                let cause = result
                    .first_error()
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .unwrap_or_else(|| "record failed".to_string());
                warn!("job {job_id}: all-or-none violated in chunk {}", chunk.index);
                return stop_at(
                    TerminalStatus::Aborted,
                    Some(JobError::AllOrNoneViolation {
                        chunk: chunk.index,
                        cause,
                    }),
                    &cursor,
                );
            }

            let budget = self.limits.chunk_budget_ms;
            if budget > 0 && elapsed.as_millis() > u128::from(budget) {
                return stop_at(
                    TerminalStatus::Aborted,
                    Some(JobError::ChunkBudgetExceeded {
                        chunk: chunk.index,
                        elapsed_ms: elapsed.as_millis(),
                        budget_ms: budget,
                    }),
                    &cursor,
                );
            }
        }

        stop_at(TerminalStatus::Complete, None, &cursor)
    }

    fn finalize(
        &self,
        job_id: String,
        state: JobState,
        stop: Stop,
        total_items: u32,
        phase: &mut Phase,
    ) -> JobOutcome {
        let finished_at = OffsetDateTime::now_utc();
        let summary = JobSummary::new(
            &job_id,
            stop.status,
            &self.job,
            &state,
            finished_at,
            stop.failure.as_ref(),
        );

        let extended = stop
            .failure
            .as_ref()
            .map(|e| format!("{}: {}", e.kind(), e));
        self.write_status(&job_id, stop.status.job_status(), &state, total_items, extended);

        let delivery = match (&self.reporter, self.job.send_report()) {
            (Some(r), true) => Some(r.dispatch(&self.job, &summary)),
            _ => None,
        };

        info!(
            "job {} {} in {}: processed={} succeeded={} failed={}",
            job_id,
            stop.status.as_str(),
            summary.duration,
            state.total_processed(),
            state.succeeded(),
            state.failed()
        );
        transition(phase, Phase::Done);

        JobOutcome {
            job_id,
            status: stop.status,
            state,
            failure: stop.failure,
            summary,
            delivery,
            checkpoint: stop.checkpoint,
        }
    }

    fn write_status(
        &self,
        job_id: &str,
        status: JobStatus,
        state: &JobState,
        total_items: u32,
        extended_status: Option<String>,
    ) {
        let Some(store) = &self.status else {
            return;
        };
        let record = JobStatusRecord {
            job_id: job_id.to_string(),
            status,
            number_of_errors: state.chunks_failed(),
            items_processed: state.chunks_processed(),
            total_items,
            extended_status,
            updated_at: now_rfc3339(),
        };
        if let Err(err) = store.write(&record) {
            warn!("job {job_id}: status write failed: {err}");
        }
    }
}

fn stop_at<S: ChunkSource>(
    status: TerminalStatus,
    failure: Option<JobError>,
    cursor: &ChunkCursor<'_, S>,
) -> Stop {
    Stop {
        status,
        failure,
        checkpoint: cursor.checkpoint().clone(),
    }
}

fn transition(phase: &mut Phase, next: Phase) {
    debug!("phase {:?} -> {:?}", phase, next);
    *phase = next;
}
