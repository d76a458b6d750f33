use batch_purge::{
    JobBuilder, JobError, RecordError, TerminalStatus,
    executor::{ChunkResult, RecordOutcome},
    report::JobSummary,
    source::RecordId,
    state::JobState,
};
use time::macros::datetime;

fn state_with_failures(n: usize, cap: usize) -> JobState {
    let mut state = JobState::new(cap, datetime!(2026-03-01 12:00:00 UTC));
    let mut outcomes = vec![RecordOutcome::ok(RecordId::new("001A"))];
    for i in 0..n {
        outcomes.push(RecordOutcome::failed(
            RecordId::new(format!("001F{i:02}")),
            RecordError::new("ENTITY_IS_LOCKED", "locked")
                .with_fields(vec!["Status".into(), "OwnerId".into()]),
        ));
    }
    state.fold(&ChunkResult {
        chunk_index: 1,
        outcomes,
        dry_run: false,
        irreversible: false,
    });
    state
}

#[test]
fn render_is_deterministic_and_complete() {
    let job = JobBuilder::new("SELECT Id FROM Account").unwrap().build();
    let state = state_with_failures(2, 100);
    let finished = datetime!(2026-03-01 12:00:03.250 UTC);

    let a = JobSummary::new("j1", TerminalStatus::Complete, &job, &state, finished, None);
    let b = JobSummary::new("j1", TerminalStatus::Complete, &job, &state, finished, None);
    let text = a.render();
    assert_eq!(text, b.render());

    assert!(text.contains("Bulk delete job j1"));
    assert!(text.contains("Status: COMPLETE"));
    assert!(text.contains("Started: 2026-03-01T12:00:00Z"));
    assert!(text.contains("Duration: 3.250s"));
    assert!(text.contains("Total processed: 3"));
    assert!(text.contains("Succeeded: 1"));
    assert!(text.contains("Failed: 2"));
    assert!(text.contains("001F00: ENTITY_IS_LOCKED (fields: Status, OwnerId)"));
    assert!(text.contains("soft delete"));
    assert!(!text.contains("DRY RUN"));
    assert!(a.subject().contains("COMPLETE"));
}

#[test]
fn render_caps_error_lines_and_shows_failure() {
    let job = JobBuilder::new("SELECT Id FROM Account")
        .unwrap()
        .dry_run(true)
        .build();
    let state = state_with_failures(12, 5);
    let failure = JobError::AllOrNoneViolation {
        chunk: 1,
        cause: "ENTITY_IS_LOCKED: locked".into(),
    };
    let summary = JobSummary::new(
        "j2",
        TerminalStatus::Aborted,
        &job,
        &state,
        datetime!(2026-03-01 12:01:00 UTC),
        Some(&failure),
    );
    let text = summary.render();

    assert_eq!(text.matches("ENTITY_IS_LOCKED (fields:").count(), 5);
    assert!(text.contains("... and 7 more not shown"));
    assert!(text.contains("Status: ABORTED"));
    assert!(text.contains("DRY RUN"));
    assert!(text.contains("Failure: all-or-none violation in chunk 1"));
    assert!(summary.subject().contains("[DRY RUN]"));
}
