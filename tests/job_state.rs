use batch_purge::{
    RecordError,
    executor::{ChunkResult, RecordOutcome},
    source::RecordId,
    state::JobState,
};
use time::OffsetDateTime;

fn chunk(index: u32, ok: usize, failed: usize) -> ChunkResult {
    let mut outcomes = Vec::new();
    for i in 0..ok {
        outcomes.push(RecordOutcome::ok(RecordId::new(format!("ok-{index}-{i}"))));
    }
    for i in 0..failed {
        outcomes.push(RecordOutcome::failed(
            RecordId::new(format!("bad-{index}-{i}")),
            RecordError::new("ENTITY_IS_LOCKED", "locked").with_fields(vec!["Status".into()]),
        ));
    }
    ChunkResult {
        chunk_index: index,
        outcomes,
        dry_run: false,
        irreversible: false,
    }
}

#[test]
fn counts_add_up_after_every_fold() {
    let mut state = JobState::new(100, OffsetDateTime::now_utc());
    for (i, (ok, failed)) in [(200, 0), (180, 20), (0, 200), (7, 3)].into_iter().enumerate() {
        let tally = state.fold(&chunk(i as u32 + 1, ok, failed));
        assert_eq!(tally.processed, (ok + failed) as u64);
        assert_eq!(state.total_processed(), state.succeeded() + state.failed());
    }
    assert_eq!(state.total_processed(), 610);
    assert_eq!(state.failed(), 223);
    assert_eq!(state.chunks_processed(), 4);
    assert_eq!(state.chunks_failed(), 3);
}

#[test]
fn error_log_stops_at_cap_but_counting_continues() {
    let mut state = JobState::new(100, OffsetDateTime::now_utc());
    state.fold(&chunk(1, 0, 150));
    state.fold(&chunk(2, 10, 100));
    assert_eq!(state.failed(), 250);
    assert_eq!(state.error_log().len(), 100);
    assert_eq!(state.errors_not_logged(), 150);
    assert_eq!(state.error_log()[0].identifier, RecordId::new("bad-1-0"));
    assert_eq!(state.error_log()[0].failed_fields, vec!["Status".to_string()]);
}

#[test]
fn irreversible_only_when_something_was_applied() {
    let mut state = JobState::new(10, OffsetDateTime::now_utc());
    let mut rolled_back = chunk(1, 0, 5);
    rolled_back.irreversible = true;
    state.fold(&rolled_back);
    assert!(!state.irreversible());

    let mut applied = chunk(2, 5, 0);
    applied.irreversible = true;
    state.fold(&applied);
    assert!(state.irreversible());
}
