use batch_purge::{
    BatchJobRunner, JobBuilder, StoreExecutor, TerminalStatus,
    report::{Delivery, OutboxNotifier, Reporter},
    status::{DirStatusStore, JobStatus, StatusStore},
    store::JsonStore,
};
use serde_json::json;
use std::sync::Arc;

fn write_store(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("records.json");
    let data = json!({
        "sources": {
            "Contact": {
                "fields": ["Id", "Email", "Status"],
                "records": [
                    {"Id": "003-1", "Email": "a@x.io", "Status": "Stale"},
                    {"Id": "003-2", "Email": "b@x.io", "Status": "Active"},
                    {"Id": "003-3", "Email": "c@x.io", "Status": "Stale"},
                    {"Id": "003-4", "Email": "d@x.io", "Status": "Stale", "Locked": true}
                ],
                "delete_guards": [
                    {"field": "Locked", "equals": true, "code": "ENTITY_IS_LOCKED", "message": "record is locked"}
                ]
            }
        }
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&data).unwrap()).unwrap();
    path
}

#[test]
fn file_backed_job_persists_deletes_status_and_report() {
    let tmp = tempfile::tempdir().unwrap();
    let store_path = write_store(tmp.path());
    let store = Arc::new(JsonStore::load(&store_path, "Id").unwrap());
    let status = Arc::new(DirStatusStore::new(&tmp.path().join("status")).unwrap());
    let outbox = tmp.path().join("outbox");

    let job = JobBuilder::new("SELECT Id, Email FROM Contact WHERE Status = 'Stale'")
        .unwrap()
        .notification_target("ops@example.com")
        .unwrap()
        .launch(Some(2))
        .unwrap();
    let outcome = BatchJobRunner::new(job, store.clone(), StoreExecutor::new(store.clone()))
        .job_id("file-job")
        .status_store(status.clone())
        .reporter(Reporter::new(Box::new(OutboxNotifier::new(&outbox)), "owner@example.com"))
        .run();

    assert_eq!(outcome.status, TerminalStatus::Complete);
    assert_eq!(outcome.state.succeeded(), 2);
    assert_eq!(outcome.state.failed(), 1);
    assert_eq!(
        outcome.delivery,
        Some(Delivery::Sent {
            recipient: "ops@example.com".into()
        })
    );

    let reloaded = JsonStore::load(&store_path, "Id").unwrap();
    assert_eq!(reloaded.live_count("Contact").unwrap(), 2);
    assert_eq!(reloaded.recycled_count("Contact").unwrap(), 2);

    let record = status.read("file-job").unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.items_processed, 2);
    assert_eq!(record.number_of_errors, 1);
    assert!(status.read("other-job").unwrap().is_none());
    assert!(status.read("../escape").is_err());

    let messages: Vec<_> = std::fs::read_dir(&outbox).unwrap().collect();
    assert_eq!(messages.len(), 1);
    let body = std::fs::read_to_string(messages[0].as_ref().unwrap().path()).unwrap();
    assert!(body.starts_with("To: ops@example.com\nSubject: Bulk delete file-job COMPLETE"));
    assert!(body.contains("003-4: ENTITY_IS_LOCKED (fields: Locked)"));
}

#[test]
fn store_rejects_records_without_identifier() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bad.json");
    std::fs::write(&path, r#"{"sources": {"Lead": {"records": [{"Name": "x"}]}}}"#).unwrap();
    assert!(JsonStore::load(&path, "Id").is_err());
}

#[test]
fn store_rejects_duplicate_identifiers() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("dupes.json");
    let raw = r#"{"sources": {"Lead": {"records": [{"Id": "001", "Name": "a"}, {"Id": "001", "Name": "b"}]}}}"#;
    std::fs::write(&path, raw).unwrap();

    let err = JsonStore::load(&path, "Id").err().unwrap();
    assert!(err.to_string().contains("duplicate Id '001'"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), raw);

    let binned = r#"{"sources": {"Lead": {"records": [{"Id": "001"}], "recycle_bin": [{"Id": "001"}]}}}"#;
    std::fs::write(&path, binned).unwrap();
    assert!(JsonStore::load(&path, "Id").is_err());
}
