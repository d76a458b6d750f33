#![allow(dead_code)]

use batch_purge::{
    error::Result,
    report::Notifier,
    store::{DeleteGuard, JsonStore, SourceTable, StoreData},
};
use serde_json::json;
use std::sync::{Arc, Mutex};

pub fn record_id(i: usize) -> String {
    format!("rec-{i:05}")
}

/// `n` Account records; the 1-based positions in `protected` refuse deletion.
pub fn account_store(n: usize, protected: &[usize]) -> JsonStore {
    let mut table = SourceTable::new(&["Id", "Name", "Region", "Protected"]).with_guard(
        DeleteGuard {
            field: "Protected".into(),
            equals: json!(true),
            code: "FIELD_CUSTOM_VALIDATION_EXCEPTION".into(),
            message: "record is protected".into(),
        },
    );
    for i in 1..=n {
        table.push(json!({
            "Id": record_id(i),
            "Name": format!("Account {i}"),
            "Region": if i % 2 == 0 { "EMEA" } else { "AMER" },
            "Protected": protected.contains(&i),
        }));
    }
    let mut data = StoreData::default();
    data.sources.insert("Account".into(), table);
    JsonStore::from_data(data, "Id").expect("build store")
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl Notifier for RecordingNotifier {
    fn deliver(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.into(), subject.into(), body.into()));
        Ok(())
    }
}

pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn deliver(&self, _recipient: &str, _subject: &str, _body: &str) -> Result<()> {
        Err(batch_purge::JobError::ReportDelivery("smtp unreachable".into()))
    }
}
