use batch_purge::{
    JobError,
    job::{JobBuilder, MAX_CHUNK_SIZE},
    query::{CompareOp, Literal, SelectionQuery},
};
use serde_json::json;

fn config_error(raw: &str) -> String {
    match JobBuilder::new(raw) {
        Err(JobError::Configuration { message, .. }) => message,
        Err(other) => panic!("expected configuration error, got {other}"),
        Ok(_) => panic!("expected configuration error for {raw:?}"),
    }
}

#[test]
fn rejects_empty_query() {
    assert!(config_error("   ").contains("empty"));
}

#[test]
fn rejects_query_without_select() {
    assert!(config_error("DELETE FROM Account").contains("SELECT"));
}

#[test]
fn rejects_query_without_source() {
    assert!(config_error("SELECT Id WHERE Name = 'x'").contains("FROM"));
}

#[test]
fn rejects_query_without_identifier_field() {
    assert!(config_error("SELECT Name FROM Account").contains("'Id'"));
}

#[test]
fn rejects_malformed_where() {
    assert!(config_error("SELECT Id FROM Account WHERE Name ~ 'x'").contains("WHERE"));
    assert!(config_error("SELECT Id FROM Account WHERE Name = 'x' OR Region = 'y'").contains("AND"));
}

#[test]
fn parses_fields_conditions_and_limit() {
    let q = SelectionQuery::parse(
        "select Id, Name from Account where Region = 'EMEA' and Score >= 3.5 and Active = true limit 10",
        "Id",
    )
    .unwrap();
    assert_eq!(q.source(), "Account");
    assert_eq!(q.fields(), ["Id".to_string(), "Name".to_string()]);
    assert_eq!(q.limit(), Some(10));
    assert_eq!(q.conditions().len(), 3);
    assert_eq!(q.conditions()[1].op, CompareOp::Ge);
    assert_eq!(q.conditions()[1].value, Literal::Num(3.5));
    assert_eq!(q.conditions()[2].value, Literal::Bool(true));
}

#[test]
fn quoted_and_is_part_of_the_literal() {
    let q = SelectionQuery::parse("SELECT Id FROM Account WHERE Name = 'Smith and Sons'", "Id").unwrap();
    assert_eq!(q.conditions().len(), 1);
    assert_eq!(q.conditions()[0].value, Literal::Str("Smith and Sons".into()));
}

#[test]
fn custom_identifier_field() {
    assert!(JobBuilder::with_identifier_field("SELECT ExternalKey FROM Lead", "ExternalKey").is_ok());
    assert!(JobBuilder::with_identifier_field("SELECT Id FROM Lead", "ExternalKey").is_err());
}

#[test]
fn conditions_match_records() {
    let q = SelectionQuery::parse(
        "SELECT Id FROM Account WHERE Region = 'EMEA' AND Score > 2 AND Owner = null",
        "Id",
    )
    .unwrap();
    let hit = json!({"Id": "a", "Region": "EMEA", "Score": 5});
    let wrong_region = json!({"Id": "b", "Region": "AMER", "Score": 5});
    let low_score = json!({"Id": "c", "Region": "EMEA", "Score": 1});
    let owned = json!({"Id": "d", "Region": "EMEA", "Score": 5, "Owner": "x"});
    assert!(q.matches(hit.as_object().unwrap()));
    assert!(!q.matches(wrong_region.as_object().unwrap()));
    assert!(!q.matches(low_score.as_object().unwrap()));
    assert!(!q.matches(owned.as_object().unwrap()));
}

#[test]
fn setters_validate_their_own_argument() {
    let b = JobBuilder::new("SELECT Id FROM Account").unwrap();
    assert!(b.clone().chunk_size(0).is_err());
    assert!(b.clone().chunk_size(MAX_CHUNK_SIZE + 1).is_err());
    assert!(b.clone().error_log_cap(0).is_err());
    assert!(b.clone().notification_target("nobody").is_err());

    let job = b
        .all_or_none(true)
        .hard_delete(true)
        .send_report(false)
        .notification_target("ops@example.com")
        .unwrap()
        .launch(None)
        .unwrap();
    assert_eq!(job.chunk_size(), 200);
    assert!(job.all_or_none() && job.hard_delete() && !job.send_report());
    assert_eq!(job.notification_target(), Some("ops@example.com"));
}

#[test]
fn launch_applies_chunk_size() {
    let job = JobBuilder::new("SELECT Id FROM Account")
        .unwrap()
        .launch(Some(75))
        .unwrap();
    assert_eq!(job.chunk_size(), 75);
    assert!(JobBuilder::new("SELECT Id FROM Account").unwrap().launch(Some(0)).is_err());
}

#[test]
fn identifier_field_is_stored_as_configured() {
    let q = SelectionQuery::parse("SELECT id, Name FROM Account WHERE ID != 'x'", "Id").unwrap();
    assert_eq!(q.fields(), ["Id".to_string(), "Name".to_string()]);
    assert_eq!(q.conditions()[0].field, "Id");
    assert_eq!(q.raw(), "SELECT id, Name FROM Account WHERE ID != 'x'");
}
