use batch_purge::{
    config::Config,
    job::{AllOrNoneScope, JobBuilder},
    report::Environment,
};

#[test]
fn parse_example_config() {
    let raw = include_str!("../batch-purge.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.job.chunk_size, 200);
    assert_eq!(cfg.job.error_log_cap, 100);
    assert_eq!(cfg.global.environment, Environment::Production);
    assert!(!cfg.store.path.is_empty());
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[job]\nidentifier_field = \"Id\"\nchunk_size = 50\nall_or_none = true\nall_or_none_scope = \"chunk\"\nhard_delete = false\ndry_run = true\nsend_report = false\nnotification_target = \"\"\nerror_log_cap = 10\n")
        .expect("parse TOML");
    assert_eq!(cfg.report.channel, "log");
    assert_eq!(cfg.limits.chunk_budget_ms, 0);

    let job = JobBuilder::from_config("SELECT Id FROM Account", &cfg)
        .expect("builder")
        .build();
    assert_eq!(job.chunk_size(), 50);
    assert!(job.all_or_none());
    assert_eq!(job.all_or_none_scope(), AllOrNoneScope::Chunk);
    assert!(!job.aborts_on_failure());
    assert!(job.dry_run());
    assert!(!job.send_report());
    assert_eq!(job.error_log_cap(), 10);
}

#[test]
fn invalid_chunk_size_in_config_is_rejected() {
    let mut cfg = Config::default();
    cfg.job.chunk_size = 0;
    assert!(JobBuilder::from_config("SELECT Id FROM Account", &cfg).is_err());
}
