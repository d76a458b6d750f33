use std::process::Command;

#[test]
fn unreadable_config_is_reported_on_stderr() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("nope.toml");

    let out = Command::new(env!("CARGO_BIN_EXE_batch-purge"))
        .arg("--config")
        .arg(&missing)
        .args(["check", "--query", "SELECT Id FROM Account"])
        .output()
        .unwrap();

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("reading config"), "stderr was: {stderr}");
    assert!(stderr.contains("nope.toml"), "stderr was: {stderr}");
}
