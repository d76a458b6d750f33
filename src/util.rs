use anyhow::Context;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub fn ensure_dir(p: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

pub fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn now_rfc3339() -> String {
    rfc3339(OffsetDateTime::now_utc())
}

/// Job ids are derived from what the job does and when it was launched, so two
/// launches of the same query never collide.
pub fn derive_job_id(query: &str, flags: &str, launched_at: OffsetDateTime) -> String {
    let seed = format!(
        "{}:{}:{}",
        query,
        flags,
        launched_at.unix_timestamp_nanos()
    );
    sha256_hex(seed.as_bytes())[..18].to_string()
}

/// Human duration with millisecond precision, e.g. `12.345s`.
pub fn format_duration(d: time::Duration) -> String {
    let ms = d.whole_milliseconds().max(0);
    format!("{}.{:03}s", ms / 1000, ms % 1000)
}

/// Writes through a sibling temp file so readers never see a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
