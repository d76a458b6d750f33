use crate::{job::AllOrNoneScope, report::Environment, runner::RunLimits};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub job: Job,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub report: Report,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    pub fn run_limits(&self) -> RunLimits {
        RunLimits {
            job_timeout_seconds: self.limits.job_timeout_seconds,
            chunk_budget_ms: self.limits.chunk_budget_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub environment: Environment,
    /// Address of whoever launches jobs; reports go here unless a job names a target.
    pub principal_address: String,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            principal_address: "admin@localhost".into(),
            print_summary: true,
        }
    }
}

/// Defaults for every job; CLI flags override them per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub identifier_field: String,
    pub chunk_size: usize,
    pub all_or_none: bool,
    pub all_or_none_scope: AllOrNoneScope,
    pub hard_delete: bool,
    pub dry_run: bool,
    pub send_report: bool,
    pub notification_target: String,
    pub error_log_cap: usize,
}
impl Default for Job {
    fn default() -> Self {
        Self {
            identifier_field: crate::query::DEFAULT_IDENTIFIER_FIELD.into(),
            chunk_size: crate::job::DEFAULT_CHUNK_SIZE,
            all_or_none: false,
            all_or_none_scope: AllOrNoneScope::Job,
            hard_delete: false,
            dry_run: false,
            send_report: true,
            notification_target: "".into(),
            error_log_cap: crate::job::DEFAULT_ERROR_LOG_CAP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub path: String,
}
impl Default for Store {
    fn default() -> Self {
        Self {
            path: "records.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub dir: String,
}
impl Default for Status {
    fn default() -> Self {
        Self {
            dir: ".batch-purge/status".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// `log` or `outbox`.
    pub channel: String,
    pub outbox_dir: String,
    pub deliver_outside_production: bool,
}
impl Default for Report {
    fn default() -> Self {
        Self {
            channel: "log".into(),
            outbox_dir: ".batch-purge/outbox".into(),
            deliver_outside_production: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Limits {
    pub job_timeout_seconds: u64,
    pub chunk_budget_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub out_dir: String,
    pub write_report_json: bool,
    pub write_summary_text: bool,
    pub report_filename: String,
    pub summary_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            write_report_json: true,
            write_summary_text: true,
            report_filename: "report.json".into(),
            summary_filename: "summary.txt".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
        }
    }
}
