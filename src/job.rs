use crate::{
    config::Config,
    error::{JobError, Result},
    query::{DEFAULT_IDENTIFIER_FIELD, SelectionQuery},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 200;
/// Largest batch scope the host accepts for a single chunk.
pub const MAX_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_ERROR_LOG_CAP: usize = 100;

/// How far an all-or-none failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllOrNoneScope {
    /// The first failing chunk is rolled back and the job stops.
    #[default]
    Job,
    /// The failing chunk is rolled back; later chunks still run.
    Chunk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Records go to the recycle bin and can be restored.
    Soft,
    /// Records bypass the recycle bin.
    Hard,
}

/// Frozen job settings. Only [`JobBuilder`] creates these, so a value of this
/// type always carries a validated selection query.
#[derive(Debug, Clone, Serialize)]
pub struct JobConfiguration {
    selection_query: SelectionQuery,
    all_or_none: bool,
    all_or_none_scope: AllOrNoneScope,
    hard_delete: bool,
    dry_run: bool,
    send_report: bool,
    notification_target: Option<String>,
    chunk_size: usize,
    error_log_cap: usize,
}

impl JobConfiguration {
    pub fn selection_query(&self) -> &SelectionQuery {
        &self.selection_query
    }

    pub fn all_or_none(&self) -> bool {
        self.all_or_none
    }

    pub fn all_or_none_scope(&self) -> AllOrNoneScope {
        self.all_or_none_scope
    }

    /// True when a single failure must stop the whole job.
    pub fn aborts_on_failure(&self) -> bool {
        self.all_or_none && self.all_or_none_scope == AllOrNoneScope::Job
    }

    pub fn hard_delete(&self) -> bool {
        self.hard_delete
    }

    pub fn delete_mode(&self) -> DeleteMode {
        if self.hard_delete {
            DeleteMode::Hard
        } else {
            DeleteMode::Soft
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn send_report(&self) -> bool {
        self.send_report
    }

    pub fn notification_target(&self) -> Option<&str> {
        self.notification_target.as_deref()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn error_log_cap(&self) -> usize {
        self.error_log_cap
    }
}

#[derive(Debug, Clone)]
pub struct JobBuilder {
    cfg: JobConfiguration,
}

impl JobBuilder {
    /// Validates the selection query once; nothing after this re-checks it.
    pub fn new(selection_query: &str) -> Result<Self> {
        Self::with_identifier_field(selection_query, DEFAULT_IDENTIFIER_FIELD)
    }

    pub fn with_identifier_field(selection_query: &str, identifier_field: &str) -> Result<Self> {
        let selection_query = SelectionQuery::parse(selection_query, identifier_field)?;
        Ok(Self {
            cfg: JobConfiguration {
                selection_query,
                all_or_none: false,
                all_or_none_scope: AllOrNoneScope::default(),
                hard_delete: false,
                dry_run: false,
                send_report: true,
                notification_target: None,
                chunk_size: DEFAULT_CHUNK_SIZE,
                error_log_cap: DEFAULT_ERROR_LOG_CAP,
            },
        })
    }

    /// Seeds a builder from the `[job]` section of the config file.
    pub fn from_config(selection_query: &str, cfg: &Config) -> Result<Self> {
        let job = &cfg.job;
        let mut b = Self::with_identifier_field(selection_query, &job.identifier_field)?
            .all_or_none(job.all_or_none)
            .all_or_none_scope(job.all_or_none_scope)
            .hard_delete(job.hard_delete)
            .dry_run(job.dry_run)
            .send_report(job.send_report)
            .chunk_size(job.chunk_size)?
            .error_log_cap(job.error_log_cap)?;
        if !job.notification_target.is_empty() {
            b = b.notification_target(&job.notification_target)?;
        }
        Ok(b)
    }

    pub fn all_or_none(mut self, on: bool) -> Self {
        self.cfg.all_or_none = on;
        self
    }

    pub fn all_or_none_scope(mut self, scope: AllOrNoneScope) -> Self {
        self.cfg.all_or_none_scope = scope;
        self
    }

    pub fn hard_delete(mut self, on: bool) -> Self {
        self.cfg.hard_delete = on;
        self
    }

    pub fn dry_run(mut self, on: bool) -> Self {
        self.cfg.dry_run = on;
        self
    }

    pub fn send_report(mut self, on: bool) -> Self {
        self.cfg.send_report = on;
        self
    }

    pub fn notification_target(mut self, address: &str) -> Result<Self> {
        let address = address.trim();
        let valid = address
            .split_once('@')
            .is_some_and(|(user, host)| !user.is_empty() && !host.is_empty());
        if !valid {
            return Err(JobError::config(
                "notification_target",
                format!("not an email address: '{address}'"),
            ));
        }
        self.cfg.notification_target = Some(address.to_string());
        Ok(self)
    }

    pub fn chunk_size(mut self, size: usize) -> Result<Self> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(JobError::config(
                "chunk_size",
                format!("chunk size must be in 1..={MAX_CHUNK_SIZE}, got {size}"),
            ));
        }
        self.cfg.chunk_size = size;
        Ok(self)
    }

    pub fn error_log_cap(mut self, cap: usize) -> Result<Self> {
        if cap == 0 {
            return Err(JobError::config("error_log_cap", "error log cap must be > 0"));
        }
        self.cfg.error_log_cap = cap;
        Ok(self)
    }

    pub fn build(self) -> JobConfiguration {
        self.cfg
    }

    /// Freezes the configuration, applying the optional launch-time chunk size.
    pub fn launch(self, chunk_size: Option<usize>) -> Result<JobConfiguration> {
        let b = match chunk_size {
            Some(n) => self.chunk_size(n)?,
            None => self,
        };
        Ok(b.build())
    }
}
