pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod query;
pub mod report;
pub mod runner;
pub mod source;
pub mod state;
pub mod status;
pub mod store;
pub mod util;

pub use error::{JobError, RecordError, Result};
pub use executor::{MutationExecutor, RecordStore, StoreExecutor};
pub use job::{AllOrNoneScope, DeleteMode, JobBuilder, JobConfiguration};
pub use report::{Reporter, TerminalStatus};
pub use runner::{BatchJobRunner, CancelHandle, JobOutcome, RunLimits};
pub use source::{ChunkCursor, ChunkSource, RecordId};
pub use state::JobState;
