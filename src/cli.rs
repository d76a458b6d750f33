use crate::{
    config::Config,
    executor::StoreExecutor,
    job::{AllOrNoneScope, JobBuilder, JobConfiguration},
    report::{LogNotifier, Notifier, OutboxNotifier, Reporter},
    runner::{BatchJobRunner, JobOutcome},
    source::{ChunkSource, planned_chunks},
    status::{DirStatusStore, StatusStore},
    store::JsonStore,
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "batch-purge")]
#[command(about = "Resumable chunked bulk delete over a record store")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./batch-purge.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override the record store file.
    #[arg(long)]
    pub store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a selection query and print how it parsed.
    Check {
        #[arg(long)]
        query: String,
    },
    /// Count matching records and the chunks a run would take.
    Plan {
        #[arg(long)]
        query: String,
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Delete every record the query selects, chunk by chunk.
    Run {
        #[arg(long)]
        query: String,
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Any failure rolls back its chunk and stops the job.
        #[arg(long)]
        all_or_none: bool,
        /// With --all-or-none, only roll back the failing chunk and keep going.
        #[arg(long, requires = "all_or_none")]
        chunk_scope: bool,
        #[arg(long)]
        hard_delete: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        no_report: bool,
        #[arg(long)]
        notify: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Print the last status record written for a job.
    Status {
        #[arg(long)]
        job_id: String,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let cfg = Config::load(&cfg_path).inspect_err(|_| init_fallback_logging())?;
    let log_path = resolve_log_path(&cfg);
    let _guard =
        init_logging(&args, &cfg, log_path.as_deref()).inspect_err(|_| init_fallback_logging())?;

    match &args.cmd {
        Command::Check { query } => check(&cfg, query),
        Command::Plan { query, chunk_size } => plan(&args, &cfg, query, *chunk_size),
        Command::Run {
            query,
            chunk_size,
            all_or_none,
            chunk_scope,
            hard_delete,
            dry_run,
            no_report,
            notify,
            out_dir,
        } => {
            let mut b = JobBuilder::from_config(query, &cfg)?;
            if *all_or_none {
                b = b.all_or_none(true);
            }
            if *chunk_scope {
                b = b.all_or_none_scope(AllOrNoneScope::Chunk);
            }
            if *hard_delete {
                b = b.hard_delete(true);
            }
            if *dry_run {
                b = b.dry_run(true);
            }
            if *no_report {
                b = b.send_report(false);
            }
            if let Some(addr) = notify {
                b = b.notification_target(addr)?;
            }
            let job = b.launch(*chunk_size)?;
            run(&args, &cfg, job, out_dir.as_deref())
        }
        Command::Status { job_id } => status(&cfg, job_id),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("batch-purge.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("batch-purge.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

/// Plain stderr logging for errors raised before the configured subscriber exists.
fn init_fallback_logging() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_store(args: &Args, cfg: &Config) -> Result<JsonStore> {
    let path = args
        .store
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.store.path));
    JsonStore::load(&path, &cfg.job.identifier_field)
        .with_context(|| format!("opening record store: {}", path.display()))
}

fn check(cfg: &Config, query: &str) -> Result<()> {
    let job = JobBuilder::from_config(query, cfg)?.build();
    println!("{}", serde_json::to_string_pretty(job.selection_query())?);
    Ok(())
}

fn plan(args: &Args, cfg: &Config, query: &str, chunk_size: Option<usize>) -> Result<()> {
    let job = JobBuilder::from_config(query, cfg)?.launch(chunk_size)?;
    let store = open_store(args, cfg)?;
    let total = store.count(job.selection_query())?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "query": job.selection_query().raw(),
            "matching_records": total,
            "chunk_size": job.chunk_size(),
            "chunks": planned_chunks(total, job.chunk_size()),
        }))?
    );
    Ok(())
}

fn run(args: &Args, cfg: &Config, job: JobConfiguration, out_override: Option<&Path>) -> Result<()> {
    let store = Arc::new(open_store(args, cfg)?);
    let status_store: Arc<dyn StatusStore> = Arc::new(DirStatusStore::new(Path::new(&cfg.status.dir))?);

    let notifier: Box<dyn Notifier> = match cfg.report.channel.as_str() {
        "log" => Box::new(LogNotifier),
        "outbox" => Box::new(OutboxNotifier::new(Path::new(&cfg.report.outbox_dir))),
        other => return Err(anyhow!("unknown report.channel: {other}")),
    };
    let reporter = Reporter::new(notifier, &cfg.global.principal_address)
        .environment(cfg.global.environment)
        .deliver_outside_production(cfg.report.deliver_outside_production);

    let runner = BatchJobRunner::new(job, store.clone(), StoreExecutor::new(store))
        .reporter(reporter)
        .status_store(status_store)
        .limits(cfg.run_limits());
    let outcome = runner.run();

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.output.out_dir));
    let job_dir = out_root.join(&outcome.job_id);
    write_outputs(cfg, &job_dir, &outcome)?;

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": outcome.job_id,
                "job_dir": job_dir,
                "status": outcome.status,
                "total_processed": outcome.state.total_processed(),
                "succeeded": outcome.state.succeeded(),
                "failed": outcome.state.failed(),
                "failure": outcome.failure.as_ref().map(|e| e.to_string()),
            }))?
        );
    }

    if !outcome.is_complete() {
        return Err(anyhow!(
            "job {} ended {}",
            outcome.job_id,
            outcome.status.as_str()
        ));
    }
    Ok(())
}

fn write_outputs(cfg: &Config, job_dir: &Path, outcome: &JobOutcome) -> Result<()> {
    ensure_dir(job_dir)?;
    info!("job_id={} out={}", outcome.job_id, job_dir.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(job_dir.join("effective-config.toml"), raw)?;
    }
    if cfg.output.write_report_json {
        std::fs::write(
            job_dir.join(&cfg.output.report_filename),
            serde_json::to_string_pretty(&outcome.summary)?,
        )?;
    }
    if cfg.output.write_summary_text {
        std::fs::write(
            job_dir.join(&cfg.output.summary_filename),
            outcome.summary.render(),
        )?;
    }
    Ok(())
}

fn status(cfg: &Config, job_id: &str) -> Result<()> {
    let store = DirStatusStore::new(Path::new(&cfg.status.dir))?;
    match store.read(job_id)? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => {
            warn!("no status record for job {job_id}");
            Err(anyhow!("unknown job: {job_id}"))
        }
    }
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.output.out_dir).join("batch-purge.log"))
}
