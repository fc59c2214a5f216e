//! Logging setup for the linking pipeline.
//!
//! Console and file sinks are composed as boxed layers, so every
//! combination `LoggingConfig` allows goes through one subscriber build.
//! The file sink writes through a non-blocking appender whose worker guard
//! is parked in a process-wide registry, keeping buffered lines flushing
//! until exit.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use tracing::{info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::infrastructure::config::ConfigManager;
pub use crate::infrastructure::config::LoggingConfig;

/// File the current run logs into. Earlier runs are archived under
/// timestamped names next to it.
const ACTIVE_LOG: &str = "skulink.log";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

lazy_static! {
    static ref WRITER_GUARDS: Mutex<Vec<WorkerGuard>> = Mutex::new(Vec::new());
}

/// Directory the pipeline logs into, `<data dir>/skulink/logs`, or `./logs`
/// when the platform has no data dir.
pub fn get_log_directory() -> PathBuf {
    ConfigManager::get_app_data_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| PathBuf::from("logs"))
}

/// Build the subscriber described by `config` and install it globally.
///
/// A `RUST_LOG` value wins over the configured level and module filters.
/// A leftover log file from the previous run is moved aside first, so
/// `skulink.log` always belongs to the current run.
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    let log_dir = get_log_directory();
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow!("Cannot create log directory {:?}: {}", log_dir, e))?;

    archive_previous_run(&log_dir)?;
    if config.auto_cleanup_logs {
        prune_archived_logs(&log_dir, &config);
    }

    let mut sinks: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if config.file_output {
        let (writer, guard) = non_blocking(rolling::never(&log_dir, ACTIVE_LOG));
        WRITER_GUARDS.lock().unwrap().push(guard);
        sinks.push(file_sink(writer, config.json_format));
    }
    if config.console_output {
        sinks.push(console_sink());
    }
    if sinks.is_empty() {
        return Err(anyhow!(
            "Logging config disables both console and file output"
        ));
    }

    Registry::default()
        .with(sinks)
        .with(build_filter(&config))
        .init();

    info!("📑 Logging into {:?} at level '{}'", log_dir, config.level);
    Ok(())
}

/// One-time startup diagnostics for support bundles.
pub fn log_system_info() {
    info!(
        "🚀 skulink {} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    if let Ok(dir) = std::env::current_dir() {
        info!("Running from {:?}", dir);
    }
}

fn file_sink(writer: NonBlocking, json: bool) -> Box<dyn Layer<Registry> + Send + Sync> {
    let base = fmt::layer()
        .with_writer(writer)
        .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_owned()))
        .with_ansi(false);
    if json {
        base.json().with_target(true).boxed()
    } else {
        base.with_target(false).boxed()
    }
}

fn console_sink() -> Box<dyn Layer<Registry> + Send + Sync> {
    fmt::layer()
        .with_writer(std::io::stdout)
        .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_owned()))
        .with_target(false)
        .boxed()
}

/// `RUST_LOG` verbatim when present, otherwise the configured base level
/// with the per-module directives layered on top.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut filter = EnvFilter::new(&config.level);
    for (module, level) in &config.module_filters {
        match format!("{module}={level}").parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => warn!("Skipping module filter {}={}: {}", module, level, e),
        }
    }
    filter
}

/// Rename a log file left behind by the previous run, stamped with that
/// file's own creation time.
fn archive_previous_run(log_dir: &Path) -> Result<()> {
    let active = log_dir.join(ACTIVE_LOG);
    if !active.exists() {
        return Ok(());
    }

    let stamp = std::fs::metadata(&active)
        .and_then(|meta| meta.created().or_else(|_| meta.modified()))
        .map(chrono::DateTime::<chrono::Utc>::from)
        .unwrap_or_else(|_| chrono::Utc::now());

    let archived_name = format!("skulink.{}.log", stamp.format("%Y%m%dT%H%M%S"));
    let archived = log_dir.join(&archived_name);
    std::fs::rename(&active, &archived).map_err(|e| {
        anyhow!(
            "Cannot archive {} as {}: {}",
            active.display(),
            archived.display(),
            e
        )
    })?;

    info!("Archived previous run's log as {}", archived_name);
    Ok(())
}

/// Retention policy for archived logs: the newest `max_files` survive, or
/// only the newest one with `keep_only_latest`. Failures here never block
/// startup.
fn prune_archived_logs(log_dir: &Path, config: &LoggingConfig) {
    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot scan {:?} for old logs: {}", log_dir, e);
            return;
        }
    };

    let mut logs: Vec<(PathBuf, std::time::SystemTime)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".log"))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            Some((entry.path(), meta.modified().ok()?))
        })
        .collect();

    // Newest first, then everything past the retention window goes.
    logs.sort_by(|a, b| b.1.cmp(&a.1));
    let keep = if config.keep_only_latest {
        1
    } else {
        config.max_files as usize
    };
    for (path, _) in logs.iter().skip(keep) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Old log {:?} was not removed: {}", path, e);
        }
    }
}
