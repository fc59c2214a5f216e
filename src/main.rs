use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use skulink::application::LinkingService;
use skulink::cli::{Cli, Commands, ModeArg, RunArgs, SessionArgs};
use skulink::domain::repositories::SessionStore;
use skulink::domain::session::{LinkingSession, SessionStatus};
use skulink::infrastructure::config::AppConfig;
use skulink::infrastructure::{
    ConfigManager, DatabaseConnection, HttpObjectStorage, SqliteImageLinkRepository,
    SqliteProductRepository, SqliteSessionRepository, logging,
};
use skulink::linking::{LinkingError, LinkingOptions};

/// Sessions shown by `skulink sessions`.
const RECENT_SESSIONS: u32 = 50;

/// Poll cadence of the `--watch` progress ticker.
const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let config = manager.initialize_on_first_run().await?;
    logging::init_logging_with_config(config.logging.clone())?;
    logging::log_system_info();

    let db = open_database(&config).await?;

    match cli.command {
        Commands::Run(args) => run_linking(args, &config, &db).await,
        Commands::Status(args) => show_status(&args, &db).await,
        Commands::Pause(args) => request_pause(&args, &db).await,
        Commands::Sessions => list_sessions(&db).await,
    }
}

/// Open (and create on first run) the SQLite database behind the pipeline.
async fn open_database(config: &AppConfig) -> Result<DatabaseConnection> {
    let url = match &config.database.url {
        Some(url) => url.clone(),
        None => {
            let path = ConfigManager::get_app_data_dir()?.join("skulink.db");
            format!("sqlite:{}", path.display())
        }
    };
    let db = DatabaseConnection::with_pool_size(&url, config.database.max_connections).await?;
    db.migrate().await?;
    Ok(db)
}

async fn run_linking(args: RunArgs, config: &AppConfig, db: &DatabaseConnection) -> Result<()> {
    let mut storage_config = config.storage.clone();
    if let Some(bucket) = &args.bucket {
        storage_config.bucket = bucket.clone();
    } else if args.mode == ModeArg::Resume {
        // a resumed run scans the bucket its first leg recorded
        if let Some(session_id) = &args.session {
            let sessions = SqliteSessionRepository::new(db.pool().clone());
            if let Some(session) = sessions.get(session_id).await? {
                if let Some(bucket) = session.options_snapshot["bucket_name"].as_str() {
                    storage_config.bucket = bucket.to_string();
                }
            }
        }
    }
    let storage = HttpObjectStorage::new(&storage_config)?;

    let watch = args.watch;
    let options = args.into_options(config);

    let service = LinkingService::new(
        Arc::new(SqliteProductRepository::new(db.pool().clone())),
        Arc::new(SqliteImageLinkRepository::new(db.pool().clone())),
        Arc::new(SqliteSessionRepository::new(db.pool().clone())),
        Arc::new(storage),
    );

    if watch {
        watch_run(&service, options).await
    } else {
        foreground_run(&service, options).await
    }
}

/// Run to completion in the foreground. Ctrl+C cancels the run; whatever was
/// already flushed stays persisted and the session is stamped Failed.
async fn foreground_run(service: &LinkingService, options: LinkingOptions) -> Result<()> {
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    match service.run_to_completion(options, cancel).await {
        Ok(session) => {
            print_session(&session);
            Ok(())
        }
        Err(LinkingError::Cancelled) => {
            println!("🛑 run cancelled, partial progress is persisted");
            process::exit(130);
        }
        Err(err) => Err(err.into()),
    }
}

/// Run in the background and print a progress line every couple of seconds.
/// Ctrl+C here pauses instead of cancelling, so the session stays resumable.
async fn watch_run(service: &LinkingService, options: LinkingOptions) -> Result<()> {
    let session_id = service.start(options).await?;
    println!("session {session_id}");

    let mut pause_requested = false;
    loop {
        let session = service.status(&session_id).await?;
        print_progress_line(&session);
        if session.status != SessionStatus::Running {
            println!();
            print_session(&session);
            break;
        }

        if pause_requested {
            tokio::time::sleep(WATCH_INTERVAL).await;
        } else {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    pause_requested = true;
                    println!("⏸️  pausing, waiting for the run to reach a safe point");
                    if let Err(err) = service.pause(&session_id).await {
                        // the run may have finished between the poll and the signal
                        warn!("⚠️  pause request not applied: {}", err);
                    }
                }
                () = tokio::time::sleep(WATCH_INTERVAL) => {}
            }
        }
    }
    Ok(())
}

async fn show_status(args: &SessionArgs, db: &DatabaseConnection) -> Result<()> {
    let sessions = SqliteSessionRepository::new(db.pool().clone());
    let session = sessions
        .get(&args.session_id)
        .await?
        .ok_or_else(|| anyhow!("session '{}' not found", args.session_id))?;
    print_session(&session);
    Ok(())
}

/// Flip a Running session to Paused. The owning process notices on its next
/// checkpoint, flushes, and records a resume cursor.
async fn request_pause(args: &SessionArgs, db: &DatabaseConnection) -> Result<()> {
    let sessions = SqliteSessionRepository::new(db.pool().clone());
    let session = sessions
        .get(&args.session_id)
        .await?
        .ok_or_else(|| anyhow!("session '{}' not found", args.session_id))?;
    if session.status != SessionStatus::Running {
        bail!(
            "session '{}' is {}, only Running sessions can pause",
            args.session_id,
            session.status.as_str()
        );
    }
    sessions
        .set_status(&args.session_id, SessionStatus::Paused)
        .await?;
    println!("⏸️  pause requested, the run parks at its next checkpoint");
    Ok(())
}

async fn list_sessions(db: &DatabaseConnection) -> Result<()> {
    let sessions = SqliteSessionRepository::new(db.pool().clone())
        .list_recent(RECENT_SESSIONS)
        .await?;
    if sessions.is_empty() {
        println!("no sessions recorded");
        return Ok(());
    }
    for session in &sessions {
        println!(
            "{}  {:<9} {:<8} {:>5.1}%  links {:<6} started {}",
            session.id,
            session.status.as_str(),
            session.mode.as_str(),
            session.progress,
            session.links_created,
            session.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
    }
    Ok(())
}

fn print_progress_line(session: &LinkingSession) {
    let eta = session
        .eta_seconds
        .map_or_else(|| "--".to_string(), |secs| format!("{secs}s"));
    println!(
        "[{:<12}] {:>5.1}% | batch {}/{} | scanned {} | links {} | candidates {} | skipped {} | errors {} | {:.1} files/s | eta {}",
        session.phase.as_str(),
        session.progress,
        session.current_batch,
        session.total_batches,
        session.images_scanned,
        session.links_created,
        session.candidates_created,
        session.images_skipped,
        session.errors_count,
        session.processing_rate,
        eta,
    );
}

fn print_session(session: &LinkingSession) {
    println!("session     {}", session.id);
    println!("status      {}", session.status.as_str());
    println!("phase       {}", session.phase.as_str());
    println!("mode        {}", session.mode.as_str());
    println!("progress    {:.1}%", session.progress);
    println!(
        "batches     {}/{}",
        session.current_batch, session.total_batches
    );
    println!("scanned     {}", session.images_scanned);
    println!("links       {}", session.links_created);
    println!("candidates  {}", session.candidates_created);
    println!("skipped     {}", session.images_skipped);
    println!("errors      {}", session.errors_count);
    println!(
        "matches     exact {} / normalized {} / padded {}",
        session.exact_matches, session.normalized_matches, session.padded_matches
    );
    if let Some(cursor) = session.scan_cursor {
        println!("cursor      {cursor}");
    }
    println!(
        "started     {}",
        session.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(duration) = session.duration_seconds {
        println!("duration    {duration}s");
    }
    if !session.warnings.is_empty() {
        println!("warnings    {}", session.warnings.len());
        for warning in &session.warnings {
            println!("  - {warning}");
        }
    }
    if !session.errors.is_empty() {
        println!("errors");
        for error in &session.errors {
            println!("  - {error}");
        }
    }
}
