//! End-to-end linking runs against a temp SQLite database and an in-memory
//! storage backend: classification counters, idempotence, audit/refresh
//! semantics and the pause/resume protocol.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use skulink::application::LinkingService;
use skulink::domain::product::{Product, ProductImage};
use skulink::domain::repositories::{ImageLinkStore, SessionStore};
use skulink::domain::session::{LinkingMode, LinkingSession, SessionStatus};
use skulink::infrastructure::{
    DatabaseConnection, InMemoryStorage, SqliteImageLinkRepository, SqliteProductRepository,
    SqliteSessionRepository,
};
use skulink::linking::{LinkingOptions, LinkingOrchestrator};

struct Harness {
    _dir: tempfile::TempDir,
    pool: SqlitePool,
    products: Arc<SqliteProductRepository>,
    store: Arc<SqliteImageLinkRepository>,
    sessions: Arc<SqliteSessionRepository>,
    storage: Arc<InMemoryStorage>,
    service: LinkingService,
}

async fn harness(skus: &[(i64, &str)], files: &[&str]) -> Result<Harness> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("pipeline.db");
    let db = DatabaseConnection::new(&format!("sqlite:{}", db_path.display())).await?;
    db.migrate().await?;
    let pool = db.pool().clone();

    let products = Arc::new(SqliteProductRepository::new(pool.clone()));
    for (id, sku) in skus {
        products.upsert_product(&Product::new(*id, sku)).await?;
    }

    let store = Arc::new(SqliteImageLinkRepository::new(pool.clone()));
    let sessions = Arc::new(SqliteSessionRepository::new(pool.clone()));
    let storage = Arc::new(InMemoryStorage::new(files));

    let service = LinkingService::new(
        products.clone(),
        store.clone(),
        sessions.clone(),
        storage.clone(),
    );

    Ok(Harness {
        _dir: dir,
        pool,
        products,
        store,
        sessions,
        storage,
        service,
    })
}

async fn run(harness: &Harness, options: LinkingOptions) -> Result<LinkingSession> {
    let session = harness
        .service
        .run_to_completion(options, CancellationToken::new())
        .await?;
    Ok(session)
}

/// Poll until the session reaches `status` or give up after ten seconds.
async fn wait_for_status(
    harness: &Harness,
    session_id: &str,
    status: SessionStatus,
) -> Result<LinkingSession> {
    for _ in 0..200 {
        if let Some(session) = harness.sessions.get(session_id).await? {
            if session.status == status {
                return Ok(session);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    bail!("session {session_id} never reached {status:?}");
}

#[tokio::test]
async fn standard_run_links_and_parks_candidates() -> Result<()> {
    let harness = harness(
        &[(1, "445033"), (2, "446723"), (3, "00123")],
        &[
            "445033.jpg",       // whole-stem exact, 100
            "ref446723A.jpg",   // loose contextual run, 78 -> candidate
            "123.jpg",          // normalized against "00123", 95
            "lifestyle_shot.jpg",
            "999999.jpg", // extracts fine but no such product
        ],
    )
    .await?;

    let session = run(&harness, LinkingOptions::default()).await?;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.images_scanned, 5);
    assert_eq!(session.links_created, 2);
    assert_eq!(session.candidates_created, 1);
    assert_eq!(session.images_skipped, 0);
    assert_eq!(session.exact_matches, 1);
    assert_eq!(session.normalized_matches, 1);
    assert_eq!(session.padded_matches, 0);
    assert_eq!(session.errors_count, 0);
    assert!((session.progress - 100.0).abs() < f64::EPSILON);
    assert!(session.completed_at.is_some());

    assert_eq!(harness.store.count_links().await?, 2);
    assert_eq!(harness.store.count_candidates().await?, 1);

    // the exact match is linked as the product's primary image
    let row = sqlx::query(
        "SELECT product_id, is_primary, match_confidence FROM product_images WHERE image_url = ?",
    )
    .bind("memory://bucket/445033.jpg")
    .fetch_one(&harness.pool)
    .await?;
    assert_eq!(row.get::<i64, _>("product_id"), 1);
    assert!(row.get::<bool, _>("is_primary"));
    assert_eq!(row.get::<i64, _>("match_confidence"), 100);
    Ok(())
}

#[tokio::test]
async fn second_run_skips_what_the_first_one_linked() -> Result<()> {
    let harness = harness(
        &[(1, "445033"), (2, "446723"), (3, "00123")],
        &[
            "445033.jpg",
            "ref446723A.jpg",
            "123.jpg",
            "lifestyle_shot.jpg",
            "999999.jpg",
        ],
    )
    .await?;

    let first = run(&harness, LinkingOptions::default()).await?;
    assert_eq!(first.links_created, 2);

    let second = run(&harness, LinkingOptions::default()).await?;
    assert_eq!(second.status, SessionStatus::Completed);
    assert_eq!(second.links_created, 0);
    // both linked products are guarded by skip_existing
    assert_eq!(second.images_skipped, 2);
    // the candidate classifies again but its row already exists
    assert_eq!(second.candidates_created, 0);
    assert!(
        second
            .warnings
            .iter()
            .any(|w| w.contains("candidates already existed"))
    );

    // no new rows either way
    assert_eq!(harness.store.count_links().await?, 2);
    assert_eq!(harness.store.count_candidates().await?, 1);

    let sessions = harness.service.list_sessions().await?;
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, second.id);
    Ok(())
}

#[tokio::test]
async fn thresholds_reroute_links_into_candidates() -> Result<()> {
    // raising the link bar to 96 pushes the exact (100) through and parks
    // the normalized (95) resolution for review
    let harness = harness(&[(1, "445033"), (3, "00123")], &["445033.jpg", "123.jpg"]).await?;

    let options = LinkingOptions {
        confidence_threshold: 96,
        candidate_threshold: 90,
        ..Default::default()
    };
    let session = run(&harness, options).await?;

    assert_eq!(session.links_created, 1);
    assert_eq!(session.candidates_created, 1);
    assert_eq!(harness.store.count_links().await?, 1);
    assert_eq!(harness.store.count_candidates().await?, 1);

    let row = sqlx::query("SELECT extracted_sku, match_confidence FROM image_match_candidates")
        .fetch_one(&harness.pool)
        .await?;
    assert_eq!(row.get::<String, _>("extracted_sku"), "123");
    assert_eq!(row.get::<i64, _>("match_confidence"), 95);
    Ok(())
}

#[tokio::test]
async fn image_cap_limits_links_per_product() -> Result<()> {
    // scan order is lexicographic: 445033.jpg, then 445033_2.jpg, 445033_3.jpg
    let harness = harness(
        &[(1, "445033")],
        &["445033.jpg", "445033_2.jpg", "445033_3.jpg"],
    )
    .await?;

    let options = LinkingOptions {
        skip_existing: false,
        max_images_per_product: 2,
        ..Default::default()
    };
    let session = run(&harness, options).await?;

    assert_eq!(session.links_created, 2);
    assert_eq!(session.images_skipped, 1);
    assert_eq!(harness.store.count_links().await?, 2);

    // one primary, ordered by arrival
    let rows = sqlx::query(
        "SELECT image_url, is_primary, sort_order FROM product_images ORDER BY sort_order",
    )
    .fetch_all(&harness.pool)
    .await?;
    assert_eq!(rows.len(), 2);
    assert!(rows[0].get::<bool, _>("is_primary"));
    assert_eq!(rows[0].get::<i64, _>("sort_order"), 0);
    assert!(!rows[1].get::<bool, _>("is_primary"));
    assert_eq!(rows[1].get::<i64, _>("sort_order"), 1);
    Ok(())
}

#[tokio::test]
async fn multi_sku_names_link_the_first_resolving_token() -> Result<()> {
    // only the second token exists in the catalog
    let harness = harness(&[(7, "446723")], &["445033.446723.png"]).await?;

    let session = run(&harness, LinkingOptions::default()).await?;
    assert_eq!(session.links_created, 1);
    assert_eq!(session.exact_matches, 1);

    let row = sqlx::query("SELECT product_id FROM product_images")
        .fetch_one(&harness.pool)
        .await?;
    assert_eq!(row.get::<i64, _>("product_id"), 7);
    Ok(())
}

#[tokio::test]
async fn zero_padded_catalog_skus_match_unpadded_filenames() -> Result<()> {
    let harness = harness(&[(9, "0455470")], &["455470.jpg"]).await?;

    let session = run(&harness, LinkingOptions::default()).await?;
    assert_eq!(session.links_created, 1);
    assert_eq!(session.normalized_matches, 1);

    let row = sqlx::query("SELECT product_id, match_confidence FROM product_images")
        .fetch_one(&harness.pool)
        .await?;
    assert_eq!(row.get::<i64, _>("product_id"), 9);
    assert_eq!(row.get::<i64, _>("match_confidence"), 95);
    Ok(())
}

#[tokio::test]
async fn audit_mode_counts_without_writing() -> Result<()> {
    let harness = harness(
        &[(1, "445033"), (2, "446723"), (3, "00123")],
        &[
            "445033.jpg",
            "ref446723A.jpg",
            "123.jpg",
            "lifestyle_shot.jpg",
        ],
    )
    .await?;

    let options = LinkingOptions {
        mode: LinkingMode::Audit,
        ..Default::default()
    };
    let session = run(&harness, options).await?;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.links_created, 2);
    assert_eq!(session.candidates_created, 1);
    assert_eq!(harness.store.count_links().await?, 0);
    assert_eq!(harness.store.count_candidates().await?, 0);
    Ok(())
}

#[tokio::test]
async fn refresh_relinks_auto_links_and_keeps_curated_rows() -> Result<()> {
    let harness = harness(&[(1, "445033"), (2, "777777")], &["445033.jpg"]).await?;

    let first = run(&harness, LinkingOptions::default()).await?;
    assert_eq!(first.links_created, 1);

    // a curated link added by hand between runs
    let curated = ProductImage {
        id: None,
        product_id: 2,
        image_url: "memory://bucket/curated.jpg".to_string(),
        alt_text: None,
        is_primary: true,
        sort_order: 0,
        status: "active".to_string(),
        match_confidence: None,
        match_metadata: None,
        auto_matched: false,
        created_at: Utc::now(),
    };
    let outcome = harness.store.insert_links(&[curated]).await?;
    assert_eq!(outcome.inserted, 1);

    let options = LinkingOptions {
        mode: LinkingMode::Refresh,
        ..Default::default()
    };
    let refresh = run(&harness, options).await?;

    assert_eq!(refresh.status, SessionStatus::Completed);
    assert_eq!(refresh.links_created, 1);
    assert!(
        refresh
            .warnings
            .iter()
            .any(|w| w.contains("refresh removed 1 auto-matched links"))
    );

    let auto: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM product_images WHERE auto_matched = 1")
            .fetch_one(&harness.pool)
            .await?;
    let curated: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM product_images WHERE auto_matched = 0")
            .fetch_one(&harness.pool)
            .await?;
    assert_eq!(auto, 1);
    assert_eq!(curated, 1);
    Ok(())
}

#[tokio::test]
async fn external_pause_parks_at_the_poll_checkpoint_and_resume_finishes() -> Result<()> {
    // 600 products and 600 exactly named files; the status poll runs every
    // 250 files, so a pause set before the run parks it at position 250
    let skus: Vec<(i64, String)> = (0..600)
        .map(|i| (i + 1, format!("{}", 100_000 + i)))
        .collect();
    let sku_refs: Vec<(i64, &str)> = skus.iter().map(|(id, sku)| (*id, sku.as_str())).collect();
    let names: Vec<String> = skus.iter().map(|(_, sku)| format!("{sku}.jpg")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let harness = harness(&sku_refs, &name_refs).await?;

    let (_pause_tx, pause_rx) = watch::channel(false);
    let mut orchestrator = LinkingOrchestrator::new(
        harness.products.clone(),
        harness.store.clone(),
        harness.sessions.clone(),
        harness.storage.clone(),
        LinkingOptions::default(),
        pause_rx,
        CancellationToken::new(),
    );
    let session = orchestrator.open_session().await?;
    let session_id = session.id.clone();

    // an operator pauses through the database before matching starts
    harness
        .sessions
        .set_status(&session_id, SessionStatus::Paused)
        .await?;

    let paused = orchestrator.run_opened(session).await?;
    assert_eq!(paused.status, SessionStatus::Paused);
    assert_eq!(paused.scan_cursor, Some(249));
    assert_eq!(paused.links_created, 250);
    assert_eq!(harness.store.count_links().await?, 250);

    let resumed_id = harness.service.resume(&session_id).await?;
    assert_eq!(resumed_id, session_id);

    let finished = wait_for_status(&harness, &session_id, SessionStatus::Completed).await?;
    assert_eq!(finished.links_created, 600);
    assert_eq!(finished.images_scanned, 600);
    assert_eq!(finished.scan_cursor, None);
    assert_eq!(harness.store.count_links().await?, 600);
    Ok(())
}

#[tokio::test]
async fn pause_signal_before_any_work_leaves_no_cursor() -> Result<()> {
    let harness = harness(
        &[(1, "445033"), (2, "446723")],
        &["445033.jpg", "446723.jpg"],
    )
    .await?;

    let (pause_tx, pause_rx) = watch::channel(false);
    pause_tx.send(true)?;

    let mut orchestrator = LinkingOrchestrator::new(
        harness.products.clone(),
        harness.store.clone(),
        harness.sessions.clone(),
        harness.storage.clone(),
        LinkingOptions::default(),
        pause_rx,
        CancellationToken::new(),
    );
    let session = orchestrator.open_session().await?;
    let session_id = session.id.clone();
    let paused = orchestrator.run_opened(session).await?;

    assert_eq!(paused.status, SessionStatus::Paused);
    assert_eq!(paused.scan_cursor, None);
    assert_eq!(paused.links_created, 0);
    assert_eq!(harness.store.count_links().await?, 0);
    drop(pause_tx);

    let resumed_id = harness.service.resume(&session_id).await?;
    let finished = wait_for_status(&harness, &resumed_id, SessionStatus::Completed).await?;
    assert_eq!(finished.links_created, 2);
    assert_eq!(harness.store.count_links().await?, 2);
    Ok(())
}

#[tokio::test]
async fn cancelled_run_persists_partial_work_and_fails_the_session() -> Result<()> {
    let harness = harness(&[(1, "445033")], &["445033.jpg"]).await?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = harness
        .service
        .run_to_completion(LinkingOptions::default(), cancel)
        .await
        .expect_err("a pre-cancelled run cannot complete");
    assert!(matches!(err, skulink::linking::LinkingError::Cancelled));

    let sessions = harness.service.list_sessions().await?;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Failed);
    assert_eq!(harness.store.count_links().await?, 0);
    Ok(())
}
