//! Repository implementation for persisted linking sessions
//!
//! The session row is the pipeline's externally visible face: dashboards and
//! the CLI poll it, and an out-of-process pause is requested by writing it.
//! Every status change is validated against the state machine before it
//! touches the row, and the write itself is conditional on the status it was
//! validated against, so racing writers cannot corrupt the lifecycle.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::sync::Arc;
use tracing::info;

use crate::domain::repositories::SessionStore;
use crate::domain::session::{LinkingSession, SessionStatus};

#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn row_to_session(row: &SqliteRow) -> LinkingSession {
        let errors: Vec<String> =
            serde_json::from_str(&row.get::<String, _>("errors")).unwrap_or_default();
        let warnings: Vec<String> =
            serde_json::from_str(&row.get::<String, _>("warnings")).unwrap_or_default();
        let options_snapshot =
            serde_json::from_str(&row.get::<String, _>("options_snapshot")).unwrap_or_default();

        LinkingSession {
            id: row.get("id"),
            status: row.get("status"),
            phase: row.get("phase"),
            mode: row.get("mode"),
            progress: row.get("progress"),
            current_batch: row.get("current_batch"),
            total_batches: row.get("total_batches"),
            images_scanned: row.get("images_scanned"),
            links_created: row.get("links_created"),
            candidates_created: row.get("candidates_created"),
            images_skipped: row.get("images_skipped"),
            errors_count: row.get("errors_count"),
            exact_matches: row.get("exact_matches"),
            normalized_matches: row.get("normalized_matches"),
            padded_matches: row.get("padded_matches"),
            processing_rate: row.get("processing_rate"),
            eta_seconds: row.get("eta_seconds"),
            errors,
            warnings,
            options_snapshot,
            scan_cursor: row.get("scan_cursor"),
            started_at: row.get("started_at"),
            updated_at: row.get("updated_at"),
            completed_at: row.get("completed_at"),
            duration_seconds: row.get("duration_seconds"),
        }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionRepository {
    async fn create(&self, session: &LinkingSession) -> Result<()> {
        let errors = serde_json::to_string(&session.errors).context("serialize errors")?;
        let warnings = serde_json::to_string(&session.warnings).context("serialize warnings")?;

        sqlx::query(
            r#"
            INSERT INTO linking_sessions
            (id, status, phase, mode, progress, current_batch, total_batches,
             images_scanned, links_created, candidates_created, images_skipped,
             errors_count, exact_matches, normalized_matches, padded_matches,
             processing_rate, eta_seconds, errors, warnings, options_snapshot,
             scan_cursor, started_at, updated_at, completed_at, duration_seconds)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(session.status)
        .bind(session.phase)
        .bind(session.mode)
        .bind(session.progress)
        .bind(session.current_batch)
        .bind(session.total_batches)
        .bind(session.images_scanned)
        .bind(session.links_created)
        .bind(session.candidates_created)
        .bind(session.images_skipped)
        .bind(session.errors_count)
        .bind(session.exact_matches)
        .bind(session.normalized_matches)
        .bind(session.padded_matches)
        .bind(session.processing_rate)
        .bind(session.eta_seconds)
        .bind(errors)
        .bind(warnings)
        .bind(session.options_snapshot.to_string())
        .bind(session.scan_cursor)
        .bind(session.started_at)
        .bind(session.updated_at)
        .bind(session.completed_at)
        .bind(session.duration_seconds)
        .execute(&*self.pool)
        .await?;

        info!("Created linking session: {}", session.id);
        Ok(())
    }

    async fn save(&self, session: &LinkingSession) -> Result<()> {
        let errors = serde_json::to_string(&session.errors).context("serialize errors")?;
        let warnings = serde_json::to_string(&session.warnings).context("serialize warnings")?;

        sqlx::query(
            r#"
            UPDATE linking_sessions SET
                phase = ?, progress = ?, current_batch = ?, total_batches = ?,
                images_scanned = ?, links_created = ?, candidates_created = ?,
                images_skipped = ?, errors_count = ?, exact_matches = ?,
                normalized_matches = ?, padded_matches = ?, processing_rate = ?,
                eta_seconds = ?, errors = ?, warnings = ?, scan_cursor = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(session.phase)
        .bind(session.progress)
        .bind(session.current_batch)
        .bind(session.total_batches)
        .bind(session.images_scanned)
        .bind(session.links_created)
        .bind(session.candidates_created)
        .bind(session.images_skipped)
        .bind(session.errors_count)
        .bind(session.exact_matches)
        .bind(session.normalized_matches)
        .bind(session.padded_matches)
        .bind(session.processing_rate)
        .bind(session.eta_seconds)
        .bind(errors)
        .bind(warnings)
        .bind(session.scan_cursor)
        .bind(session.updated_at)
        .bind(&session.id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<LinkingSession>> {
        let row = sqlx::query("SELECT * FROM linking_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_session))
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<LinkingSession>> {
        let rows = sqlx::query("SELECT * FROM linking_sessions ORDER BY started_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.iter().map(Self::row_to_session).collect())
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let current = self
            .get(session_id)
            .await?
            .with_context(|| format!("session not found: {session_id}"))?;

        if !current.status.can_transition_to(status) {
            bail!(
                "illegal session transition {} -> {} for {}",
                current.status,
                status,
                session_id
            );
        }

        let result = sqlx::query(
            "UPDATE linking_sessions SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(session_id)
        .bind(current.status)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("session {session_id} status changed concurrently");
        }

        info!(
            "Session {} transitioned {} -> {}",
            session_id, current.status, status
        );
        Ok(())
    }

    async fn finish(&self, session: &LinkingSession) -> Result<bool> {
        let errors = serde_json::to_string(&session.errors).context("serialize errors")?;
        let warnings = serde_json::to_string(&session.warnings).context("serialize warnings")?;

        let result = sqlx::query(
            r#"
            UPDATE linking_sessions SET
                status = ?, phase = ?, progress = ?, current_batch = ?,
                total_batches = ?, images_scanned = ?, links_created = ?,
                candidates_created = ?, images_skipped = ?, errors_count = ?,
                exact_matches = ?, normalized_matches = ?, padded_matches = ?,
                processing_rate = ?, eta_seconds = ?, errors = ?, warnings = ?,
                scan_cursor = ?, updated_at = ?, completed_at = ?,
                duration_seconds = ?
            WHERE id = ? AND status = 'Running'
            "#,
        )
        .bind(session.status)
        .bind(session.phase)
        .bind(session.progress)
        .bind(session.current_batch)
        .bind(session.total_batches)
        .bind(session.images_scanned)
        .bind(session.links_created)
        .bind(session.candidates_created)
        .bind(session.images_skipped)
        .bind(session.errors_count)
        .bind(session.exact_matches)
        .bind(session.normalized_matches)
        .bind(session.padded_matches)
        .bind(session.processing_rate)
        .bind(session.eta_seconds)
        .bind(errors)
        .bind(warnings)
        .bind(session.scan_cursor)
        .bind(session.updated_at)
        .bind(session.completed_at)
        .bind(session.duration_seconds)
        .bind(&session.id)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{LinkingMode, LinkingPhase};
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::tempdir;

    async fn setup() -> Result<(tempfile::TempDir, SqliteSessionRepository)> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("sessions.db");
        let db = DatabaseConnection::new(&format!("sqlite:{}", db_path.display())).await?;
        db.migrate().await?;
        Ok((temp_dir, SqliteSessionRepository::new(db.pool().clone())))
    }

    #[tokio::test]
    async fn session_round_trips_every_field() -> Result<()> {
        let (_tmp, repo) = setup().await?;
        let mut session =
            LinkingSession::new(LinkingMode::Refresh, serde_json::json!({"max_files": 50}));
        session.enter_phase(LinkingPhase::Matching);
        session.images_scanned = 120;
        session.links_created = 40;
        session.exact_matches = 30;
        session.normalized_matches = 8;
        session.padded_matches = 2;
        session.scan_cursor = Some(119);
        session.record_warning("index collision on 00123");
        repo.create(&session).await?;

        let loaded = repo.get(&session.id).await?.unwrap();
        assert_eq!(loaded.status, SessionStatus::Running);
        assert_eq!(loaded.phase, LinkingPhase::Matching);
        assert_eq!(loaded.mode, LinkingMode::Refresh);
        assert_eq!(loaded.images_scanned, 120);
        assert_eq!(loaded.scan_cursor, Some(119));
        assert_eq!(loaded.warnings, vec!["index collision on 00123"]);
        assert_eq!(loaded.options_snapshot["max_files"], 50);
        Ok(())
    }

    #[tokio::test]
    async fn pause_and_resume_transitions_are_enforced() -> Result<()> {
        let (_tmp, repo) = setup().await?;
        let session = LinkingSession::new(LinkingMode::Standard, serde_json::json!({}));
        repo.create(&session).await?;

        repo.set_status(&session.id, SessionStatus::Paused).await?;
        // Paused -> Failed is not legal.
        assert!(
            repo.set_status(&session.id, SessionStatus::Failed)
                .await
                .is_err()
        );
        repo.set_status(&session.id, SessionStatus::Running).await?;
        repo.set_status(&session.id, SessionStatus::Completed)
            .await?;
        // Terminal states reject everything.
        assert!(
            repo.set_status(&session.id, SessionStatus::Running)
                .await
                .is_err()
        );
        Ok(())
    }

    #[tokio::test]
    async fn save_cannot_clobber_an_external_pause() -> Result<()> {
        let (_tmp, repo) = setup().await?;
        let mut session = LinkingSession::new(LinkingMode::Standard, serde_json::json!({}));
        repo.create(&session).await?;

        // An operator pauses while the orchestrator holds a Running copy.
        repo.set_status(&session.id, SessionStatus::Paused).await?;
        session.images_scanned = 500;
        repo.save(&session).await?;

        let loaded = repo.get(&session.id).await?.unwrap();
        assert_eq!(loaded.status, SessionStatus::Paused);
        assert_eq!(loaded.images_scanned, 500);
        Ok(())
    }

    #[tokio::test]
    async fn finish_loses_the_race_to_a_pause() -> Result<()> {
        let (_tmp, repo) = setup().await?;
        let mut session = LinkingSession::new(LinkingMode::Standard, serde_json::json!({}));
        repo.create(&session).await?;
        repo.set_status(&session.id, SessionStatus::Paused).await?;

        session.finish(SessionStatus::Completed);
        assert!(!repo.finish(&session).await?);

        let loaded = repo.get(&session.id).await?.unwrap();
        assert_eq!(loaded.status, SessionStatus::Paused);
        Ok(())
    }

    #[tokio::test]
    async fn finish_stamps_terminal_state() -> Result<()> {
        let (_tmp, repo) = setup().await?;
        let mut session = LinkingSession::new(LinkingMode::Audit, serde_json::json!({}));
        repo.create(&session).await?;

        session.links_created = 10;
        session.finish(SessionStatus::Completed);
        assert!(repo.finish(&session).await?);

        let loaded = repo.get(&session.id).await?.unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
        assert_eq!(loaded.phase, LinkingPhase::Completed);
        assert_eq!(loaded.progress, 100.0);
        assert!(loaded.completed_at.is_some());
        assert!(loaded.duration_seconds.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn list_recent_returns_newest_first() -> Result<()> {
        let (_tmp, repo) = setup().await?;
        let mut older = LinkingSession::new(LinkingMode::Standard, serde_json::json!({}));
        older.started_at = older.started_at - chrono::Duration::minutes(5);
        repo.create(&older).await?;
        let newer = LinkingSession::new(LinkingMode::Standard, serde_json::json!({}));
        repo.create(&newer).await?;

        let sessions = repo.list_recent(10).await?;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, newer.id);
        assert_eq!(sessions[1].id, older.id);

        let limited = repo.list_recent(1).await?;
        assert_eq!(limited.len(), 1);
        Ok(())
    }
}
