//! Repository implementation for image links and review candidates
//!
//! Batches are written all-or-nothing first; when a batch trips a unique
//! constraint it is replayed per record so one duplicate cannot sink the
//! other 499. Duplicate keys are expected control flow (a re-run seeing its
//! own output), everything else is collected per record.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::debug;

use crate::domain::product::{ImageCandidate, ProductImage};
use crate::domain::repositories::{BatchOutcome, ExistingLinks, ImageLinkStore};

const INSERT_LINK_SQL: &str = r#"
    INSERT INTO product_images
    (product_id, image_url, alt_text, is_primary, sort_order, status,
     match_confidence, match_metadata, auto_matched, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const INSERT_CANDIDATE_SQL: &str = r#"
    INSERT INTO image_match_candidates
    (product_id, image_url, match_confidence, extracted_sku, source_filename,
     status, session_id, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn link_query<'q>(
    link: &'q ProductImage,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let metadata_json = link
        .match_metadata
        .as_ref()
        .and_then(|m| serde_json::to_string(m).ok());
    sqlx::query(INSERT_LINK_SQL)
        .bind(link.product_id)
        .bind(&link.image_url)
        .bind(&link.alt_text)
        .bind(link.is_primary)
        .bind(link.sort_order)
        .bind(&link.status)
        .bind(link.match_confidence)
        .bind(metadata_json)
        .bind(link.auto_matched)
        .bind(link.created_at)
}

fn candidate_query<'q>(
    candidate: &'q ImageCandidate,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    sqlx::query(INSERT_CANDIDATE_SQL)
        .bind(candidate.product_id)
        .bind(&candidate.image_url)
        .bind(candidate.match_confidence)
        .bind(&candidate.extracted_sku)
        .bind(&candidate.source_filename)
        .bind(&candidate.status)
        .bind(&candidate.session_id)
        .bind(candidate.created_at)
}

#[derive(Clone)]
pub struct SqliteImageLinkRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteImageLinkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn insert_links_tx(&self, links: &[ProductImage]) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;
        for link in links {
            link_query(link).execute(&mut *tx).await?;
        }
        tx.commit().await
    }

    async fn insert_links_each(&self, links: &[ProductImage]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for link in links {
            match link_query(link).execute(&*self.pool).await {
                Ok(_) => outcome.inserted += 1,
                Err(e) if is_unique_violation(&e) => outcome.skipped += 1,
                Err(e) => outcome.errors.push(format!(
                    "link {} -> product {}: {}",
                    link.image_url, link.product_id, e
                )),
            }
        }
        outcome
    }

    async fn insert_candidates_tx(&self, candidates: &[ImageCandidate]) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;
        for candidate in candidates {
            candidate_query(candidate).execute(&mut *tx).await?;
        }
        tx.commit().await
    }

    async fn insert_candidates_each(&self, candidates: &[ImageCandidate]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for candidate in candidates {
            match candidate_query(candidate).execute(&*self.pool).await {
                Ok(_) => outcome.inserted += 1,
                Err(e) if is_unique_violation(&e) => outcome.skipped += 1,
                Err(e) => outcome.errors.push(format!(
                    "candidate {} -> product {}: {}",
                    candidate.image_url, candidate.product_id, e
                )),
            }
        }
        outcome
    }

    pub async fn count_links(&self) -> Result<u32> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM product_images")
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get::<i64, _>("count") as u32)
    }

    pub async fn count_candidates(&self) -> Result<u32> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM image_match_candidates")
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get::<i64, _>("count") as u32)
    }
}

#[async_trait]
impl ImageLinkStore for SqliteImageLinkRepository {
    async fn existing_links(&self) -> Result<ExistingLinks> {
        let rows = sqlx::query("SELECT product_id, image_url, is_primary FROM product_images")
            .fetch_all(&*self.pool)
            .await?;

        let mut existing = ExistingLinks::default();
        for row in &rows {
            existing.note_link(
                row.get("product_id"),
                row.get::<String, _>("image_url").as_str(),
                row.get("is_primary"),
            );
        }
        Ok(existing)
    }

    async fn insert_links(&self, links: &[ProductImage]) -> Result<BatchOutcome> {
        if links.is_empty() {
            return Ok(BatchOutcome::default());
        }
        match self.insert_links_tx(links).await {
            Ok(()) => Ok(BatchOutcome {
                inserted: links.len() as u32,
                ..Default::default()
            }),
            Err(e) if is_unique_violation(&e) => {
                debug!(
                    batch = links.len(),
                    "link batch hit a unique constraint, replaying per record"
                );
                Ok(self.insert_links_each(links).await)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_candidates(&self, candidates: &[ImageCandidate]) -> Result<BatchOutcome> {
        if candidates.is_empty() {
            return Ok(BatchOutcome::default());
        }
        match self.insert_candidates_tx(candidates).await {
            Ok(()) => Ok(BatchOutcome {
                inserted: candidates.len() as u32,
                ..Default::default()
            }),
            Err(e) if is_unique_violation(&e) => {
                debug!(
                    batch = candidates.len(),
                    "candidate batch hit a unique constraint, replaying per record"
                );
                Ok(self.insert_candidates_each(candidates).await)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_auto_matched(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM product_images WHERE auto_matched = 1")
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
