//! SQLite pool construction and schema migration.
//!
//! The schema is small enough to live here as plain DDL; `migrate` is
//! idempotent and safe to run at every startup.

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;

use crate::infrastructure::config::defaults;

/// Everything the pipeline persists, one statement per table plus the
/// lookup indexes. `image_url UNIQUE` on `product_images` is what makes
/// re-runs and concurrent writers safe.
const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY,
        sku TEXT NOT NULL,
        name TEXT,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS product_images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_id INTEGER NOT NULL,
        image_url TEXT NOT NULL UNIQUE,
        alt_text TEXT,
        is_primary BOOLEAN NOT NULL DEFAULT 0,
        sort_order INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'active',
        match_confidence INTEGER,
        match_metadata TEXT,
        auto_matched BOOLEAN NOT NULL DEFAULT 0,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (product_id) REFERENCES products (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS image_match_candidates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_id INTEGER NOT NULL,
        image_url TEXT NOT NULL,
        match_confidence INTEGER NOT NULL,
        extracted_sku TEXT NOT NULL,
        source_filename TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        session_id TEXT NOT NULL,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (product_id, image_url),
        FOREIGN KEY (product_id) REFERENCES products (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS linking_sessions (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        phase TEXT NOT NULL,
        mode TEXT NOT NULL,
        progress REAL NOT NULL DEFAULT 0,
        current_batch INTEGER NOT NULL DEFAULT 0,
        total_batches INTEGER NOT NULL DEFAULT 0,
        images_scanned INTEGER NOT NULL DEFAULT 0,
        links_created INTEGER NOT NULL DEFAULT 0,
        candidates_created INTEGER NOT NULL DEFAULT 0,
        images_skipped INTEGER NOT NULL DEFAULT 0,
        errors_count INTEGER NOT NULL DEFAULT 0,
        exact_matches INTEGER NOT NULL DEFAULT 0,
        normalized_matches INTEGER NOT NULL DEFAULT 0,
        padded_matches INTEGER NOT NULL DEFAULT 0,
        processing_rate REAL NOT NULL DEFAULT 0,
        eta_seconds INTEGER,
        errors TEXT NOT NULL DEFAULT '[]',
        warnings TEXT NOT NULL DEFAULT '[]',
        options_snapshot TEXT NOT NULL DEFAULT '{}',
        scan_cursor INTEGER,
        started_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL,
        completed_at DATETIME,
        duration_seconds INTEGER
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_products_sku ON products (sku);
    CREATE INDEX IF NOT EXISTS idx_product_images_product_id ON product_images (product_id);
    CREATE INDEX IF NOT EXISTS idx_candidates_session_id ON image_match_candidates (session_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_status ON linking_sessions (status);
    "#,
];

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_pool_size(database_url, defaults::DB_MAX_CONNECTIONS).await
    }

    pub async fn with_pool_size(database_url: &str, max_connections: u32) -> Result<Self> {
        // SQLite creates missing files but not missing directories.
        let file = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);
        if file != ":memory:" {
            if let Some(parent) = Path::new(file).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        debug!("Opened SQLite pool ({} connections max)", max_connections);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema is current");
        Ok(())
    }
}
