//! Repository implementation for product catalog access
//!
//! The linking pipeline only reads the catalog; writes exist for seeding
//! and for tests exercising the full pipeline against a real database.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::domain::product::Product;
use crate::domain::repositories::ProductReader;

#[derive(Clone)]
pub struct SqliteProductRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Insert or update one catalog row.
    pub async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO products
            (id, sku, name, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_products(&self) -> Result<u32> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM products")
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get::<i64, _>("count") as u32)
    }
}

#[async_trait]
impl ProductReader for SqliteProductRepository {
    async fn all_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, sku, name, is_active, created_at, updated_at FROM products ORDER BY id",
        )
        .fetch_all(&*self.pool)
        .await?;

        let products = rows
            .iter()
            .map(|row| Product {
                id: row.get("id"),
                sku: row.get("sku"),
                name: row.get("name"),
                is_active: row.get("is_active"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect();

        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::tempdir;

    #[tokio::test]
    async fn products_round_trip() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("products.db");
        let db = DatabaseConnection::new(&format!("sqlite:{}", db_path.display())).await?;
        db.migrate().await?;

        let repo = SqliteProductRepository::new(db.pool().clone());
        let mut product = Product::new(445033, "445033");
        product.name = Some("Widget".to_string());
        repo.upsert_product(&product).await?;

        let mut inactive = Product::new(2, "999999");
        inactive.is_active = false;
        repo.upsert_product(&inactive).await?;

        let all = repo.all_products().await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, 2);
        assert_eq!(all[1].sku, "445033");
        assert!(all[1].is_active);
        assert!(!all[0].is_active);
        assert_eq!(repo.count_products().await?, 2);
        Ok(())
    }
}
