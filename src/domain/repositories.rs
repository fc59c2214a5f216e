//! Repository interfaces for the linking pipeline
//!
//! Trait seams between the orchestrator and the relational store. All
//! implementations must be safe to share across tasks.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::domain::product::{ImageCandidate, Product, ProductImage};
use crate::domain::session::{LinkingSession, SessionStatus};

/// Snapshot of the link state the matching phase classifies against.
/// Loaded once up front and then maintained synchronously in memory as
/// links are emitted, so classification never races its own output.
#[derive(Debug, Default, Clone)]
pub struct ExistingLinks {
    /// Every image URL that already has a link row.
    pub linked_urls: HashSet<String>,
    /// Link count per product, for the per-product cap.
    pub images_per_product: HashMap<i64, u32>,
    /// Products that already have a primary image.
    pub products_with_primary: HashSet<i64>,
}

impl ExistingLinks {
    pub fn image_count(&self, product_id: i64) -> u32 {
        self.images_per_product.get(&product_id).copied().unwrap_or(0)
    }

    /// Record an emitted link so later files in the same run see it.
    pub fn note_link(&mut self, product_id: i64, image_url: &str, is_primary: bool) {
        self.linked_urls.insert(image_url.to_string());
        *self.images_per_product.entry(product_id).or_insert(0) += 1;
        if is_primary {
            self.products_with_primary.insert(product_id);
        }
    }
}

/// Outcome of one persisted batch; unique-key skips are expected control
/// flow, anything else lands in `errors` without failing the batch.
#[derive(Debug, Default, Clone)]
pub struct BatchOutcome {
    pub inserted: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

impl BatchOutcome {
    pub fn merge(&mut self, other: BatchOutcome) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

#[async_trait]
pub trait ProductReader: Send + Sync {
    /// Full catalog; the SKU index filters inactive rows itself.
    async fn all_products(&self) -> Result<Vec<Product>>;
}

#[async_trait]
pub trait ImageLinkStore: Send + Sync {
    async fn existing_links(&self) -> Result<ExistingLinks>;
    async fn insert_links(&self, links: &[ProductImage]) -> Result<BatchOutcome>;
    async fn insert_candidates(&self, candidates: &[ImageCandidate]) -> Result<BatchOutcome>;
    /// Refresh pre-step: remove pipeline-created links, keep curated ones.
    /// Returns how many rows were deleted.
    async fn delete_auto_matched(&self) -> Result<u64>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &LinkingSession) -> Result<()>;
    /// Progress update touching every column except `status`, so an
    /// externally requested pause can never be overwritten by a counter
    /// write racing it. Status changes go through `set_status`/`finish`.
    async fn save(&self, session: &LinkingSession) -> Result<()>;
    async fn get(&self, session_id: &str) -> Result<Option<LinkingSession>>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<LinkingSession>>;
    /// Guarded status write: fails without touching the row when the
    /// transition is not legal from the currently persisted status.
    async fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<()>;
    /// Terminal write (Completed/Failed) guarded on the row still being
    /// Running. Returns false when a concurrent pause won the race, in
    /// which case the caller must park instead of finishing.
    async fn finish(&self, session: &LinkingSession) -> Result<bool>;
}
