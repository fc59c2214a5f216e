use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::extraction::SkuSource;
use super::sku_index::MatchType;

/// Product catalog row as seen by the linking pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(id: i64, sku: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            sku: sku.to_string(),
            name: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persisted image-to-product link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductImage {
    /// None before the row is inserted.
    pub id: Option<i64>,
    pub product_id: i64,
    pub image_url: String,
    pub alt_text: Option<String>,
    pub is_primary: bool,
    pub sort_order: i32,
    pub status: String,
    pub match_confidence: Option<u8>,
    pub match_metadata: Option<MatchMetadata>,
    /// True for links created by the pipeline, false for curated ones.
    pub auto_matched: bool,
    pub created_at: DateTime<Utc>,
}

impl ProductImage {
    /// A link emitted by the matching phase.
    pub fn auto_linked(
        product_id: i64,
        image_url: String,
        is_primary: bool,
        sort_order: i32,
        metadata: MatchMetadata,
    ) -> Self {
        Self {
            id: None,
            product_id,
            image_url,
            alt_text: None,
            is_primary,
            sort_order,
            status: "active".to_string(),
            match_confidence: Some(metadata.final_confidence),
            match_metadata: Some(metadata),
            auto_matched: true,
            created_at: Utc::now(),
        }
    }
}

/// Sub-threshold match parked for manual review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub id: Option<i64>,
    pub product_id: i64,
    pub image_url: String,
    pub match_confidence: u8,
    pub extracted_sku: String,
    pub source_filename: String,
    pub status: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

impl ImageCandidate {
    pub fn pending(
        product_id: i64,
        image_url: String,
        match_confidence: u8,
        extracted_sku: String,
        source_filename: String,
        session_id: String,
    ) -> Self {
        Self {
            id: None,
            product_id,
            image_url,
            match_confidence,
            extracted_sku,
            source_filename,
            status: "pending".to_string(),
            session_id,
            created_at: Utc::now(),
        }
    }
}

/// Audit trail stored alongside each auto-created link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub extracted_sku: String,
    pub source: SkuSource,
    pub match_type: MatchType,
    /// Extractor confidence before the match-type discount.
    pub raw_confidence: u8,
    pub final_confidence: u8,
    pub source_filename: String,
    pub full_path: String,
    pub session_id: String,
    pub matched_at: DateTime<Utc>,
}
