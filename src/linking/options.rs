//! Tunables for one linking run

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::LinkingError;
use crate::domain::extraction::ExtractorOptions;
use crate::domain::session::{LinkingMode, LinkingSession};
use crate::infrastructure::config::{defaults, AppConfig};
use crate::infrastructure::storage_scanner::ScanOptions;

/// Everything one run can be tuned with.
///
/// Serialized onto the session row as `options_snapshot`, so a finished run
/// records exactly what it ran with. Missing fields in an old snapshot fall
/// back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingOptions {
    pub mode: LinkingMode,

    /// Paused session to continue; required when `mode` is resume
    pub session_id: Option<String>,

    /// Bucket override; the config bucket applies when unset
    pub bucket_name: Option<String>,

    /// Folder to scan, bucket root when unset
    pub scan_path: Option<String>,

    /// Descend into subfolders instead of scanning a single folder
    pub scan_all_folders: bool,

    pub max_files: u32,

    /// Minimum final confidence for a direct link
    pub confidence_threshold: u8,

    /// Minimum final confidence for a review candidate
    pub candidate_threshold: u8,

    /// Accept only exact SKU resolutions; normalized and padded hits are
    /// treated as misses
    pub strict_sku_matching: bool,

    /// Split `12345.67890.jpg` style names into several SKU candidates
    pub process_multi_sku: bool,

    /// Accepted for forward compatibility, currently has no effect
    pub enable_fuzzy_matching: bool,

    /// Skip products that already have at least one image
    pub skip_existing: bool,

    /// Mark the first link of a product as its primary image
    pub auto_set_primary: bool,

    pub max_images_per_product: u32,

    /// Records accumulated before the writer task flushes a batch
    pub persist_batch_size: usize,

    pub min_sku_length: usize,
    pub max_sku_length: usize,

    /// Extraction candidates below this confidence are discarded
    pub min_extraction_confidence: u8,

    pub scan_page_size: u32,
    pub scan_retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for LinkingOptions {
    fn default() -> Self {
        Self {
            mode: LinkingMode::Standard,
            session_id: None,
            bucket_name: None,
            scan_path: None,
            scan_all_folders: true,
            max_files: defaults::MAX_FILES,
            confidence_threshold: defaults::CONFIDENCE_THRESHOLD,
            candidate_threshold: defaults::CANDIDATE_THRESHOLD,
            strict_sku_matching: false,
            process_multi_sku: true,
            enable_fuzzy_matching: false,
            skip_existing: defaults::SKIP_EXISTING,
            auto_set_primary: defaults::AUTO_SET_PRIMARY,
            max_images_per_product: defaults::MAX_IMAGES_PER_PRODUCT,
            persist_batch_size: defaults::PERSIST_BATCH_SIZE,
            min_sku_length: defaults::MIN_SKU_LENGTH,
            max_sku_length: defaults::MAX_SKU_LENGTH,
            min_extraction_confidence: defaults::MIN_EXTRACTION_CONFIDENCE,
            scan_page_size: defaults::SCAN_PAGE_SIZE,
            scan_retry_attempts: defaults::SCAN_RETRY_ATTEMPTS,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
        }
    }
}

impl LinkingOptions {
    /// Seed run options from the persisted configuration. CLI flags are
    /// applied on top of this.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_files: config.linking.max_files,
            confidence_threshold: config.linking.confidence_threshold,
            candidate_threshold: config.linking.candidate_threshold,
            skip_existing: config.linking.skip_existing,
            auto_set_primary: config.linking.auto_set_primary,
            max_images_per_product: config.linking.max_images_per_product,
            persist_batch_size: config.linking.persist_batch_size,
            min_sku_length: config.linking.min_sku_length,
            max_sku_length: config.linking.max_sku_length,
            min_extraction_confidence: config.linking.min_extraction_confidence,
            scan_page_size: config.storage.page_size,
            scan_retry_attempts: config.linking.scan_retry_attempts,
            retry_delay_ms: config.linking.retry_delay_ms,
            ..Self::default()
        }
    }

    /// Rebuild the options a paused session ran with from its snapshot.
    /// The scan cursor is only meaningful against those options, so a
    /// resume runs with them rather than with whatever the resuming
    /// process happens to be configured with.
    pub fn restored_for_resume(session: &LinkingSession) -> Self {
        let mut options: Self = serde_json::from_value(session.options_snapshot.clone())
            .unwrap_or_else(|e| {
                warn!(
                    "Options snapshot of session {} is unreadable ({}), using defaults",
                    session.id, e
                );
                Self::default()
            });
        options.mode = LinkingMode::Resume;
        options.session_id = Some(session.id.clone());
        options
    }

    pub fn validate(&self) -> Result<(), LinkingError> {
        if self.confidence_threshold > 100 || self.candidate_threshold > 100 {
            return Err(LinkingError::Configuration(
                "thresholds are percentages between 0 and 100".to_string(),
            ));
        }
        if self.candidate_threshold > self.confidence_threshold {
            return Err(LinkingError::Configuration(format!(
                "candidate threshold {} is above the confidence threshold {}",
                self.candidate_threshold, self.confidence_threshold
            )));
        }
        if self.max_images_per_product == 0 {
            return Err(LinkingError::Configuration(
                "max images per product must be at least 1".to_string(),
            ));
        }
        if self.persist_batch_size == 0 {
            return Err(LinkingError::Configuration(
                "persist batch size must be at least 1".to_string(),
            ));
        }
        if self.max_files == 0 {
            return Err(LinkingError::Configuration(
                "max files must be at least 1".to_string(),
            ));
        }
        if self.min_sku_length == 0 || self.min_sku_length > self.max_sku_length {
            return Err(LinkingError::Configuration(format!(
                "SKU length bounds {}..{} are not usable",
                self.min_sku_length, self.max_sku_length
            )));
        }
        if self.mode == LinkingMode::Resume && self.session_id.is_none() {
            return Err(LinkingError::Configuration(
                "resume mode requires a session id".to_string(),
            ));
        }
        Ok(())
    }

    /// The options row stored on the session, never fails.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Extraction settings implied by these options. Path extraction only
    /// pays off when folder names carry SKUs, so it follows the recursive
    /// scan flag.
    pub fn extractor_options(&self) -> ExtractorOptions {
        ExtractorOptions {
            min_sku_length: self.min_sku_length,
            max_sku_length: self.max_sku_length,
            min_confidence: self.min_extraction_confidence,
            enable_multi_sku: self.process_multi_sku,
            enable_path_extraction: self.scan_all_folders,
            ..ExtractorOptions::default()
        }
    }

    /// Scan settings implied by these options.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            root_prefix: self.scan_path.clone().unwrap_or_default(),
            recurse: self.scan_all_folders,
            max_files: self.max_files,
            page_size: self.scan_page_size,
            retry_attempts: self.scan_retry_attempts,
            retry_delay_ms: self.retry_delay_ms,
            ..ScanOptions::default()
        }
    }
}
