//! Recursive bucket scanner
//!
//! Walks the image bucket folder by folder, paginating each listing until a
//! short page, and flattens everything with an image extension into one
//! order-stable list. Transient listing failures are retried with jitter;
//! a branch that keeps failing is abandoned with a warning while the rest
//! of the scan continues.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::defaults;
use super::storage::{ObjectStorage, StorageEntry, StorageError};
use crate::domain::extraction::has_image_extension;

/// One image found in the bucket.
#[derive(Debug, Clone)]
pub struct ImageFile {
    /// Bare object name, e.g. `445033_front.jpg`
    pub name: String,
    /// Path relative to the bucket root, e.g. `winter/445033_front.jpg`
    pub full_path: String,
    /// Public URL of the object
    pub url: String,
}

/// Scan tuning. `Default` mirrors the config defaults.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Folder to start from, empty for the bucket root
    pub root_prefix: String,
    /// Descend into subfolders (bounded by `max_depth`)
    pub recurse: bool,
    /// Stop collecting once this many images are found
    pub max_files: u32,
    pub page_size: u32,
    pub max_depth: u32,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            root_prefix: String::new(),
            recurse: true,
            max_files: defaults::MAX_FILES,
            page_size: defaults::SCAN_PAGE_SIZE,
            max_depth: defaults::SCAN_MAX_DEPTH,
            retry_attempts: defaults::SCAN_RETRY_ATTEMPTS,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
        }
    }
}

/// Everything a finished scan produced.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Image files in stable listing order
    pub files: Vec<ImageFile>,
    /// Notes about abandoned branches and skipped folders
    pub warnings: Vec<String>,
    /// True when the scan stopped at `max_files`
    pub truncated: bool,
}

#[derive(Default)]
struct ScanState {
    files: Vec<ImageFile>,
    warnings: Vec<String>,
    truncated: bool,
    pages_listed: u32,
}

/// Depth-first scanner over an [`ObjectStorage`] backend.
pub struct StorageScanner {
    storage: Arc<dyn ObjectStorage>,
    options: ScanOptions,
}

impl StorageScanner {
    pub fn new(storage: Arc<dyn ObjectStorage>, options: ScanOptions) -> Self {
        Self { storage, options }
    }

    /// Run the scan to completion.
    ///
    /// Only cancellation surfaces as an error. Listing failures that outlive
    /// the retry budget abandon their branch and are reported as warnings in
    /// the outcome instead.
    pub async fn scan(&self, cancel: &CancellationToken) -> Result<ScanOutcome, StorageError> {
        let root = self.options.root_prefix.trim_matches('/').to_string();
        info!(
            "📂 Scanning storage from '{}' (recurse: {}, max {} files)",
            if root.is_empty() { "<root>" } else { &root },
            self.options.recurse,
            self.options.max_files
        );

        let mut state = ScanState::default();
        self.scan_folder(root, 0, &mut state, cancel).await?;

        info!(
            "✅ Scan finished: {} image files from {} pages, {} warnings{}",
            state.files.len(),
            state.pages_listed,
            state.warnings.len(),
            if state.truncated {
                " (truncated at file cap)"
            } else {
                ""
            }
        );
        Ok(ScanOutcome {
            files: state.files,
            warnings: state.warnings,
            truncated: state.truncated,
        })
    }

    fn scan_folder<'a>(
        &'a self,
        prefix: String,
        depth: u32,
        state: &'a mut ScanState,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + 'a>> {
        Box::pin(async move {
            let mut offset = 0u32;
            loop {
                if state.files.len() as u32 >= self.options.max_files {
                    state.truncated = true;
                    return Ok(());
                }

                let page = match self.list_page_with_retry(&prefix, offset, cancel).await {
                    Ok(page) => page,
                    Err(StorageError::Cancelled) => return Err(StorageError::Cancelled),
                    Err(e) => {
                        warn!(
                            "⚠️ Abandoning scan branch '{}' at offset {}: {}",
                            prefix, offset, e
                        );
                        state.warnings.push(format!(
                            "abandoned folder '{}' at offset {} after {} attempts: {}",
                            prefix,
                            offset,
                            self.options.retry_attempts.max(1),
                            e
                        ));
                        return Ok(());
                    }
                };
                state.pages_listed += 1;
                let page_len = page.len() as u32;

                for entry in page {
                    if state.files.len() as u32 >= self.options.max_files {
                        state.truncated = true;
                        return Ok(());
                    }

                    if entry.is_folder() {
                        if !self.options.recurse {
                            continue;
                        }
                        let child = join_path(&prefix, &entry.name);
                        if depth + 1 > self.options.max_depth {
                            warn!(
                                "⚠️ Folder '{}' is deeper than {} levels, skipping",
                                child, self.options.max_depth
                            );
                            state.warnings.push(format!(
                                "folder '{}' deeper than {} levels was not scanned",
                                child, self.options.max_depth
                            ));
                            continue;
                        }
                        self.scan_folder(child, depth + 1, &mut *state, cancel)
                            .await?;
                    } else if has_image_extension(&entry.name) {
                        let full_path = join_path(&prefix, &entry.name);
                        let url = self.storage.public_url(&full_path);
                        state.files.push(ImageFile {
                            name: entry.name,
                            full_path,
                            url,
                        });
                    } else {
                        debug!("Skipping non-image object '{}'", entry.name);
                    }
                }

                if page_len < self.options.page_size {
                    return Ok(());
                }
                offset += self.options.page_size;
            }
        })
    }

    async fn list_page_with_retry(
        &self,
        prefix: &str,
        offset: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<StorageEntry>, StorageError> {
        let attempts = self.options.retry_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }

            let listed = tokio::select! {
                listed = self.storage.list(prefix, self.options.page_size, offset) => listed,
                _ = cancel.cancelled() => {
                    warn!("🛑 Scan cancelled while listing '{}'", prefix);
                    return Err(StorageError::Cancelled);
                }
            };

            match listed {
                Ok(page) => return Ok(page),
                Err(StorageError::Cancelled) => return Err(StorageError::Cancelled),
                Err(e) => {
                    if attempt >= attempts {
                        return Err(e);
                    }
                    let base = self.options.retry_delay_ms;
                    let jitter = if base >= 10 { fastrand::u64(0..=base / 5) } else { 0 };
                    let delay = base.saturating_add(jitter);
                    warn!(
                        "🔁 Listing '{}' attempt {}/{} failed, retrying in {}ms: {}",
                        prefix, attempt, attempts, delay, e
                    );
                    tokio::select! {
                        _ = sleep(Duration::from_millis(delay)) => {}
                        _ = cancel.cancelled() => return Err(StorageError::Cancelled),
                    }
                }
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
