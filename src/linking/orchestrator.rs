//! Run orchestration
//!
//! One orchestrator drives one session through its phases: load the
//! catalog, load existing links, scan the bucket, classify every file and
//! finalize. Pausing is cooperative: an in-process watch flag is checked at
//! the top of the per-file loop, and the persisted status is polled at a
//! bounded cadence so out-of-process pauses are honored too.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::batch_writer::{BatchWriter, WriteRecord, WriterReport};
use super::options::LinkingOptions;
use super::LinkingError;
use crate::domain::extraction::SkuExtractor;
use crate::domain::product::{ImageCandidate, MatchMetadata, ProductImage};
use crate::domain::repositories::{ExistingLinks, ImageLinkStore, ProductReader, SessionStore};
use crate::domain::session::{LinkingMode, LinkingPhase, LinkingSession, SessionStatus};
use crate::domain::sku_index::{match_confidence, MatchType, ProductSkuIndex};
use crate::infrastructure::config::defaults;
use crate::infrastructure::storage::{ObjectStorage, StorageError};
use crate::infrastructure::storage_scanner::{ImageFile, StorageScanner};

/// What classification decided for one scanned file.
#[derive(Debug)]
enum Classification {
    Link(ProductImage),
    Candidate(ImageCandidate),
    Skip(SkipReason),
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    ProductHasImages,
    ProductAtCap,
    UrlAlreadyLinked,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::ProductHasImages => "product already has images",
            SkipReason::ProductAtCap => "product reached its image cap",
            SkipReason::UrlAlreadyLinked => "image URL already linked",
        };
        f.write_str(text)
    }
}

enum RunOutcome {
    Completed,
    Paused,
}

enum StopCause {
    Paused { next_file: usize },
    Cancelled,
}

/// Drives one linking session from start to a terminal state.
pub struct LinkingOrchestrator {
    products: Arc<dyn ProductReader>,
    store: Arc<dyn ImageLinkStore>,
    sessions: Arc<dyn SessionStore>,
    storage: Arc<dyn ObjectStorage>,
    options: LinkingOptions,
    pause: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl LinkingOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        products: Arc<dyn ProductReader>,
        store: Arc<dyn ImageLinkStore>,
        sessions: Arc<dyn SessionStore>,
        storage: Arc<dyn ObjectStorage>,
        options: LinkingOptions,
        pause: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            products,
            store,
            sessions,
            storage,
            options,
            pause,
            cancel,
        }
    }

    /// Drive the run to Completed, Paused or Failed and return the final
    /// session snapshot. Failures are stamped on the persisted row before
    /// the error is returned.
    pub async fn run(mut self) -> Result<LinkingSession, LinkingError> {
        let session = self.open_session().await?;
        self.run_opened(session).await
    }

    /// Finish a run whose session row already exists. Split from [`run`] so
    /// a caller can learn the session id before the long part starts.
    pub async fn run_opened(
        mut self,
        mut session: LinkingSession,
    ) -> Result<LinkingSession, LinkingError> {
        match self.execute(&mut session).await {
            Ok(RunOutcome::Completed) => {
                session.finish(SessionStatus::Completed);
                let finished = self.sessions.finish(&session).await?;
                if !finished {
                    // a pause won the race at the very end; every file was
                    // processed, so a resume will complete immediately
                    warn!(
                        "⚠️ Session {} was paused externally right at completion",
                        session.id
                    );
                    session.status = SessionStatus::Paused;
                    self.sessions.save(&session).await?;
                }
                info!(
                    "🎉 Session {} completed: {} links, {} candidates, {} skipped, {} errors",
                    session.id,
                    session.links_created,
                    session.candidates_created,
                    session.images_skipped,
                    session.errors_count
                );
                Ok(session)
            }
            Ok(RunOutcome::Paused) => {
                info!(
                    "⏸️ Session {} paused at scan cursor {:?}",
                    session.id, session.scan_cursor
                );
                Ok(session)
            }
            Err(e) => {
                error!("❌ Session {} failed: {e}", session.id);
                session.record_error(e.to_string());
                session.finish(SessionStatus::Failed);
                if let Err(save_err) = self.sessions.finish(&session).await {
                    warn!(
                        "⚠️ Could not persist failure state for session {}: {save_err}",
                        session.id
                    );
                }
                Err(e)
            }
        }
    }

    /// Validate the options, then create a fresh session row or reopen a
    /// paused one for resume. Resume swaps in the options the session row
    /// recorded: the scan cursor is only valid against those.
    pub async fn open_session(&mut self) -> Result<LinkingSession, LinkingError> {
        self.options.validate()?;
        if self.options.mode == LinkingMode::Resume {
            let id = self
                .options
                .session_id
                .clone()
                .ok_or_else(|| {
                    LinkingError::Configuration("resume mode requires a session id".to_string())
                })?;
            let mut session = self
                .sessions
                .get(&id)
                .await?
                .ok_or_else(|| LinkingError::SessionNotFound(id.clone()))?;
            if session.status != SessionStatus::Paused {
                return Err(LinkingError::SessionState {
                    id,
                    actual: session.status.to_string(),
                    expected: SessionStatus::Paused.to_string(),
                });
            }
            self.sessions.set_status(&id, SessionStatus::Running).await?;
            session.status = SessionStatus::Running;
            self.options = LinkingOptions::restored_for_resume(&session);
            info!(
                "▶️ Resuming session {} at scan cursor {:?}",
                session.id, session.scan_cursor
            );
            Ok(session)
        } else {
            let session = LinkingSession::new(self.options.mode, self.options.snapshot());
            self.sessions.create(&session).await?;
            info!("🚀 Starting {} session {}", session.mode, session.id);
            Ok(session)
        }
    }

    async fn execute(&mut self, session: &mut LinkingSession) -> Result<RunOutcome, LinkingError> {
        session.enter_phase(LinkingPhase::LoadingProducts);
        self.persist(session).await?;

        let products = self.products.all_products().await?;
        info!("📦 Loaded {} products", products.len());

        let index = ProductSkuIndex::build(&products);
        info!(
            "🗂️ SKU index ready: {} keys, {} collisions",
            index.len(),
            index.collisions().len()
        );
        for collision in index.collisions() {
            session.record_warning(format!(
                "SKU key '{}' ({}) kept product {}, ignored product {}",
                collision.key,
                collision.kind.as_str(),
                collision.kept_product_id,
                collision.rejected_product_id
            ));
        }

        session.enter_phase(LinkingPhase::LoadingExistingLinks);
        self.persist(session).await?;

        if self.options.mode == LinkingMode::Refresh {
            let removed = self.store.delete_auto_matched().await?;
            warn!("🧹 Refresh removed {} auto-matched links", removed);
            session.record_warning(format!("refresh removed {removed} auto-matched links"));
        }

        let mut guards = self.store.existing_links().await?;
        info!("🔗 {} existing image links loaded", guards.linked_urls.len());

        session.enter_phase(LinkingPhase::Scanning);
        self.persist(session).await?;

        let scanner = StorageScanner::new(self.storage.clone(), self.options.scan_options());
        let scan = scanner.scan(&self.cancel).await.map_err(|e| match e {
            StorageError::Cancelled => LinkingError::Cancelled,
            other => LinkingError::Storage(other),
        })?;
        for warning in &scan.warnings {
            session.record_warning(warning.clone());
        }
        if scan.truncated {
            session.record_warning(format!(
                "scan stopped at the {} file cap",
                self.options.max_files
            ));
        }
        session.images_scanned = scan.files.len() as u32;

        session.enter_phase(LinkingPhase::Matching);
        let total = scan.files.len() as u64;
        session.total_batches = scan
            .files
            .len()
            .div_ceil(self.options.persist_batch_size) as u32;
        self.persist(session).await?;

        let start_index = match (self.options.mode, session.scan_cursor) {
            (LinkingMode::Resume, Some(cursor)) => {
                (cursor as usize + 1).min(scan.files.len())
            }
            _ => 0,
        };
        if start_index > 0 {
            info!("⏭️ Skipping {} files processed before the pause", start_index);
        }

        let extractor = SkuExtractor::new(self.options.extractor_options());
        let writer = if self.options.mode.is_dry_run() {
            info!("🔍 Audit mode: classification only, nothing will be written");
            None
        } else {
            Some(BatchWriter::spawn(
                self.store.clone(),
                self.options.persist_batch_size,
                defaults::WRITER_CHANNEL_CAPACITY,
            ))
        };

        let mut processed = start_index as u64;
        let mut stop: Option<StopCause> = None;

        for (position, file) in scan.files.iter().enumerate().skip(start_index) {
            if self.cancel.is_cancelled() {
                stop = Some(StopCause::Cancelled);
                break;
            }
            if self.pause_requested(&session.id, position).await? {
                stop = Some(StopCause::Paused {
                    next_file: position,
                });
                break;
            }

            match classify_file(&extractor, &index, &self.options, &guards, file, &session.id) {
                Classification::Link(link) => {
                    guards.note_link(link.product_id, &link.image_url, link.is_primary);
                    session.links_created += 1;
                    if let Some(metadata) = &link.match_metadata {
                        session.bump_match_counter(metadata.match_type);
                    }
                    debug!(
                        "🔗 {} -> product {} at {}%",
                        file.name,
                        link.product_id,
                        link.match_confidence.unwrap_or_default()
                    );
                    if let Some(writer) = &writer {
                        writer.submit(WriteRecord::Link(link)).await?;
                    }
                }
                Classification::Candidate(candidate) => {
                    session.candidates_created += 1;
                    debug!(
                        "🤔 {} -> candidate for product {} at {}%",
                        file.name, candidate.product_id, candidate.match_confidence
                    );
                    if let Some(writer) = &writer {
                        writer.submit(WriteRecord::Candidate(candidate)).await?;
                    }
                }
                Classification::Skip(reason) => {
                    session.images_skipped += 1;
                    debug!("⏭️ {}: {}", file.name, reason);
                }
                Classification::Miss => {
                    debug!("🚫 {}: no product matched", file.name);
                }
            }

            processed += 1;
            if processed % defaults::PROGRESS_UPDATE_ITEMS as u64 == 0 {
                session.current_batch =
                    ((processed.saturating_sub(1) / self.options.persist_batch_size as u64) + 1)
                        as u32;
                session.update_matching_progress(processed, total);
                self.persist(session).await?;
            }
        }

        session.update_matching_progress(processed, total);

        match stop {
            Some(StopCause::Cancelled) => {
                if let Some(writer) = writer {
                    let report = writer.finish().await?;
                    reconcile(session, &report);
                }
                self.persist(session).await?;
                Err(LinkingError::Cancelled)
            }
            Some(StopCause::Paused { next_file }) => {
                if let Some(writer) = writer {
                    let report = writer.finish().await?;
                    reconcile(session, &report);
                }
                // next_file has not been processed, the cursor points at the
                // last file that has
                session.scan_cursor = if next_file == 0 {
                    None
                } else {
                    Some(next_file as u32 - 1)
                };
                session.status = SessionStatus::Paused;
                self.persist(session).await?;
                self.ensure_persisted_pause(&session.id).await?;
                Ok(RunOutcome::Paused)
            }
            None => {
                session.enter_phase(LinkingPhase::Finalizing);
                // a completed run leaves no cursor behind
                session.scan_cursor = None;
                self.persist(session).await?;
                if let Some(writer) = writer {
                    let report = writer.finish().await?;
                    reconcile(session, &report);
                }
                Ok(RunOutcome::Completed)
            }
        }
    }

    /// True when this run should stop and leave a Paused session behind.
    async fn pause_requested(
        &self,
        session_id: &str,
        position: usize,
    ) -> Result<bool, LinkingError> {
        if *self.pause.borrow() {
            return Ok(true);
        }
        if position > 0 && position % defaults::PAUSE_POLL_ITEMS as usize == 0 {
            if let Some(persisted) = self.sessions.get(session_id).await? {
                if persisted.status == SessionStatus::Paused {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Make sure the persisted row says Paused when the request came in via
    /// the in-process watch flag only.
    async fn ensure_persisted_pause(&self, session_id: &str) -> Result<(), LinkingError> {
        match self.sessions.get(session_id).await? {
            Some(persisted) if persisted.status == SessionStatus::Running => {
                if let Err(e) = self
                    .sessions
                    .set_status(session_id, SessionStatus::Paused)
                    .await
                {
                    debug!("Pause status already settled elsewhere: {e}");
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn persist(&self, session: &LinkingSession) -> Result<(), LinkingError> {
        self.sessions.save(session).await?;
        Ok(())
    }
}

/// Fold what the writer actually did back into the session counters.
/// Write-time duplicate skips demote optimistic link counts; per-record
/// errors become session errors.
fn reconcile(session: &mut LinkingSession, report: &WriterReport) {
    if report.links.skipped > 0 {
        session.links_created = session.links_created.saturating_sub(report.links.skipped);
        session.images_skipped += report.links.skipped;
        session.record_warning(format!(
            "{} links already existed and were skipped at write time",
            report.links.skipped
        ));
    }
    if report.candidates.skipped > 0 {
        session.candidates_created = session
            .candidates_created
            .saturating_sub(report.candidates.skipped);
        session.record_warning(format!(
            "{} candidates already existed and were skipped at write time",
            report.candidates.skipped
        ));
    }
    for error in report
        .links
        .errors
        .iter()
        .chain(report.candidates.errors.iter())
    {
        session.record_error(error.clone());
    }
}

/// Decide what to do with one scanned file.
///
/// Pure with respect to the guard sets: callers update them when they
/// accept an emission, never this function.
fn classify_file(
    extractor: &SkuExtractor,
    index: &ProductSkuIndex,
    options: &LinkingOptions,
    guards: &ExistingLinks,
    file: &ImageFile,
    session_id: &str,
) -> Classification {
    let path = if options.scan_all_folders {
        Some(file.full_path.as_str())
    } else {
        None
    };
    let extracted = extractor.extract(&file.name, path);
    if extracted.is_empty() {
        return Classification::Miss;
    }

    // first SKU in descending confidence order that resolves to a product
    let resolved = extracted.iter().find_map(|candidate| {
        index.find_match(&candidate.sku).and_then(|hit| {
            if options.strict_sku_matching && hit.match_type != MatchType::Exact {
                None
            } else {
                Some((candidate, hit))
            }
        })
    });
    let Some((sku, hit)) = resolved else {
        return Classification::Miss;
    };

    if options.skip_existing && guards.image_count(hit.product_id) > 0 {
        return Classification::Skip(SkipReason::ProductHasImages);
    }
    if guards.image_count(hit.product_id) >= options.max_images_per_product {
        return Classification::Skip(SkipReason::ProductAtCap);
    }
    if guards.linked_urls.contains(&file.url) {
        return Classification::Skip(SkipReason::UrlAlreadyLinked);
    }

    let confidence = match_confidence(sku.confidence, hit.match_type);
    if confidence >= options.confidence_threshold {
        let is_primary =
            options.auto_set_primary && !guards.products_with_primary.contains(&hit.product_id);
        let sort_order = guards.image_count(hit.product_id) as i32;
        let metadata = MatchMetadata {
            extracted_sku: sku.sku.clone(),
            source: sku.source,
            match_type: hit.match_type,
            raw_confidence: sku.confidence,
            final_confidence: confidence,
            source_filename: file.name.clone(),
            full_path: file.full_path.clone(),
            session_id: session_id.to_string(),
            matched_at: Utc::now(),
        };
        Classification::Link(ProductImage::auto_linked(
            hit.product_id,
            file.url.clone(),
            is_primary,
            sort_order,
            metadata,
        ))
    } else if confidence >= options.candidate_threshold {
        Classification::Candidate(ImageCandidate::pending(
            hit.product_id,
            file.url.clone(),
            confidence,
            sku.sku.clone(),
            file.name.clone(),
            session_id.to_string(),
        ))
    } else {
        Classification::Miss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::extraction::SkuSource;
    use crate::domain::product::Product;

    fn index_of(skus: &[(i64, &str)]) -> ProductSkuIndex {
        let products: Vec<Product> = skus.iter().map(|(id, sku)| Product::new(*id, sku)).collect();
        ProductSkuIndex::build(&products)
    }

    fn file(name: &str) -> ImageFile {
        ImageFile {
            name: name.to_string(),
            full_path: name.to_string(),
            url: format!("https://cdn.example/{name}"),
        }
    }

    fn classify(
        index: &ProductSkuIndex,
        options: &LinkingOptions,
        guards: &ExistingLinks,
        name: &str,
    ) -> Classification {
        let extractor = SkuExtractor::new(options.extractor_options());
        classify_file(&extractor, index, options, guards, &file(name), "test-session")
    }

    #[test]
    fn exact_filename_becomes_a_primary_link() {
        let index = index_of(&[(1, "445033")]);
        let options = LinkingOptions::default();
        let guards = ExistingLinks::default();

        match classify(&index, &options, &guards, "445033.jpg") {
            Classification::Link(link) => {
                assert_eq!(link.product_id, 1);
                assert_eq!(link.match_confidence, Some(100));
                assert!(link.is_primary);
                assert!(link.auto_matched);
                let metadata = link.match_metadata.unwrap();
                assert_eq!(metadata.source, SkuSource::ExactNumeric);
                assert_eq!(metadata.match_type, MatchType::Exact);
            }
            other => panic!("expected a link, got {other:?}"),
        }
    }

    #[test]
    fn mid_band_confidence_becomes_a_candidate() {
        // "ref445033A" resolves through the loose contextual pattern at 78,
        // inside the candidate band
        let index = index_of(&[(1, "445033")]);
        let options = LinkingOptions::default();
        let guards = ExistingLinks::default();

        match classify(&index, &options, &guards, "ref445033A.jpg") {
            Classification::Candidate(candidate) => {
                assert_eq!(candidate.product_id, 1);
                assert_eq!(candidate.match_confidence, 78);
                assert_eq!(candidate.extracted_sku, "445033");
                assert_eq!(candidate.status, "pending");
            }
            other => panic!("expected a candidate, got {other:?}"),
        }
    }

    #[test]
    fn sub_candidate_confidence_is_a_miss() {
        // a three digit run only surfaces through the fallback at 40
        let index = index_of(&[(1, "123")]);
        let options = LinkingOptions::default();
        let guards = ExistingLinks::default();

        assert!(matches!(
            classify(&index, &options, &guards, "a123b.jpg"),
            Classification::Miss
        ));
    }

    #[test]
    fn unresolvable_names_are_misses() {
        let index = index_of(&[(1, "445033")]);
        let options = LinkingOptions::default();
        let guards = ExistingLinks::default();

        assert!(matches!(
            classify(&index, &options, &guards, "lifestyle_shot.jpg"),
            Classification::Miss
        ));
        assert!(matches!(
            classify(&index, &options, &guards, "999999.jpg"),
            Classification::Miss
        ));
    }

    #[test]
    fn products_with_images_are_skipped_when_configured() {
        let index = index_of(&[(1, "445033")]);
        let options = LinkingOptions::default();
        let mut guards = ExistingLinks::default();
        guards.note_link(1, "https://cdn.example/manual.jpg", false);

        assert!(matches!(
            classify(&index, &options, &guards, "445033.jpg"),
            Classification::Skip(SkipReason::ProductHasImages)
        ));

        let options = LinkingOptions {
            skip_existing: false,
            ..Default::default()
        };
        assert!(matches!(
            classify(&index, &options, &guards, "445033.jpg"),
            Classification::Link(_)
        ));
    }

    #[test]
    fn image_cap_stops_further_links() {
        let index = index_of(&[(1, "445033")]);
        let options = LinkingOptions {
            skip_existing: false,
            max_images_per_product: 2,
            ..Default::default()
        };
        let mut guards = ExistingLinks::default();
        guards.note_link(1, "https://cdn.example/one.jpg", false);
        guards.note_link(1, "https://cdn.example/two.jpg", false);

        assert!(matches!(
            classify(&index, &options, &guards, "445033.jpg"),
            Classification::Skip(SkipReason::ProductAtCap)
        ));
    }

    #[test]
    fn already_linked_urls_are_skipped() {
        let index = index_of(&[(1, "445033")]);
        let options = LinkingOptions {
            skip_existing: false,
            ..Default::default()
        };
        let mut guards = ExistingLinks::default();
        guards
            .linked_urls
            .insert("https://cdn.example/445033.jpg".to_string());

        assert!(matches!(
            classify(&index, &options, &guards, "445033.jpg"),
            Classification::Skip(SkipReason::UrlAlreadyLinked)
        ));
    }

    #[test]
    fn strict_matching_rejects_normalized_resolutions() {
        let index = index_of(&[(1, "00123")]);
        let guards = ExistingLinks::default();

        let relaxed = LinkingOptions::default();
        match classify(&index, &relaxed, &guards, "123.jpg") {
            Classification::Link(link) => {
                assert_eq!(link.match_confidence, Some(95));
                assert_eq!(link.match_metadata.unwrap().match_type, MatchType::Normalized);
            }
            other => panic!("expected a link, got {other:?}"),
        }

        let strict = LinkingOptions {
            strict_sku_matching: true,
            ..Default::default()
        };
        assert!(matches!(
            classify(&index, &strict, &guards, "123.jpg"),
            Classification::Miss
        ));
    }

    #[test]
    fn strict_matching_still_accepts_padded_extraction_hitting_exact_keys() {
        // the extractor synthesizes "0455470" from "455470", which resolves
        // as an exact key even under strict matching
        let index = index_of(&[(1, "0455470")]);
        let strict = LinkingOptions {
            strict_sku_matching: true,
            ..Default::default()
        };
        let guards = ExistingLinks::default();

        match classify(&index, &strict, &guards, "455470.jpg") {
            Classification::Link(link) => {
                let metadata = link.match_metadata.unwrap();
                assert_eq!(metadata.match_type, MatchType::Exact);
                assert_eq!(metadata.extracted_sku, "0455470");
                assert_eq!(metadata.raw_confidence, 92);
            }
            other => panic!("expected a link, got {other:?}"),
        }
    }

    #[test]
    fn first_resolving_sku_wins_in_multi_sku_names() {
        // only the second token of the multi-SKU name exists in the catalog
        let index = index_of(&[(7, "446723")]);
        let options = LinkingOptions::default();
        let guards = ExistingLinks::default();

        match classify(&index, &options, &guards, "445033.446723.png") {
            Classification::Link(link) => {
                assert_eq!(link.product_id, 7);
                let metadata = link.match_metadata.unwrap();
                assert_eq!(metadata.extracted_sku, "446723");
                assert_eq!(metadata.source, SkuSource::MultiSku);
            }
            other => panic!("expected a link, got {other:?}"),
        }
    }

    #[test]
    fn primary_flag_respects_existing_primaries_and_the_option() {
        let index = index_of(&[(1, "445033")]);
        let options = LinkingOptions {
            skip_existing: false,
            ..Default::default()
        };
        let mut guards = ExistingLinks::default();
        guards.products_with_primary.insert(1);

        match classify(&index, &options, &guards, "445033.jpg") {
            Classification::Link(link) => assert!(!link.is_primary),
            other => panic!("expected a link, got {other:?}"),
        }

        let no_primary = LinkingOptions {
            auto_set_primary: false,
            ..Default::default()
        };
        match classify(&index, &no_primary, &ExistingLinks::default(), "445033.jpg") {
            Classification::Link(link) => assert!(!link.is_primary),
            other => panic!("expected a link, got {other:?}"),
        }
    }

    #[test]
    fn reconcile_demotes_write_time_duplicates() {
        let mut session = LinkingSession::new(LinkingMode::Standard, serde_json::json!({}));
        session.links_created = 5;
        session.candidates_created = 2;

        let mut report = WriterReport::default();
        report.links.inserted = 4;
        report.links.skipped = 1;
        report.candidates.inserted = 2;
        report.links.errors.push("insert failed: disk I/O".to_string());

        reconcile(&mut session, &report);

        assert_eq!(session.links_created, 4);
        assert_eq!(session.images_skipped, 1);
        assert_eq!(session.candidates_created, 2);
        assert_eq!(session.errors_count, 1);
        assert_eq!(session.warnings.len(), 1);
    }
}
