//! Dedicated persistence task
//!
//! Link and candidate records funnel through a bounded channel into one
//! writer task that flushes whenever a batch fills up. The per-file loop
//! never touches the database directly, and channel backpressure keeps
//! memory bounded when classification outruns SQLite.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::product::{ImageCandidate, ProductImage};
use crate::domain::repositories::{BatchOutcome, ImageLinkStore};

/// One record headed for the database.
#[derive(Debug)]
pub enum WriteRecord {
    Link(ProductImage),
    Candidate(ImageCandidate),
}

/// Totals of everything the writer task persisted, split by record kind.
#[derive(Debug, Default, Clone)]
pub struct WriterReport {
    pub links: BatchOutcome,
    pub candidates: BatchOutcome,
}

enum WriterMessage {
    Record(WriteRecord),
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task.
pub struct BatchWriter {
    tx: mpsc::Sender<WriterMessage>,
    handle: JoinHandle<Result<WriterReport>>,
}

impl BatchWriter {
    /// Spawn the writer task with the given flush size and channel capacity.
    pub fn spawn(
        store: Arc<dyn ImageLinkStore>,
        batch_size: usize,
        channel_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let handle = tokio::spawn(writer_loop(store, rx, batch_size.max(1)));
        Self { tx, handle }
    }

    /// Queue one record, waiting when the channel is full.
    pub async fn submit(&self, record: WriteRecord) -> Result<()> {
        self.tx
            .send(WriterMessage::Record(record))
            .await
            .map_err(|_| anyhow::anyhow!("writer task stopped accepting records"))
    }

    /// Push everything pending to the database and wait until it is there.
    /// Used before persisting a pause so the scan cursor never gets ahead
    /// of the written records.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriterMessage::Flush(ack_tx))
            .await
            .map_err(|_| anyhow::anyhow!("writer task stopped accepting records"))?;
        ack_rx.await.context("writer task dropped the flush ack")
    }

    /// Close the channel, write the remainder and return the totals.
    pub async fn finish(self) -> Result<WriterReport> {
        drop(self.tx);
        self.handle.await.context("writer task panicked")?
    }
}

async fn writer_loop(
    store: Arc<dyn ImageLinkStore>,
    mut rx: mpsc::Receiver<WriterMessage>,
    batch_size: usize,
) -> Result<WriterReport> {
    let mut links: Vec<ProductImage> = Vec::new();
    let mut candidates: Vec<ImageCandidate> = Vec::new();
    let mut report = WriterReport::default();

    while let Some(message) = rx.recv().await {
        match message {
            WriterMessage::Record(WriteRecord::Link(link)) => {
                links.push(link);
                if links.len() >= batch_size {
                    flush_links(store.as_ref(), &mut links, &mut report).await?;
                }
            }
            WriterMessage::Record(WriteRecord::Candidate(candidate)) => {
                candidates.push(candidate);
                if candidates.len() >= batch_size {
                    flush_candidates(store.as_ref(), &mut candidates, &mut report).await?;
                }
            }
            WriterMessage::Flush(ack) => {
                flush_links(store.as_ref(), &mut links, &mut report).await?;
                flush_candidates(store.as_ref(), &mut candidates, &mut report).await?;
                let _ = ack.send(());
            }
        }
    }

    flush_links(store.as_ref(), &mut links, &mut report).await?;
    flush_candidates(store.as_ref(), &mut candidates, &mut report).await?;

    info!(
        "💾 Writer finished: {} links and {} candidates written, {} skipped as duplicates",
        report.links.inserted,
        report.candidates.inserted,
        report.links.skipped + report.candidates.skipped
    );
    Ok(report)
}

async fn flush_links(
    store: &dyn ImageLinkStore,
    pending: &mut Vec<ProductImage>,
    report: &mut WriterReport,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let batch = std::mem::take(pending);
    debug!("Flushing {} link records", batch.len());
    let outcome = store.insert_links(&batch).await?;
    report.links.merge(outcome);
    Ok(())
}

async fn flush_candidates(
    store: &dyn ImageLinkStore,
    pending: &mut Vec<ImageCandidate>,
    report: &mut WriterReport,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let batch = std::mem::take(pending);
    debug!("Flushing {} candidate records", batch.len());
    let outcome = store.insert_candidates(&batch).await?;
    report.candidates.merge(outcome);
    Ok(())
}
