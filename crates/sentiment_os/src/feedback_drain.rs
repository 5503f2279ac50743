#![forbid(unsafe_code)]

use std::sync::Arc;

use sentiment_engines::sentiment_api::feedback_entry_idempotency_key;
use sentiment_storage::feedback_store::StorageError;
use tracing::{debug, info, warn};

use crate::durable_store::FeedbackStoreHandle;
use crate::transport::SentimentTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedbackDrainPassMetrics {
    pub read_count: u32,
    pub delivered_count: u32,
    pub retained_count: u32,
    pub remove_failed_count: u32,
    pub remaining_after: u64,
}

impl FeedbackDrainPassMetrics {
    pub fn is_settled(&self) -> bool {
        self.remaining_after == 0
    }
}

/// One drain pass over everything queued at the start of the pass.
///
/// Each entry is attempted exactly once. A rejected or unreachable delivery
/// leaves the entry in place and the pass moves on. Only a failure to read the
/// store aborts the pass.
pub async fn run_feedback_drain_pass(
    store: &FeedbackStoreHandle,
    transport: &dyn SentimentTransport,
) -> Result<FeedbackDrainPassMetrics, StorageError> {
    let entries = store.drain().await?;
    let mut metrics = FeedbackDrainPassMetrics {
        read_count: entries.len() as u32,
        ..FeedbackDrainPassMetrics::default()
    };
    if entries.is_empty() {
        debug!("feedback drain pass found nothing queued");
        return Ok(metrics);
    }

    for entry in entries {
        let key = feedback_entry_idempotency_key(&entry);
        match transport.submit_sentiment(&entry.sentiment, Some(&key)).await {
            Ok(_receipt) => {
                metrics.delivered_count = metrics.delivered_count.saturating_add(1);
                if let Err(err) = store.remove(entry.id).await {
                    // Delivered but still queued; the next pass sends it again.
                    warn!(entry_id = %entry.id, error = %err, "delivered feedback entry could not be removed");
                    metrics.remove_failed_count = metrics.remove_failed_count.saturating_add(1);
                }
            }
            Err(err) => {
                debug!(entry_id = %entry.id, error = %err, "feedback entry kept for a later pass");
                metrics.retained_count = metrics.retained_count.saturating_add(1);
            }
        }
    }

    metrics.remaining_after = match store.pending_count().await {
        Ok(count) => count,
        Err(err) => {
            warn!(error = %err, "could not count remaining feedback entries");
            u64::from(metrics.retained_count + metrics.remove_failed_count)
        }
    };
    info!(
        read = metrics.read_count,
        delivered = metrics.delivered_count,
        retained = metrics.retained_count,
        remove_failed = metrics.remove_failed_count,
        remaining = metrics.remaining_after,
        "feedback drain pass finished"
    );
    Ok(metrics)
}

/// The drain protocol bundled with its collaborators, for platforms that
/// trigger passes by tag.
#[derive(Clone)]
pub struct FeedbackDrainer {
    store: Arc<FeedbackStoreHandle>,
    transport: Arc<dyn SentimentTransport>,
}

impl FeedbackDrainer {
    pub fn new(store: Arc<FeedbackStoreHandle>, transport: Arc<dyn SentimentTransport>) -> Self {
        Self { store, transport }
    }

    pub async fn run_pass(&self) -> Result<FeedbackDrainPassMetrics, StorageError> {
        run_feedback_drain_pass(&self.store, self.transport.as_ref()).await
    }
}

impl std::fmt::Debug for FeedbackDrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackDrainer")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
