#![forbid(unsafe_code)]

use std::sync::Arc;

use sentiment_contracts::feedback_queue::{EntryId, FeedbackEntry, FeedbackRecordInput, StoreName};

use crate::feedback_store::{FeedbackQueueStore, StorageError, StoreLocation};

/// Typed repository interface for the durable feedback queue.
pub trait FeedbackQueueRepo: Send + Sync {
    fn enqueue_feedback_row(&self, input: &FeedbackRecordInput) -> Result<EntryId, StorageError>;
    fn feedback_rows(&self) -> Result<Vec<FeedbackEntry>, StorageError>;
    fn remove_feedback_row(&self, id: EntryId) -> Result<bool, StorageError>;
    fn feedback_row_count(&self) -> Result<u64, StorageError>;
}

/// Opens (creating if absent) the repo behind a durable feedback queue.
pub trait FeedbackQueueRepoOpener: Send + Sync {
    fn open_feedback_repo(&self) -> Result<Arc<dyn FeedbackQueueRepo>, StorageError>;
}

impl FeedbackQueueRepo for FeedbackQueueStore {
    fn enqueue_feedback_row(&self, input: &FeedbackRecordInput) -> Result<EntryId, StorageError> {
        self.enqueue(input)
    }

    fn feedback_rows(&self) -> Result<Vec<FeedbackEntry>, StorageError> {
        self.drain()
    }

    fn remove_feedback_row(&self, id: EntryId) -> Result<bool, StorageError> {
        self.remove(id)
    }

    fn feedback_row_count(&self) -> Result<u64, StorageError> {
        self.pending_count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteFeedbackQueueOpener {
    pub location: StoreLocation,
    pub store_name: StoreName,
}

impl SqliteFeedbackQueueOpener {
    pub fn new(location: StoreLocation, store_name: StoreName) -> Self {
        Self {
            location,
            store_name,
        }
    }
}

impl FeedbackQueueRepoOpener for SqliteFeedbackQueueOpener {
    fn open_feedback_repo(&self) -> Result<Arc<dyn FeedbackQueueRepo>, StorageError> {
        let store = FeedbackQueueStore::open(&self.location, self.store_name.clone())?;
        Ok(Arc::new(store))
    }
}
