#![forbid(unsafe_code)]

use std::sync::Arc;

use sentiment_contracts::feedback_queue::{EntryId, FeedbackEntry, FeedbackRecordInput, StoreName};
use sentiment_storage::feedback_store::{StorageError, StoreLocation};
use sentiment_storage::repo::{
    FeedbackQueueRepo, FeedbackQueueRepoOpener, SqliteFeedbackQueueOpener,
};
use tokio::sync::OnceCell;
use tracing::debug;

/// Lazily opened access to the durable feedback queue.
///
/// The first successful open is kept; a failed open is not, so the next call
/// tries again. Store calls run on tokio's blocking pool and hold no lock
/// across an await.
pub struct FeedbackStoreHandle {
    opener: Arc<dyn FeedbackQueueRepoOpener>,
    repo: OnceCell<Arc<dyn FeedbackQueueRepo>>,
}

impl FeedbackStoreHandle {
    pub fn new(opener: Arc<dyn FeedbackQueueRepoOpener>) -> Self {
        Self {
            opener,
            repo: OnceCell::new(),
        }
    }

    /// SQLite at `location`, or a store that never opens when there is no
    /// location.
    pub fn for_location(location: Option<StoreLocation>, store_name: StoreName) -> Self {
        match location {
            Some(location) => Self::new(Arc::new(SqliteFeedbackQueueOpener::new(
                location, store_name,
            ))),
            None => Self::new(Arc::new(DisabledStoreOpener)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.repo.initialized()
    }

    pub async fn open(&self) -> Result<Arc<dyn FeedbackQueueRepo>, StorageError> {
        let repo = self
            .repo
            .get_or_try_init(|| async {
                let opener = self.opener.clone();
                debug!("opening durable feedback store");
                run_blocking(move || opener.open_feedback_repo()).await
            })
            .await?;
        Ok(repo.clone())
    }

    pub async fn enqueue(&self, input: FeedbackRecordInput) -> Result<EntryId, StorageError> {
        let repo = self.open().await?;
        run_blocking(move || repo.enqueue_feedback_row(&input)).await
    }

    pub async fn drain(&self) -> Result<Vec<FeedbackEntry>, StorageError> {
        let repo = self.open().await?;
        run_blocking(move || repo.feedback_rows()).await
    }

    pub async fn remove(&self, id: EntryId) -> Result<bool, StorageError> {
        let repo = self.open().await?;
        run_blocking(move || repo.remove_feedback_row(id)).await
    }

    pub async fn pending_count(&self) -> Result<u64, StorageError> {
        let repo = self.open().await?;
        run_blocking(move || repo.feedback_row_count()).await
    }
}

impl std::fmt::Debug for FeedbackStoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackStoreHandle")
            .field("open", &self.is_open())
            .finish()
    }
}

struct DisabledStoreOpener;

impl FeedbackQueueRepoOpener for DisabledStoreOpener {
    fn open_feedback_repo(&self) -> Result<Arc<dyn FeedbackQueueRepo>, StorageError> {
        Err(StorageError::unavailable("durable store disabled by configuration"))
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| StorageError::unavailable(format!("store task failed: {err}")))?
}
