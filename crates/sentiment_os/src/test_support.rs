#![forbid(unsafe_code)]

//! In-process fakes for the gateway and drain tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sentiment_contracts::display::DataSourceStatus;
use sentiment_contracts::feedback_queue::{EntryId, FeedbackEntry, FeedbackRecordInput, SyncTag};
use sentiment_contracts::sentiment::{SentimentLabel, SentimentSnapshot};
use sentiment_contracts::Validate;
use sentiment_engines::sentiment_api::{SubmitReceipt, TransportError};
use sentiment_storage::feedback_store::StorageError;
use sentiment_storage::repo::{FeedbackQueueRepo, FeedbackQueueRepoOpener};

use crate::deferred_sync::{BackgroundSyncRegistrar, SyncRegistrationError};
use crate::presenter::{FeedbackNotice, FeedbackPresenter};
use crate::transport::SentimentTransport;

#[derive(Debug, Default)]
pub struct MemoryRepo {
    rows: Mutex<BTreeMap<u64, FeedbackEntry>>,
    next_id: AtomicU32,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
    mutations: AtomicU32,
}

impl MemoryRepo {
    pub fn with_rows(labels: &[&str]) -> Self {
        let repo = Self::default();
        for (idx, label) in labels.iter().enumerate() {
            let input = FeedbackRecordInput::v1(
                sentiment_contracts::UnixTimeMs(1_000 + idx as u64),
                SentimentLabel::new(*label).unwrap(),
            )
            .unwrap();
            repo.enqueue_feedback_row(&input).unwrap();
        }
        repo.mutations.store(0, Ordering::SeqCst);
        repo
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn mutation_count(&self) -> u32 {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<(u64, String)> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .map(|e| (e.id.0, e.sentiment.as_str().to_string()))
            .collect()
    }
}

impl FeedbackQueueRepo for MemoryRepo {
    fn enqueue_feedback_row(&self, input: &FeedbackRecordInput) -> Result<EntryId, StorageError> {
        input.validate()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                table: "memory".to_string(),
                reason: "quota exceeded".to_string(),
            });
        }
        let id = EntryId(self.next_id.fetch_add(1, Ordering::SeqCst) as u64 + 1);
        let entry = FeedbackEntry::v1(id, input.timestamp, input.sentiment.clone())?;
        self.rows.lock().unwrap().insert(id.0, entry);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn feedback_rows(&self) -> Result<Vec<FeedbackEntry>, StorageError> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    fn remove_feedback_row(&self, id: EntryId) -> Result<bool, StorageError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                table: "memory".to_string(),
                reason: "disk I/O error".to_string(),
            });
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().unwrap().remove(&id.0).is_some())
    }

    fn feedback_row_count(&self) -> Result<u64, StorageError> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }
}

#[derive(Debug)]
pub struct MemoryRepoOpener {
    repo: Arc<MemoryRepo>,
    fail_open: AtomicBool,
    opens: AtomicU32,
}

impl MemoryRepoOpener {
    pub fn new(repo: Arc<MemoryRepo>) -> Self {
        Self {
            repo,
            fail_open: AtomicBool::new(false),
            opens: AtomicU32::new(0),
        }
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn open_calls(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

impl FeedbackQueueRepoOpener for MemoryRepoOpener {
    fn open_feedback_repo(&self) -> Result<Arc<dyn FeedbackQueueRepo>, StorageError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("storage disabled"));
        }
        Ok(self.repo.clone())
    }
}

/// Replays scripted submit results in order; once the script runs out every
/// submit is accepted.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    submit_script: Mutex<VecDeque<Result<SubmitReceipt, TransportError>>>,
    fetch_result: Mutex<Option<Result<SentimentSnapshot, TransportError>>>,
    submits: Mutex<Vec<(String, Option<String>)>>,
    fetches: AtomicU32,
    submit_delay: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn with_submit_script(script: Vec<Result<SubmitReceipt, TransportError>>) -> Self {
        let transport = Self::default();
        *transport.submit_script.lock().unwrap() = script.into();
        transport
    }

    /// Each submit is recorded first, then held for `delay`.
    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_fetch_result(&self, result: Result<SentimentSnapshot, TransportError>) {
        *self.fetch_result.lock().unwrap() = Some(result);
    }

    pub fn submitted_labels(&self) -> Vec<String> {
        self.submits
            .lock()
            .unwrap()
            .iter()
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn submitted_keys(&self) -> Vec<Option<String>> {
        self.submits
            .lock()
            .unwrap()
            .iter()
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.submits.lock().unwrap().len() + self.fetch_calls() as usize
    }
}

pub fn accepted() -> Result<SubmitReceipt, TransportError> {
    Ok(SubmitReceipt { status: 201 })
}

pub fn server_error() -> Result<SubmitReceipt, TransportError> {
    Err(TransportError::rejected(500, "Internal Server Error"))
}

#[async_trait]
impl SentimentTransport for ScriptedTransport {
    async fn fetch_snapshot(&self) -> Result<SentimentSnapshot, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(SentimentSnapshot::default()))
    }

    async fn submit_sentiment(
        &self,
        label: &SentimentLabel,
        idempotency_key: Option<&str>,
    ) -> Result<SubmitReceipt, TransportError> {
        self.submits.lock().unwrap().push((
            label.as_str().to_string(),
            idempotency_key.map(str::to_string),
        ));
        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.submit_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(accepted)
    }
}

#[derive(Debug, Default)]
pub struct ToggleRegistrar {
    available: bool,
    reject_reason: Option<String>,
    registered: Mutex<Vec<SyncTag>>,
}

impl ToggleRegistrar {
    pub fn available() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            available: true,
            reject_reason: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn registered_tags(&self) -> Vec<SyncTag> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackgroundSyncRegistrar for ToggleRegistrar {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn register(&self, tag: &SyncTag) -> Result<(), SyncRegistrationError> {
        if let Some(reason) = &self.reject_reason {
            return Err(SyncRegistrationError::Rejected {
                reason: reason.clone(),
            });
        }
        self.registered.lock().unwrap().push(tag.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub notices: Mutex<Vec<FeedbackNotice>>,
    pub snapshots: Mutex<Vec<SentimentSnapshot>>,
    pub sources: Mutex<Vec<DataSourceStatus>>,
}

impl RecordingPresenter {
    pub fn notices(&self) -> Vec<FeedbackNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn sources(&self) -> Vec<DataSourceStatus> {
        self.sources.lock().unwrap().clone()
    }

    pub fn rendered_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }
}

impl FeedbackPresenter for RecordingPresenter {
    fn render_snapshot(&self, snapshot: &SentimentSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn set_data_source(&self, status: DataSourceStatus) {
        self.sources.lock().unwrap().push(status);
    }

    fn notify(&self, notice: &FeedbackNotice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}
