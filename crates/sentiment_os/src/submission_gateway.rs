#![forbid(unsafe_code)]

use std::sync::Arc;

use sentiment_contracts::display::DataSourceStatus;
use sentiment_contracts::feedback_queue::{EntryId, FeedbackRecordInput};
use sentiment_contracts::sentiment::{SentimentLabel, SentimentLabelSet, SentimentSnapshot};
use sentiment_contracts::{ContractViolation, ReasonCodeId, UnixTimeMs};
use sentiment_engines::sentiment_api::TransportError;
use sentiment_storage::feedback_store::StorageError;
use tracing::{debug, info, warn};

use crate::capabilities::PlatformCapabilities;
use crate::deferred_sync::{DeferredSyncCoordinator, SyncRegistrationError};
use crate::durable_store::FeedbackStoreHandle;
use crate::presenter::{FeedbackNotice, FeedbackPresenter};
use crate::transport::SentimentTransport;

pub mod reason_codes {
    use sentiment_contracts::ReasonCodeId;

    // Submission gateway reason-code namespace.
    pub const SENTIMENT_QUEUE_WRITE_FAILED: ReasonCodeId = ReasonCodeId(0x5346_0101);
    pub const SENTIMENT_SYNC_REGISTRATION_FAILED: ReasonCodeId = ReasonCodeId(0x5346_0102);
    pub const SENTIMENT_DIRECT_SEND_FAILED: ReasonCodeId = ReasonCodeId(0x5346_0103);
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error("could not queue feedback: {0}")]
    StoreWrite(StorageError),
    #[error("feedback {entry_id} queued but not scheduled for sync: {source}")]
    SyncRegistration {
        entry_id: EntryId,
        source: SyncRegistrationError,
    },
    #[error("{0}")]
    Send(TransportError),
}

impl SubmitError {
    /// Whether the rating still exists somewhere after the failure.
    pub fn data_retained(&self) -> bool {
        matches!(self, Self::SyncRegistration { .. })
    }

    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            Self::StoreWrite(_) => reason_codes::SENTIMENT_QUEUE_WRITE_FAILED,
            Self::SyncRegistration { .. } => reason_codes::SENTIMENT_SYNC_REGISTRATION_FAILED,
            Self::Send(_) => reason_codes::SENTIMENT_DIRECT_SEND_FAILED,
        }
    }

    pub fn notice(&self) -> FeedbackNotice {
        match self {
            Self::StoreWrite(err) => FeedbackNotice::error("Sync Error", err.to_string()),
            Self::SyncRegistration { source, .. } => {
                FeedbackNotice::warning("Sync Error", source.to_string())
                    .with_footer("Your rating is saved on this device.")
            }
            Self::Send(err) => FeedbackNotice::error("POST Error", err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Accepted by the server. `refreshed` is `None` when the follow-up fetch
    /// failed.
    Sent { refreshed: Option<SentimentSnapshot> },
    Queued { entry_id: EntryId },
    Failed(SubmitError),
}

/// Per-submission routing between a direct send and the durable queue.
pub struct SubmissionGateway {
    labels: SentimentLabelSet,
    capabilities: PlatformCapabilities,
    store: Arc<FeedbackStoreHandle>,
    sync: DeferredSyncCoordinator,
    transport: Arc<dyn SentimentTransport>,
    presenter: Arc<dyn FeedbackPresenter>,
    clock: fn() -> UnixTimeMs,
}

impl SubmissionGateway {
    pub fn new(
        labels: SentimentLabelSet,
        capabilities: PlatformCapabilities,
        store: Arc<FeedbackStoreHandle>,
        sync: DeferredSyncCoordinator,
        transport: Arc<dyn SentimentTransport>,
        presenter: Arc<dyn FeedbackPresenter>,
    ) -> Self {
        Self {
            labels,
            capabilities,
            store,
            sync,
            transport,
            presenter,
            clock: UnixTimeMs::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> UnixTimeMs) -> Self {
        self.clock = clock;
        self
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    /// `Err` means the selection was missing or not an allowed label; nothing
    /// was stored or sent and nothing is shown.
    pub async fn submit(&self, selection: Option<&str>) -> Result<SubmitOutcome, ContractViolation> {
        let label = self.labels.resolve(selection)?;

        let outcome = if self.capabilities.supports_deferred_queue() {
            match self.store.open().await {
                Ok(_) => self.persist_and_register(label).await,
                Err(err) => {
                    warn!(error = %err, "durable store unavailable, sending directly");
                    self.send_direct(label).await
                }
            }
        } else {
            self.send_direct(label).await
        };

        match &outcome {
            SubmitOutcome::Sent { .. } => {}
            SubmitOutcome::Queued { entry_id } => {
                info!(entry_id = %entry_id, "sentiment feedback queued");
                self.presenter.notify(&FeedbackNotice::request_queued());
            }
            SubmitOutcome::Failed(err) => {
                warn!(
                    reason_code = err.reason_code().0,
                    data_retained = err.data_retained(),
                    error = %err,
                    "sentiment submission failed"
                );
                self.presenter.notify(&err.notice());
            }
        }
        Ok(outcome)
    }

    /// Fetches the current counts and hands them to the presenter.
    pub async fn refresh_snapshot(&self) -> Result<SentimentSnapshot, TransportError> {
        match self.transport.fetch_snapshot().await {
            Ok(snapshot) => {
                self.presenter.render_snapshot(&snapshot);
                self.presenter.set_data_source(DataSourceStatus::Network);
                Ok(snapshot)
            }
            Err(err) => {
                warn!(error = %err, "sentiment snapshot fetch failed");
                self.presenter.set_data_source(DataSourceStatus::Error);
                self.presenter.notify(&FeedbackNotice::error(
                    "Data Error",
                    format!("Error fetching data: {err}"),
                ));
                Err(err)
            }
        }
    }

    /// Past label resolution every failure is a `Failed` outcome, including a
    /// record the store refuses (for example a clock reading of zero).
    async fn persist_and_register(&self, label: SentimentLabel) -> SubmitOutcome {
        let entry_id = match FeedbackRecordInput::v1((self.clock)(), label) {
            Ok(input) => match self.store.enqueue(input).await {
                Ok(id) => id,
                Err(err) => return SubmitOutcome::Failed(SubmitError::StoreWrite(err)),
            },
            Err(violation) => {
                return SubmitOutcome::Failed(SubmitError::StoreWrite(
                    StorageError::ContractViolation(violation),
                ))
            }
        };
        match self.sync.register_intent().await {
            Ok(()) => SubmitOutcome::Queued { entry_id },
            Err(source) => SubmitOutcome::Failed(SubmitError::SyncRegistration { entry_id, source }),
        }
    }

    async fn send_direct(&self, label: SentimentLabel) -> SubmitOutcome {
        match self.transport.submit_sentiment(&label, None).await {
            Ok(receipt) => {
                debug!(status = receipt.status, sentiment = label.as_str(), "sentiment sent");
                let refreshed = self.refresh_snapshot().await.ok();
                SubmitOutcome::Sent { refreshed }
            }
            Err(err) => SubmitOutcome::Failed(SubmitError::Send(err)),
        }
    }
}

impl std::fmt::Debug for SubmissionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionGateway")
            .field("labels", &self.labels)
            .field("capabilities", &self.capabilities)
            .field("store", &self.store)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}
