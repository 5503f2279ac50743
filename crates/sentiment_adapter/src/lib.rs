#![forbid(unsafe_code)]

pub mod background_sync;
pub mod dev_server;
pub mod presenter;

use std::sync::Arc;
use std::time::Duration;

use sentiment_contracts::feedback_queue::FeedbackEntry;
use sentiment_contracts::sentiment::SentimentSnapshot;
use sentiment_contracts::{ContractViolation, Validate};
use sentiment_engines::sentiment_api::{SentimentApiClient, TransportError};
use sentiment_os::capabilities::{detect_capabilities, PlatformCapabilities};
use sentiment_os::config::FeedbackQueueConfig;
use sentiment_os::deferred_sync::{
    BackgroundSyncRegistrar, DeferredSyncCoordinator, NoBackgroundSync,
};
use sentiment_os::durable_store::FeedbackStoreHandle;
use sentiment_os::feedback_drain::{FeedbackDrainPassMetrics, FeedbackDrainer};
use sentiment_os::presenter::FeedbackPresenter;
use sentiment_os::submission_gateway::{SubmissionGateway, SubmitOutcome};
use sentiment_os::transport::SentimentTransport;
use sentiment_storage::feedback_store::StorageError;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::background_sync::{BackgroundSyncStats, TokioBackgroundSync};

pub const DEV_SERVER_BIND_DEFAULT: &str = "127.0.0.1:8080";

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ContractViolation),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Installs the process-wide `tracing` subscriber. `RUST_LOG` overrides the
/// `info` default. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn dev_server_bind_from_env() -> String {
    std::env::var("SENTIMENT_DEV_SERVER_BIND")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEV_SERVER_BIND_DEFAULT.to_string())
}

/// Process wiring for the feedback queue: SQLite store, HTTP transport, tokio
/// background sync and a presenter.
pub struct AdapterRuntime {
    config: FeedbackQueueConfig,
    store: Arc<FeedbackStoreHandle>,
    drainer: FeedbackDrainer,
    background_sync: Option<Arc<TokioBackgroundSync>>,
    gateway: SubmissionGateway,
    direct_gateway: SubmissionGateway,
}

impl AdapterRuntime {
    /// Spawns the background sync worker when enabled, so this must run inside
    /// a tokio runtime.
    pub fn new(
        config: FeedbackQueueConfig,
        presenter: Arc<dyn FeedbackPresenter>,
    ) -> Result<Self, AdapterError> {
        let client = SentimentApiClient::new(&config.api)?;
        let transport: Arc<dyn SentimentTransport> = Arc::new(client);
        Self::with_transport(config, transport, presenter)
    }

    pub fn default_from_env(presenter: Arc<dyn FeedbackPresenter>) -> Result<Self, AdapterError> {
        Self::new(FeedbackQueueConfig::from_env()?, presenter)
    }

    pub fn with_transport(
        config: FeedbackQueueConfig,
        transport: Arc<dyn SentimentTransport>,
        presenter: Arc<dyn FeedbackPresenter>,
    ) -> Result<Self, AdapterError> {
        config.validate()?;

        let store = Arc::new(FeedbackStoreHandle::for_location(
            config.store_location.clone(),
            config.store_name.clone(),
        ));
        let drainer = FeedbackDrainer::new(store.clone(), transport.clone());

        let background_sync = if config.background_sync_enabled {
            Some(Arc::new(TokioBackgroundSync::spawn(
                config.sync_tag.clone(),
                drainer.clone(),
                Duration::from_millis(config.sync_retry_interval_ms),
            )))
        } else {
            None
        };
        let registrar: Arc<dyn BackgroundSyncRegistrar> = match &background_sync {
            Some(sync) => sync.clone() as Arc<dyn BackgroundSyncRegistrar>,
            None => Arc::new(NoBackgroundSync),
        };

        let capabilities = detect_capabilities(&config, registrar.as_ref());
        info!(
            origin = %config.api.origin,
            durable_store = capabilities.durable_store,
            deferred_sync = capabilities.deferred_sync,
            "feedback queue runtime ready"
        );
        let coordinator = DeferredSyncCoordinator::new(registrar, config.sync_tag.clone());
        let gateway = SubmissionGateway::new(
            config.labels.clone(),
            capabilities,
            store.clone(),
            coordinator.clone(),
            transport.clone(),
            presenter.clone(),
        );
        let direct_gateway = SubmissionGateway::new(
            config.labels.clone(),
            PlatformCapabilities::none(),
            store.clone(),
            coordinator,
            transport,
            presenter,
        );

        Ok(Self {
            config,
            store,
            drainer,
            background_sync,
            gateway,
            direct_gateway,
        })
    }

    pub fn config(&self) -> &FeedbackQueueConfig {
        &self.config
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.gateway.capabilities()
    }

    pub async fn submit(&self, selection: Option<&str>) -> Result<SubmitOutcome, ContractViolation> {
        self.gateway.submit(selection).await
    }

    /// Skips the durable queue regardless of capabilities.
    pub async fn submit_direct(
        &self,
        selection: Option<&str>,
    ) -> Result<SubmitOutcome, ContractViolation> {
        self.direct_gateway.submit(selection).await
    }

    pub async fn refresh_snapshot(&self) -> Result<SentimentSnapshot, TransportError> {
        self.gateway.refresh_snapshot().await
    }

    pub async fn run_drain_pass(&self) -> Result<FeedbackDrainPassMetrics, StorageError> {
        self.drainer.run_pass().await
    }

    pub async fn pending_count(&self) -> Result<u64, StorageError> {
        self.store.pending_count().await
    }

    pub async fn queued_entries(&self) -> Result<Vec<FeedbackEntry>, StorageError> {
        self.store.drain().await
    }

    pub fn background_sync_stats(&self) -> Option<BackgroundSyncStats> {
        self.background_sync.as_ref().map(|sync| sync.stats())
    }

    /// Waits until every registration so far has had its drain pass, or until
    /// `timeout` runs out. Returns the last stats seen.
    pub async fn settle_background_sync(&self, timeout: Duration) -> Option<BackgroundSyncStats> {
        let sync = self.background_sync.as_ref()?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let stats = sync.stats();
            if stats.handled_registrations >= stats.registrations
                || tokio::time::Instant::now() >= deadline
            {
                return Some(stats);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn shutdown(&self) {
        if let Some(sync) = &self.background_sync {
            sync.shutdown().await;
        }
    }
}

impl std::fmt::Debug for AdapterRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRuntime")
            .field("config", &self.config)
            .field("gateway", &self.gateway)
            .field("background_sync", &self.background_sync)
            .finish_non_exhaustive()
    }
}
