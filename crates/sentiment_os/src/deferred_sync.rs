#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use sentiment_contracts::feedback_queue::SyncTag;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncRegistrationError {
    #[error("background sync is not available")]
    Unavailable,
    #[error("background sync registration rejected: {reason}")]
    Rejected { reason: String },
}

/// The host's facility for running a drain pass later, without the caller
/// staying around.
#[async_trait]
pub trait BackgroundSyncRegistrar: Send + Sync {
    fn is_available(&self) -> bool;

    /// Returns once the host has acknowledged the registration, not once the
    /// work has run.
    async fn register(&self, tag: &SyncTag) -> Result<(), SyncRegistrationError>;
}

/// Registrar for hosts with no deferred-execution facility.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackgroundSync;

#[async_trait]
impl BackgroundSyncRegistrar for NoBackgroundSync {
    fn is_available(&self) -> bool {
        false
    }

    async fn register(&self, _tag: &SyncTag) -> Result<(), SyncRegistrationError> {
        Err(SyncRegistrationError::Unavailable)
    }
}

#[derive(Clone)]
pub struct DeferredSyncCoordinator {
    registrar: Arc<dyn BackgroundSyncRegistrar>,
    tag: SyncTag,
}

impl DeferredSyncCoordinator {
    pub fn new(registrar: Arc<dyn BackgroundSyncRegistrar>, tag: SyncTag) -> Self {
        Self { registrar, tag }
    }

    /// Called once per committed enqueue.
    pub async fn register_intent(&self) -> Result<(), SyncRegistrationError> {
        if !self.registrar.is_available() {
            warn!(tag = self.tag.as_str(), "background sync unavailable at registration");
            return Err(SyncRegistrationError::Unavailable);
        }
        match self.registrar.register(&self.tag).await {
            Ok(()) => {
                info!(tag = self.tag.as_str(), "background sync registered");
                Ok(())
            }
            Err(err) => {
                warn!(tag = self.tag.as_str(), error = %err, "background sync registration failed");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for DeferredSyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredSyncCoordinator")
            .field("tag", &self.tag)
            .field("available", &self.registrar.is_available())
            .finish()
    }
}
