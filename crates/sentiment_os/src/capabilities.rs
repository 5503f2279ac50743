#![forbid(unsafe_code)]

use crate::config::FeedbackQueueConfig;
use crate::deferred_sync::BackgroundSyncRegistrar;

/// What the host offers for offline submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformCapabilities {
    pub durable_store: bool,
    pub deferred_sync: bool,
}

impl PlatformCapabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            durable_store: true,
            deferred_sync: true,
        }
    }

    /// Persist-then-register needs both.
    pub fn supports_deferred_queue(self) -> bool {
        self.durable_store && self.deferred_sync
    }
}

/// Durable store capability comes from configuration; whether the store can
/// actually be opened is only learned on first use.
pub fn detect_capabilities(
    config: &FeedbackQueueConfig,
    registrar: &dyn BackgroundSyncRegistrar,
) -> PlatformCapabilities {
    PlatformCapabilities {
        durable_store: config.store_location.is_some(),
        deferred_sync: config.background_sync_enabled && registrar.is_available(),
    }
}
