#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sentiment_contracts::feedback_queue::SyncTag;
use sentiment_os::deferred_sync::{BackgroundSyncRegistrar, SyncRegistrationError};
use sentiment_os::feedback_drain::{FeedbackDrainPassMetrics, FeedbackDrainer};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const BACKGROUND_SYNC_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackgroundSyncStats {
    pub registrations: u64,
    /// Registrations covered by a pass that started after they arrived and has
    /// finished.
    pub handled_registrations: u64,
    pub passes: u64,
    pub failed_passes: u64,
    pub pending: bool,
    pub last_pass: Option<FeedbackDrainPassMetrics>,
}

struct Registration {
    tag: SyncTag,
    ack: oneshot::Sender<()>,
}

#[derive(Default)]
struct SyncState {
    pending: BTreeSet<SyncTag>,
    stats: BackgroundSyncStats,
}

struct SyncShared {
    state: Mutex<SyncState>,
    wake: Notify,
}

impl SyncShared {
    fn with_state<R>(&self, f: impl FnOnce(&mut SyncState) -> R) -> Option<R> {
        self.state.lock().ok().map(|mut state| f(&mut state))
    }
}

/// In-process deferred-execution facility backed by tokio tasks.
///
/// One task accepts registrations and acknowledges them immediately; a second
/// task runs the drain passes, so a registration never waits on a pass. A
/// registration wakes the pass runner. While a pass leaves entries behind, the
/// tag stays pending and the pass is repeated every `retry_interval`. The tag
/// is cleared once a pass leaves the store empty and no registration arrived
/// while it ran.
pub struct TokioBackgroundSync {
    tag: SyncTag,
    tx: mpsc::Sender<Registration>,
    shared: Arc<SyncShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioBackgroundSync {
    /// Must be called from inside a tokio runtime.
    pub fn spawn(tag: SyncTag, drainer: FeedbackDrainer, retry_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(BACKGROUND_SYNC_CHANNEL_CAPACITY);
        let shared = Arc::new(SyncShared {
            state: Mutex::new(SyncState::default()),
            wake: Notify::new(),
        });
        let receiver = tokio::spawn(accept_registrations(rx, shared.clone()));
        let runner = tokio::spawn(run_passes(drainer, retry_interval, shared.clone()));
        info!(
            tag = tag.as_str(),
            retry_interval_ms = retry_interval.as_millis() as u64,
            "background sync worker started"
        );
        Self {
            tag,
            tx,
            shared,
            workers: Mutex::new(vec![receiver, runner]),
        }
    }

    pub fn stats(&self) -> BackgroundSyncStats {
        self.shared
            .with_state(|state| state.stats)
            .unwrap_or_default()
    }

    /// Stops the worker. Later registrations are refused.
    pub async fn shutdown(&self) {
        let workers = match self.workers.lock() {
            Ok(mut slot) => std::mem::take(&mut *slot),
            Err(_) => Vec::new(),
        };
        if workers.is_empty() {
            return;
        }
        for worker in &workers {
            worker.abort();
        }
        for worker in workers {
            let _ = worker.await;
        }
        info!(tag = self.tag.as_str(), "background sync worker stopped");
    }
}

#[async_trait]
impl BackgroundSyncRegistrar for TokioBackgroundSync {
    fn is_available(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn register(&self, tag: &SyncTag) -> Result<(), SyncRegistrationError> {
        if tag != &self.tag {
            return Err(SyncRegistrationError::Rejected {
                reason: format!("no handler registered for tag {}", tag.as_str()),
            });
        }
        let (ack, acked) = oneshot::channel();
        self.tx
            .send(Registration {
                tag: tag.clone(),
                ack,
            })
            .await
            .map_err(|_| SyncRegistrationError::Unavailable)?;
        acked.await.map_err(|_| SyncRegistrationError::Unavailable)
    }
}

impl std::fmt::Debug for TokioBackgroundSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioBackgroundSync")
            .field("tag", &self.tag)
            .field("available", &self.is_available())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn accept_registrations(mut rx: mpsc::Receiver<Registration>, shared: Arc<SyncShared>) {
    while let Some(registration) = rx.recv().await {
        debug!(tag = registration.tag.as_str(), "background sync registration received");
        shared.with_state(|state| {
            state.pending.insert(registration.tag);
            state.stats.registrations = state.stats.registrations.saturating_add(1);
            state.stats.pending = true;
        });
        let _ = registration.ack.send(());
        shared.wake.notify_one();
    }
    debug!("background sync registration channel closed");
}

async fn run_passes(drainer: FeedbackDrainer, retry_interval: Duration, shared: Arc<SyncShared>) {
    let mut ticker = tokio::time::interval(retry_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        let retry_due = shared
            .with_state(|state| !state.pending.is_empty())
            .unwrap_or(false);
        tokio::select! {
            _ = shared.wake.notified() => {}
            _ = ticker.tick(), if retry_due => {}
        }
        run_pending_passes(&drainer, &shared).await;
        ticker.reset();
    }
}

async fn run_pending_passes(drainer: &FeedbackDrainer, shared: &SyncShared) {
    let Some((tags, seen)) = shared.with_state(|state| {
        (
            state.pending.iter().cloned().collect::<Vec<_>>(),
            state.stats.registrations,
        )
    }) else {
        return;
    };
    for tag in tags {
        let result = drainer.run_pass().await;
        if let Err(err) = &result {
            warn!(tag = tag.as_str(), error = %err, "background drain pass failed");
        }
        shared.with_state(|state| {
            let stats = &mut state.stats;
            stats.passes = stats.passes.saturating_add(1);
            match result {
                Ok(metrics) => {
                    // A registration that arrived mid-pass may name an entry
                    // this pass never read.
                    if metrics.is_settled() && stats.registrations == seen {
                        state.pending.remove(&tag);
                    }
                    stats.last_pass = Some(metrics);
                }
                Err(_) => stats.failed_passes = stats.failed_passes.saturating_add(1),
            }
            mark_handled(state, seen);
        });
    }
    shared.with_state(|state| mark_handled(state, seen));
}

fn mark_handled(state: &mut SyncState, seen: u64) {
    state.stats.handled_registrations = state.stats.handled_registrations.max(seen);
    state.stats.pending = !state.pending.is_empty();
}
