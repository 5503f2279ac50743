#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sentiment_adapter::AdapterRuntime;
use sentiment_contracts::Validate;
use sentiment_os::config::FeedbackQueueConfig;
use sentiment_os::submission_gateway::SubmitOutcome;
use sentiment_storage::feedback_store::StoreLocation;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "sentiment")]
#[command(about = "Submit sentiment feedback and manage the offline queue")]
pub struct Cli {
    /// Overrides SENTIMENT_API_ORIGIN.
    #[arg(long, global = true)]
    pub origin: Option<String>,
    /// Overrides SENTIMENT_STORE_PATH. `off` disables the queue.
    #[arg(long, global = true)]
    pub store: Option<String>,
    #[command(subcommand)]
    pub command: FeedbackCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum FeedbackCommand {
    /// Submit one rating. Queues it when offline delivery is available.
    Submit {
        label: String,
        /// Send now and skip the queue.
        #[arg(long, default_value_t = false)]
        direct: bool,
    },
    /// Run one delivery pass over the queue.
    Drain,
    /// Fetch current counts and show the queue size.
    Status,
    /// List queued entries without sending them.
    Queue,
}

impl Cli {
    pub fn config(&self) -> Result<FeedbackQueueConfig, String> {
        let mut config = FeedbackQueueConfig::from_env().map_err(|e| e.to_string())?;
        self.apply_overrides(&mut config)?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut FeedbackQueueConfig) -> Result<(), String> {
        if let Some(origin) = &self.origin {
            config.api.origin = origin.trim().to_string();
        }
        if let Some(store) = &self.store {
            config.store_location = store_location_for(store);
        }
        config.validate().map_err(|e| e.to_string())
    }
}

fn store_location_for(raw: &str) -> Option<StoreLocation> {
    let raw = raw.trim();
    if matches!(raw.to_ascii_lowercase().as_str(), "off" | "none" | "0" | "false") {
        None
    } else {
        Some(StoreLocation::File(PathBuf::from(raw)))
    }
}

pub async fn execute_feedback_command(
    runtime: &AdapterRuntime,
    command: &FeedbackCommand,
) -> Result<String, String> {
    debug!(?command, "running feedback command");
    match command {
        FeedbackCommand::Submit { label, direct } => {
            let outcome = if *direct {
                runtime.submit_direct(Some(label)).await
            } else {
                runtime.submit(Some(label)).await
            };
            let outcome = outcome.map_err(|_| {
                let allowed = runtime
                    .config()
                    .labels
                    .labels()
                    .iter()
                    .map(|l| l.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("unknown sentiment '{label}'. allowed: {allowed}")
            })?;
            match outcome {
                SubmitOutcome::Sent { .. } => Ok("SENT".to_string()),
                SubmitOutcome::Queued { entry_id } => {
                    let wait = Duration::from_millis(runtime.config().api.request_timeout_ms);
                    runtime.settle_background_sync(wait).await;
                    Ok(format!("QUEUED {entry_id}"))
                }
                SubmitOutcome::Failed(err) => Err(format!("submission failed: {err}")),
            }
        }
        FeedbackCommand::Drain => {
            let metrics = runtime
                .run_drain_pass()
                .await
                .map_err(|e| format!("drain failed: {e}"))?;
            Ok(format!(
                "read={} delivered={} retained={} remove_failed={} remaining={}",
                metrics.read_count,
                metrics.delivered_count,
                metrics.retained_count,
                metrics.remove_failed_count,
                metrics.remaining_after
            ))
        }
        FeedbackCommand::Status => {
            let pending = match runtime.pending_count().await {
                Ok(count) => count.to_string(),
                Err(err) if err.is_unavailable() => "unavailable".to_string(),
                Err(err) => return Err(format!("failed to count queue: {err}")),
            };
            let capabilities = runtime.capabilities();
            let fetched = runtime.refresh_snapshot().await.is_ok();
            Ok(format!(
                "origin={} fetched={} durable_store={} deferred_sync={} pending={}",
                runtime.config().api.origin,
                fetched,
                capabilities.durable_store,
                capabilities.deferred_sync,
                pending
            ))
        }
        FeedbackCommand::Queue => {
            let entries = runtime
                .queued_entries()
                .await
                .map_err(|e| format!("failed to read queue: {e}"))?;
            Ok(entries
                .iter()
                .map(|e| format!("{}\t{}\t{}", e.id, e.timestamp.0, e.sentiment))
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}
