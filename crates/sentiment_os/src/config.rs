#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;

use sentiment_contracts::feedback_queue::{StoreName, SyncTag};
use sentiment_contracts::sentiment::SentimentLabelSet;
use sentiment_contracts::{ContractViolation, Validate};
use sentiment_engines::sentiment_api::{
    SentimentApiConfig, CONNECT_TIMEOUT_MS_DEFAULT, REQUEST_TIMEOUT_MS_DEFAULT,
};
use sentiment_storage::feedback_store::StoreLocation;

pub const DEFAULT_API_ORIGIN: &str = "http://127.0.0.1:8080";
pub const DEFAULT_STORE_PATH: &str = "./sentiment_feedback.sqlite3";
pub const SYNC_RETRY_INTERVAL_MS_DEFAULT: u64 = 30_000;

/// Process-wide settings for the feedback queue, passed to every component at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackQueueConfig {
    pub api: SentimentApiConfig,
    /// `None` means this process has no durable store capability.
    pub store_location: Option<StoreLocation>,
    pub store_name: StoreName,
    pub sync_tag: SyncTag,
    pub labels: SentimentLabelSet,
    pub sync_retry_interval_ms: u64,
    pub background_sync_enabled: bool,
}

impl FeedbackQueueConfig {
    pub fn mvp_v1(origin: impl Into<String>) -> Self {
        Self {
            api: SentimentApiConfig::mvp_v1(origin),
            store_location: Some(StoreLocation::File(PathBuf::from(DEFAULT_STORE_PATH))),
            store_name: StoreName::mvp_v1(),
            sync_tag: SyncTag::feedback(),
            labels: SentimentLabelSet::mvp_v1(),
            sync_retry_interval_ms: SYNC_RETRY_INTERVAL_MS_DEFAULT,
            background_sync_enabled: true,
        }
    }

    pub fn from_env() -> Result<Self, ContractViolation> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Self::from_env`] but reads through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ContractViolation>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key).and_then(|v| {
                let s = v.trim().to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(s)
                }
            })
        };
        let bounded_ms = |key: &str, range: std::ops::RangeInclusive<u64>, default: u64| {
            non_empty(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| range.contains(v))
                .unwrap_or(default)
        };

        let origin = non_empty("SENTIMENT_API_ORIGIN").unwrap_or_else(|| DEFAULT_API_ORIGIN.into());
        let mut config = Self::mvp_v1(origin);
        config.api.connect_timeout_ms = bounded_ms(
            "SENTIMENT_CONNECT_TIMEOUT_MS",
            100..=60_000,
            CONNECT_TIMEOUT_MS_DEFAULT,
        );
        config.api.request_timeout_ms = bounded_ms(
            "SENTIMENT_REQUEST_TIMEOUT_MS",
            100..=120_000,
            REQUEST_TIMEOUT_MS_DEFAULT,
        );
        config.sync_retry_interval_ms = bounded_ms(
            "SENTIMENT_SYNC_RETRY_INTERVAL_MS",
            100..=600_000,
            SYNC_RETRY_INTERVAL_MS_DEFAULT,
        );

        if let Some(path) = non_empty("SENTIMENT_STORE_PATH") {
            config.store_location = if is_off(&path) {
                None
            } else {
                Some(StoreLocation::File(PathBuf::from(path)))
            };
        }
        if let Some(name) = non_empty("SENTIMENT_STORE_NAME") {
            config.store_name = StoreName::new(name)?;
        }
        if let Some(labels) = non_empty("SENTIMENT_LABELS") {
            config.labels = SentimentLabelSet::parse_csv(&labels)?;
        }
        if let Some(flag) = non_empty("SENTIMENT_BACKGROUND_SYNC") {
            config.background_sync_enabled = !is_off(&flag);
        }

        config.validate()?;
        Ok(config)
    }
}

fn is_off(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}

impl Validate for FeedbackQueueConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.api.validate()?;
        self.store_name.validate()?;
        self.sync_tag.validate()?;
        self.labels.validate()?;
        if !(100..=600_000).contains(&self.sync_retry_interval_ms) {
            return Err(ContractViolation::InvalidRange {
                field: "feedback_queue_config.sync_retry_interval_ms",
                min: 100.0,
                max: 600_000.0,
                got: self.sync_retry_interval_ms as f64,
            });
        }
        Ok(())
    }
}
