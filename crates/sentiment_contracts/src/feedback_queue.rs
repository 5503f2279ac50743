#![forbid(unsafe_code)]

use crate::sentiment::SentimentLabel;
use crate::{ContractViolation, SchemaVersion, UnixTimeMs, Validate};

pub const FEEDBACK_QUEUE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const FEEDBACK_SYNC_TAG: &str = "feedback";
pub const DEFAULT_FEEDBACK_STORE_NAME: &str = "feedback_queue";

const SYNC_TAG_MAX_LEN: usize = 64;
const STORE_NAME_MAX_LEN: usize = 48;

/// Store-assigned key of a queued entry. Starts at 1 and is never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl Validate for EntryId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "entry_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What gets persisted on enqueue; the id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecordInput {
    pub schema_version: SchemaVersion,
    pub timestamp: UnixTimeMs,
    pub sentiment: SentimentLabel,
}

impl FeedbackRecordInput {
    pub fn v1(timestamp: UnixTimeMs, sentiment: SentimentLabel) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: FEEDBACK_QUEUE_CONTRACT_VERSION,
            timestamp,
            sentiment,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for FeedbackRecordInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != FEEDBACK_QUEUE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "feedback_record_input.schema_version",
                reason: "must match FEEDBACK_QUEUE_CONTRACT_VERSION",
            });
        }
        if self.timestamp.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "feedback_record_input.timestamp",
                reason: "must be > 0",
            });
        }
        if self.timestamp.0 > i64::MAX as u64 {
            return Err(ContractViolation::InvalidValue {
                field: "feedback_record_input.timestamp",
                reason: "must fit a signed 64-bit integer",
            });
        }
        self.sentiment.validate()
    }
}

/// A queued, not-yet-delivered feedback record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEntry {
    pub id: EntryId,
    pub timestamp: UnixTimeMs,
    pub sentiment: SentimentLabel,
}

impl FeedbackEntry {
    pub fn v1(
        id: EntryId,
        timestamp: UnixTimeMs,
        sentiment: SentimentLabel,
    ) -> Result<Self, ContractViolation> {
        let entry = Self {
            id,
            timestamp,
            sentiment,
        };
        entry.validate()?;
        Ok(entry)
    }
}

impl Validate for FeedbackEntry {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.id.validate()?;
        self.sentiment.validate()
    }
}

/// Name under which deferred work is registered with the platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncTag(String);

impl SyncTag {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let tag = Self(value.into());
        tag.validate()?;
        Ok(tag)
    }

    pub fn feedback() -> Self {
        Self(FEEDBACK_SYNC_TAG.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for SyncTag {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "sync_tag",
                reason: "must not be empty",
            });
        }
        if self.0.len() > SYNC_TAG_MAX_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "sync_tag",
                reason: "must be <= 64 bytes",
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for SyncTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the record store. It is interpolated into DDL, so it is restricted
/// to `[a-z_][a-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreName(String);

impl StoreName {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let name = Self(value.into());
        name.validate()?;
        Ok(name)
    }

    pub fn mvp_v1() -> Self {
        Self(DEFAULT_FEEDBACK_STORE_NAME.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for StoreName {
    fn validate(&self) -> Result<(), ContractViolation> {
        let mut chars = self.0.chars();
        let Some(first) = chars.next() else {
            return Err(ContractViolation::InvalidValue {
                field: "store_name",
                reason: "must not be empty",
            });
        };
        if !(first.is_ascii_lowercase() || first == '_') {
            return Err(ContractViolation::InvalidValue {
                field: "store_name",
                reason: "must start with a lowercase letter or underscore",
            });
        }
        if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err(ContractViolation::InvalidValue {
                field: "store_name",
                reason: "must contain only lowercase letters, digits, or underscores",
            });
        }
        if self.0.len() > STORE_NAME_MAX_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "store_name",
                reason: "must be <= 48 bytes",
            });
        }
        if self.0.starts_with("sqlite_") {
            return Err(ContractViolation::InvalidValue {
                field: "store_name",
                reason: "must not use the reserved sqlite_ prefix",
            });
        }
        Ok(())
    }
}
