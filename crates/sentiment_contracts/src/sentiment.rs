#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::{ContractViolation, Validate};

pub const SENTIMENT_LABEL_MAX_LEN: usize = 64;
pub const SENTIMENT_LABEL_SET_MAX: usize = 16;

pub const DEFAULT_SENTIMENT_LABELS: [&str; 3] = ["positive", "neutral", "negative"];

/// A single selectable sentiment option value.
///
/// Only the shape is checked here. Whether a label is currently selectable is
/// decided by [`SentimentLabelSet::resolve`]; labels read back from the durable
/// store are accepted even if the allowed set has since changed.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SentimentLabel(String);

impl SentimentLabel {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let label = Self(value.into());
        label.validate()?;
        Ok(label)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for SentimentLabel {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_label",
                reason: "must not be empty",
            });
        }
        if self.0.trim() != self.0 {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_label",
                reason: "must not have leading or trailing whitespace",
            });
        }
        if self.0.len() > SENTIMENT_LABEL_MAX_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_label",
                reason: "must be <= 64 bytes",
            });
        }
        if self.0.chars().any(char::is_control) {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_label",
                reason: "must not contain control characters",
            });
        }
        Ok(())
    }
}

impl TryFrom<String> for SentimentLabel {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SentimentLabel> for String {
    fn from(label: SentimentLabel) -> Self {
        label.0
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of options a user may pick from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentimentLabelSet {
    labels: Vec<SentimentLabel>,
}

impl SentimentLabelSet {
    pub fn v1(labels: Vec<SentimentLabel>) -> Result<Self, ContractViolation> {
        let set = Self { labels };
        set.validate()?;
        Ok(set)
    }

    pub fn mvp_v1() -> Self {
        Self {
            labels: DEFAULT_SENTIMENT_LABELS
                .iter()
                .map(|v| SentimentLabel((*v).to_string()))
                .collect(),
        }
    }

    /// Parses a comma separated list such as `positive,neutral,negative`.
    pub fn parse_csv(raw: &str) -> Result<Self, ContractViolation> {
        let labels = raw
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(SentimentLabel::new)
            .collect::<Result<Vec<_>, _>>()?;
        Self::v1(labels)
    }

    pub fn labels(&self) -> &[SentimentLabel] {
        &self.labels
    }

    pub fn contains(&self, value: &str) -> bool {
        self.labels.iter().any(|l| l.as_str() == value)
    }

    /// Turns a raw selection into a label. A missing or empty selection, or one
    /// outside the set, is rejected.
    pub fn resolve(&self, selection: Option<&str>) -> Result<SentimentLabel, ContractViolation> {
        let Some(value) = selection else {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_selection",
                reason: "no selection made",
            });
        };
        if value.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_selection",
                reason: "no selection made",
            });
        }
        self.labels
            .iter()
            .find(|l| l.as_str() == value)
            .cloned()
            .ok_or(ContractViolation::InvalidValue {
                field: "sentiment_selection",
                reason: "must be a member of the allowed label set",
            })
    }
}

impl Validate for SentimentLabelSet {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.labels.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_label_set.labels",
                reason: "must not be empty",
            });
        }
        if self.labels.len() > SENTIMENT_LABEL_SET_MAX {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_label_set.labels",
                reason: "must be <= 16",
            });
        }
        for (idx, label) in self.labels.iter().enumerate() {
            label.validate()?;
            if self.labels[..idx].contains(label) {
                return Err(ContractViolation::InvalidValue {
                    field: "sentiment_label_set.labels",
                    reason: "must not contain duplicates",
                });
            }
        }
        Ok(())
    }
}

/// Body of `POST /api/sentiment`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubmitSentimentBody {
    pub sentiment: SentimentLabel,
}

impl SubmitSentimentBody {
    pub fn v1(sentiment: SentimentLabel) -> Self {
        Self { sentiment }
    }
}

/// Server-produced label -> count mapping. Read-only once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SentimentSnapshot {
    counts: BTreeMap<String, u64>,
}

impl SentimentSnapshot {
    pub fn v1(counts: BTreeMap<String, u64>) -> Result<Self, ContractViolation> {
        let snapshot = Self { counts };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    pub fn count_for(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }
}

impl Validate for SentimentSnapshot {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.counts.keys().any(|k| k.trim().is_empty()) {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_snapshot.counts",
                reason: "labels must not be empty",
            });
        }
        Ok(())
    }
}
