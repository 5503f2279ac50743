#![forbid(unsafe_code)]

use std::time::Duration;

use sentiment_contracts::feedback_queue::FeedbackEntry;
use sentiment_contracts::sentiment::{SentimentLabel, SentimentSnapshot, SubmitSentimentBody};
use sentiment_contracts::{ContractViolation, Validate};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

pub const SENTIMENT_API_PATH: &str = "/api/sentiment";
pub const SENTIMENT_SUBMIT_ACCEPTED_STATUS: u16 = 201;
pub const SENTIMENT_FETCH_OK_STATUS: u16 = 200;

pub const CONNECT_TIMEOUT_MS_DEFAULT: u64 = 3_000;
pub const REQUEST_TIMEOUT_MS_DEFAULT: u64 = 10_000;

const TRANSPORT_MESSAGE_MAX_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {message}")]
    Network { message: String },
    #[error("{status_text}")]
    Rejected { status: u16, status_text: String },
    #[error("response decode failed: {message}")]
    Decode { message: String },
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: bounded_message(message.into()),
        }
    }

    pub fn rejected(status: u16, status_text: impl Into<String>) -> Self {
        let text = status_text.into();
        let status_text = if text.trim().is_empty() {
            format!("http status {status}")
        } else {
            bounded_message(text)
        };
        Self::Rejected {
            status,
            status_text,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: bounded_message(message.into()),
        }
    }
}

fn bounded_message(msg: String) -> String {
    if msg.len() > TRANSPORT_MESSAGE_MAX_LEN {
        msg.chars().take(TRANSPORT_MESSAGE_MAX_LEN).collect::<String>()
    } else {
        msg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentimentApiConfig {
    pub origin: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl SentimentApiConfig {
    pub fn mvp_v1(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            connect_timeout_ms: CONNECT_TIMEOUT_MS_DEFAULT,
            request_timeout_ms: REQUEST_TIMEOUT_MS_DEFAULT,
        }
    }

    /// `{origin}/api/sentiment`. Any path already on the origin is replaced.
    pub fn endpoint_url(&self) -> Result<Url, ContractViolation> {
        let origin = Url::parse(self.origin.trim()).map_err(|_| ContractViolation::InvalidValue {
            field: "sentiment_api_config.origin",
            reason: "must be an absolute URL",
        })?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_api_config.origin",
                reason: "must use http or https",
            });
        }
        origin
            .join(SENTIMENT_API_PATH)
            .map_err(|_| ContractViolation::InvalidValue {
                field: "sentiment_api_config.origin",
                reason: "must accept the sentiment API path",
            })
    }
}

impl Validate for SentimentApiConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.endpoint_url()?;
        if self.connect_timeout_ms == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_api_config.connect_timeout_ms",
                reason: "must be > 0",
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "sentiment_api_config.request_timeout_ms",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

/// Blocking client for the sentiment API. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct SentimentApiClient {
    endpoint: String,
    agent: ureq::Agent,
}

impl SentimentApiClient {
    pub fn new(config: &SentimentApiConfig) -> Result<Self, ContractViolation> {
        config.validate()?;
        let endpoint = config.endpoint_url()?.to_string();
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.request_timeout_ms))
            .timeout_write(Duration::from_millis(config.request_timeout_ms))
            .build();
        Ok(Self { endpoint, agent })
    }

    /// `GET /api/sentiment`. Only 200 with a label -> count body is a success.
    pub fn fetch_snapshot(&self) -> Result<SentimentSnapshot, TransportError> {
        debug!(endpoint = %self.endpoint, "fetching sentiment snapshot");
        match self.agent.get(&self.endpoint).call() {
            Ok(resp) => {
                if resp.status() != SENTIMENT_FETCH_OK_STATUS {
                    return Err(TransportError::rejected(resp.status(), resp.status_text()));
                }
                let snapshot = resp
                    .into_json::<SentimentSnapshot>()
                    .map_err(|err| TransportError::decode(err.to_string()))?;
                snapshot
                    .validate()
                    .map_err(|err| TransportError::decode(err.to_string()))?;
                Ok(snapshot)
            }
            Err(ureq::Error::Status(code, resp)) => {
                Err(TransportError::rejected(code, resp.status_text()))
            }
            Err(ureq::Error::Transport(err)) => Err(TransportError::network(err.to_string())),
        }
    }

    /// `POST /api/sentiment` with `{"sentiment": label}`. Only 201 is accepted.
    pub fn submit_sentiment(
        &self,
        label: &SentimentLabel,
        idempotency_key: Option<&str>,
    ) -> Result<SubmitReceipt, TransportError> {
        let payload = serde_json::to_string(&SubmitSentimentBody::v1(label.clone()))
            .map_err(|err| TransportError::decode(format!("payload encode failed: {err}")))?;
        let mut req = self
            .agent
            .post(&self.endpoint)
            .set("content-type", "application/json");
        if let Some(key) = idempotency_key {
            req = req.set("idempotency-key", key);
        }
        debug!(endpoint = %self.endpoint, sentiment = label.as_str(), "submitting sentiment");
        match req.send_string(&payload) {
            Ok(resp) => {
                if resp.status() == SENTIMENT_SUBMIT_ACCEPTED_STATUS {
                    Ok(SubmitReceipt {
                        status: resp.status(),
                    })
                } else {
                    Err(TransportError::rejected(resp.status(), resp.status_text()))
                }
            }
            Err(ureq::Error::Status(code, resp)) => {
                Err(TransportError::rejected(code, resp.status_text()))
            }
            Err(ureq::Error::Transport(err)) => Err(TransportError::network(err.to_string())),
        }
    }
}

/// Stable key for one queued entry, sent on every delivery attempt so the server
/// can recognise a re-delivery after an interrupted drain pass.
pub fn feedback_entry_idempotency_key(entry: &FeedbackEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "feedback_entry|{}|{}|{}",
            entry.id.0,
            entry.timestamp.0,
            entry.sentiment.as_str()
        )
        .as_bytes(),
    );
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}
