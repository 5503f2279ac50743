#![forbid(unsafe_code)]

use async_trait::async_trait;
use sentiment_contracts::sentiment::{SentimentLabel, SentimentSnapshot};
use sentiment_engines::sentiment_api::{SentimentApiClient, SubmitReceipt, TransportError};

/// Request side of the sentiment API as seen by the gateway and drain pass.
#[async_trait]
pub trait SentimentTransport: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<SentimentSnapshot, TransportError>;

    async fn submit_sentiment(
        &self,
        label: &SentimentLabel,
        idempotency_key: Option<&str>,
    ) -> Result<SubmitReceipt, TransportError>;
}

// The HTTP client blocks, so each call is moved onto tokio's blocking pool.
#[async_trait]
impl SentimentTransport for SentimentApiClient {
    async fn fetch_snapshot(&self) -> Result<SentimentSnapshot, TransportError> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.fetch_snapshot())
            .await
            .map_err(|err| TransportError::network(format!("transport task failed: {err}")))?
    }

    async fn submit_sentiment(
        &self,
        label: &SentimentLabel,
        idempotency_key: Option<&str>,
    ) -> Result<SubmitReceipt, TransportError> {
        let client = self.clone();
        let label = label.clone();
        let key = idempotency_key.map(str::to_string);
        tokio::task::spawn_blocking(move || client.submit_sentiment(&label, key.as_deref()))
            .await
            .map_err(|err| TransportError::network(format!("transport task failed: {err}")))?
    }
}
