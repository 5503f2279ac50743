#![forbid(unsafe_code)]

use std::net::SocketAddr;

use sentiment_adapter::dev_server::{dev_server_router, DevServerState};
use sentiment_adapter::{dev_server_bind_from_env, init_tracing};
use sentiment_os::config::FeedbackQueueConfig;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let addr: SocketAddr = dev_server_bind_from_env().parse()?;
    let config = FeedbackQueueConfig::from_env()?;

    let state = DevServerState::new(config.labels.clone());
    let app = dev_server_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        labels = config.labels.labels().len(),
        "sentiment_dev_server listening on http://{addr}/api/sentiment"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    info!("sentiment_dev_server stopped");
    Ok(())
}
