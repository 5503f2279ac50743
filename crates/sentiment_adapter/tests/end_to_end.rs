#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sentiment_adapter::dev_server::{serve_dev_server, DevServerState};
use sentiment_adapter::AdapterRuntime;
use sentiment_contracts::display::DataSourceStatus;
use sentiment_contracts::feedback_queue::EntryId;
use sentiment_contracts::sentiment::{SentimentLabel, SentimentLabelSet, SentimentSnapshot};
use sentiment_engines::sentiment_api::{SentimentApiClient, SentimentApiConfig, TransportError};
use sentiment_os::config::FeedbackQueueConfig;
use sentiment_os::presenter::{FeedbackNotice, FeedbackPresenter};
use sentiment_os::submission_gateway::SubmitOutcome;
use sentiment_storage::feedback_store::StoreLocation;

#[derive(Default)]
struct RecordingPresenter {
    notices: Mutex<Vec<FeedbackNotice>>,
    snapshots: Mutex<Vec<SentimentSnapshot>>,
}

impl FeedbackPresenter for RecordingPresenter {
    fn render_snapshot(&self, snapshot: &SentimentSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn set_data_source(&self, _status: DataSourceStatus) {}

    fn notify(&self, notice: &FeedbackNotice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

async fn start_dev_server() -> (SocketAddr, DevServerState) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = DevServerState::new(SentimentLabelSet::mvp_v1());
    let server_state = state.clone();
    tokio::spawn(async move {
        let _ = serve_dev_server(listener, server_state).await;
    });
    (addr, state)
}

async fn unused_origin() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn config_for(origin: String, store_path: std::path::PathBuf) -> FeedbackQueueConfig {
    let mut config = FeedbackQueueConfig::mvp_v1(origin);
    config.store_location = Some(StoreLocation::File(store_path));
    config.sync_retry_interval_ms = 100;
    config.api.connect_timeout_ms = 500;
    config.api.request_timeout_ms = 2_000;
    config
}

async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_e2e_01_queued_feedback_reaches_server_through_background_sync() {
    let (addr, server) = start_dev_server().await;
    let dir = tempfile::tempdir().unwrap();
    let presenter = Arc::new(RecordingPresenter::default());
    let runtime = AdapterRuntime::new(
        config_for(format!("http://{addr}"), dir.path().join("queue.sqlite3")),
        presenter.clone(),
    )
    .unwrap();
    assert!(runtime.capabilities().supports_deferred_queue());

    let outcome = runtime.submit(Some("negative")).await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Queued {
            entry_id: EntryId(1)
        }
    );
    assert_eq!(
        presenter.notices.lock().unwrap().clone(),
        vec![FeedbackNotice::request_queued()]
    );

    wait_for("server to count the queued rating", || {
        server.snapshot().unwrap().count_for("negative") == 1
    })
    .await;
    wait_for("background sync to settle", || {
        runtime
            .background_sync_stats()
            .map(|stats| !stats.pending && stats.passes >= 1)
            .unwrap_or(false)
    })
    .await;
    assert_eq!(runtime.pending_count().await.unwrap(), 0);
    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_e2e_02_direct_send_refreshes_from_server() {
    let (addr, server) = start_dev_server().await;
    let dir = tempfile::tempdir().unwrap();
    let presenter = Arc::new(RecordingPresenter::default());
    let runtime = AdapterRuntime::new(
        config_for(format!("http://{addr}"), dir.path().join("queue.sqlite3")),
        presenter.clone(),
    )
    .unwrap();

    let outcome = runtime.submit_direct(Some("positive")).await.unwrap();
    let SubmitOutcome::Sent {
        refreshed: Some(snapshot),
    } = outcome
    else {
        panic!("expected a refreshed send, got {outcome:?}");
    };
    assert_eq!(snapshot.count_for("positive"), 1);
    assert_eq!(server.snapshot().unwrap().count_for("positive"), 1);
    assert_eq!(presenter.snapshots.lock().unwrap().len(), 1);
    assert_eq!(runtime.pending_count().await.unwrap(), 0);
    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_e2e_03_offline_queue_survives_restart_and_drains_later() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("queue.sqlite3");

    {
        let presenter = Arc::new(RecordingPresenter::default());
        let config = config_for(unused_origin().await, store_path.clone());
        let offline = AdapterRuntime::new(config, presenter).unwrap();
        offline.submit(Some("neutral")).await.unwrap();
        offline.submit(Some("neutral")).await.unwrap();
        wait_for("a failed background pass", || {
            offline
                .background_sync_stats()
                .map(|stats| stats.passes >= 1)
                .unwrap_or(false)
        })
        .await;
        assert_eq!(offline.pending_count().await.unwrap(), 2);
        offline.shutdown().await;
    }

    let (addr, server) = start_dev_server().await;
    let mut config = config_for(format!("http://{addr}"), store_path);
    config.background_sync_enabled = false;
    let online = AdapterRuntime::new(config, Arc::new(RecordingPresenter::default())).unwrap();
    assert!(!online.capabilities().supports_deferred_queue());

    let queued = online.queued_entries().await.unwrap();
    assert_eq!(
        queued.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![EntryId(1), EntryId(2)]
    );
    let metrics = online.run_drain_pass().await.unwrap();
    assert_eq!(metrics.delivered_count, 2);
    assert!(metrics.is_settled());
    assert_eq!(server.snapshot().unwrap().count_for("neutral"), 2);

    let again = online.run_drain_pass().await.unwrap();
    assert_eq!(again.read_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_e2e_04_dev_server_honours_api_contract() {
    let (addr, server) = start_dev_server().await;
    let client = SentimentApiClient::new(&SentimentApiConfig::mvp_v1(format!("http://{addr}")))
        .unwrap();
    let client_for_calls = client.clone();

    let (unknown, first, repeat, fetched) = tokio::task::spawn_blocking(move || {
        let unknown = client_for_calls
            .submit_sentiment(&SentimentLabel::new("ecstatic").unwrap(), None);
        let label = SentimentLabel::new("negative").unwrap();
        let first = client_for_calls.submit_sentiment(&label, Some("entry-key-1"));
        let repeat = client_for_calls.submit_sentiment(&label, Some("entry-key-1"));
        let fetched = client_for_calls.fetch_snapshot();
        (unknown, first, repeat, fetched)
    })
    .await
    .unwrap();

    assert!(matches!(
        unknown,
        Err(TransportError::Rejected { status: 400, .. })
    ));
    assert_eq!(first.unwrap().status, 201);
    assert_eq!(repeat.unwrap().status, 201);
    let fetched = fetched.unwrap();
    assert_eq!(fetched.count_for("negative"), 1);
    assert_eq!(fetched, server.snapshot().unwrap());
}
