#![forbid(unsafe_code)]

use std::fs;

use sentiment_contracts::feedback_queue::{EntryId, FeedbackRecordInput, StoreName};
use sentiment_contracts::sentiment::SentimentLabel;
use sentiment_contracts::UnixTimeMs;
use sentiment_storage::feedback_store::{FeedbackQueueStore, StorageError, StoreLocation};
use sentiment_storage::repo::{FeedbackQueueRepoOpener, SqliteFeedbackQueueOpener};

fn record(ts: u64, label: &str) -> FeedbackRecordInput {
    FeedbackRecordInput::v1(UnixTimeMs(ts), SentimentLabel::new(label).unwrap()).unwrap()
}

fn file_location(dir: &tempfile::TempDir) -> StoreLocation {
    StoreLocation::File(dir.path().join("nested").join("feedback.sqlite3"))
}

#[test]
fn at_feedback_queue_db_01_rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let location = file_location(&dir);
    {
        let store = FeedbackQueueStore::open(&location, StoreName::mvp_v1()).unwrap();
        assert_eq!(store.enqueue(&record(1_000, "negative")).unwrap(), EntryId(1));
        assert_eq!(store.enqueue(&record(2_000, "positive")).unwrap(), EntryId(2));
    }

    let reopened = FeedbackQueueStore::open(&location, StoreName::mvp_v1()).unwrap();
    let rows = reopened.drain().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, EntryId(1));
    assert_eq!(rows[0].sentiment.as_str(), "negative");
    assert_eq!(rows[1].timestamp, UnixTimeMs(2_000));
}

#[test]
fn at_feedback_queue_db_02_repeated_opens_share_persisted_rows() {
    let dir = tempfile::tempdir().unwrap();
    let opener = SqliteFeedbackQueueOpener::new(file_location(&dir), StoreName::mvp_v1());
    let a = opener.open_feedback_repo().unwrap();
    let b = opener.open_feedback_repo().unwrap();

    let id = a.enqueue_feedback_row(&record(5, "neutral")).unwrap();
    assert_eq!(b.feedback_row_count().unwrap(), 1);
    assert!(b.remove_feedback_row(id).unwrap());
    assert_eq!(a.feedback_row_count().unwrap(), 0);
}

#[test]
fn at_feedback_queue_db_03_remove_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FeedbackQueueStore::open(&file_location(&dir), StoreName::mvp_v1()).unwrap();
    let id = store.enqueue(&record(5, "neutral")).unwrap();
    assert!(store.remove(id).unwrap());
    assert!(!store.remove(id).unwrap());
    assert!(store.drain().unwrap().is_empty());
}

#[test]
fn at_feedback_queue_db_04_directory_path_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = FeedbackQueueStore::open(
        &StoreLocation::File(dir.path().to_path_buf()),
        StoreName::mvp_v1(),
    )
    .unwrap_err();
    assert!(err.is_unavailable(), "{err:?}");
}

#[test]
fn at_feedback_queue_db_05_foreign_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.sqlite3");
    fs::write(&path, vec![b'x'; 4096]).unwrap();
    let err = FeedbackQueueStore::open(&StoreLocation::File(path), StoreName::mvp_v1()).unwrap_err();
    assert!(err.is_unavailable(), "{err:?}");
}

#[test]
fn at_feedback_queue_db_06_newer_schema_version_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("PRAGMA user_version=99;").unwrap();
    }
    let err = FeedbackQueueStore::open(&StoreLocation::File(path), StoreName::mvp_v1()).unwrap_err();
    assert!(matches!(err, StorageError::Unavailable { .. }), "{err:?}");
}

#[test]
fn at_feedback_queue_db_07_invalid_record_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = FeedbackQueueStore::open(&file_location(&dir), StoreName::mvp_v1()).unwrap();
    store.enqueue(&record(5, "neutral")).unwrap();

    let mut bad = record(6, "positive");
    bad.timestamp = UnixTimeMs(0);
    let err = store.enqueue(&bad).unwrap_err();
    assert!(matches!(err, StorageError::ContractViolation(_)));
    assert_eq!(store.pending_count().unwrap(), 1);
}

#[test]
fn at_feedback_queue_db_08_store_names_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let location = file_location(&dir);
    let a = FeedbackQueueStore::open(&location, StoreName::new("queue_a").unwrap()).unwrap();
    let b = FeedbackQueueStore::open(&location, StoreName::new("queue_b").unwrap()).unwrap();
    a.enqueue(&record(5, "neutral")).unwrap();
    assert_eq!(a.pending_count().unwrap(), 1);
    assert_eq!(b.pending_count().unwrap(), 0);
}
