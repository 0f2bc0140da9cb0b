//! Durability and concurrency of the SQLite-backed failed-URL ledger.

use std::sync::Arc;

use media_ingest_core::{Database, FailedUrlLedger};
use tempfile::TempDir;

#[tokio::test]
async fn test_ledger_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("ledger.db");

    {
        let db = Database::new(&db_path).await.unwrap();
        let ledger = FailedUrlLedger::sqlite(db.clone());
        assert!(ledger.add("https://ext.example/broken.jpg").await.unwrap());
        db.close().await;
    }

    let db = Database::new(&db_path).await.unwrap();
    let ledger = FailedUrlLedger::sqlite(db);
    assert!(ledger.is_blacklisted("https://ext.example/broken.jpg").await.unwrap());
    assert!(!ledger.is_blacklisted("https://ext.example/other.jpg").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_adds_of_same_url_keep_one_entry() {
    let temp = TempDir::new().unwrap();
    let db = Database::new(&temp.path().join("ledger.db")).await.unwrap();
    let ledger = Arc::new(FailedUrlLedger::sqlite(db));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            ledger.add("https://ext.example/same.jpg").await.unwrap()
        }));
    }
    let mut newly_added = 0;
    for handle in handles {
        if handle.await.unwrap() {
            newly_added += 1;
        }
    }

    assert_eq!(newly_added, 1);
    assert_eq!(ledger.entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_and_clear() {
    let temp = TempDir::new().unwrap();
    let db = Database::new(&temp.path().join("ledger.db")).await.unwrap();
    let ledger = FailedUrlLedger::sqlite(db);
    for url in ["https://a.example/1.jpg", "https://a.example/2.jpg", "https://a.example/3.jpg"] {
        ledger.add(url).await.unwrap();
    }

    assert!(ledger.remove("https://a.example/2.jpg").await.unwrap());
    assert!(!ledger.remove("https://a.example/2.jpg").await.unwrap());
    assert!(!ledger.is_blacklisted("https://a.example/2.jpg").await.unwrap());

    assert_eq!(ledger.clear().await.unwrap(), 2);
    assert!(ledger.entries().await.unwrap().is_empty());
}
