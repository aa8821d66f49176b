//! Unit tests for the write-through blacklist.

use std::sync::Arc;

use securitybot::persistence::blacklist::Blacklist;
use securitybot::persistence::db::{self, Database};

async fn database() -> Arc<Database> {
    Arc::new(db::connect_memory().await.expect("in-memory db"))
}

#[tokio::test]
async fn empty_database_loads_empty_blacklist() {
    let blacklist = Blacklist::load(database().await).await.unwrap();
    assert!(blacklist.names().is_empty());
    assert!(!blacklist.contains("alice"));
}

#[tokio::test]
async fn add_is_idempotent() {
    let mut blacklist = Blacklist::load(database().await).await.unwrap();

    assert!(blacklist.add("svc-deploy").await.unwrap());
    assert!(!blacklist.add("svc-deploy").await.unwrap());
    assert!(blacklist.contains("svc-deploy"));
}

#[tokio::test]
async fn remove_reports_membership() {
    let mut blacklist = Blacklist::load(database().await).await.unwrap();
    blacklist.add("svc-deploy").await.unwrap();

    assert!(blacklist.remove("svc-deploy").await.unwrap());
    assert!(!blacklist.remove("svc-deploy").await.unwrap());
    assert!(!blacklist.contains("svc-deploy"));
}

#[tokio::test]
async fn changes_survive_reload() {
    let db = database().await;
    {
        let mut blacklist = Blacklist::load(Arc::clone(&db)).await.unwrap();
        blacklist.add("zed").await.unwrap();
        blacklist.add("amy").await.unwrap();
        blacklist.add("max").await.unwrap();
        blacklist.remove("max").await.unwrap();
    }

    let reloaded = Blacklist::load(db).await.unwrap();

    assert_eq!(reloaded.names(), vec!["amy", "zed"]);
}

#[tokio::test]
async fn membership_is_case_sensitive() {
    let mut blacklist = Blacklist::load(database().await).await.unwrap();
    blacklist.add("Alice").await.unwrap();

    assert!(blacklist.contains("Alice"));
    assert!(!blacklist.contains("alice"));
}
