//! Unit tests for the per-user ignore list.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use securitybot::models::ignored::IgnoredAlert;
use securitybot::persistence::db;
use securitybot::persistence::ignore_list::IgnoreList;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).single().unwrap()
}

async fn list() -> IgnoreList {
    let db = Arc::new(db::connect_memory().await.expect("in-memory db"));
    IgnoreList::new(db)
}

#[test]
fn entry_expires_at_its_deadline() {
    let entry = IgnoredAlert {
        username: "alice".into(),
        title: "Suspicious login".into(),
        reason: "travelling".into(),
        until: now(),
    };
    assert!(!entry.is_expired(now() - Duration::seconds(1)));
    assert!(entry.is_expired(now()));
}

#[tokio::test]
async fn ignored_for_is_keyed_by_title_and_scoped_to_user() {
    let list = list().await;
    let until = now() + Duration::hours(2);
    list.ignore("alice", "Suspicious login", "travelling", until).await.unwrap();
    list.ignore("alice", "New device", "new laptop", until).await.unwrap();
    list.ignore("bob", "Suspicious login", "vpn", until).await.unwrap();

    let alice = list.ignored_for("alice", now()).await.unwrap();

    assert_eq!(alice.len(), 2);
    let entry = &alice["Suspicious login"];
    assert_eq!(entry.reason, "travelling");
    assert_eq!(entry.until, until);
    assert!(list.ignored_for("carol", now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn ignore_replaces_existing_entry() {
    let list = list().await;
    list.ignore("alice", "A", "first", now() + Duration::hours(1)).await.unwrap();
    list.ignore("alice", "A", "second", now() + Duration::hours(5)).await.unwrap();

    let entries = list.ignored_for("alice", now()).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries["A"].reason, "second");
    assert_eq!(entries["A"].until, now() + Duration::hours(5));
}

#[tokio::test]
async fn expired_entries_are_pruned_on_read() {
    let list = list().await;
    list.ignore("alice", "A", "short", now() + Duration::minutes(10)).await.unwrap();
    list.ignore("alice", "B", "long", now() + Duration::hours(10)).await.unwrap();

    let later = now() + Duration::minutes(10);
    let entries = list.ignored_for("alice", later).await.unwrap();

    assert!(!entries.contains_key("A"));
    assert!(entries.contains_key("B"));
    assert_eq!(list.prune(later).await.unwrap(), 0);
}

#[tokio::test]
async fn prune_reports_rows_removed() {
    let list = list().await;
    list.ignore("alice", "A", "", now() - Duration::hours(1)).await.unwrap();
    list.ignore("bob", "B", "", now() - Duration::minutes(1)).await.unwrap();
    list.ignore("bob", "C", "", now() + Duration::minutes(1)).await.unwrap();

    assert_eq!(list.prune(now()).await.unwrap(), 2);
}

#[tokio::test]
async fn remove_reports_whether_entry_existed() {
    let list = list().await;
    list.ignore("alice", "A", "", now() + Duration::hours(1)).await.unwrap();

    assert!(list.remove("alice", "A").await.unwrap());
    assert!(!list.remove("alice", "A").await.unwrap());
    assert!(list.ignored_for("alice", now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_returns_live_entries_soonest_first() {
    let list = list().await;
    list.ignore("bob", "late", "", now() + Duration::hours(3)).await.unwrap();
    list.ignore("alice", "soon", "", now() + Duration::hours(1)).await.unwrap();
    list.ignore("alice", "gone", "", now() - Duration::hours(1)).await.unwrap();

    let entries = list.list(now()).await.unwrap();

    let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["soon", "late"]);
}
