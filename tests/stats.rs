//! Aggregate statistics and archive visibility tests.

use chrono::{DateTime, TimeZone, Utc};
use incident_tracker::models::NotificationStatus;
use incident_tracker::pairing::link_pair;
use incident_tracker::store;
use incident_tracker::test_support::{TestDatabase, TestFixtures};

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 29, hour, 0, 0).unwrap()
}

#[tokio::test]
async fn open_count_excludes_resolved_references() {
    let db = TestDatabase::new().await.expect("test database");
    let pool = db.pool_clone();
    let fixtures = TestFixtures::new(&pool);

    // Resolved lifecycle: open + resolved, linked.
    fixtures
        .insert_notification("s1-open", "S-100001", NotificationStatus::Open, at(8))
        .await
        .unwrap();
    fixtures
        .insert_notification_with_duration(
            "s1-resolved",
            "S-100001",
            NotificationStatus::Resolved,
            at(10),
            Some(60),
        )
        .await
        .unwrap();
    assert!(link_pair(&pool, "S-100001").await.unwrap());

    // Still genuinely open.
    fixtures
        .insert_notification("s2-open", "S-100002", NotificationStatus::Open, at(9))
        .await
        .unwrap();
    fixtures
        .insert_notification(
            "s3-continuing",
            "S-100003",
            NotificationStatus::Continuing,
            at(9),
        )
        .await
        .unwrap();

    let stats = store::current_stats(&pool, false).await.unwrap();

    assert_eq!(stats.total_notifications, 4);
    // S-100001 has a Resolved record, so only S-100002 and S-100003 count.
    assert_eq!(stats.open_count, 2);
    // Both S-100001 rows were propagated to Resolved.
    assert_eq!(stats.resolved_count, 2);
    assert_eq!(stats.continuing_count, 1);
    assert_eq!(stats.avg_resolution_time_minutes, 120.0);
    assert_eq!(stats.avg_incident_duration_minutes, 60.0);

    let unknown = stats
        .platform_incident_stats
        .get("Unknown")
        .expect("incident stats for platform");
    assert_eq!(unknown.count, 1);
    assert_eq!(unknown.avg_duration_minutes, 60.0);
    assert_eq!(unknown.total_duration_minutes, 60);

    db.close().await.expect("drop test database");
}

#[tokio::test]
async fn resolved_reference_stays_closed_even_when_archived() {
    let db = TestDatabase::new().await.expect("test database");
    let pool = db.pool_clone();
    let fixtures = TestFixtures::new(&pool);

    fixtures
        .insert_notification("t1-open", "S-100010", NotificationStatus::Open, at(8))
        .await
        .unwrap();
    fixtures
        .insert_notification("t1-resolved", "S-100010", NotificationStatus::Resolved, at(9))
        .await
        .unwrap();

    // Archive only rows received before 08:30: the Open row.
    let archived = store::archive_older_than(&pool, at(8) + chrono::Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(archived, 1);

    let stats = store::current_stats(&pool, false).await.unwrap();
    // The resolved record closes the reference regardless of the archive
    // filter on the open side.
    assert_eq!(stats.open_count, 0);
    assert_eq!(stats.total_notifications, 1);

    db.close().await.expect("drop test database");
}

#[tokio::test]
async fn archived_rows_hidden_by_default_visible_on_request() {
    let db = TestDatabase::new().await.expect("test database");
    let pool = db.pool_clone();
    let fixtures = TestFixtures::new(&pool);

    fixtures
        .insert_notification("u1", "S-100020", NotificationStatus::Open, at(8))
        .await
        .unwrap();

    let flipped = store::archive_older_than(&pool, Utc::now()).await.unwrap();
    assert_eq!(flipped, 1);

    // Repeat sweep is idempotent on already-archived rows.
    let again = store::archive_older_than(&pool, Utc::now()).await.unwrap();
    assert_eq!(again, 0);

    let hidden = store::list_by_status(&pool, NotificationStatus::Open, false)
        .await
        .unwrap();
    assert!(hidden.is_empty());

    let visible = store::list_by_status(&pool, NotificationStatus::Open, true)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert!(visible[0].is_archived);

    db.close().await.expect("drop test database");
}
