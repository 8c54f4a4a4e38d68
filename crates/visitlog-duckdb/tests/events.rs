use chrono::{DateTime, Duration, TimeZone, Utc};

use visitlog_core::analytics::{EventQuery, EventStore};
use visitlog_core::event::PageView;
use visitlog_core::visitor::DeviceType;
use visitlog_duckdb::DuckDbBackend;

fn page_view(id: &str, path: &str, at: DateTime<Utc>) -> PageView {
    PageView {
        id: id.to_string(),
        path: path.to_string(),
        method: "GET".to_string(),
        client_ip: "203.0.113.7".to_string(),
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148"
            .to_string(),
        referrer: "https://duckduckgo.com/".to_string(),
        duration_ms: 12,
        timestamp: at,
        visitor_id: "0123456789abcdef".to_string(),
        device_type: DeviceType::Mobile,
        browser: "safari".to_string(),
        os: "ios".to_string(),
        country: String::new(),
        utm_source: "newsletter".to_string(),
        utm_medium: String::new(),
        utm_campaign: String::new(),
        is_new_visit: true,
        query: "utm_source=newsletter".to_string(),
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap() + Duration::milliseconds(125)
}

#[tokio::test]
async fn insert_and_read_back_round_trips_every_column() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    let original = page_view("evt-1", "/pricing", base_time());
    db.insert_events(std::slice::from_ref(&original))
        .await
        .expect("insert");

    let rows = db
        .recent_events(&EventQuery {
            since: base_time() - Duration::days(1),
            limit: 10,
        })
        .await
        .expect("query");

    assert_eq!(rows, vec![original]);
}

#[tokio::test]
async fn recent_events_are_newest_first_and_bounded() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    let t0 = base_time();
    let events = vec![
        page_view("old", "/a", t0 - Duration::days(200)),
        page_view("e1", "/a", t0 - Duration::minutes(30)),
        page_view("e2", "/b", t0 - Duration::minutes(20)),
        page_view("e3", "/c", t0 - Duration::minutes(10)),
    ];
    db.insert_events(&events).await.expect("insert");

    let rows = db
        .recent_events(&EventQuery {
            since: t0 - Duration::days(90),
            limit: 2,
        })
        .await
        .expect("query");
    let ids: Vec<&str> = rows.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e3", "e2"]);

    // The lifetime count ignores the lookback window.
    assert_eq!(db.count_events().await.expect("count"), 4);
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    db.insert_events(&[]).await.expect("insert");
    assert_eq!(db.count_events().await.expect("count"), 0);
}

#[tokio::test]
async fn failed_batch_commits_nothing() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    let t0 = base_time();
    // Duplicate primary key inside one batch.
    let batch = vec![page_view("dup", "/a", t0), page_view("dup", "/b", t0)];
    assert!(db.insert_events(&batch).await.is_err());
    assert_eq!(db.count_events().await.expect("count"), 0);
}

#[tokio::test]
async fn delete_events_before_prunes_only_older_rows() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    let t0 = base_time();
    let events = vec![
        page_view("a", "/", t0 - Duration::days(400)),
        page_view("b", "/", t0 - Duration::days(366)),
        page_view("c", "/", t0 - Duration::days(10)),
    ];
    db.insert_events(&events).await.expect("insert");

    let deleted = db
        .delete_events_before(t0 - Duration::days(365))
        .await
        .expect("delete");
    assert_eq!(deleted, 2);
    assert_eq!(db.count_events().await.expect("count"), 1);
}

#[tokio::test]
async fn whole_second_timestamps_parse() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    db.insert_events(&[page_view("w", "/", at)])
        .await
        .expect("insert");

    let rows = db
        .recent_events(&EventQuery {
            since: at - Duration::hours(1),
            limit: 1,
        })
        .await
        .expect("query");
    assert_eq!(rows[0].timestamp, at);
}

#[tokio::test]
async fn schema_creates_expected_indexes() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    let conn = db.conn_for_test().await;
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM duckdb_indexes() WHERE table_name = 'analytics_events'",
            [],
            |row| row.get(0),
        )
        .expect("index count");
    assert_eq!(count, 6);
}

#[tokio::test]
async fn usable_through_the_trait_object() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    let store: std::sync::Arc<dyn EventStore> = std::sync::Arc::new(db);
    store.ping().await.expect("ping");
    store
        .insert_events(&[page_view("t", "/", base_time())])
        .await
        .expect("insert");
    assert_eq!(store.count_events().await.expect("count"), 1);
}

#[tokio::test]
async fn equal_timestamps_come_back_latest_insert_first() {
    let db = DuckDbBackend::open_in_memory().expect("open");
    let at = base_time();
    let mut first = page_view("first", "/a", at);
    first.browser = "firefox".to_string();
    let second = page_view("second", "/b", at);
    db.insert_events(&[first]).await.expect("insert first");
    db.insert_events(&[second]).await.expect("insert second");

    let mut same_batch = page_view("third", "/c", at);
    same_batch.visitor_id = "ffffffffffffffff".to_string();
    let fourth = page_view("fourth", "/d", at);
    db.insert_events(&[same_batch, fourth])
        .await
        .expect("insert batch");

    for _ in 0..5 {
        let rows = db
            .recent_events(&EventQuery {
                since: at - Duration::hours(1),
                limit: 10,
            })
            .await
            .expect("query");
        let ids: Vec<&str> = rows.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["fourth", "third", "second", "first"]);
    }
}
