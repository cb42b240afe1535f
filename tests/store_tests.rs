// tests/store_tests.rs

use std::sync::Arc;

use lms_backend::{
    models::{
        user::{NewUser, Role},
        weak_area::{WeakAreaStatus, WeakAreaUpdate},
    },
    store::{MemoryStore, PgStore, Store},
    utils::rate_limit::{PgRateLimiter, RateDecision, RateLimiter},
};
use sqlx::{PgPool, postgres::PgPoolOptions};

const CONCURRENT_UPDATES: i64 = 24;

async fn create_student(store: &dyn Store) -> i64 {
    let username = format!("s_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    store
        .create_user(NewUser {
            username,
            password_hash: "not-a-real-hash".to_string(),
            role: Role::Student,
            approved: true,
            batch: Some("2023".to_string()),
            section: Some("A".to_string()),
            year: None,
            semester: None,
        })
        .await
        .expect("create student")
        .id
}

fn update(student_id: i64, history_id: i64) -> WeakAreaUpdate {
    WeakAreaUpdate {
        student_id,
        subject: "Networks".to_string(),
        topic: "Routing".to_string(),
        wrong_count: 1,
        total_count: 2,
        subtopics: vec![format!("case-{}", history_id % 3)],
        prerequisites: vec![],
        attempt_id: Some(history_id),
    }
}

/// Fires many updates at one (student, subject, topic) at once and checks
/// that none of them was lost.
async fn concurrent_updates_are_all_applied(store: Arc<dyn Store>) {
    let student_id = create_student(store.as_ref()).await;

    let handles: Vec<_> = (1..=CONCURRENT_UPDATES)
        .map(|history_id| {
            let store = store.clone();
            tokio::spawn(async move { store.record_weak_area(&update(student_id, history_id)).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("task panicked").expect("update failed");
    }

    let areas = store.list_weak_areas(student_id, None).await.unwrap();
    assert_eq!(areas.len(), 1, "one row per key");
    let area = &areas[0];
    assert_eq!(area.total_attempts as i64, 2 * CONCURRENT_UPDATES);
    assert_eq!(area.wrong_answers_count as i64, CONCURRENT_UPDATES);
    assert_eq!(area.improvement_score, 50);
    assert_eq!(area.status, WeakAreaStatus::NeedsWork);

    let mut history = area.attempt_history.clone();
    history.sort_unstable();
    assert_eq!(history, (1..=CONCURRENT_UPDATES).collect::<Vec<_>>());

    let mut subtopics = area.subtopics.clone();
    subtopics.sort();
    assert_eq!(subtopics, vec!["case-0", "case-1", "case-2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_store_serializes_weak_area_updates() {
    concurrent_updates_are_all_applied(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn memory_store_keeps_counts_after_overflowing_update() {
    let store = MemoryStore::new();
    let student_id = create_student(&store).await;

    let mut big = update(student_id, 1);
    big.wrong_count = 0;
    big.total_count = i32::MAX;
    store.record_weak_area(&big).await.unwrap();

    assert!(store.record_weak_area(&big).await.is_err());
    let areas = store.list_weak_areas(student_id, None).await.unwrap();
    assert_eq!(areas[0].total_attempts, i32::MAX);
}

/// Connects to `DATABASE_URL` and migrates it. Returns `None` (and the test
/// passes vacuously) when no database is configured.
async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");
    Some(pool)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn postgres_store_serializes_weak_area_updates() {
    let Some(pool) = test_pool().await else { return };
    concurrent_updates_are_all_applied(Arc::new(PgStore::new(pool))).await;
}

#[tokio::test]
async fn postgres_rate_limiter_spends_shared_buckets() {
    let Some(pool) = test_pool().await else { return };
    let limiter = PgRateLimiter::new(pool, 2.0, 0.01);
    let key = format!("test:{}", uuid::Uuid::new_v4());

    assert_eq!(limiter.check(&key).await.unwrap(), RateDecision::Allowed);
    assert_eq!(limiter.check(&key).await.unwrap(), RateDecision::Allowed);
    match limiter.check(&key).await.unwrap() {
        RateDecision::Limited { retry_after_secs } => assert!(retry_after_secs >= 1),
        RateDecision::Allowed => panic!("third request should be limited"),
    }

    let other = format!("test:{}", uuid::Uuid::new_v4());
    assert_eq!(limiter.check(&other).await.unwrap(), RateDecision::Allowed);
}
