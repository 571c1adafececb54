use sqlx::{Pool, Postgres};

use folrs::postgres::{PgEventStore, PgStateStore, PgTransactionBackend};
use folrs::store::transaction::{
    AppendRequest, Commit, TransactionBackend, TransactionStatus, TransactionStore,
};
use folrs::store::{EventStore, StateStore};
use folrs::{Dependencies, FollowerActivation, FollowerConfig, FollowerState};

use crate::common::{TestEvent, TestFollower, TestState};

fn row(transaction_id: i64, data: &str) -> AppendRequest {
    AppendRequest {
        unit_name: "unit-a".to_owned(),
        transaction_id,
        data: data.to_owned(),
        status: TransactionStatus::Persisted,
    }
}

#[sqlx::test]
async fn setup_creates_the_tables(pool: Pool<Postgres>) {
    let event_store: PgEventStore<TestFollower> = PgEventStore::new(pool.clone()).await.unwrap();
    let state_store: PgStateStore<TestFollower> = PgStateStore::new(pool.clone()).await.unwrap();
    let backend = PgTransactionBackend::new(pool.clone()).await.unwrap();

    assert_eq!(event_store.table_name(), "test_events");
    assert_eq!(state_store.table_name(), "test_snapshots");
    assert_eq!(backend.table_name(), "transaction_records");

    for table in ["test_events", "test_snapshots", "transaction_records"] {
        let rows = sqlx::query("SELECT table_name FROM information_schema.columns WHERE table_name = $1")
            .bind(table)
            .fetch_all(&pool)
            .await
            .unwrap();
        assert!(!rows.is_empty(), "missing table {table}");
    }
}

#[sqlx::test]
async fn event_store_persists_and_reads_ranges(pool: Pool<Postgres>) {
    let store: PgEventStore<TestFollower> = PgEventStore::new(pool).await.unwrap();
    let key = "alpha".to_owned();

    for version in 1..=5 {
        let persisted = store
            .persist(&key, &TestEvent::Added { amount: version }, version)
            .await
            .unwrap();
        assert!(persisted);
    }

    // A producer retrying an already-written version loses the race quietly.
    let persisted = store.persist(&key, &TestEvent::Added { amount: 3 }, 3).await.unwrap();
    assert!(!persisted);

    let events = store.get_list(&key, 2, 4).await.unwrap();
    let versions: Vec<i64> = events.iter().map(|event| event.version()).collect();
    assert_eq!(versions, vec![3, 4]);

    let all = store.get_list(&key, 0, 100).await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all[0].payload, TestEvent::Added { amount: 1 });

    let none = store.get_list(&"beta".to_owned(), 0, 100).await.unwrap();
    assert!(none.is_empty());
}

#[sqlx::test]
async fn state_store_round_trips_snapshots(pool: Pool<Postgres>) {
    let store: PgStateStore<TestFollower> = PgStateStore::new(pool).await.unwrap();
    let key = "alpha".to_owned();

    assert!(store.get(&key).await.unwrap().is_none());

    let mut state = FollowerState {
        key: key.clone(),
        version: 1,
        doing_version: 1,
        inner: TestState {
            total: 10,
            applied_versions: vec![1],
        },
    };
    store.insert(&state).await.unwrap();

    let loaded = store.get(&key).await.unwrap().unwrap();
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.inner, state.inner);

    // Unique key per follower instance.
    assert!(store.insert(&state).await.is_err());

    state.version = 5;
    state.doing_version = 5;
    state.inner.total = 25;
    store.update(&state).await.unwrap();

    let loaded = store.get(&key).await.unwrap().unwrap();
    assert_eq!(loaded.version, 5);
    assert_eq!(loaded.inner.total, 25);

    store.delete(&key).await.unwrap();
    assert!(store.get(&key).await.unwrap().is_none());
}

#[sqlx::test]
async fn transaction_backend_bulk_is_all_or_nothing(pool: Pool<Postgres>) {
    let backend = PgTransactionBackend::new(pool).await.unwrap();

    backend
        .insert_bulk(&[row(1, "a"), row(2, "b"), row(3, "c")])
        .await
        .unwrap();
    assert_eq!(backend.get_list("unit-a").await.unwrap().len(), 3);

    // One duplicate aborts the whole transaction: the fresh row 4 must not
    // survive the rollback.
    let result = backend.insert_bulk(&[row(4, "d"), row(2, "dup")]).await;
    assert!(result.is_err());
    let rows = backend.get_list("unit-a").await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|row| row.transaction_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    assert!(backend.insert_one(&row(4, "d")).await.unwrap());
    assert!(!backend.insert_one(&row(2, "dup")).await.unwrap());
    assert_eq!(backend.get_list("unit-a").await.unwrap().len(), 4);

    assert!(backend.update_status("unit-a", 1, TransactionStatus::Committed).await.unwrap());
    assert!(!backend.update_status("unit-a", 404, TransactionStatus::Committed).await.unwrap());

    backend.delete("unit-a", 1).await.unwrap();
    assert_eq!(backend.get_list("unit-a").await.unwrap().len(), 3);
}

#[sqlx::test]
async fn transaction_store_appends_through_postgres(pool: Pool<Postgres>) {
    let backend = PgTransactionBackend::new(pool).await.unwrap();
    let store = TransactionStore::new(backend);

    let commit = Commit {
        transaction_id: 1,
        data: "step-one".to_owned(),
        status: TransactionStatus::Persisted,
    };

    assert!(store.append("unit-a", &commit).await.unwrap());
    assert!(!store.append("unit-a", &commit).await.unwrap());

    let commits: Vec<Commit<String>> = store.get_list("unit-a").await.unwrap();
    assert_eq!(commits, vec![commit]);
}

#[sqlx::test]
async fn follower_activates_from_postgres_stores(pool: Pool<Postgres>) {
    let event_store: PgEventStore<TestFollower> = PgEventStore::new(pool.clone()).await.unwrap();
    let state_store: PgStateStore<TestFollower> = PgStateStore::new(pool).await.unwrap();
    let key = "alpha".to_owned();

    for version in 1..=4 {
        assert!(event_store
            .persist(&key, &TestEvent::Added { amount: version * 10 }, version)
            .await
            .unwrap());
    }

    let activation = FollowerActivation::activate(
        TestFollower,
        key.clone(),
        FollowerConfig::default().fully_active(),
        Dependencies::new(event_store, state_store.clone()),
    )
    .await
    .unwrap();

    assert_eq!(activation.state().version, 4);
    assert_eq!(activation.state().inner.total, 10 + 20 + 30 + 40);

    let snapshot = state_store.get(&key).await.unwrap().unwrap();
    assert_eq!(snapshot.version, 4);
    assert_eq!(snapshot.inner, activation.state().inner);
}
