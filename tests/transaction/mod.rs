use std::sync::Arc;
use std::time::Duration;

use folrs::store::transaction::{
    AppendRequest, Commit, TransactionStatus, TransactionStore, TransactionStoreConfig,
    TransactionStoreError,
};

use crate::common::InMemoryTransactionBackend;

fn commit(transaction_id: i64, data: &str) -> Commit<String> {
    Commit {
        transaction_id,
        data: data.to_owned(),
        status: TransactionStatus::Persisted,
    }
}

/// Parks the consumer on a sacrificial append so that everything appended
/// afterwards piles up in the queue and drains as one batch.
async fn park_consumer(
    backend: &Arc<InMemoryTransactionBackend>,
    store: &Arc<TransactionStore<Arc<InMemoryTransactionBackend>>>,
) -> tokio::task::JoinHandle<bool> {
    backend.hold_bulk();

    let decoy = {
        let store = Arc::clone(store);
        tokio::spawn(async move { store.append("unit-a", &commit(99, "decoy")).await.unwrap() })
    };

    while !backend.bulk_in_flight() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    decoy
}

#[tokio::test]
async fn batched_appends_commit_in_one_bulk_transaction() {
    let backend = Arc::new(InMemoryTransactionBackend::default());
    let store = Arc::new(TransactionStore::new(Arc::clone(&backend)));

    let decoy = park_consumer(&backend, &store).await;

    let mut appends = Vec::new();
    for transaction_id in 1..=3 {
        let store = Arc::clone(&store);
        appends.push(tokio::spawn(async move {
            store
                .append("unit-a", &commit(transaction_id, "step"))
                .await
                .unwrap()
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    backend.release_bulk();

    assert!(decoy.await.unwrap());
    for append in appends {
        assert!(append.await.unwrap());
    }

    // The decoy went alone; the three coalesced into a single transaction.
    assert_eq!(backend.bulk_sizes(), vec![1, 3]);
    assert_eq!(backend.singles(), 0);
    assert_eq!(backend.rows().len(), 4);
}

#[tokio::test]
async fn duplicate_in_batch_falls_back_to_single_rows_in_order() {
    let backend = Arc::new(InMemoryTransactionBackend::seeded(vec![AppendRequest {
        unit_name: "unit-a".to_owned(),
        transaction_id: 2,
        data: "\"original\"".to_owned(),
        status: TransactionStatus::Persisted,
    }]));
    let store = Arc::new(TransactionStore::new(Arc::clone(&backend)));

    let decoy = park_consumer(&backend, &store).await;

    let mut appends = Vec::new();
    for transaction_id in 1..=3 {
        let store = Arc::clone(&store);
        appends.push(tokio::spawn(async move {
            store
                .append("unit-a", &commit(transaction_id, "replacement"))
                .await
                .unwrap()
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    backend.release_bulk();

    assert!(decoy.await.unwrap());
    let outcomes: Vec<bool> = {
        let mut outcomes = Vec::new();
        for append in appends {
            outcomes.push(append.await.unwrap());
        }
        outcomes
    };

    // The middle row already existed: bulk aborted, the fallback inserted the
    // other two and reported the duplicate as "already appended".
    assert_eq!(outcomes, vec![true, false, true]);
    assert_eq!(backend.bulk_sizes(), vec![1, 3]);
    assert_eq!(backend.singles(), 3);

    let row_2: Vec<AppendRequest> = backend
        .rows()
        .into_iter()
        .filter(|row| row.transaction_id == 2)
        .collect();
    assert_eq!(row_2.len(), 1);
    assert_eq!(row_2[0].data, "\"original\"");
}

#[tokio::test]
async fn sequential_duplicate_append_returns_false() {
    let backend = Arc::new(InMemoryTransactionBackend::default());
    let store = TransactionStore::new(Arc::clone(&backend));

    assert!(store.append("unit-a", &commit(7, "first")).await.unwrap());
    assert!(!store.append("unit-a", &commit(7, "second")).await.unwrap());

    assert_eq!(backend.rows().len(), 1);

    let commits: Vec<Commit<String>> = store.get_list("unit-a").await.unwrap();
    assert_eq!(commits, vec![commit(7, "first")]);
}

#[tokio::test]
async fn appended_commits_round_trip_through_get_list() {
    let backend = Arc::new(InMemoryTransactionBackend::default());
    let store = TransactionStore::new(Arc::clone(&backend));

    for transaction_id in [3, 1, 2] {
        let appended = store
            .append("unit-a", &commit(transaction_id, &format!("step-{transaction_id}")))
            .await
            .unwrap();
        assert!(appended);
    }
    assert!(store.append("unit-b", &commit(1, "other-unit")).await.unwrap());

    let commits: Vec<Commit<String>> = store.get_list("unit-a").await.unwrap();
    assert_eq!(
        commits,
        vec![commit(1, "step-1"), commit(2, "step-2"), commit(3, "step-3")]
    );
}

#[tokio::test]
async fn update_and_delete_manage_the_commit_lifecycle() {
    let backend = Arc::new(InMemoryTransactionBackend::default());
    let store = TransactionStore::new(Arc::clone(&backend));

    assert!(store.append("unit-a", &commit(5, "step")).await.unwrap());

    assert!(store.update("unit-a", 5, TransactionStatus::Committed).await.unwrap());
    let commits: Vec<Commit<String>> = store.get_list("unit-a").await.unwrap();
    assert_eq!(commits[0].status, TransactionStatus::Committed);

    assert!(!store.update("unit-a", 404, TransactionStatus::Rolledback).await.unwrap());

    store.delete("unit-a", 5).await.unwrap();
    let commits: Vec<Commit<String>> = store.get_list("unit-a").await.unwrap();
    assert!(commits.is_empty());
}

#[tokio::test]
async fn slow_reads_surface_as_elapsed() {
    let backend = Arc::new(InMemoryTransactionBackend::default());
    *backend.read_delay.lock().unwrap() = Some(Duration::from_millis(200));

    let store = TransactionStore::with_config(
        Arc::clone(&backend),
        TransactionStoreConfig::default().with_read_timeout(Duration::from_millis(20)),
    );

    let error = store.get_list::<String>("unit-a").await.unwrap_err();
    assert!(matches!(error, TransactionStoreError::Elapsed(_)));
}
