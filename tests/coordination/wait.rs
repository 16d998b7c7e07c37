use orion_automation::coordination::{CoordinationClient, InMemoryConnector, InMemoryCoordinationStore};
use orion_automation::error::{ConnectionError, WaitError};
use orion_automation::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const PATH: &str = "/admin/reassign_partitions";

fn client_for(store: &Arc<InMemoryCoordinationStore>) -> CoordinationClient {
    let connector = InMemoryConnector::new("zk-test:2181", Arc::clone(store));
    CoordinationClient::new(
        Arc::new(connector),
        RetryPolicy::new(3, Duration::from_millis(10)),
        Duration::from_secs(1),
    )
}

#[tokio::test(start_paused = true)]
async fn test_wait_observes_deletion_on_next_poll() {
    let store = Arc::new(InMemoryCoordinationStore::new());
    store.create(PATH, b"{}".to_vec());
    let client = client_for(&store);

    let deleter = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            store.delete(PATH)
        })
    };

    let started = Instant::now();
    let polls = client.wait_for_path_deleted(PATH).await.unwrap();

    assert!(deleter.await.unwrap());
    assert_eq!(polls, 4);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(3), "waited {waited:?}");
    assert!(waited < Duration::from_secs(4), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn test_absent_path_returns_immediately() {
    let store = Arc::new(InMemoryCoordinationStore::new());
    let client = client_for(&store);

    let started = Instant::now();
    assert_eq!(client.wait_for_path_deleted(PATH).await.unwrap(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(store.exists_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_with_deadline_times_out() {
    let store = Arc::new(InMemoryCoordinationStore::new());
    store.create(PATH, Vec::new());
    let client = client_for(&store);

    let err = client
        .wait_for_path_deleted_with(PATH, Duration::from_millis(500), Some(Duration::from_secs(2)))
        .await
        .unwrap_err();

    assert!(matches!(err, WaitError::Timeout { ref path, waited_ms } if path == PATH && waited_ms >= 2_000));
    assert!(store.exists_now(PATH));
}

#[tokio::test(start_paused = true)]
async fn test_session_loss_reconnects_and_keeps_waiting() {
    let store = Arc::new(InMemoryCoordinationStore::new());
    store.create(PATH, Vec::new());
    let client = client_for(&store);

    assert!(client.exists(PATH).await.unwrap());
    assert_eq!(client.sessions_created(), 1);

    store.expire_session_on_next_check();
    let deleter = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            store.delete(PATH);
        })
    };

    let polls = client.wait_for_path_deleted(PATH).await.unwrap();
    deleter.await.unwrap();

    assert!(polls >= 2);
    assert_eq!(client.sessions_created(), 2);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_store_exhausts_retries() {
    let connector = Arc::new(InMemoryConnector::unreachable("zk-down:2181"));
    let policy = RetryPolicy::new(3, Duration::from_millis(1_000));
    let client = CoordinationClient::new(connector.clone(), policy, Duration::from_secs(1));

    let started = Instant::now();
    let err = client.wait_for_path_deleted(PATH).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(
        err,
        WaitError::Connection(ConnectionError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(connector.attempts(), 3);
    assert!(!client.is_connected());

    // Backoff doubles between attempts: 1s after the first, 2s after the second.
    assert_eq!(policy.backoff_for(1), Duration::from_millis(1_000));
    assert_eq!(policy.backoff_for(2), Duration::from_millis(2_000));
    assert!(elapsed >= Duration::from_millis(3_000), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(4_000), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_transient_connect_failures_are_retried() {
    let store = Arc::new(InMemoryCoordinationStore::new());
    let connector = Arc::new(InMemoryConnector::new("zk-test:2181", Arc::clone(&store)).failing_first(2));
    let client = CoordinationClient::new(
        connector.clone(),
        RetryPolicy::new(3, Duration::from_millis(10)),
        Duration::from_secs(1),
    );

    assert!(!client.exists(PATH).await.unwrap());
    assert_eq!(connector.attempts(), 3);
    assert_eq!(client.sessions_created(), 1);
}
