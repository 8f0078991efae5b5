mod common;

use common::{get_test_config, harness, registration_body};
use push_registrar::adapters::queue::{MemoryQueue, RegistrationQueue};
use push_registrar::domain::token::SubscriptionStatus;
use push_registrar::workers::RegistrationWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct WorkerHarness {
    worker: RegistrationWorker,
    provider: Arc<common::FakeProvider>,
    store: Arc<push_registrar::adapters::database::MemoryTokenStore>,
}

fn worker_over(queue: &Arc<MemoryQueue>) -> WorkerHarness {
    let config = get_test_config();
    let common::Harness { processor, provider, store } = harness();
    let worker = RegistrationWorker::new(Arc::clone(queue) as _, processor, &config.queue);
    WorkerHarness { worker, provider, store }
}

#[tokio::test]
async fn test_succeeded_records_are_acknowledged() {
    let queue = Arc::new(MemoryQueue::default());
    let h = worker_over(&queue);
    let worker = &h.worker;

    queue.enqueue(&registration_body("token-a", "alerts")).await.unwrap();
    queue.enqueue(&registration_body("token-b", "alerts")).await.unwrap();

    let response = worker.process_next_batch().await.unwrap().expect("batch should be leased");

    assert_eq!(response.succeeded.len(), 2);
    assert_eq!(queue.pending().await, 0);
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn test_empty_queue_returns_none() {
    let queue = Arc::new(MemoryQueue::default());
    let WorkerHarness { worker, .. } = worker_over(&queue);

    assert!(worker.process_next_batch().await.unwrap().is_none());
}

#[tokio::test]
async fn test_transient_failure_is_redelivered_and_recovers() {
    let queue = Arc::new(MemoryQueue::default());
    let h = worker_over(&queue);
    let worker = &h.worker;
    h.provider.fail_probes("flaky-token", 1);

    let message_id = queue.enqueue(&registration_body("flaky-token", "alerts")).await.unwrap();

    let first = worker.process_next_batch().await.unwrap().expect("first delivery");
    assert_eq!(first.failed_ids().collect::<Vec<_>>(), vec![message_id.as_str()]);
    assert_eq!(queue.pending().await, 1);
    assert!(h.store.is_empty());

    let second = worker.process_next_batch().await.unwrap().expect("redelivery");
    assert_eq!(second.succeeded, vec![message_id]);
    assert_eq!(queue.pending().await, 0);

    let stored = h.store.get("flaky-token").expect("record should exist");
    assert_eq!(stored.subscription_status, SubscriptionStatus::Subscribed);
    assert_eq!(h.provider.probe_count(), 2);
}

#[tokio::test]
async fn test_malformed_record_is_dead_lettered_after_max_receives() {
    let queue = Arc::new(MemoryQueue::new(2));
    let WorkerHarness { worker, .. } = worker_over(&queue);

    let message_id = queue.enqueue("not json").await.unwrap();

    for _ in 0..2 {
        let response = worker.process_next_batch().await.unwrap().expect("record should be leased");
        assert!(!response.is_complete_success());
    }
    assert_eq!(worker.check_dead_letters().await.unwrap(), 0);

    assert!(worker.process_next_batch().await.unwrap().is_none());
    assert_eq!(worker.check_dead_letters().await.unwrap(), 1);
    assert_eq!(queue.pending().await, 0);

    let dead: serde_json::Value = serde_json::from_str(&queue.dead_letters().await[0]).unwrap();
    assert_eq!(dead["messageId"], message_id.as_str());
    assert_eq!(dead["body"], "not json");
}

#[tokio::test]
async fn test_run_reports_records_exhausted_by_transient_failures() {
    let queue = Arc::new(MemoryQueue::new(2));
    let WorkerHarness { worker, provider, store } = worker_over(&queue);
    provider.fail_probes("outage-token", 10);

    queue.enqueue(&registration_body("outage-token", "alerts")).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    let dead_lettered = tokio::time::timeout(Duration::from_secs(5), async {
        while queue.dead_letter_count().await.unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(dead_lettered.is_ok(), "record was never dead-lettered");
    assert!(store.is_empty());
    assert_eq!(provider.probe_count(), 2);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_drains_queue_and_stops_on_shutdown() {
    let queue = Arc::new(MemoryQueue::default());
    let WorkerHarness { worker, store, .. } = worker_over(&queue);

    for i in 0..25 {
        queue.enqueue(&registration_body(&format!("token-{i}"), "alerts")).await.unwrap();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while queue.pending().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "worker did not drain the queue");
    assert_eq!(store.len(), 25);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker should stop after shutdown")
        .unwrap();
}
