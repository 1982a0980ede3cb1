use crate::helpers::{random_registration, registration, FlakyQueue};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{atomic::Ordering, Arc};
use stock_worker::{
    consumers::{Consumer, CycleReport, Handler, HandlerError, Incoming},
    queue::InMemoryQueue,
    users::{InMemoryUserStore, RegisterUser, REGISTER_USER},
};
use tokio::sync::Mutex;

/// Records the id of every envelope it handles.
struct RecordIds;

#[async_trait]
impl Handler<Mutex<Vec<String>>> for RecordIds {
    async fn handle(&self, incoming: Incoming<'_, Mutex<Vec<String>>>) -> Result<(), HandlerError> {
        incoming
            .context
            .lock()
            .await
            .push(incoming.envelope.id.clone());
        Ok(())
    }
}

#[tokio::test]
async fn a_malformed_message_does_not_block_the_rest_of_the_batch() {
    // Arrange
    let queue = Arc::new(InMemoryQueue::default());
    let store = Arc::new(InMemoryUserStore::new());
    let (first, first_user) = random_registration("m1");
    let (second, second_user) = random_registration("m2");
    let (third, third_user) = random_registration("m3");
    queue.send(first).await;
    queue.send("this is not json").await;
    queue.send(second).await;
    queue.send(third).await;
    let consumer = Consumer::builder(queue.clone(), store.clone())
        .handler(REGISTER_USER, RegisterUser)
        .build()
        .unwrap();

    // Act
    let report = consumer.run_cycle().await.unwrap();

    // Assert
    assert_eq!(
        report,
        CycleReport {
            received: 4,
            completed: 3,
            discarded: 0,
            failed: 1
        }
    );
    for user_id in [first_user, second_user, third_user] {
        assert!(store.get("s1", &user_id).await.is_some());
    }
    assert_eq!(queue.bodies().await, vec![b"this is not json".to_vec()]);
}

#[tokio::test]
async fn a_message_without_a_body_is_left_on_the_queue() {
    // Arrange
    let queue = Arc::new(InMemoryQueue::default());
    let store = Arc::new(InMemoryUserStore::new());
    queue.send("").await;
    queue.send(registration("m1", "s1", "u1", "a")).await;
    let consumer = Consumer::builder(queue.clone(), store.clone())
        .handler(REGISTER_USER, RegisterUser)
        .build()
        .unwrap();

    // Act
    let report = consumer.run_cycle().await.unwrap();

    // Assert
    assert_eq!(report.failed, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(queue.bodies().await, vec![Vec::<u8>::new()]);
}

#[tokio::test]
async fn messages_with_an_unknown_action_are_deleted_whatever_their_payload() {
    // Arrange
    let queue = Arc::new(InMemoryQueue::default());
    let store = Arc::new(InMemoryUserStore::new());
    for data in [
        json!(null),
        json!({"stockId": "s1", "userId": "u1"}),
        json!([1, 2, 3]),
        json!("registerUser"),
    ] {
        let body = json!({"id": "m1", "action": "buyStock", "data": data}).to_string();
        queue.send(body).await;
    }
    let consumer = Consumer::builder(queue.clone(), store.clone())
        .handler(REGISTER_USER, RegisterUser)
        .build()
        .unwrap();

    // Act
    let report = consumer.run_cycle().await.unwrap();

    // Assert
    assert_eq!(report.discarded, 4);
    assert_eq!(report.failed, 0);
    assert!(queue.is_empty().await);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn messages_are_processed_in_delivery_order() {
    // Arrange
    let queue = Arc::new(InMemoryQueue::default());
    let handled = Arc::new(Mutex::new(Vec::new()));
    let ids: Vec<String> = (0..7).map(|i| format!("m{i}")).collect();
    for id in &ids {
        queue
            .send(json!({"id": id, "action": "record", "data": {}}).to_string())
            .await;
    }
    let consumer = Consumer::builder(queue.clone(), handled.clone())
        .handler("record", RecordIds)
        .build()
        .unwrap();

    // Act
    consumer.run_cycle().await.unwrap();

    // Assert
    assert_eq!(*handled.lock().await, ids);
}

#[tokio::test]
async fn a_cycle_fetches_at_most_one_batch() {
    // Arrange
    let queue = Arc::new(InMemoryQueue::default());
    let handled = Arc::new(Mutex::new(Vec::new()));
    for i in 0..15 {
        queue
            .send(json!({"id": format!("m{i}"), "action": "record", "data": {}}).to_string())
            .await;
    }
    let consumer = Consumer::builder(queue.clone(), handled.clone())
        .handler("record", RecordIds)
        .build()
        .unwrap();

    // Act
    let first = consumer.run_cycle().await.unwrap();
    let second = consumer.run_cycle().await.unwrap();

    // Assert
    assert_eq!(first.received, 10);
    assert_eq!(second.received, 5);
    assert_eq!(handled.lock().await.len(), 15);
}

#[tokio::test]
async fn an_empty_queue_is_not_an_error() {
    // Arrange
    let queue = Arc::new(InMemoryQueue::default());
    let consumer = Consumer::builder(queue, Arc::new(InMemoryUserStore::new()))
        .handler(REGISTER_USER, RegisterUser)
        .build()
        .unwrap();

    // Act
    let report = consumer.run_cycle().await.unwrap();

    // Assert
    assert_eq!(report, CycleReport::default());
}

#[tokio::test]
async fn a_failed_delete_is_counted_and_the_message_stays_on_the_queue() {
    // Arrange
    let queue = Arc::new(FlakyQueue::failing(0));
    queue.fail_deletes.store(true, Ordering::SeqCst);
    let store = Arc::new(InMemoryUserStore::new());
    queue.inner.send(registration("m1", "s1", "u1", "a")).await;
    let consumer = Consumer::builder(queue.clone(), store.clone())
        .handler(REGISTER_USER, RegisterUser)
        .build()
        .unwrap();

    // Act
    let report = consumer.run_cycle().await.unwrap();

    // Assert
    // The user is stored: when the message comes back, the upsert is simply applied again.
    assert_eq!(report.failed, 1);
    assert!(store.get("s1", "u1").await.is_some());
    assert_eq!(queue.inner.len().await, 1);
}

#[test]
fn a_consumer_needs_a_positive_batch_size() {
    let outcome = Consumer::builder(
        Arc::new(InMemoryQueue::default()),
        Arc::new(InMemoryUserStore::new()),
    )
    .batch_size(0)
    .handler(REGISTER_USER, RegisterUser)
    .build();

    assert!(outcome.is_err());
}
