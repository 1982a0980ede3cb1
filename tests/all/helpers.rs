use fake::{faker::name::en::FirstName, Fake};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};
use stock_worker::{
    queue::{DeleteError, FetchError, InMemoryQueue, InMemoryReceipt, QueueClient, RawMessage},
    users::{InMemoryUserStore, RegistrationRecord, StoreError, UserStore},
};
use tokio::time::Instant;

pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// The JSON body of a `registerUser` envelope.
pub fn registration(id: &str, stock_id: &str, user_id: &str, nickname: &str) -> String {
    json!({
        "id": id,
        "action": "registerUser",
        "data": {
            "stockId": stock_id,
            "userId": user_id,
            "userInfo": {"gender": "F", "nickname": nickname}
        }
    })
    .to_string()
}

/// A `registerUser` envelope for a randomly named user in session `s1`.
pub fn random_registration(id: &str) -> (String, String) {
    let user_id = uuid::Uuid::new_v4().to_string();
    let nickname: String = FirstName().fake();
    (registration(id, "s1", &user_id, &nickname), user_id)
}

/// An [`InMemoryQueue`] that can be told to fail.
pub struct FlakyQueue {
    pub inner: InMemoryQueue,
    /// The next `n` calls to `receive` fail.
    pub failing_receives: AtomicUsize,
    /// Every call to `delete` fails while set.
    pub fail_deletes: AtomicBool,
    /// When each `receive` call was issued.
    pub receive_calls: Mutex<Vec<Instant>>,
}

impl FlakyQueue {
    pub fn failing(receives: usize) -> Self {
        Self {
            inner: InMemoryQueue::new(VISIBILITY_TIMEOUT),
            failing_receives: AtomicUsize::new(receives),
            fail_deletes: AtomicBool::new(false),
            receive_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn receive_calls(&self) -> Vec<Instant> {
        self.receive_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl QueueClient for FlakyQueue {
    type Receipt = InMemoryReceipt;

    async fn receive(
        &self,
        max_messages: usize,
    ) -> Result<Vec<RawMessage<InMemoryReceipt>>, FetchError> {
        self.receive_calls.lock().unwrap().push(Instant::now());
        let failing = self
            .failing_receives
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow::anyhow!("connection refused").into());
        }
        self.inner.receive(max_messages).await
    }

    async fn delete(&self, receipt: InMemoryReceipt) -> Result<(), DeleteError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(DeleteError::Backend(anyhow::anyhow!("channel closed")));
        }
        self.inner.delete(receipt).await
    }
}

/// An [`InMemoryUserStore`] whose first `n` writes fail.
#[derive(Default)]
pub struct FailingStore {
    pub inner: InMemoryUserStore,
    pub failures_left: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl FailingStore {
    pub fn failing(writes: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(writes),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl UserStore for FailingStore {
    async fn upsert(&self, record: &RegistrationRecord) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable(anyhow::anyhow!("connection reset")));
        }
        self.inner.upsert(record).await
    }
}

/// A queue without visibility timeout, acknowledging like an AMQP broker: a released message
/// is requeued at its original position, ahead of everything published after it, and is
/// returned by the very next `receive`.
#[derive(Default)]
pub struct RequeueQueue {
    state: Mutex<RequeueState>,
}

#[derive(Default)]
struct RequeueState {
    next_tag: u64,
    ready: Vec<(u64, Vec<u8>)>,
    unacked: HashMap<u64, Vec<u8>>,
    deliveries: usize,
}

#[derive(Debug)]
pub struct DeliveryTag(u64);

impl RequeueQueue {
    pub fn send(&self, body: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        let tag = state.next_tag;
        state.next_tag += 1;
        state.ready.push((tag, body.into()));
    }

    /// Messages that have not been acknowledged, in flight or not.
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.ready.len() + state.unacked.len()
    }

    /// How many messages have been handed out so far, redeliveries included.
    pub fn deliveries(&self) -> usize {
        self.state.lock().unwrap().deliveries
    }
}

#[async_trait::async_trait]
impl QueueClient for RequeueQueue {
    type Receipt = DeliveryTag;

    async fn receive(
        &self,
        max_messages: usize,
    ) -> Result<Vec<RawMessage<DeliveryTag>>, FetchError> {
        let mut state = self.state.lock().unwrap();
        let count = max_messages.min(state.ready.len());
        let batch: Vec<_> = state.ready.drain(..count).collect();
        state.deliveries += batch.len();
        Ok(batch
            .into_iter()
            .map(|(tag, body)| {
                state.unacked.insert(tag, body.clone());
                RawMessage {
                    body,
                    receipt: DeliveryTag(tag),
                }
            })
            .collect())
    }

    async fn delete(&self, receipt: DeliveryTag) -> Result<(), DeleteError> {
        let mut state = self.state.lock().unwrap();
        state
            .unacked
            .remove(&receipt.0)
            .map(|_| ())
            .ok_or(DeleteError::UnknownReceipt)
    }

    async fn release(&self, receipt: DeliveryTag) -> Result<(), DeleteError> {
        let mut state = self.state.lock().unwrap();
        let body = state
            .unacked
            .remove(&receipt.0)
            .ok_or(DeleteError::UnknownReceipt)?;
        let position = state.ready.partition_point(|(tag, _)| *tag < receipt.0);
        state.ready.insert(position, (receipt.0, body));
        Ok(())
    }
}
