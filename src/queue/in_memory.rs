use super::{DeleteError, FetchError, QueueClient, RawMessage};
use redact::Secret;
use std::time::Duration;
use tokio::{
    sync::{Mutex, Notify},
    time::Instant,
};
use uuid::Uuid;

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// A queue living in the current process, with the delivery semantics of a hosted
/// visibility-timeout queue.
///
/// - A received message becomes invisible to other `receive` calls for `visibility_timeout`.
///   If it has not been deleted by then, it becomes visible again and will be redelivered.
/// - Each delivery gets a fresh receipt: a receipt from an earlier delivery can no longer
///   delete the message.
/// - `receive` waits up to `wait_time` for messages when none are visible.
pub struct InMemoryQueue {
    messages: Mutex<Vec<Slot>>,
    published: Notify,
    visibility_timeout: Duration,
    wait_time: Duration,
}

struct Slot {
    message_id: Uuid,
    body: Vec<u8>,
    invisible_until: Option<Instant>,
    current_receipt: Option<Uuid>,
    receive_count: u32,
}

/// Receipt for a delivery from an [`InMemoryQueue`].
#[derive(Debug)]
pub struct InMemoryReceipt {
    message_id: Uuid,
    handle: Secret<Uuid>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_TIMEOUT)
    }
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            published: Notify::new(),
            visibility_timeout,
            wait_time: Duration::ZERO,
        }
    }

    /// How long `receive` waits for a message to show up when the queue looks empty.
    /// Defaults to zero: `receive` returns immediately.
    #[must_use]
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Publish a message at the back of the queue.
    pub async fn send(&self, body: impl Into<Vec<u8>>) {
        self.messages.lock().await.push(Slot {
            message_id: Uuid::new_v4(),
            body: body.into(),
            invisible_until: None,
            current_receipt: None,
            receive_count: 0,
        });
        self.published.notify_waiters();
    }

    /// Number of messages that have not been deleted, in flight or not.
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The bodies of the messages that have not been deleted, in publishing order.
    pub async fn bodies(&self) -> Vec<Vec<u8>> {
        self.messages
            .lock()
            .await
            .iter()
            .map(|slot| slot.body.clone())
            .collect()
    }

    /// How many times each undeleted message has been delivered, in publishing order.
    pub async fn receive_counts(&self) -> Vec<u32> {
        self.messages
            .lock()
            .await
            .iter()
            .map(|slot| slot.receive_count)
            .collect()
    }

    /// Take up to `max_messages` visible messages, hiding them for the visibility timeout.
    ///
    /// Also returns the earliest instant at which a hidden message becomes visible again.
    async fn take_visible(
        &self,
        max_messages: usize,
    ) -> (Vec<RawMessage<InMemoryReceipt>>, Option<Instant>) {
        let now = Instant::now();
        let mut messages = self.messages.lock().await;
        let mut batch = Vec::new();
        let mut next_visible_at: Option<Instant> = None;

        for slot in messages.iter_mut() {
            match slot.invisible_until {
                Some(until) if until > now => {
                    next_visible_at = Some(next_visible_at.map_or(until, |t| t.min(until)));
                }
                _ if batch.len() < max_messages => {
                    let handle = Uuid::new_v4();
                    slot.invisible_until = Some(now + self.visibility_timeout);
                    slot.current_receipt = Some(handle);
                    slot.receive_count += 1;
                    batch.push(RawMessage {
                        body: slot.body.clone(),
                        receipt: InMemoryReceipt {
                            message_id: slot.message_id,
                            handle: handle.into(),
                        },
                    });
                }
                _ => {}
            }
        }
        (batch, next_visible_at)
    }
}

#[async_trait::async_trait]
impl QueueClient for InMemoryQueue {
    type Receipt = InMemoryReceipt;

    async fn receive(
        &self,
        max_messages: usize,
    ) -> Result<Vec<RawMessage<InMemoryReceipt>>, FetchError> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        let deadline = Instant::now() + self.wait_time;
        loop {
            // Register interest before looking, so a concurrent `send` cannot slip through.
            let published = self.published.notified();
            let (batch, next_visible_at) = self.take_visible(max_messages).await;
            if !batch.is_empty() || Instant::now() >= deadline {
                return Ok(batch);
            }
            let wake_at = next_visible_at.map_or(deadline, |t| t.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, published).await;
        }
    }

    async fn delete(&self, receipt: InMemoryReceipt) -> Result<(), DeleteError> {
        let mut messages = self.messages.lock().await;
        let position = messages
            .iter()
            .position(|slot| {
                slot.message_id == receipt.message_id
                    && slot.current_receipt.as_ref() == Some(receipt.handle.expose_secret())
            })
            .ok_or(DeleteError::UnknownReceipt)?;
        messages.remove(position);
        Ok(())
    }
}
