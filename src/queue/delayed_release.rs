use super::{DeleteError, FetchError, QueueClient, RawMessage};
use std::time::Duration;
use tokio::{sync::Mutex, time::Instant};

/// Holds on to released deliveries for `delay` before handing them back to `inner`.
///
/// Backends without a visibility timeout (e.g. RabbitMq) requeue a released message at the
/// head of the queue: the next fetch returns it straight away. Wrapping them in
/// `DelayedRelease` keeps failed deliveries in flight, hence invisible to `receive`, until
/// `delay` has elapsed.
///
/// Held deliveries are released lazily, at the beginning of the next `receive` after their
/// delay expired. Dropping the wrapper drops the held receipts: for RabbitMq, the broker
/// requeues them once their channel is closed.
pub struct DelayedRelease<Q: QueueClient> {
    inner: Q,
    delay: Duration,
    held: Mutex<Vec<(Instant, Q::Receipt)>>,
}

impl<Q: QueueClient> DelayedRelease<Q> {
    pub fn new(inner: Q, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }

    /// Number of released deliveries that have not been handed back to `inner` yet.
    pub async fn held(&self) -> usize {
        self.held.lock().await.len()
    }

    async fn release_due(&self) {
        let now = Instant::now();
        let due: Vec<Q::Receipt> = {
            let mut held = self.held.lock().await;
            let (due, pending) = std::mem::take(&mut *held)
                .into_iter()
                .partition::<Vec<_>, _>(|(release_at, _)| *release_at <= now);
            *held = pending;
            due.into_iter().map(|(_, receipt)| receipt).collect()
        };
        for receipt in due {
            if let Err(e) = self.inner.release(receipt).await {
                tracing::warn!(
                    error = &e as &(dyn std::error::Error + 'static),
                    "Failed to release a delayed message."
                );
            }
        }
    }
}

#[async_trait::async_trait]
impl<Q: QueueClient> QueueClient for DelayedRelease<Q> {
    type Receipt = Q::Receipt;

    async fn receive(
        &self,
        max_messages: usize,
    ) -> Result<Vec<RawMessage<Q::Receipt>>, FetchError> {
        self.release_due().await;
        self.inner.receive(max_messages).await
    }

    async fn delete(&self, receipt: Q::Receipt) -> Result<(), DeleteError> {
        self.inner.delete(receipt).await
    }

    async fn release(&self, receipt: Q::Receipt) -> Result<(), DeleteError> {
        self.held
            .lock()
            .await
            .push((Instant::now() + self.delay, receipt));
        Ok(())
    }
}
