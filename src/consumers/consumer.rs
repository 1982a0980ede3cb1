use crate::{
    consumers::{
        builder::ConsumerBuilder, dispatcher::DispatchOutcome, Dispatcher, Envelope,
        ProcessingError,
    },
    queue::{FetchError, QueueClient, RawMessage},
};
use futures_util::{Future, FutureExt};
use shutdown_handler::ShutdownHandler;
use std::{sync::Arc, time::Duration};

/// Drains a queue: fetch a batch, process each message, acknowledge, repeat.
///
/// # Failure handling
///
/// - A message that cannot be decoded, or whose handler fails, is left on the queue (it will
///   be redelivered by the backend) and the consumer moves on to the next message.
/// - A message whose action has no registered handler is deleted: no redelivery will ever
///   make it processable.
/// - If fetching a batch fails, the consumer waits for the cooldown period and starts over.
///   It retries forever.
/// - If every message of a batch failed, the consumer also waits for the cooldown before
///   fetching again.
///
/// Messages within a batch are processed sequentially, in delivery order.
///
/// Use [`Consumer::builder`] to configure a consumer.
pub struct Consumer<Q, C>
where
    Q: QueueClient,
    C: Send + Sync + 'static,
{
    pub(super) queue: Arc<Q>,
    pub(super) context: Arc<C>,
    pub(super) dispatcher: Dispatcher<C>,
    pub(super) batch_size: usize,
    pub(super) cooldown: Duration,
    /// Stop after this many cycles. Runs indefinitely if `None`.
    pub(super) exit_after: Option<usize>,
}

/// What happened during a single fetch/process cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Messages returned by the queue.
    pub received: usize,
    /// Messages handled and deleted.
    pub completed: usize,
    /// Messages with an unknown action, deleted without being handled.
    pub discarded: usize,
    /// Messages that could not be processed or deleted. They will be redelivered.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageOutcome {
    Completed,
    Discarded,
}

impl<Q, C> Consumer<Q, C>
where
    Q: QueueClient,
    C: Send + Sync + 'static,
{
    /// Start building a [`Consumer`] pulling from `queue`.
    ///
    /// `context` is shared by all the handlers registered on the consumer: it is the place
    /// for resources with a significant initialisation cost, e.g. a database connection pool.
    pub fn builder(queue: Arc<Q>, context: Arc<C>) -> ConsumerBuilder<Q, C> {
        ConsumerBuilder::new(queue, context)
    }

    /// Consume messages until the process receives SIGTERM (or ctrl-c).
    ///
    /// You usually want to invoke `run_until_stopped` at the end of your `main` function.
    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        let shutdown = ShutdownHandler::sigterm()?;
        self.run_until_shutdown(shutdown.wait_for_signal()).await;
        Ok(())
    }

    /// Consume messages until `shutdown` resolves (or `exit_after` cycles have run).
    ///
    /// The shutdown signal is observed while waiting for messages and during the cooldown: a
    /// batch that is being processed is always processed to completion.
    #[tracing::instrument(skip_all, name = "consumer_run")]
    pub async fn run_until_shutdown(self, shutdown: impl Future<Output = ()>) {
        let shutdown = shutdown.fuse();
        tokio::pin!(shutdown);

        tracing::info!(
            batch_size = self.batch_size,
            actions = ?self.dispatcher.actions().collect::<Vec<_>>(),
            "Consumer started."
        );

        let mut cycles = 0;
        loop {
            if self.exit_after == Some(cycles) {
                break;
            }
            cycles += 1;

            let fetched = tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Consumer received shutdown event.");
                    break;
                }
                fetched = self.queue.receive(self.batch_size) => fetched,
            };
            let cool_down = match fetched {
                Ok(messages) => {
                    let report = self.process_batch(messages).await;
                    if report.received > 0 && report.failed == report.received {
                        tracing::warn!(
                            failed = report.failed,
                            cooldown_seconds = self.cooldown.as_secs_f64(),
                            "Every message of the batch failed, pausing before the next fetch."
                        );
                        true
                    } else {
                        false
                    }
                }
                Err(e) => {
                    tracing::error!(
                        error.message = %e,
                        error.details = ?e.0,
                        cooldown_seconds = self.cooldown.as_secs_f64(),
                        "Fetching messages failed, the consumer will restart after a cooldown."
                    );
                    true
                }
            };

            if cool_down {
                tokio::select! {
                    biased;

                    _ = &mut shutdown => {
                        tracing::info!("Consumer received shutdown event.");
                        break;
                    }
                    _ = tokio::time::sleep(self.cooldown) => {}
                }
            }
        }
        tracing::info!(cycles, "Consumer stopped.");
    }

    /// Fetch a single batch of messages and process it.
    ///
    /// Only a failure to fetch is returned as an error: failures to process individual
    /// messages are logged and counted in the returned [`CycleReport`].
    pub async fn run_cycle(&self) -> Result<CycleReport, FetchError> {
        let messages = self.queue.receive(self.batch_size).await?;
        Ok(self.process_batch(messages).await)
    }

    async fn process_batch(&self, messages: Vec<RawMessage<Q::Receipt>>) -> CycleReport {
        let mut report = CycleReport {
            received: messages.len(),
            ..CycleReport::default()
        };
        if messages.is_empty() {
            tracing::debug!("No messages to process.");
            return report;
        }

        tracing::info!(count = messages.len(), "Processing a batch of messages.");
        for message in messages {
            match self.process(message).await {
                Ok(MessageOutcome::Completed) => report.completed += 1,
                Ok(MessageOutcome::Discarded) => report.discarded += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        error = &e as &(dyn std::error::Error + 'static),
                        "Failed to process a message, it will be redelivered."
                    );
                }
            }
        }
        report
    }

    /// Decode, dispatch and acknowledge one message.
    #[tracing::instrument(
        name = "process_message",
        skip_all,
        fields(envelope_id = tracing::field::Empty, action = tracing::field::Empty)
    )]
    async fn process(
        &self,
        message: RawMessage<Q::Receipt>,
    ) -> Result<MessageOutcome, ProcessingError> {
        let RawMessage { body, receipt } = message;

        let envelope = match Envelope::decode(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.release(receipt).await;
                return Err(ProcessingError::Malformed(e));
            }
        };
        let span = tracing::Span::current();
        span.record("envelope_id", envelope.id.as_str());
        span.record("action", envelope.action.as_str());

        let outcome = match self
            .dispatcher
            .dispatch(self.context.clone(), &envelope)
            .await
        {
            Ok(DispatchOutcome::Handled) => MessageOutcome::Completed,
            Ok(DispatchOutcome::UnknownAction) => {
                tracing::warn!("Unknown action, the message will be deleted without processing.");
                MessageOutcome::Discarded
            }
            Err(source) => {
                self.release(receipt).await;
                return Err(ProcessingError::Handler {
                    envelope_id: envelope.id,
                    source,
                });
            }
        };

        self.queue
            .delete(receipt)
            .await
            .map_err(|source| ProcessingError::Delete {
                envelope_id: envelope.id.clone(),
                source,
            })?;
        tracing::info!("Message processed.");
        Ok(outcome)
    }

    /// Hand a delivery back to the queue. A failure here only delays redelivery.
    async fn release(&self, receipt: Q::Receipt) {
        if let Err(e) = self.queue.release(receipt).await {
            tracing::warn!(
                error = &e as &(dyn std::error::Error + 'static),
                "Failed to release a message."
            );
        }
    }
}
