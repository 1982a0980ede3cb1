use crate::consumers::{envelope::Envelope, error::HandlerError};
use std::sync::Arc;

/// A decoded envelope, together with the resources its handler may need.
///
/// `Incoming` is the input type of [`Handler::handle`].
pub struct Incoming<'e, C> {
    /// Resources that outlive the processing of a single message, e.g. a connection pool to
    /// the user store. Shared by all the handlers registered on a consumer.
    pub context: Arc<C>,
    pub envelope: &'e Envelope,
}

/// Applies the side effects associated with one `action`.
///
/// # Scope
///
/// Handlers never see the receipt of the message they are processing: deleting or releasing
/// the delivery is up to the consumer, based on the outcome of `handle`.
///
/// # Redelivery
///
/// Queues deliver messages at least once. A handler can be invoked more than once for the
/// same envelope (e.g. the worker crashed between the handler returning and the delete
/// reaching the queue), and it must be safe to do so.
#[async_trait::async_trait]
pub trait Handler<Context>: Send + Sync + 'static {
    async fn handle(&self, incoming: Incoming<'_, Context>) -> Result<(), HandlerError>;
}

#[async_trait::async_trait]
impl<Context, H> Handler<Context> for Box<H>
where
    Context: Send + Sync + 'static,
    H: Handler<Context> + ?Sized,
{
    async fn handle(&self, incoming: Incoming<'_, Context>) -> Result<(), HandlerError> {
        H::handle(self, incoming).await
    }
}
