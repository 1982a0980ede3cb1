use crate::consumers::{Envelope, Handler, HandlerError, Incoming};
use std::{collections::HashMap, sync::Arc};

/// Routes envelopes to the handler registered for their `action`.
///
/// Handlers are registered once, at startup, using [`Dispatcher::builder`].
pub struct Dispatcher<Context> {
    handlers: HashMap<String, Arc<dyn Handler<Context>>>,
}

/// What happened to an envelope handed to the [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The registered handler applied the envelope successfully.
    Handled,
    /// No handler is registered for the envelope's action.
    ///
    /// Redelivering the message will never make the action recognisable: the message should
    /// be considered consumed.
    UnknownAction,
}

impl<Context> Dispatcher<Context>
where
    Context: Send + Sync + 'static,
{
    pub fn builder() -> DispatcherBuilder<Context> {
        DispatcherBuilder {
            handlers: HashMap::new(),
        }
    }

    /// The actions this dispatcher knows how to handle.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub async fn dispatch(
        &self,
        context: Arc<Context>,
        envelope: &Envelope,
    ) -> Result<DispatchOutcome, HandlerError> {
        let Some(handler) = self.handlers.get(&envelope.action) else {
            return Ok(DispatchOutcome::UnknownAction);
        };
        handler.handle(Incoming { context, envelope }).await?;
        Ok(DispatchOutcome::Handled)
    }
}

/// Collects handlers for a [`Dispatcher`].
pub struct DispatcherBuilder<Context> {
    handlers: HashMap<String, Arc<dyn Handler<Context>>>,
}

impl<Context> DispatcherBuilder<Context>
where
    Context: Send + Sync + 'static,
{
    /// Register `handler` for envelopes whose action is `action`.
    ///
    /// Registering a second handler for the same action replaces the first one.
    #[must_use]
    pub fn handler(mut self, action: impl Into<String>, handler: impl Handler<Context>) -> Self {
        self.handlers.insert(action.into(), Arc::new(handler));
        self
    }

    pub fn build(self) -> Dispatcher<Context> {
        Dispatcher {
            handlers: self.handlers,
        }
    }
}
