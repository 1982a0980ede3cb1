//! Facilities to drain a queue of envelopes. Check out [`Consumer`] as a starting point.
pub use builder::{ConsumerBuilder, ConsumerSettings};
pub use consumer::{Consumer, CycleReport};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherBuilder};
pub use envelope::{Envelope, MalformedMessage};
pub use error::{HandlerError, ProcessingError};
pub use handler::{Handler, Incoming};

mod builder;
mod consumer;
mod dispatcher;
mod envelope;
mod error;
mod handler;
