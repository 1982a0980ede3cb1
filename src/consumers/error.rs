use crate::{
    consumers::envelope::MalformedMessage,
    queue::DeleteError,
    users::StoreError,
};

/// The error returned by message handlers.
///
/// Handlers fail as a whole: if `handle` returns an error, the envelope is considered not
/// applied and the message is left on the queue to be redelivered.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    /// The payload does not have the shape the handler expects.
    #[error("The payload does not match the `{action}` action.")]
    InvalidPayload {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why the processing of a single message did not complete.
///
/// None of these stop the consumer: the failure is logged and the consumer moves on to the
/// next message.
#[derive(thiserror::Error, Debug)]
pub enum ProcessingError {
    /// The message could not be decoded. It is left on the queue.
    #[error("The message is malformed.")]
    Malformed(#[source] MalformedMessage),
    /// The handler failed. The message is left on the queue.
    #[error("Handling of envelope `{envelope_id}` failed.")]
    Handler {
        envelope_id: String,
        #[source]
        source: HandlerError,
    },
    /// The envelope was dealt with, but the queue did not accept the delete: the message
    /// will be delivered (and handled) again.
    #[error("Failed to delete the message carrying envelope `{envelope_id}`.")]
    Delete {
        envelope_id: String,
        #[source]
        source: DeleteError,
    },
}
