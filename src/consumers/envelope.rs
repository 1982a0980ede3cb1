use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// The unit of work carried by a queue message.
///
/// On the wire an envelope is a JSON document:
///
/// ```json
/// {"id": "m1", "action": "registerUser", "data": {"stockId": "s1", "userId": "u1"}}
/// ```
///
/// `data` is left undecoded: its shape depends on `action` and it is up to the handler
/// registered for that action to make sense of it (see [`Envelope::data_as`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Identifies the logical event. It is not the transport-level message id.
    pub id: String,
    /// Selects the handler.
    pub action: String,
    pub data: serde_json::Value,
}

/// A message body that cannot be turned into an [`Envelope`].
#[derive(thiserror::Error, Debug)]
pub enum MalformedMessage {
    #[error("The message has no body.")]
    EmptyBody,
    #[error("The message body is not a valid envelope.")]
    InvalidEnvelope(#[source] serde_json::Error),
    #[error("The `{0}` field of the envelope is empty.")]
    EmptyField(&'static str),
}

impl Envelope {
    /// Decode a raw message body.
    pub fn decode(body: &[u8]) -> Result<Self, MalformedMessage> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(MalformedMessage::EmptyBody);
        }
        let envelope: Envelope =
            serde_json::from_slice(body).map_err(MalformedMessage::InvalidEnvelope)?;
        if envelope.id.is_empty() {
            return Err(MalformedMessage::EmptyField("id"));
        }
        if envelope.action.is_empty() {
            return Err(MalformedMessage::EmptyField("action"));
        }
        Ok(envelope)
    }

    /// Deserialize the payload into the type expected by the handler of this action.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}
