use super::{RegistrationRecord, UserStore};
use crate::consumers::{Handler, HandlerError, Incoming};

/// The action tag of user registration envelopes.
pub const REGISTER_USER: &str = "registerUser";

/// Registers a user into the [`UserStore`] found in the consumer context.
///
/// The write is an upsert keyed by `(stock_id, user_id)`: a redelivered envelope is applied
/// again and leaves the store unchanged.
///
/// Redeliveries are not ordered with respect to newer events: a stale envelope processed
/// after a newer one for the same key overwrites it.
pub struct RegisterUser;

#[async_trait::async_trait]
impl<S> Handler<S> for RegisterUser
where
    S: UserStore,
{
    async fn handle(&self, incoming: Incoming<'_, S>) -> Result<(), HandlerError> {
        let record: RegistrationRecord =
            incoming
                .envelope
                .data_as()
                .map_err(|source| HandlerError::InvalidPayload {
                    action: REGISTER_USER,
                    source,
                })?;
        tracing::info!(
            stock_id = %record.stock_id,
            user_id = %record.user_id,
            "Registering user."
        );
        incoming.context.upsert(&record).await?;
        Ok(())
    }
}
