//! The stock game's user store, and the handler registering users into it.
use serde::{Deserialize, Serialize};

pub use in_memory::InMemoryUserStore;
pub use postgres::{DatabaseSettings, PgUserStore};
pub use registration::{RegisterUser, REGISTER_USER};

mod in_memory;
mod postgres;
mod registration;

/// A user joining a stock game session, as carried by a `registerUser` envelope.
///
/// `(stock_id, user_id)` is the natural key of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    /// The game session the user belongs to.
    pub stock_id: String,
    /// The user, as known to the identity provider.
    pub user_id: String,
    pub user_info: UserInfo,
}

/// Profile snapshot taken when the user registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub gender: String,
    pub nickname: String,
}

/// Persistence for registered users.
///
/// # Concurrency
///
/// Several consumers may upsert the same key at the same time: implementations must make
/// concurrent duplicate writes safe without relying on the caller for locking.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Insert the user, or overwrite the stored profile if `(stock_id, user_id)` already
    /// exists. Applying the same record twice leaves the store as applying it once.
    async fn upsert(&self, record: &RegistrationRecord) -> Result<(), StoreError>;
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Failed to reach the user store.")]
    Unavailable(#[source] anyhow::Error),
    #[error("The user store rejected the write.")]
    Rejected(#[source] anyhow::Error),
}
