use super::{RegistrationRecord, StoreError, UserStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A [`UserStore`] keeping users in memory, keyed by `(stock_id, user_id)`.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<(String, String), RegistrationRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, stock_id: &str, user_id: &str) -> Option<RegistrationRecord> {
        self.users
            .read()
            .await
            .get(&(stock_id.to_owned(), user_id.to_owned()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn upsert(&self, record: &RegistrationRecord) -> Result<(), StoreError> {
        let key = (record.stock_id.clone(), record.user_id.clone());
        self.users.write().await.insert(key, record.clone());
        Ok(())
    }
}
