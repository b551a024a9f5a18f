//! In-memory conversation store.

use super::{ConversationStore, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Store contents: the default channel and number -> thread mappings.
/// Shared by the memory and file backends; the file backend serializes it as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    #[serde(default)]
    pub default_channel: Option<String>,
    #[serde(default)]
    pub numbers: BTreeMap<String, String>,
}

impl StoreState {
    /// Reverse lookup by value. Linear in the number of mappings.
    pub fn number_for_thread(&self, thread_id: &str) -> Option<String> {
        self.numbers
            .iter()
            .find(|(_, t)| t.as_str() == thread_id)
            .map(|(n, _)| n.clone())
    }
}

/// Conversation store held in process memory.
pub struct MemoryStore {
    inner: RwLock<StoreState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreState::default()),
        }
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> StoreState {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn set_default_channel(&self, channel_id: &str) -> Result<(), StoreError> {
        self.inner.write().await.default_channel = Some(channel_id.to_string());
        Ok(())
    }

    async fn default_channel(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().await.default_channel.clone())
    }

    async fn create_mapping(&self, number: &str, thread_id: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .numbers
            .insert(number.to_string(), thread_id.to_string());
        Ok(())
    }

    async fn delete_mapping(&self, number: &str) -> Result<(), StoreError> {
        self.inner.write().await.numbers.remove(number);
        Ok(())
    }

    async fn thread_for_number(&self, number: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().await.numbers.get(number).cloned())
    }

    async fn number_for_thread(&self, thread_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().await.number_for_thread(thread_id))
    }
}
