//! Conversation store: phone number <-> thread mapping plus the default channel.
//!
//! The relay only needs a small key-value contract. Backends: process memory,
//! a JSON file, or a Firebase Realtime Database. The reverse lookup
//! (`number_for_thread`) is part of the contract so callers never assume a
//! particular query model; memory and file backends scan values (O(n) in the
//! number of mappings).

mod file;
mod firebase;
mod memory;

pub use file::FileStore;
pub use firebase::FirebaseStore;
pub use memory::{MemoryStore, StoreState};

use crate::config::{self, Config, StoreBackend};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store api error: {0}")]
    Api(String),
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),
}

/// Persistence contract for the relay. Missing data is `Ok(None)`, never an error.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Overwrite the channel that receives SMS from numbers with no open conversation.
    async fn set_default_channel(&self, channel_id: &str) -> Result<(), StoreError>;

    /// Current default channel, if an install has chosen one.
    async fn default_channel(&self) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite the mapping for `number`. Idempotent.
    async fn create_mapping(&self, number: &str, thread_id: &str) -> Result<(), StoreError>;

    /// Remove the mapping for `number`; absent is a no-op.
    async fn delete_mapping(&self, number: &str) -> Result<(), StoreError>;

    async fn thread_for_number(&self, number: &str) -> Result<Option<String>, StoreError>;

    /// Reverse lookup: which number's conversation started at `thread_id`.
    async fn number_for_thread(&self, thread_id: &str) -> Result<Option<String>, StoreError>;
}

/// Build the configured backend.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ConversationStore>> {
    let store: Arc<dyn ConversationStore> = match config.store.backend {
        StoreBackend::Memory => {
            log::info!("conversation store: memory (mappings are lost on restart)");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::File => {
            let path = config::resolve_store_path(config);
            log::info!("conversation store: file {}", path.display());
            Arc::new(FileStore::load(path).await)
        }
        StoreBackend::Firebase => {
            let (url, secret) = config::resolve_firebase(config);
            let url = url.ok_or_else(|| {
                anyhow::anyhow!("store.backend is \"firebase\" but no store.firebaseUrl or FIREBASE_URL is set")
            })?;
            log::info!("conversation store: firebase {}", url);
            Arc::new(FirebaseStore::new(url, secret))
        }
    };
    Ok(store)
}
