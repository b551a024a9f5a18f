//! File-backed conversation store: the whole state as one JSON document,
//! rewritten after each mutation.

use super::memory::StoreState;
use super::{ConversationStore, StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub struct FileStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl FileStore {
    /// Load store from path; if file missing or invalid, starts empty.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                log::warn!("ignoring unreadable store file {}: {}", path.display(), e);
                StoreState::default()
            }),
            Err(_) => StoreState::default(),
        };
        Self {
            path,
            state: RwLock::new(state),
        }
    }

    /// Write `state` to a sibling temp file and rename it over the store file,
    /// so a crash mid-write never leaves a truncated document behind.
    async fn save(&self, state: &StoreState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Apply `change` to a copy of the state, persist the copy, and only then
    /// publish it. A failed save leaves memory matching the file.
    async fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreState) -> bool + Send,
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.save(&next).await?;
        *state = next;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileStore {
    async fn set_default_channel(&self, channel_id: &str) -> Result<(), StoreError> {
        self.update(|s| {
            s.default_channel = Some(channel_id.to_string());
            true
        })
        .await
    }

    async fn default_channel(&self) -> Result<Option<String>, StoreError> {
        Ok(self.state.read().await.default_channel.clone())
    }

    async fn create_mapping(&self, number: &str, thread_id: &str) -> Result<(), StoreError> {
        self.update(|s| {
            s.numbers.insert(number.to_string(), thread_id.to_string()).as_deref() != Some(thread_id)
        })
        .await
    }

    async fn delete_mapping(&self, number: &str) -> Result<(), StoreError> {
        self.update(|s| s.numbers.remove(number).is_some()).await
    }

    async fn thread_for_number(&self, number: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.read().await.numbers.get(number).cloned())
    }

    async fn number_for_thread(&self, thread_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.read().await.number_for_thread(thread_id))
    }
}
