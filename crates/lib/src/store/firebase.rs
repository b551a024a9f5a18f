//! Firebase Realtime Database backend over the REST API.
//!
//! Layout: `channel` holds the default channel id, `numbers/{number}` holds the
//! thread id. The reverse lookup uses `orderBy="$value"&equalTo=...`, which needs
//! `".indexOn": ".value"` on `numbers` in the database rules to avoid a full download.

use super::{ConversationStore, StoreError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

const CHANNEL_PATH: &str = "channel";
const NUMBERS_PATH: &str = "numbers";

#[derive(Clone)]
pub struct FirebaseStore {
    base_url: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl FirebaseStore {
    pub fn new(base_url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path)
    }

    fn number_path(number: &str) -> Result<String, StoreError> {
        validate_key(number)?;
        Ok(format!("{}/{}", NUMBERS_PATH, number))
    }

    fn auth_query(&self) -> Vec<(&'static str, String)> {
        self.secret
            .iter()
            .map(|s| ("auth", s.clone()))
            .collect()
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&'static str, String)],
    ) -> Result<Option<T>, StoreError> {
        let mut query = self.auth_query();
        query.extend(extra.iter().cloned());
        let res = self
            .client
            .get(self.url(path))
            .query(&query)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(StoreError::Api(format!("GET {}: {} {}", path, status, body)));
        }
        Ok(res.json::<Option<T>>().await?)
    }

    async fn put(&self, path: &str, value: &str) -> Result<(), StoreError> {
        let res = self
            .client
            .put(self.url(path))
            .query(&self.auth_query())
            .json(&value)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(StoreError::Api(format!("PUT {}: {} {}", path, status, body)));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let res = self
            .client
            .delete(self.url(path))
            .query(&self.auth_query())
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(StoreError::Api(format!("DELETE {}: {} {}", path, status, body)));
        }
        Ok(())
    }
}

/// Database keys must be non-empty and free of `. $ # [ ] /`.
fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.contains(['.', '$', '#', '[', ']', '/']) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ConversationStore for FirebaseStore {
    async fn set_default_channel(&self, channel_id: &str) -> Result<(), StoreError> {
        self.put(CHANNEL_PATH, channel_id).await
    }

    async fn default_channel(&self) -> Result<Option<String>, StoreError> {
        self.get(CHANNEL_PATH, &[]).await
    }

    async fn create_mapping(&self, number: &str, thread_id: &str) -> Result<(), StoreError> {
        self.put(&Self::number_path(number)?, thread_id).await
    }

    async fn delete_mapping(&self, number: &str) -> Result<(), StoreError> {
        // DELETE on a missing node succeeds, so no existence check.
        self.delete(&Self::number_path(number)?).await
    }

    async fn thread_for_number(&self, number: &str) -> Result<Option<String>, StoreError> {
        self.get(&Self::number_path(number)?, &[]).await
    }

    async fn number_for_thread(&self, thread_id: &str) -> Result<Option<String>, StoreError> {
        let query = [
            ("orderBy", "\"$value\"".to_string()),
            ("equalTo", serde_json::to_string(thread_id)?),
        ];
        let matches: Option<HashMap<String, String>> = self.get(NUMBERS_PATH, &query).await?;
        Ok(matches.and_then(|m| m.into_keys().next()))
    }
}
