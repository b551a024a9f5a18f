//! Recording provider fakes for unit tests.

use crate::channels::{ChannelError, ChatApi, OAuthGrant, SmsApi};
use crate::store::{ConversationStore, MemoryStore, StoreError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub channel: String,
    pub text: String,
    pub thread_id: Option<String>,
}

/// Chat fake: records posts and hands out ids "M1", "M2", ...
#[derive(Default)]
pub struct RecordingChat {
    pub posts: Mutex<Vec<Post>>,
    pub pickers: Mutex<Vec<String>>,
    pub opened_dms: Mutex<Vec<String>>,
    pub fail_posts: AtomicBool,
    next_id: AtomicUsize,
}

impl RecordingChat {
    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn failing() -> Self {
        let chat = Self::default();
        chat.fail_posts.store(true, Ordering::SeqCst);
        chat
    }
}

#[async_trait]
impl ChatApi for RecordingChat {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> Result<String, ChannelError> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(ChannelError::Api("chat.postMessage failed: channel_not_found".into()));
        }
        self.posts.lock().unwrap().push(Post {
            channel: channel.to_string(),
            text: text.to_string(),
            thread_id: thread_id.map(str::to_string),
        });
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("M{}", n))
    }

    async fn bot_user_id(&self) -> Result<String, ChannelError> {
        Ok("UBOT".to_string())
    }

    async fn open_direct_message(&self, user_id: &str) -> Result<String, ChannelError> {
        self.opened_dms.lock().unwrap().push(user_id.to_string());
        Ok(format!("D-{}", user_id))
    }

    async fn post_channel_picker(&self, channel: &str) -> Result<(), ChannelError> {
        self.pickers.lock().unwrap().push(channel.to_string());
        Ok(())
    }

    async fn exchange_oauth_code(&self, code: &str) -> Result<OAuthGrant, ChannelError> {
        if code == "bad" {
            return Err(ChannelError::Api("oauth.access failed: invalid_code".into()));
        }
        Ok(OAuthGrant {
            user_id: "UINSTALLER".to_string(),
            team_id: Some("T1".to_string()),
        })
    }
}

/// SMS fake: records (to, text) pairs.
#[derive(Default)]
pub struct RecordingSms {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingSms {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsApi for RecordingSms {
    async fn send_sms(&self, to: &str, text: &str) -> Result<String, ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Api("send sms failed: 400".into()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), text.to_string()));
        Ok(format!("SM{}", sent.len()))
    }
}

/// Store fake over `MemoryStore` whose reads or writes can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool, op: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Api(format!("{}: 503 Service Unavailable", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    async fn set_default_channel(&self, channel_id: &str) -> Result<(), StoreError> {
        Self::check(&self.fail_writes, "PUT channel")?;
        self.inner.set_default_channel(channel_id).await
    }

    async fn default_channel(&self) -> Result<Option<String>, StoreError> {
        Self::check(&self.fail_reads, "GET channel")?;
        self.inner.default_channel().await
    }

    async fn create_mapping(&self, number: &str, thread_id: &str) -> Result<(), StoreError> {
        Self::check(&self.fail_writes, "PUT numbers")?;
        self.inner.create_mapping(number, thread_id).await
    }

    async fn delete_mapping(&self, number: &str) -> Result<(), StoreError> {
        Self::check(&self.fail_writes, "DELETE numbers")?;
        self.inner.delete_mapping(number).await
    }

    async fn thread_for_number(&self, number: &str) -> Result<Option<String>, StoreError> {
        Self::check(&self.fail_reads, "GET numbers")?;
        self.inner.thread_for_number(number).await
    }

    async fn number_for_thread(&self, thread_id: &str) -> Result<Option<String>, StoreError> {
        Self::check(&self.fail_reads, "GET numbers")?;
        self.inner.number_for_thread(thread_id).await
    }
}
