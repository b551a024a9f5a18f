//! Outbound dispatcher: fire-and-forget sends over the provider traits.
//!
//! Provider errors are logged here and reduced to `None` / `false`; nothing is
//! retried and nothing propagates to the webhook that triggered the send.

use crate::channels::{ChatApi, SmsApi};
use std::sync::Arc;

#[derive(Clone)]
pub struct Dispatcher {
    chat: Arc<dyn ChatApi>,
    sms: Arc<dyn SmsApi>,
}

impl Dispatcher {
    pub fn new(chat: Arc<dyn ChatApi>, sms: Arc<dyn SmsApi>) -> Self {
        Self { chat, sms }
    }

    /// Post a top-level message. The returned id is the conversation key for later threaded replies.
    pub async fn post_new_message(&self, channel: &str, text: &str) -> Option<String> {
        match self.chat.post_message(channel, text, None).await {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("dispatch: posting to {} failed: {}", channel, e);
                None
            }
        }
    }

    /// Post into an existing thread.
    pub async fn post_threaded_reply(&self, channel: &str, text: &str, thread_id: &str) -> bool {
        match self.chat.post_message(channel, text, Some(thread_id)).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!(
                    "dispatch: threaded reply to {} in {} failed: {}",
                    thread_id,
                    channel,
                    e
                );
                false
            }
        }
    }

    /// Send an SMS from the configured origin number. No destination means nothing to do.
    pub async fn send_sms(&self, to: Option<&str>, text: &str) -> bool {
        let Some(to) = to else {
            return false;
        };
        match self.sms.send_sms(to, text).await {
            Ok(sid) => {
                log::debug!("dispatch: sms to {} accepted as {}", to, sid);
                true
            }
            Err(e) => {
                log::warn!("dispatch: sms to {} failed: {}", to, e);
                false
            }
        }
    }
}
