//! Provider channels: Slack (chat) and Twilio (SMS).
//!
//! The relay talks to providers only through the `ChatApi` and `SmsApi` traits so
//! handlers can be exercised without network access. Inbound payloads are turned
//! into `InboundSms` / `ChatEvent` before they reach the relay.

mod inbound;
mod slack;
mod twilio;

pub use inbound::{ChatEvent, InboundSms};
pub use slack::{
    channel_picker_message, strip_bot_mention, EventEnvelope, InteractionPayload, MessageEvent,
    OAuthGrant, ReactionEvent, ReactionItem, SlackClient, SlackEvent, CHANNEL_PICKER_CALLBACK_ID,
};
pub use twilio::{to_e164, TwilioClient};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider api error: {0}")]
    Api(String),
    #[error("{0} not configured")]
    NotConfigured(&'static str),
}

/// Chat provider operations used by the relay and the install flow.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Post `text` to `channel`, as a threaded reply when `thread_id` is set.
    /// Returns the new message's id, which doubles as the thread id for replies.
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> Result<String, ChannelError>;

    /// The bot's own user id.
    async fn bot_user_id(&self) -> Result<String, ChannelError>;

    /// Open (or reuse) a direct message channel with `user_id`; returns its channel id.
    async fn open_direct_message(&self, user_id: &str) -> Result<String, ChannelError>;

    /// Post the interactive default-channel picker to `channel`.
    async fn post_channel_picker(&self, channel: &str) -> Result<(), ChannelError>;

    /// Exchange an OAuth authorization code for the installing user's grant.
    async fn exchange_oauth_code(&self, code: &str) -> Result<OAuthGrant, ChannelError>;
}

/// SMS provider operations.
#[async_trait]
pub trait SmsApi: Send + Sync {
    /// Send `text` to `to` from the configured origin number. Returns the provider message id.
    async fn send_sms(&self, to: &str, text: &str) -> Result<String, ChannelError>;
}
