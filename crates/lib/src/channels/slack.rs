//! Slack channel: Web API calls (chat.postMessage, auth.test, conversations.open,
//! oauth.access) and the Events API / interactive payload types.

use crate::channels::inbound::ChatEvent;
use crate::channels::{ChannelError, ChatApi};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Callback id of the install prompt; interaction payloads carry it back.
pub const CHANNEL_PICKER_CALLBACK_ID: &str = "default_channel";

/// Events API envelope (`POST /slack/events` body).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    UrlVerification {
        #[serde(default)]
        token: String,
        challenge: String,
    },
    EventCallback {
        #[serde(default)]
        token: String,
        /// Stable across redeliveries of the same event.
        #[serde(default)]
        event_id: Option<String>,
        event: SlackEvent,
    },
    #[serde(other)]
    Unknown,
}

impl EventEnvelope {
    /// Verification token carried in the envelope (empty when absent).
    pub fn token(&self) -> &str {
        match self {
            EventEnvelope::UrlVerification { token, .. } => token,
            EventEnvelope::EventCallback { token, .. } => token,
            EventEnvelope::Unknown => "",
        }
    }
}

/// Inner event of an `event_callback`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    Message(MessageEvent),
    ReactionAdded(ReactionEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionEvent {
    #[serde(default)]
    pub user: Option<String>,
    pub reaction: String,
    pub item: ReactionItem,
}

#[derive(Debug, Deserialize)]
pub struct ReactionItem {
    #[serde(default)]
    pub channel: Option<String>,
    /// Reactions on files have no `ts`.
    #[serde(default)]
    pub ts: Option<String>,
}

impl From<SlackEvent> for ChatEvent {
    fn from(event: SlackEvent) -> Self {
        match event {
            SlackEvent::Message(m) => ChatEvent::Message {
                thread_id: m.thread_ts,
                text: m.text.unwrap_or_default(),
            },
            SlackEvent::ReactionAdded(r) => match r.item.ts {
                Some(ts) => ChatEvent::ReactionAdded {
                    reaction: r.reaction,
                    message_id: ts,
                },
                None => ChatEvent::Other,
            },
            SlackEvent::Other => ChatEvent::Other,
        }
    }
}

/// Interactive message payload (the JSON inside the `payload` field of `POST /select`).
#[derive(Debug, Default, Deserialize)]
pub struct InteractionPayload {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub callback_id: Option<String>,
    #[serde(default)]
    pub actions: Vec<InteractionAction>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InteractionAction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectedOption {
    pub value: String,
}

impl InteractionPayload {
    /// `actions[0].selected_options[0].value`, if present and non-empty.
    pub fn selected_value(&self) -> Option<&str> {
        self.actions
            .first()
            .and_then(|a| a.selected_options.first())
            .map(|o| o.value.trim())
            .filter(|v| !v.is_empty())
    }
}

/// If `text` starts with a mention of `bot_user_id` (`<@U123>` or `<@U123|name>`),
/// return the rest with leading whitespace removed.
pub fn strip_bot_mention<'a>(text: &'a str, bot_user_id: &str) -> Option<&'a str> {
    let rest = text.strip_prefix("<@")?.strip_prefix(bot_user_id)?;
    let rest = match rest.strip_prefix('>') {
        Some(r) => r,
        None => {
            let labelled = rest.strip_prefix('|')?;
            let end = labelled.find('>')?;
            &labelled[end + 1..]
        }
    };
    Some(rest.trim_start())
}

/// Interactive install prompt: a select menu listing the workspace's channels.
pub fn channel_picker_message(channel: &str) -> Value {
    json!({
        "channel": channel,
        "text": "Where should incoming text messages go?",
        "attachments": [{
            "text": "Choose a channel for new SMS conversations",
            "fallback": "Your client cannot show the channel picker",
            "callback_id": CHANNEL_PICKER_CALLBACK_ID,
            "attachment_type": "default",
            "actions": [{
                "name": "channel_list",
                "text": "Pick a channel...",
                "type": "select",
                "data_source": "channels"
            }]
        }]
    })
}

/// Grant returned by the OAuth code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthGrant {
    /// The installing user.
    pub user_id: String,
    pub team_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ts: String,
}

#[derive(Debug, Deserialize)]
struct OpenConversationResponse {
    channel: ConversationRef,
}

#[derive(Debug, Deserialize)]
struct ConversationRef {
    id: String,
}

/// `oauth.access` returns `user_id`; `oauth.v2.access` returns `authed_user.id`. Accept both.
#[derive(Debug, Deserialize)]
struct OAuthAccessResponse {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    authed_user: Option<ConversationRef>,
    #[serde(default)]
    team_id: Option<String>,
    #[serde(default)]
    team: Option<ConversationRef>,
}

/// Slack Web API client.
pub struct SlackClient {
    base_url: String,
    bot_token: Option<String>,
    /// Token used for relayed posts; falls back to the bot token.
    auth_token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    client: reqwest::Client,
}

impl SlackClient {
    pub fn new(bot_token: Option<String>, auth_token: Option<String>) -> Self {
        Self {
            base_url: SLACK_API_BASE.to_string(),
            bot_token,
            auth_token,
            client_id: None,
            client_secret: None,
            client: reqwest::Client::new(),
        }
    }

    /// Override the Web API base URL (for tests or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// OAuth app credentials used by `exchange_oauth_code`.
    pub fn with_oauth_client(mut self, client_id: Option<String>, client_secret: Option<String>) -> Self {
        self.client_id = client_id;
        self.client_secret = client_secret;
        self
    }

    fn bot_token(&self) -> Result<&str, ChannelError> {
        self.bot_token
            .as_deref()
            .ok_or(ChannelError::NotConfigured("slack bot token"))
    }

    fn post_token(&self) -> Result<&str, ChannelError> {
        self.auth_token
            .as_deref()
            .map_or_else(|| self.bot_token(), Ok)
    }

    /// Check HTTP status and Slack's `ok` field, then decode the body.
    async fn read_response<T: DeserializeOwned>(
        method: &str,
        res: reqwest::Response,
    ) -> Result<T, ChannelError> {
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(ChannelError::Api(format!("{} failed ({}): {}", method, status, body)));
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ChannelError::Api(format!("{} returned invalid json: {}", method, e)))?;
        // Slack returns 200 for most app-level errors; check JSON "ok" field
        if value.get("ok") != Some(&Value::Bool(true)) {
            let err = value
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            return Err(ChannelError::Api(format!("{} failed: {}", method, err)));
        }
        serde_json::from_value(value)
            .map_err(|e| ChannelError::Api(format!("{} returned unexpected json: {}", method, e)))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        token: &str,
        body: &Value,
    ) -> Result<T, ChannelError> {
        let url = format!("{}/{}", self.base_url, method);
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Self::read_response(method, res).await
    }
}

#[async_trait]
impl ChatApi for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> Result<String, ChannelError> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(ts) = thread_id {
            body["thread_ts"] = Value::String(ts.to_string());
        }
        let res: PostMessageResponse = self
            .call("chat.postMessage", self.post_token()?, &body)
            .await?;
        Ok(res.ts)
    }

    async fn bot_user_id(&self) -> Result<String, ChannelError> {
        let res: AuthTestResponse = self
            .call("auth.test", self.bot_token()?, &json!({}))
            .await?;
        Ok(res.user_id)
    }

    async fn open_direct_message(&self, user_id: &str) -> Result<String, ChannelError> {
        let res: OpenConversationResponse = self
            .call("conversations.open", self.bot_token()?, &json!({ "users": user_id }))
            .await?;
        Ok(res.channel.id)
    }

    async fn post_channel_picker(&self, channel: &str) -> Result<(), ChannelError> {
        let _: Value = self
            .call("chat.postMessage", self.bot_token()?, &channel_picker_message(channel))
            .await?;
        Ok(())
    }

    async fn exchange_oauth_code(&self, code: &str) -> Result<OAuthGrant, ChannelError> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or(ChannelError::NotConfigured("slack client id"))?;
        let client_secret = self
            .client_secret
            .as_deref()
            .ok_or(ChannelError::NotConfigured("slack client secret"))?;
        let url = format!("{}/oauth.access", self.base_url);
        let res = self
            .client
            .post(&url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
            ])
            .send()
            .await?;
        let res: OAuthAccessResponse = Self::read_response("oauth.access", res).await?;
        let user_id = res
            .user_id
            .or(res.authed_user.map(|u| u.id))
            .ok_or_else(|| ChannelError::Api("oauth.access returned no user id".to_string()))?;
        Ok(OAuthGrant {
            user_id,
            team_id: res.team_id.or(res.team.map(|t| t.id)),
        })
    }
}
