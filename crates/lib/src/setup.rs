//! Install flow: OAuth code exchange, channel picker in a DM with the installer,
//! and storing the picked channel as the default for new conversations.

use crate::channels::{
    ChannelError, ChatApi, InteractionPayload, OAuthGrant, CHANNEL_PICKER_CALLBACK_ID,
};
use crate::store::{ConversationStore, StoreError};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("interaction carried no selected channel")]
    MissingSelection,
    #[error("interaction is not from the channel picker (callback {0:?})")]
    UnexpectedCallback(Option<String>),
}

pub struct Installer {
    chat: Arc<dyn ChatApi>,
    store: Arc<dyn ConversationStore>,
}

impl Installer {
    pub fn new(chat: Arc<dyn ChatApi>, store: Arc<dyn ConversationStore>) -> Self {
        Self { chat, store }
    }

    /// Exchange the authorization code, then prompt the installing user for a channel.
    /// A failed prompt is logged; the install itself still counts as done.
    pub async fn complete_install(&self, code: &str) -> Result<OAuthGrant, SetupError> {
        let grant = self.chat.exchange_oauth_code(code).await?;
        log::info!(
            "installed by {} (team {})",
            grant.user_id,
            grant.team_id.as_deref().unwrap_or("?")
        );
        if let Err(e) = self.prompt_for_channel(&grant.user_id).await {
            log::warn!("setup: channel prompt for {} failed: {}", grant.user_id, e);
        }
        Ok(grant)
    }

    /// Open a DM with `user_id` and post the channel picker there. Returns the DM channel id.
    pub async fn prompt_for_channel(&self, user_id: &str) -> Result<String, SetupError> {
        let dm = self.chat.open_direct_message(user_id).await?;
        self.chat.post_channel_picker(&dm).await?;
        Ok(dm)
    }

    /// Store the channel chosen in the picker. Returns the channel id.
    /// Payloads from any other interactive message are rejected.
    pub async fn select_channel(&self, payload: &InteractionPayload) -> Result<String, SetupError> {
        if payload.callback_id.as_deref() != Some(CHANNEL_PICKER_CALLBACK_ID) {
            return Err(SetupError::UnexpectedCallback(payload.callback_id.clone()));
        }
        let channel = payload
            .selected_value()
            .ok_or(SetupError::MissingSelection)?;
        self.store.set_default_channel(channel).await?;
        log::info!("default channel set to {}", channel);
        Ok(channel.to_string())
    }
}
