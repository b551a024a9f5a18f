//! Relay core: decides, for each inbound SMS or chat event, which thread,
//! channel or number to target, and creates or removes the number <-> thread mapping.
//!
//! - SMS from an unmapped number opens a conversation: a top-level post to the
//!   default channel whose id becomes the thread for that number.
//! - SMS from a mapped number is a threaded reply.
//! - A bot-mentioning reply inside a mapped thread goes back out as SMS.
//! - A `white_check_mark` reaction on the thread's root ends the conversation.
//!
//! Lookup-then-create is not atomic: two first messages from the same number
//! racing can both open a conversation; the later mapping wins.

use crate::channels::{strip_bot_mention, ChatEvent, InboundSms};
use crate::dispatch::Dispatcher;
use crate::store::ConversationStore;
use std::sync::Arc;

/// Reaction that closes a conversation.
pub const ACK_REACTION: &str = "white_check_mark";

/// What an inbound SMS led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsOutcome {
    /// Posted into the existing thread.
    Threaded { thread_id: String },
    /// Posted a new top-level message and mapped the number to it.
    Opened { thread_id: String },
    /// No install has chosen a default channel yet.
    NoDefaultChannel,
    DispatchFailed,
    StoreFailed,
}

/// What a chat event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Sent the reply as SMS to `number`.
    Relayed { number: String },
    /// Removed the mapping for `number`.
    Ended { number: String },
    /// Addressed to the relay but the thread has no mapping.
    Unmapped,
    Ignored,
    Failed,
}

/// Text of the opening post for a new conversation.
pub fn new_conversation_text(body: &str, number: &str) -> String {
    format!("{} from {}", body, number)
}

pub struct Relay {
    store: Arc<dyn ConversationStore>,
    dispatcher: Dispatcher,
    bot_user_id: Option<String>,
}

impl Relay {
    /// `bot_user_id` is the chat identity replies must mention; without it no reply is relayed.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        dispatcher: Dispatcher,
        bot_user_id: Option<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            bot_user_id,
        }
    }

    pub fn bot_user_id(&self) -> Option<&str> {
        self.bot_user_id.as_deref()
    }

    /// Route one inbound SMS into chat.
    pub async fn handle_inbound_sms(&self, sms: &InboundSms) -> SmsOutcome {
        let number = sms.number();
        let thread = match self.store.thread_for_number(number).await {
            Ok(t) => t,
            Err(e) => {
                log::warn!("sms: thread lookup for {} failed: {}", number, e);
                return SmsOutcome::StoreFailed;
            }
        };
        // Read once so the whole request sees a single value.
        let channel = match self.store.default_channel().await {
            Ok(Some(c)) => c,
            Ok(None) => {
                log::warn!("sms: dropping message from {}; no default channel selected", number);
                return SmsOutcome::NoDefaultChannel;
            }
            Err(e) => {
                log::warn!("sms: default channel lookup failed: {}", e);
                return SmsOutcome::StoreFailed;
            }
        };

        match thread {
            Some(thread_id) => {
                if self
                    .dispatcher
                    .post_threaded_reply(&channel, &sms.body, &thread_id)
                    .await
                {
                    SmsOutcome::Threaded { thread_id }
                } else {
                    SmsOutcome::DispatchFailed
                }
            }
            None => {
                let text = new_conversation_text(&sms.body, number);
                let Some(thread_id) = self.dispatcher.post_new_message(&channel, &text).await else {
                    return SmsOutcome::DispatchFailed;
                };
                if let Err(e) = self.store.create_mapping(number, &thread_id).await {
                    log::warn!("sms: mapping {} -> {} failed: {}", number, thread_id, e);
                    return SmsOutcome::StoreFailed;
                }
                log::info!("opened conversation for {} at {}", number, thread_id);
                SmsOutcome::Opened { thread_id }
            }
        }
    }

    /// Route one chat event: relay bot-addressed thread replies, close on acknowledgment.
    pub async fn handle_chat_event(&self, event: ChatEvent) -> EventOutcome {
        match event {
            ChatEvent::Message {
                thread_id: Some(thread_id),
                text,
            } => self.relay_reply(&thread_id, &text).await,
            ChatEvent::ReactionAdded {
                reaction,
                message_id,
            } if reaction == ACK_REACTION => self.end_conversation(&message_id).await,
            other => {
                log::debug!("chat event ignored: {:?}", other);
                EventOutcome::Ignored
            }
        }
    }

    async fn relay_reply(&self, thread_id: &str, text: &str) -> EventOutcome {
        let Some(bot) = self.bot_user_id.as_deref() else {
            return EventOutcome::Ignored;
        };
        let Some(reply) = strip_bot_mention(text, bot) else {
            return EventOutcome::Ignored;
        };
        let number = match self.store.number_for_thread(thread_id).await {
            Ok(n) => n,
            Err(e) => {
                log::warn!("chat: number lookup for thread {} failed: {}", thread_id, e);
                return EventOutcome::Failed;
            }
        };
        let sent = self.dispatcher.send_sms(number.as_deref(), reply).await;
        match number {
            None => {
                log::debug!("chat: thread {} has no open conversation", thread_id);
                EventOutcome::Unmapped
            }
            Some(number) if sent => EventOutcome::Relayed { number },
            Some(_) => EventOutcome::Failed,
        }
    }

    async fn end_conversation(&self, message_id: &str) -> EventOutcome {
        let number = match self.store.number_for_thread(message_id).await {
            Ok(Some(n)) => n,
            Ok(None) => return EventOutcome::Unmapped,
            Err(e) => {
                log::warn!("chat: number lookup for {} failed: {}", message_id, e);
                return EventOutcome::Failed;
            }
        };
        if let Err(e) = self.store.delete_mapping(&number).await {
            log::warn!("chat: removing mapping for {} failed: {}", number, e);
            return EventOutcome::Failed;
        }
        log::info!("closed conversation for {}", number);
        EventOutcome::Ended { number }
    }
}
