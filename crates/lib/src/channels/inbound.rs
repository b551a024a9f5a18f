//! Provider-neutral inbound events handed to the relay.

/// An SMS delivered by the SMS webhook. Missing form fields arrive as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundSms {
    pub body: String,
    /// Sender as delivered by the provider, e.g. "+15551230000".
    pub from: String,
}

impl InboundSms {
    pub fn new(body: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            from: from.into(),
        }
    }

    /// Store key for the sender: the provider always prepends exactly one
    /// character ("+"), which is dropped whatever it is.
    pub fn number(&self) -> &str {
        let mut chars = self.from.chars();
        chars.next();
        chars.as_str()
    }
}

/// A chat event the relay may act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A message; `thread_id` is set when it was posted inside a thread.
    Message {
        thread_id: Option<String>,
        text: String,
    },
    /// A reaction added to the message identified by `message_id`.
    ReactionAdded { reaction: String, message_id: String },
    Other,
}
