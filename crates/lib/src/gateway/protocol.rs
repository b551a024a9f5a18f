//! Gateway wire types: SMS webhook form, select interaction body, install query, acks.

use crate::channels::InboundSms;
use serde::{Deserialize, Serialize};

/// Empty TwiML: acknowledge the SMS webhook without an auto-reply.
pub const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

/// `POST /sms` form body. Missing fields become empty strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmsForm {
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "From", default)]
    pub from: String,
}

impl SmsForm {
    /// Decode a form body; anything undecodable is treated as an empty message.
    pub fn parse(body: &[u8]) -> Self {
        serde_urlencoded::from_bytes(body).unwrap_or_else(|e| {
            log::debug!("sms webhook: undecodable form ({}), using empty fields", e);
            Self::default()
        })
    }
}

impl From<SmsForm> for InboundSms {
    fn from(form: SmsForm) -> Self {
        InboundSms::new(form.body, form.from)
    }
}

/// `POST /select` body: `payload` holds the interaction JSON as a string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectBody {
    #[serde(default)]
    pub payload: String,
}

impl SelectBody {
    /// Slack sends a urlencoded form; a JSON object with the same field is accepted too.
    pub fn parse(content_type: &str, body: &[u8]) -> Option<Self> {
        if content_type.starts_with("application/json") {
            serde_json::from_slice(body).ok()
        } else {
            serde_urlencoded::from_bytes(body).ok()
        }
    }
}

/// Reply to a channel selection; leaves the picker message in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectAck {
    pub text: String,
    pub replace_original: bool,
}

impl SelectAck {
    pub fn for_channel(channel: &str) -> Self {
        Self {
            text: format!("New text conversations will be posted to <#{}>.", channel),
            replace_original: false,
        }
    }
}

/// `GET /auth` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthQuery {
    #[serde(default)]
    pub code: Option<String>,
}
