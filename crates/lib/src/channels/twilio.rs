//! Twilio SMS channel: Messages API send from a fixed origin number.

use crate::channels::{ChannelError, SmsApi};
use async_trait::async_trait;
use serde::Deserialize;

const TWILIO_API_BASE: &str = "https://api.twilio.com";

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Twilio REST client for outbound SMS.
pub struct TwilioClient {
    base_url: String,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    client: reqwest::Client,
}

/// Stored numbers have no leading "+"; Twilio wants E.164.
pub fn to_e164(number: &str) -> String {
    if number.starts_with('+') {
        number.to_string()
    } else {
        format!("+{}", number)
    }
}

impl TwilioClient {
    pub fn new(
        account_sid: Option<String>,
        auth_token: Option<String>,
        from_number: Option<String>,
    ) -> Self {
        Self {
            base_url: TWILIO_API_BASE.to_string(),
            account_sid,
            auth_token,
            from_number,
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base URL (for tests or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SmsApi for TwilioClient {
    async fn send_sms(&self, to: &str, text: &str) -> Result<String, ChannelError> {
        let sid = self
            .account_sid
            .as_deref()
            .ok_or(ChannelError::NotConfigured("twilio account sid"))?;
        let token = self
            .auth_token
            .as_deref()
            .ok_or(ChannelError::NotConfigured("twilio auth token"))?;
        let from = self
            .from_number
            .as_deref()
            .ok_or(ChannelError::NotConfigured("twilio origin number"))?;
        let url = format!("{}/2010-04-01/Accounts/{}/Messages.json", self.base_url, sid);
        let to = to_e164(to);
        let res = self
            .client
            .post(&url)
            .basic_auth(sid, Some(token))
            .form(&[("To", to.as_str()), ("From", from), ("Body", text)])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<TwilioErrorBody>(&body) {
                Ok(TwilioErrorBody {
                    code: Some(code),
                    message: Some(message),
                }) => format!("{} (code {})", message, code),
                _ => body,
            };
            return Err(ChannelError::Api(format!("send sms failed: {} {}", status, detail)));
        }
        let resource: MessageResource = res.json().await?;
        Ok(resource.sid)
    }
}
