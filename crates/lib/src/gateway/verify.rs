//! Request verification.
//!
//! Slack: signing secret (HMAC-SHA256 over the raw body) or the legacy
//! verification token carried in payloads. Twilio: `X-Twilio-Signature`,
//! HMAC-SHA1 over the webhook URL followed by the sorted form parameters.

use crate::config::{SlackCredentials, TwilioCredentials};
use axum::http::{HeaderMap, Uri};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Requests older (or newer) than this are rejected as replays.
const MAX_CLOCK_SKEW_SECS: u64 = 60 * 5;

const SIGNATURE_HEADER: &str = "x-slack-signature";
const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const TWILIO_SIGNATURE_HEADER: &str = "x-twilio-signature";

/// How inbound Slack requests are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verifier {
    /// Check `X-Slack-Signature` with the signing secret.
    Signature(String),
    /// Compare the payload's `token` field.
    Token(String),
    /// Accept everything (loopback binds only).
    Disabled,
}

impl Verifier {
    /// Signing secret wins over the verification token.
    pub fn from_credentials(creds: &SlackCredentials) -> Self {
        if let Some(secret) = &creds.signing_secret {
            Verifier::Signature(secret.clone())
        } else if let Some(token) = &creds.verification_token {
            Verifier::Token(token.clone())
        } else {
            Verifier::Disabled
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Verifier::Disabled)
    }

    /// Header-level check against the current clock. Passes unless signature mode rejects.
    pub fn verify_request(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.verify_request_at(headers, body, now)
    }

    pub fn verify_request_at(&self, headers: &HeaderMap, body: &[u8], now: u64) -> bool {
        let Verifier::Signature(secret) = self else {
            return true;
        };
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .trim()
                .to_string()
        };
        let Ok(timestamp) = header(TIMESTAMP_HEADER).parse::<u64>() else {
            return false;
        };
        if now.abs_diff(timestamp) > MAX_CLOCK_SKEW_SECS {
            return false;
        }
        let signature = header(SIGNATURE_HEADER);
        let Some(signature) = signature.strip_prefix("v0=") else {
            return false;
        };
        let Ok(signature_bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(format!("v0:{}:", timestamp).as_bytes());
        mac.update(body);
        mac.verify_slice(&signature_bytes).is_ok()
    }

    /// Payload-level check. Passes unless token mode rejects.
    pub fn verify_token(&self, token: &str) -> bool {
        match self {
            Verifier::Token(expected) => token == expected.as_str(),
            _ => true,
        }
    }
}

/// `v0=` signature Slack would send for `body` at `timestamp`.
pub fn slack_signature(secret: &str, timestamp: u64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts keys of any length"));
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

/// How inbound SMS webhooks are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsVerifier {
    /// Check `X-Twilio-Signature` with the account auth token. The signed URL is
    /// `webhook_url` when set, otherwise rebuilt from the request.
    Signature {
        auth_token: String,
        webhook_url: Option<String>,
    },
    /// Accept everything (loopback binds only).
    Disabled,
}

impl SmsVerifier {
    pub fn from_credentials(creds: &TwilioCredentials) -> Self {
        match &creds.auth_token {
            Some(auth_token) => SmsVerifier::Signature {
                auth_token: auth_token.clone(),
                webhook_url: creds.webhook_url.clone(),
            },
            None => SmsVerifier::Disabled,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, SmsVerifier::Disabled)
    }

    pub fn verify_request(&self, headers: &HeaderMap, uri: &Uri, body: &[u8]) -> bool {
        let SmsVerifier::Signature {
            auth_token,
            webhook_url,
        } = self
        else {
            return true;
        };
        let url = match webhook_url {
            Some(url) => url.clone(),
            None => match request_url(headers, uri) {
                Some(url) => url,
                None => return false,
            },
        };
        let Some(signature) = headers
            .get(TWILIO_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        let Ok(signature_bytes) = base64::engine::general_purpose::STANDARD.decode(signature.trim())
        else {
            return false;
        };
        twilio_mac(auth_token, &url, body)
            .verify_slice(&signature_bytes)
            .is_ok()
    }
}

/// `{proto}://{host}{path}` as the client addressed it; proto from `X-Forwarded-Proto`, default http.
fn request_url(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())?;
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    Some(format!("{}://{}{}", proto, host, path))
}

fn twilio_mac(auth_token: &str, url: &str, body: &[u8]) -> HmacSha1 {
    let mut params: Vec<(String, String)> = serde_urlencoded::from_bytes(body).unwrap_or_default();
    params.sort();
    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts keys of any length"));
    mac.update(url.as_bytes());
    for (key, value) in &params {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    mac
}

/// `X-Twilio-Signature` Twilio would send when posting the form `body` to `url`.
pub fn twilio_signature(auth_token: &str, url: &str, body: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD
        .encode(twilio_mac(auth_token, url, body).finalize().into_bytes())
}
