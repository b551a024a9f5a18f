//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.smsrelay/config.json`) and environment.
//! Provider credentials are usually supplied through the environment (or a `.env` file
//! loaded by the CLI); env values override the file when set and non-empty.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Slack app credentials and endpoints.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Twilio account and origin number.
    #[serde(default)]
    pub twilio: TwilioConfig,

    /// Conversation store backend.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP webhooks (default 3000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Slack app config. Every secret here can be overridden from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot user token (xoxb-). Overridden by SLACK_BOT_TOKEN.
    pub bot_token: Option<String>,
    /// Workspace token used to post relayed messages; falls back to the bot token. Overridden by SLACK_AUTH_TOKEN.
    pub auth_token: Option<String>,
    /// Legacy verification token compared against the `token` field of events and interactions. Overridden by SLACK_VERIFICATION_TOKEN.
    pub verification_token: Option<String>,
    /// Signing secret for X-Slack-Signature verification; preferred over the verification token when set. Overridden by SLACK_SIGNING_SECRET.
    pub signing_secret: Option<String>,
    /// OAuth client id used by the install flow. Overridden by SLACK_CLIENT_ID.
    pub client_id: Option<String>,
    /// OAuth client secret used by the install flow. Overridden by SLACK_CLIENT_SECRET.
    pub client_secret: Option<String>,
    /// Where the browser is sent after a successful install.
    #[serde(default = "default_install_redirect")]
    pub install_redirect: String,
    /// Web API base URL (for tests or proxies).
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
}

fn default_install_redirect() -> String {
    "https://slack.com".to_string()
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            auth_token: None,
            verification_token: None,
            signing_secret: None,
            client_id: None,
            client_secret: None,
            install_redirect: default_install_redirect(),
            api_base: default_slack_api_base(),
        }
    }
}

/// Twilio config: account credentials and the fixed origin number for outbound SMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwilioConfig {
    /// Overridden by TWILIO_ACCOUNT_SID.
    pub account_sid: Option<String>,
    /// Overridden by TWILIO_AUTH_TOKEN.
    pub auth_token: Option<String>,
    /// Origin number in E.164 form (e.g. "+15550001111"). Overridden by TWILIO_NUMBER.
    pub from_number: Option<String>,
    /// Public URL of `/sms` exactly as entered in the Twilio console; signatures are
    /// computed over it. When unset the URL is rebuilt from the request's Host header.
    /// Overridden by TWILIO_WEBHOOK_URL.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            webhook_url: None,
            api_base: default_twilio_api_base(),
        }
    }
}

/// Which conversation store backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory; mappings are lost on restart.
    Memory,
    /// JSON file rewritten after every mutation.
    #[default]
    File,
    /// Firebase Realtime Database over REST.
    Firebase,
}

/// Conversation store config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// File backend path (default ~/.smsrelay/conversations.json).
    pub path: Option<PathBuf>,
    /// Database URL, e.g. "https://my-app.firebaseio.com". Overridden by FIREBASE_URL.
    pub firebase_url: Option<String>,
    /// Database secret or access token sent as `auth`. Overridden by FIREBASE_SECRET.
    pub firebase_secret: Option<String>,
}

/// Read a trimmed, non-empty env var.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Env var first, then the trimmed, non-empty config value.
fn env_or(name: &str, configured: Option<&String>) -> Option<String> {
    env_value(name).or_else(|| {
        configured
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Fully resolved Slack credentials (env applied over config).
#[derive(Debug, Clone, Default)]
pub struct SlackCredentials {
    pub bot_token: Option<String>,
    pub auth_token: Option<String>,
    pub verification_token: Option<String>,
    pub signing_secret: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Resolve Slack credentials: SLACK_* env vars override config.
pub fn resolve_slack_credentials(config: &Config) -> SlackCredentials {
    let s = &config.slack;
    SlackCredentials {
        bot_token: env_or("SLACK_BOT_TOKEN", s.bot_token.as_ref()),
        auth_token: env_or("SLACK_AUTH_TOKEN", s.auth_token.as_ref()),
        verification_token: env_or("SLACK_VERIFICATION_TOKEN", s.verification_token.as_ref()),
        signing_secret: env_or("SLACK_SIGNING_SECRET", s.signing_secret.as_ref()),
        client_id: env_or("SLACK_CLIENT_ID", s.client_id.as_ref()),
        client_secret: env_or("SLACK_CLIENT_SECRET", s.client_secret.as_ref()),
    }
}

/// Fully resolved Twilio credentials (env applied over config).
#[derive(Debug, Clone, Default)]
pub struct TwilioCredentials {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub webhook_url: Option<String>,
}

/// Resolve Twilio credentials: TWILIO_* env vars override config.
pub fn resolve_twilio_credentials(config: &Config) -> TwilioCredentials {
    let t = &config.twilio;
    TwilioCredentials {
        account_sid: env_or("TWILIO_ACCOUNT_SID", t.account_sid.as_ref()),
        auth_token: env_or("TWILIO_AUTH_TOKEN", t.auth_token.as_ref()),
        from_number: env_or("TWILIO_NUMBER", t.from_number.as_ref()),
        webhook_url: env_or("TWILIO_WEBHOOK_URL", t.webhook_url.as_ref()),
    }
}

/// Resolve Firebase URL and secret: FIREBASE_URL / FIREBASE_SECRET override config.
pub fn resolve_firebase(config: &Config) -> (Option<String>, Option<String>) {
    (
        env_or("FIREBASE_URL", config.store.firebase_url.as_ref()),
        env_or("FIREBASE_SECRET", config.store.firebase_secret.as_ref()),
    )
}

/// Resolve the listen port: PORT env overrides config.
pub fn resolve_port(config: &Config) -> u16 {
    env_value("PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.gateway.port)
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Base directory for config and local state (~/.smsrelay).
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".smsrelay"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("SMSRELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_dir().join("config.json"))
}

/// File store path: `store.path` if set, otherwise `conversations.json` in the config directory.
pub fn resolve_store_path(config: &Config) -> PathBuf {
    config
        .store
        .path
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| default_config_dir().join("conversations.json"))
}

/// Load config from the given path (or SMSRELAY_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
