//! Gateway HTTP server: SMS webhook, Slack events, install and selection callbacks.

use crate::channels::{
    ChatApi, EventEnvelope, InboundSms, InteractionPayload, SlackClient, TwilioClient,
};
use crate::config::{self, Config};
use crate::dispatch::Dispatcher;
use crate::gateway::dedup::RecentEvents;
use crate::gateway::protocol::{AuthQuery, SelectAck, SelectBody, SmsForm, EMPTY_TWIML};
use crate::gateway::verify::{SmsVerifier, Verifier};
use crate::relay::Relay;
use crate::setup::{Installer, SetupError};
use crate::store;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Slack sets this on redelivered events.
const RETRY_HEADER: &str = "x-slack-retry-num";

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Port reported by the health endpoint.
    pub port: u16,
    pub relay: Arc<Relay>,
    pub installer: Arc<Installer>,
    pub verifier: Arc<Verifier>,
    pub sms_verifier: Arc<SmsVerifier>,
    /// Event ids already handled; redeliveries of these are skipped.
    pub recent_events: Arc<RecentEvents>,
    /// Browser destination after a successful install.
    pub install_redirect: String,
}

/// Build clients, store and bot identity from config.
pub async fn build_state(config: &Config) -> Result<GatewayState> {
    let slack_creds = config::resolve_slack_credentials(config);
    let twilio_creds = config::resolve_twilio_credentials(config);

    let slack = Arc::new(
        SlackClient::new(slack_creds.bot_token.clone(), slack_creds.auth_token.clone())
            .with_base_url(&config.slack.api_base)
            .with_oauth_client(slack_creds.client_id.clone(), slack_creds.client_secret.clone()),
    );
    let sms_verifier = SmsVerifier::from_credentials(&twilio_creds);
    if twilio_creds.from_number.is_none() {
        log::warn!("no twilio origin number configured (twilio.fromNumber or TWILIO_NUMBER); replies cannot be sent as sms");
    }
    let twilio = Arc::new(
        TwilioClient::new(
            twilio_creds.account_sid,
            twilio_creds.auth_token,
            twilio_creds.from_number,
        )
        .with_base_url(&config.twilio.api_base),
    );

    let store = store::open_store(config).await?;

    let bot_user_id = if slack_creds.bot_token.is_some() {
        match slack.bot_user_id().await {
            Ok(id) => {
                log::info!("slack bot identity: {}", id);
                Some(id)
            }
            Err(e) => {
                log::warn!("resolving slack bot identity failed: {}; thread replies will not be relayed", e);
                None
            }
        }
    } else {
        log::warn!("no slack bot token configured (slack.botToken or SLACK_BOT_TOKEN); thread replies will not be relayed");
        None
    };

    let dispatcher = Dispatcher::new(slack.clone(), twilio);
    Ok(GatewayState {
        port: config.gateway.port,
        relay: Arc::new(Relay::new(store.clone(), dispatcher, bot_user_id)),
        installer: Arc::new(Installer::new(slack, store)),
        verifier: Arc::new(Verifier::from_credentials(&slack_creds)),
        sms_verifier: Arc::new(sms_verifier),
        recent_events: Arc::new(RecentEvents::default()),
        install_redirect: config.slack.install_redirect.clone(),
    })
}

/// All gateway routes.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/sms", post(sms_webhook))
        .route("/select", post(select_channel))
        .route("/auth", get(auth_callback))
        .route("/slack/events", post(slack_events))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback, both Slack and Twilio request verification must be configured
/// or startup fails.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    let state = build_state(&config).await?;
    if !config::is_loopback_bind(&bind) {
        if state.verifier.is_disabled() {
            anyhow::bail!(
                "refusing to bind gateway to {} without request verification (set slack.signingSecret / SLACK_SIGNING_SECRET or slack.verificationToken / SLACK_VERIFICATION_TOKEN)",
                bind
            );
        }
        if state.sms_verifier.is_disabled() {
            anyhow::bail!(
                "refusing to bind gateway to {} without sms request verification (set twilio.authToken / TWILIO_AUTH_TOKEN)",
                bind
            );
        }
    }

    let bind_addr = format!("{}:{}", bind, state.port);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// In-flight requests finish before `axum::serve` returns.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for health checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
        "botUserId": state.relay.bot_user_id(),
    }))
}

/// POST /sms — Twilio webhook. Unsigned or forged requests get 401; anything else is
/// acknowledged and relay failures are only logged.
async fn sms_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    if !state.sms_verifier.verify_request(&headers, &uri, &body) {
        log::warn!("sms webhook: rejected request with missing or invalid signature");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let sms: InboundSms = SmsForm::parse(&body).into();
    let outcome = state.relay.handle_inbound_sms(&sms).await;
    log::debug!("sms webhook: {:?}", outcome);
    ([(header::CONTENT_TYPE, "text/xml")], EMPTY_TWIML).into_response()
}

/// POST /slack/events — Events API: answers URL verification, routes message and reaction events.
async fn slack_events(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.verifier.verify_request(&headers, &body) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let envelope: EventEnvelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            log::debug!("slack events: unparsable body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    if !state.verifier.verify_token(envelope.token()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match envelope {
        EventEnvelope::UrlVerification { challenge, .. } => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        EventEnvelope::EventCallback {
            event, event_id, ..
        } => {
            if let Some(id) = event_id.as_deref() {
                if !state.recent_events.first_delivery(id) {
                    log::debug!("slack events: {} already handled, skipping redelivery", id);
                    return StatusCode::OK.into_response();
                }
            }
            if let Some(retry) = headers.get(RETRY_HEADER).and_then(|v| v.to_str().ok()) {
                log::debug!("slack events: handling redelivery #{}", retry);
            }
            let outcome = state.relay.handle_chat_event(event.into()).await;
            log::debug!("slack events: {:?}", outcome);
            StatusCode::OK.into_response()
        }
        EventEnvelope::Unknown => StatusCode::OK.into_response(),
    }
}

/// POST /select — channel picker interaction; stores the default channel.
async fn select_channel(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.verifier.verify_request(&headers, &body) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let Some(select) = SelectBody::parse(content_type, &body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let payload: InteractionPayload = match serde_json::from_str(&select.payload) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("select: unparsable payload: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    if !state.verifier.verify_token(&payload.token) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.installer.select_channel(&payload).await {
        Ok(channel) => Json(SelectAck::for_channel(&channel)).into_response(),
        Err(e @ (SetupError::MissingSelection | SetupError::UnexpectedCallback(_))) => {
            log::debug!("select: {}", e);
            StatusCode::BAD_REQUEST.into_response()
        }
        Err(e) => {
            log::warn!("select: storing default channel failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /auth?code= — OAuth redirect target: exchange the code, prompt for a channel, send the browser on.
async fn auth_callback(
    State(state): State<GatewayState>,
    Query(query): Query<AuthQuery>,
) -> Response {
    let Some(code) = query.code.filter(|c| !c.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing code").into_response();
    };
    match state.installer.complete_install(code.trim()).await {
        Ok(_) => Redirect::to(&state.install_redirect).into_response(),
        Err(e) => {
            log::warn!("auth: install failed: {}", e);
            (StatusCode::BAD_GATEWAY, "authorization failed").into_response()
        }
    }
}
