//! Integration test: gateway wired to stub Slack and Twilio APIs (served by axum on a
//! free port). Drives the full SMS -> thread -> SMS -> close cycle over HTTP.

use axum::{
    extract::{Form, State},
    routing::post,
    Json, Router,
};
use lib::config::{Config, StoreBackend};
use lib::gateway::{self, slack_signature, twilio_signature};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Recorded {
    posts: Arc<Mutex<Vec<Value>>>,
    sms: Arc<Mutex<Vec<HashMap<String, String>>>>,
    oauth_codes: Arc<Mutex<Vec<String>>>,
}

impl Recorded {
    fn posts(&self) -> Vec<Value> {
        self.posts.lock().unwrap().clone()
    }

    fn sms(&self) -> Vec<HashMap<String, String>> {
        self.sms.lock().unwrap().clone()
    }
}

async fn auth_test() -> Json<Value> {
    Json(json!({ "ok": true, "user_id": "UBOT" }))
}

async fn post_message(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    let mut posts = rec.posts.lock().unwrap();
    posts.push(body);
    Json(json!({ "ok": true, "ts": format!("M{}", posts.len()) }))
}

async fn conversations_open(Json(body): Json<Value>) -> Json<Value> {
    let user = body["users"].as_str().unwrap_or_default().to_string();
    Json(json!({ "ok": true, "channel": { "id": format!("D-{}", user) } }))
}

async fn oauth_access(
    State(rec): State<Recorded>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let code = form.get("code").cloned().unwrap_or_default();
    rec.oauth_codes.lock().unwrap().push(code.clone());
    if code == "expired" {
        return Json(json!({ "ok": false, "error": "invalid_code" }));
    }
    Json(json!({ "ok": true, "user_id": "UINSTALL", "team_id": "T1" }))
}

async fn twilio_messages(
    State(rec): State<Recorded>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let mut sms = rec.sms.lock().unwrap();
    sms.push(form);
    Json(json!({ "sid": format!("SM{}", sms.len()) }))
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

async fn spawn_providers(rec: Recorded) -> String {
    let app = Router::new()
        .route("/api/auth.test", post(auth_test))
        .route("/api/chat.postMessage", post(post_message))
        .route("/api/conversations.open", post(conversations_open))
        .route("/api/oauth.access", post(oauth_access))
        .route("/2010-04-01/Accounts/:sid/Messages.json", post(twilio_messages))
        .with_state(rec);
    spawn(app).await
}

fn relay_config(providers: &str) -> Config {
    let mut config = Config::default();
    config.store.backend = StoreBackend::Memory;
    config.slack.bot_token = Some("xoxb-test".into());
    config.slack.verification_token = Some("vt".into());
    config.slack.client_id = Some("cid".into());
    config.slack.client_secret = Some("csecret".into());
    config.slack.install_redirect = "https://example.slack.com".into();
    config.slack.api_base = format!("{}/api", providers);
    config.twilio.account_sid = Some("AC123".into());
    config.twilio.auth_token = Some("tok".into());
    config.twilio.from_number = Some("+15550001111".into());
    config.twilio.api_base = providers.to_string();
    config
}

fn form_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'*' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

struct Setup {
    rec: Recorded,
    gateway: String,
    client: reqwest::Client,
}

async fn setup_with(config_fn: impl FnOnce(&mut Config)) -> Setup {
    let rec = Recorded::default();
    let providers = spawn_providers(rec.clone()).await;
    let mut config = relay_config(&providers);
    config_fn(&mut config);
    let state = gateway::build_state(&config).await.expect("build state");
    let gateway = spawn(gateway::router(state)).await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client");
    Setup {
        rec,
        gateway,
        client,
    }
}

async fn setup() -> Setup {
    setup_with(|_| {}).await
}

impl Setup {
    async fn select(&self, channel: &str) -> reqwest::Response {
        let payload = json!({
            "type": "interactive_message",
            "token": "vt",
            "callback_id": "default_channel",
            "actions": [{ "name": "channel_list", "type": "select",
                          "selected_options": [{ "value": channel }] }]
        });
        self.client
            .post(format!("{}/select", self.gateway))
            .form(&[("payload", payload.to_string())])
            .send()
            .await
            .expect("select")
    }

    /// Post a raw `/sms` body signed the way Twilio signs it.
    async fn signed_sms(&self, body: Vec<u8>) -> reqwest::Response {
        let url = format!("{}/sms", self.gateway);
        let signature = twilio_signature("tok", &url, &body);
        self.client
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("X-Twilio-Signature", signature)
            .body(body)
            .send()
            .await
            .expect("sms")
    }

    async fn sms(&self, body: &str, from: &str) -> reqwest::Response {
        let form = format!(
            "Body={}&From={}&To=%2B15550001111",
            form_encode(body),
            form_encode(from)
        );
        self.signed_sms(form.into_bytes()).await
    }

    async fn event(&self, event: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/slack/events", self.gateway))
            .json(&json!({ "token": "vt", "type": "event_callback", "event": event }))
            .send()
            .await
            .expect("event")
    }
}

#[tokio::test]
async fn sms_thread_reply_and_close_round_trip() {
    let s = setup().await;

    let ack: Value = s.select("CRELAY").await.json().await.unwrap();
    assert_eq!(ack["replace_original"], false);

    let resp = s.sms("Hi", "+15551230000").await;
    assert!(resp.status().is_success());
    assert!(resp.text().await.unwrap().contains("<Response>"));
    let posts = s.rec.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["channel"], "CRELAY");
    assert_eq!(posts[0]["text"], "Hi from 15551230000");
    assert!(posts[0].get("thread_ts").is_none());

    let resp = s
        .event(json!({
            "type": "message", "channel": "CRELAY", "user": "UAGENT",
            "text": "<@UBOT> Hello back", "ts": "M9", "thread_ts": "M1"
        }))
        .await;
    assert!(resp.status().is_success());
    let sms = s.rec.sms();
    assert_eq!(sms.len(), 1);
    assert_eq!(sms[0]["To"], "+15551230000");
    assert_eq!(sms[0]["From"], "+15550001111");
    assert_eq!(sms[0]["Body"], "Hello back");

    s.sms("Thanks", "+15551230000").await;
    let posts = s.rec.posts();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[1]["thread_ts"], "M1");
    assert_eq!(posts[1]["text"], "Thanks");

    s.event(json!({
        "type": "reaction_added", "user": "UAGENT", "reaction": "white_check_mark",
        "item": { "type": "message", "channel": "CRELAY", "ts": "M1" }
    }))
    .await;
    s.sms("New question", "+15551230000").await;
    let posts = s.rec.posts();
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[2]["text"], "New question from 15551230000");
    assert!(posts[2].get("thread_ts").is_none());

    // The closed thread no longer relays.
    s.event(json!({
        "type": "message", "text": "<@UBOT> anyone?", "ts": "M10", "thread_ts": "M1"
    }))
    .await;
    assert_eq!(s.rec.sms().len(), 1);
}

#[tokio::test]
async fn sms_before_install_posts_nothing_but_is_acknowledged() {
    let s = setup().await;
    let resp = s.sms("Hi", "+15551230000").await;
    assert!(resp.status().is_success());
    assert!(s.rec.posts().is_empty());
}

#[tokio::test]
async fn malformed_sms_body_is_still_acknowledged() {
    let s = setup().await;
    s.select("CRELAY").await;
    let resp = s.signed_sms(b"%%%".to_vec()).await;
    assert!(resp.status().is_success());
    assert_eq!(s.rec.posts()[0]["text"], " from ");
}

#[tokio::test]
async fn unsigned_or_forged_sms_is_rejected() {
    let s = setup().await;
    s.select("CRELAY").await;

    let unsigned = s
        .client
        .post(format!("{}/sms", s.gateway))
        .form(&[("Body", "Hi"), ("From", "+15551230000")])
        .send()
        .await
        .unwrap();
    assert_eq!(unsigned.status(), reqwest::StatusCode::UNAUTHORIZED);

    let url = format!("{}/sms", s.gateway);
    let signature = twilio_signature("tok", &url, b"Body=Hi&From=%2B15551230000");
    let forged = s
        .client
        .post(url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("X-Twilio-Signature", signature)
        .body("Body=Hi&From=%2B15559999999")
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert!(s.rec.posts().is_empty());
}

#[tokio::test]
async fn events_with_wrong_token_are_rejected() {
    let s = setup().await;
    let resp = s
        .client
        .post(format!("{}/slack/events", s.gateway))
        .json(&json!({ "token": "nope", "type": "url_verification", "challenge": "c" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn url_verification_echoes_challenge() {
    let s = setup().await;
    let resp = s
        .client
        .post(format!("{}/slack/events", s.gateway))
        .json(&json!({ "token": "vt", "type": "url_verification", "challenge": "abc" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["challenge"], "abc");
}

#[tokio::test]
async fn redelivered_events_are_relayed_once() {
    let s = setup().await;
    s.select("CRELAY").await;
    s.sms("Hi", "+15551230000").await;
    let event = |id: &str, text: &str| {
        json!({
            "token": "vt", "type": "event_callback", "event_id": id,
            "event": { "type": "message", "text": text, "ts": "M5", "thread_ts": "M1" }
        })
    };
    for retry in [None, Some("1")] {
        let mut req = s
            .client
            .post(format!("{}/slack/events", s.gateway))
            .json(&event("Ev1", "<@UBOT> ok"));
        if let Some(n) = retry {
            req = req.header("X-Slack-Retry-Num", n);
        }
        assert!(req.send().await.unwrap().status().is_success());
    }
    assert_eq!(s.rec.sms().len(), 1);

    // A retry whose first delivery never arrived is the only copy and is handled.
    s.client
        .post(format!("{}/slack/events", s.gateway))
        .header("X-Slack-Retry-Num", "2")
        .json(&event("Ev2", "<@UBOT> still there?"))
        .send()
        .await
        .unwrap();
    let sms = s.rec.sms();
    assert_eq!(sms.len(), 2);
    assert_eq!(sms[1]["Body"], "still there?");
}

#[tokio::test]
async fn signed_requests_are_verified() {
    let s = setup_with(|c| {
        c.slack.signing_secret = Some("shh".into());
    })
    .await;
    let body = json!({ "type": "url_verification", "challenge": "xyz" }).to_string();
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();

    let ok = s
        .client
        .post(format!("{}/slack/events", s.gateway))
        .header("Content-Type", "application/json")
        .header("X-Slack-Request-Timestamp", ts.to_string())
        .header("X-Slack-Signature", slack_signature("shh", ts, body.as_bytes()))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert!(ok.status().is_success());

    let forged = s
        .client
        .post(format!("{}/slack/events", s.gateway))
        .header("X-Slack-Request-Timestamp", ts.to_string())
        .header("X-Slack-Signature", slack_signature("wrong", ts, body.as_bytes()))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn install_prompts_in_dm_and_redirects() {
    let s = setup().await;
    let resp = s
        .client
        .get(format!("{}/auth?code=abc", s.gateway))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(
        resp.headers().get("location").and_then(|v| v.to_str().ok()),
        Some("https://example.slack.com")
    );
    assert_eq!(*s.rec.oauth_codes.lock().unwrap(), vec!["abc".to_string()]);
    let posts = s.rec.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["channel"], "D-UINSTALL");
    assert_eq!(posts[0]["attachments"][0]["callback_id"], "default_channel");
}

#[tokio::test]
async fn install_failures_do_not_redirect() {
    let s = setup().await;
    let resp = s
        .client
        .get(format!("{}/auth?code=expired", s.gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);
    let resp = s.client.get(format!("{}/auth", s.gateway)).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(s.rec.posts().is_empty());
}

#[tokio::test]
async fn select_without_choice_is_bad_request() {
    let s = setup().await;
    let payload = json!({ "token": "vt", "callback_id": "default_channel", "actions": [] });
    let resp = s
        .client
        .post(format!("{}/select", s.gateway))
        .form(&[("payload", payload.to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn select_from_another_interaction_keeps_default_channel() {
    let s = setup().await;
    s.select("CRELAY").await;
    let payload = json!({
        "token": "vt",
        "callback_id": "survey",
        "actions": [{ "name": "answer", "type": "select",
                      "selected_options": [{ "value": "CEVIL" }] }]
    });
    let resp = s
        .client
        .post(format!("{}/select", s.gateway))
        .form(&[("payload", payload.to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    s.sms("Hi", "+15551230000").await;
    assert_eq!(s.rec.posts()[0]["channel"], "CRELAY");
}
