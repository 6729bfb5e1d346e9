//! End-to-end tests for the webhook conversation engine.
//!
//! Each test spins the real Axum router on a random port, backed by an
//! in-memory key-value store and stub collaborator HTTP servers that record
//! every request, then drives deliveries through the provider contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use nutri_assist::channels::WhatsAppClient;
use nutri_assist::collaborators::{AccountClient, ChatClient, PlanClient};
use nutri_assist::conversation::ConversationEngine;
use nutri_assist::store::{KvStore, LibSqlStore};
use nutri_assist::webhook::webhook_routes;

const VERIFY_TOKEN: &str = "test-verify-token";
const PHONE_NUMBER_ID: &str = "428600";

// ── Stub collaborator: plan + account service ───────────────────────────

/// One recorded collaborator request.
#[derive(Debug, Clone)]
struct Hit {
    method: &'static str,
    path: String,
    body: Value,
}

#[derive(Default)]
struct AppStub {
    hits: Mutex<Vec<Hit>>,
    /// email → account id
    accounts: Mutex<HashMap<String, String>>,
    /// phone → account id
    phones: Mutex<HashMap<String, String>>,
    /// Current plan payload, if one has been generated.
    plan: Mutex<Option<Value>>,
}

impl AppStub {
    fn record(&self, method: &'static str, path: impl Into<String>, body: Value) {
        self.hits.lock().unwrap().push(Hit {
            method,
            path: path.into(),
            body,
        });
    }

    fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    fn clear_hits(&self) {
        self.hits.lock().unwrap().clear();
    }

    fn hit_count(&self, method: &str, path_part: &str) -> usize {
        self.hits()
            .iter()
            .filter(|h| h.method == method && h.path.contains(path_part))
            .count()
    }

    fn sample_plan() -> Value {
        json!({
            "date": "2026-08-26",
            "meals": {
                "breakfast": { "label": "Oat bowl", "calories": 420.0, "items": ["oats", "milk"] },
                "lunch": { "label": "Chicken wrap", "calories": 610.0 },
                "dinner": { "label": "Salmon & greens", "calories": 550.0 }
            },
            "lockedAt": null
        })
    }
}

fn app_stub_routes(stub: Arc<AppStub>) -> Router {
    async fn lookup(State(stub): State<Arc<AppStub>>, Json(body): Json<Value>) -> Json<Value> {
        stub.record("POST", "/api/auth/lookup", body.clone());
        let email = body["email"].as_str().unwrap_or_default().to_string();
        let accounts = stub.accounts.lock().unwrap();
        match accounts.get(&email) {
            Some(id) => Json(json!({ "found": true, "id": id, "email": email })),
            None => Json(json!({ "found": false })),
        }
    }

    async fn by_phone(
        State(stub): State<Arc<AppStub>>,
        Path(phone): Path<String>,
    ) -> Json<Value> {
        stub.record("GET", format!("/api/users/by-phone/{phone}"), Value::Null);
        let phones = stub.phones.lock().unwrap();
        match phones.get(&phone) {
            Some(id) => Json(json!({ "found": true, "id": id })),
            None => Json(json!({ "found": false })),
        }
    }

    async fn link_phone(State(stub): State<Arc<AppStub>>, Json(body): Json<Value>) -> Json<Value> {
        stub.record("POST", "/api/users/link-phone", body);
        Json(json!({}))
    }

    async fn register(State(stub): State<Arc<AppStub>>, Json(body): Json<Value>) -> Json<Value> {
        stub.record("POST", "/api/auth/register", body.clone());
        let email = body["email"].as_str().unwrap_or_default().to_string();
        stub.accounts.lock().unwrap().insert(email, "u-new".into());
        Json(json!({ "id": "u-new" }))
    }

    async fn fetch_plan(
        State(stub): State<Arc<AppStub>>,
        Path(date): Path<String>,
    ) -> Json<Value> {
        stub.record("GET", format!("/api/mealplans/{date}"), Value::Null);
        let plan = stub.plan.lock().unwrap().clone();
        Json(json!({ "plan": plan }))
    }

    async fn generate(State(stub): State<Arc<AppStub>>, Json(body): Json<Value>) -> Json<Value> {
        stub.record("POST", "/api/mealplans/generate", body);
        let plan = AppStub::sample_plan();
        *stub.plan.lock().unwrap() = Some(plan.clone());
        Json(json!({ "plan": plan }))
    }

    async fn accept(
        State(stub): State<Arc<AppStub>>,
        Path(date): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        stub.record("POST", format!("/api/mealplans/{date}/accept"), body);
        if let Some(plan) = stub.plan.lock().unwrap().as_mut() {
            plan["lockedAt"] = json!("2026-08-26T12:00:00Z");
        }
        Json(json!({}))
    }

    async fn reject(
        State(stub): State<Arc<AppStub>>,
        Path(date): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        stub.record("POST", format!("/api/mealplans/{date}/reject"), body);
        *stub.plan.lock().unwrap() = Some(AppStub::sample_plan());
        Json(json!({}))
    }

    async fn swap(
        State(stub): State<Arc<AppStub>>,
        Path(date): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        stub.record("POST", format!("/api/mealplans/{date}/swap"), body.clone());
        let slot = body["mealType"].as_str().unwrap_or_default().to_string();
        if let Some(plan) = stub.plan.lock().unwrap().as_mut() {
            plan["meals"][&slot] = json!({ "label": "Fresh pick" });
        }
        Json(json!({ "meal": { "label": "Fresh pick" }, "diag": {} }))
    }

    Router::new()
        .route("/api/auth/lookup", post(lookup))
        .route("/api/users/by-phone/{phone}", get(by_phone))
        .route("/api/users/link-phone", post(link_phone))
        .route("/api/auth/register", post(register))
        .route("/api/mealplans/generate", post(generate))
        .route("/api/mealplans/{date}", get(fetch_plan))
        .route("/api/mealplans/{date}/accept", post(accept))
        .route("/api/mealplans/{date}/reject", post(reject))
        .route("/api/mealplans/{date}/swap", post(swap))
        .with_state(stub)
}

// ── Stub Graph API (outbound messenger) ─────────────────────────────────

#[derive(Default)]
struct GraphStub {
    sends: Mutex<Vec<Value>>,
}

impl GraphStub {
    /// Sent text bodies, in order. Read receipts are excluded.
    fn texts(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v["type"] == "text")
            .map(|v| v["text"]["body"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn list_count(&self) -> usize {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v["type"] == "interactive")
            .count()
    }

    fn clear(&self) {
        self.sends.lock().unwrap().clear();
    }
}

fn graph_stub_routes(stub: Arc<GraphStub>) -> Router {
    async fn messages(
        State(stub): State<Arc<GraphStub>>,
        Path(_pnid): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        stub.sends.lock().unwrap().push(body);
        Json(json!({ "messages": [{ "id": "wamid.out" }] }))
    }

    Router::new()
        .route("/{pnid}/messages", post(messages))
        .with_state(stub)
}

// ── Stub chat proxy ─────────────────────────────────────────────────────

#[derive(Default)]
struct ChatStub {
    messages: Mutex<Vec<String>>,
    /// Override for the canned reply; `Some("")` simulates a blank answer.
    reply: Mutex<Option<String>>,
}

fn chat_stub_routes(stub: Arc<ChatStub>) -> Router {
    async fn message(State(stub): State<Arc<ChatStub>>, Json(body): Json<Value>) -> Json<Value> {
        let text = body["message"].as_str().unwrap_or_default().to_string();
        stub.messages.lock().unwrap().push(text);
        let reply = stub
            .reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "Lean protein with every meal helps.".to_string());
        Json(json!({ "reply": reply }))
    }

    Router::new()
        .route("/chat/message", post(message))
        .with_state(stub)
}

// ── Harness ─────────────────────────────────────────────────────────────

struct Harness {
    webhook_url: String,
    app: Arc<AppStub>,
    graph: Arc<GraphStub>,
    chat: Arc<ChatStub>,
    client: reqwest::Client,
}

async fn serve(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

async fn start() -> Harness {
    let app = Arc::new(AppStub::default());
    let graph = Arc::new(GraphStub::default());
    let chat = Arc::new(ChatStub::default());

    let app_port = serve(app_stub_routes(Arc::clone(&app))).await;
    let graph_port = serve(graph_stub_routes(Arc::clone(&graph))).await;
    let chat_port = serve(chat_stub_routes(Arc::clone(&chat))).await;

    let store: Arc<dyn KvStore> = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let messenger = Arc::new(
        WhatsAppClient::new(PHONE_NUMBER_ID.into(), SecretString::from("test-token"))
            .with_api_base(format!("http://127.0.0.1:{graph_port}")),
    );
    let plans = PlanClient::new(format!("http://127.0.0.1:{app_port}"));
    let accounts = AccountClient::new(format!("http://127.0.0.1:{app_port}"));
    let chat_client = ChatClient::new(format!("http://127.0.0.1:{chat_port}"));

    let engine = Arc::new(ConversationEngine::new(
        store, messenger, plans, accounts, chat_client,
    ));
    let router = webhook_routes(engine, VERIFY_TOKEN.to_string());
    let webhook_port = serve(router).await;

    Harness {
        webhook_url: format!("http://127.0.0.1:{webhook_port}/webhook"),
        app,
        graph,
        chat,
        client: reqwest::Client::new(),
    }
}

impl Harness {
    /// Deliver an event and assert the fixed acknowledgment.
    async fn deliver(&self, payload: Value) {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "EVENT_RECEIVED");
    }

    fn text_event(&self, phone: &str, message_id: &str, body: &str) -> Value {
        json!({
            "entry": [{ "changes": [{ "value": { "messages": [{
                "from": phone,
                "id": message_id,
                "text": { "body": body }
            }] } }] }]
        })
    }

    fn list_event(&self, phone: &str, message_id: &str, row_id: &str, title: &str) -> Value {
        json!({
            "entry": [{ "changes": [{ "value": { "messages": [{
                "from": phone,
                "id": message_id,
                "interactive": { "list_reply": { "id": row_id, "title": title } }
            }] } }] }]
        })
    }
}

// ── Verification handshake ──────────────────────────────────────────────

#[tokio::test]
async fn verification_echoes_challenge() {
    let h = start().await;
    let resp = h
        .client
        .get(&h.webhook_url)
        .query(&[
            ("hub.mode", "subscribe"),
            ("hub.verify_token", VERIFY_TOKEN),
            ("hub.challenge", "challenge_123"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "challenge_123");
}

#[tokio::test]
async fn verification_rejects_bad_token() {
    let h = start().await;
    let resp = h
        .client
        .get(&h.webhook_url)
        .query(&[
            ("hub.mode", "subscribe"),
            ("hub.verify_token", "wrong"),
            ("hub.challenge", "challenge_123"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Forbidden");
}

// ── Login flow ──────────────────────────────────────────────────────────

#[tokio::test]
async fn signup_flow_hello_email_password() {
    let h = start().await;
    let phone = "15550001111";

    // Turn 1: greeting from an unseen phone with no linked account.
    h.deliver(h.text_event(phone, "wamid.login.1", "hello")).await;
    let texts = h.graph.texts();
    assert_eq!(texts.len(), 1, "greeting should send exactly one prompt");
    assert!(texts[0].contains("email address"));

    // Turn 2: valid email, no existing account → password prompt.
    h.deliver(h.text_event(phone, "wamid.login.2", "A@B.com")).await;
    let texts = h.graph.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[1].contains("password"));
    // The lookup received the normalized address.
    let lookup = h
        .app
        .hits()
        .into_iter()
        .find(|hit| hit.path == "/api/auth/lookup")
        .unwrap();
    assert_eq!(lookup.body["email"], "a@b.com");

    // Turn 3: password → account created, signed in, menu shown.
    h.deliver(h.text_event(phone, "wamid.login.3", "secret1")).await;
    let texts = h.graph.texts();
    assert_eq!(texts.len(), 3);
    assert!(texts[2].contains("Account created"));
    assert_eq!(h.graph.list_count(), 1, "menu list should be sent once");

    let register = h
        .app
        .hits()
        .into_iter()
        .find(|hit| hit.path == "/api/auth/register")
        .unwrap();
    assert_eq!(register.body["email"], "a@b.com");
    assert_eq!(register.body["phone"], phone);
    let hash = register.body["passwordHash"].as_str().unwrap();
    assert_ne!(hash, "secret1", "cleartext must not travel");
    assert!(hash.starts_with("$argon2"), "expected a PHC hash, got {hash}");
}

#[tokio::test]
async fn invalid_email_reprompts_without_leaving_step() {
    let h = start().await;
    let phone = "15550002222";

    h.deliver(h.text_event(phone, "wamid.email.1", "hello")).await;
    h.graph.clear();

    h.deliver(h.text_event(phone, "wamid.email.2", "not-an-email")).await;
    let texts = h.graph.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("valid *email*"));

    // Still collecting the email: a good address now moves to the password step.
    h.deliver(h.text_event(phone, "wamid.email.3", "a@b.com")).await;
    let texts = h.graph.texts();
    assert!(texts[1].contains("password"));
}

#[tokio::test]
async fn short_password_reprompts() {
    let h = start().await;
    let phone = "15550003333";

    h.deliver(h.text_event(phone, "wamid.pwd.1", "hello")).await;
    h.deliver(h.text_event(phone, "wamid.pwd.2", "a@b.com")).await;
    h.graph.clear();

    h.deliver(h.text_event(phone, "wamid.pwd.3", "tiny")).await;
    let texts = h.graph.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("at least 6 characters"));
    assert_eq!(h.app.hit_count("POST", "/api/auth/register"), 0);

    // Still in the password step: a long enough password registers.
    h.deliver(h.text_event(phone, "wamid.pwd.4", "longenough")).await;
    assert_eq!(h.app.hit_count("POST", "/api/auth/register"), 1);
}

#[tokio::test]
async fn greeting_with_linked_phone_signs_in() {
    let h = start().await;
    let phone = "15550004444";
    h.app.phones.lock().unwrap().insert(phone.into(), "u77".into());

    h.deliver(h.text_event(phone, "wamid.known.1", "hello")).await;
    let texts = h.graph.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("NutriSuite assistant"));
    assert_eq!(h.graph.list_count(), 1);
}

// ── Idempotency ─────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_delivery_is_a_noop() {
    let h = start().await;
    let phone = "15550005555";

    let event = h.text_event(phone, "wamid.dup.1", "hello");
    h.deliver(event.clone()).await;
    h.deliver(event).await;

    assert_eq!(h.graph.texts().len(), 1, "second delivery must not re-send");
    assert_eq!(
        h.app.hit_count("GET", "/api/users/by-phone"),
        1,
        "second delivery must not re-query collaborators"
    );
}

// ── Menu actions ────────────────────────────────────────────────────────

#[tokio::test]
async fn swap_without_plan_generates_first() {
    let h = start().await;
    let phone = "15550006666";
    h.app.phones.lock().unwrap().insert(phone.into(), "u77".into());

    h.deliver(h.text_event(phone, "wamid.swap.1", "hello")).await;
    h.graph.clear();
    h.app.clear_hits();

    h.deliver(h.list_event(phone, "wamid.swap.2", "swap-lunch", "Swap lunch")).await;

    assert_eq!(h.app.hit_count("POST", "/api/mealplans/generate"), 1);
    assert_eq!(h.app.hit_count("POST", "/swap"), 1);
    let swap = h
        .app
        .hits()
        .into_iter()
        .find(|hit| hit.path.ends_with("/swap"))
        .unwrap();
    assert_eq!(swap.body["mealType"], "lunch");
    assert_eq!(swap.body["userId"], "u77");

    let texts = h.graph.texts();
    assert_eq!(texts.len(), 1, "exactly one reply for the action");
    assert!(
        texts[0].starts_with("Swapped *lunch*"),
        "reply was: {}",
        texts[0]
    );
    assert!(texts[0].contains("• Lunch: Fresh pick"));
    assert!(texts[0].contains("• Supper:"));
    assert_eq!(h.graph.list_count(), 1, "menu re-shown after the action");
}

#[tokio::test]
async fn menu_selection_while_unauthenticated_defers_action() {
    let h = start().await;
    let phone = "15550007777";
    h.app
        .accounts
        .lock()
        .unwrap()
        .insert("a@b.com".into(), "u88".into());

    // Selecting from the menu before logging in only prompts for the email.
    h.deliver(h.list_event(phone, "wamid.defer.1", "plan", "Generate plan")).await;
    let texts = h.graph.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("email address"));
    assert_eq!(h.app.hit_count("POST", "/api/mealplans/generate"), 0);

    // Authentication completes → the deferred action runs immediately.
    h.deliver(h.text_event(phone, "wamid.defer.2", "a@b.com")).await;
    assert_eq!(h.app.hit_count("POST", "/api/users/link-phone"), 1);
    assert_eq!(h.app.hit_count("POST", "/api/mealplans/generate"), 1);
    let texts = h.graph.texts();
    assert!(
        texts.iter().any(|t| t.starts_with("Generated today's plan.")),
        "deferred plan action should reply: {texts:?}"
    );
}

#[tokio::test]
async fn accept_and_show_reply_with_summary() {
    let h = start().await;
    let phone = "15550008888";
    h.app.phones.lock().unwrap().insert(phone.into(), "u77".into());
    *h.app.plan.lock().unwrap() = Some(AppStub::sample_plan());

    h.deliver(h.text_event(phone, "wamid.accept.1", "hello")).await;
    h.graph.clear();

    h.deliver(h.list_event(phone, "wamid.accept.2", "accept", "Accept plan")).await;
    let texts = h.graph.texts();
    assert!(texts[0].starts_with("Plan accepted and locked."));
    assert!(texts[0].contains("• Breakfast: Oat bowl (420 kcal)"));

    h.graph.clear();
    h.deliver(h.list_event(phone, "wamid.accept.3", "show-today", "Show today")).await;
    let texts = h.graph.texts();
    assert!(texts[0].starts_with("*Today (2026-08-26)*"));
}

// ── Free text chat ──────────────────────────────────────────────────────

#[tokio::test]
async fn authenticated_free_text_is_forwarded() {
    let h = start().await;
    let phone = "15550009999";
    h.app.phones.lock().unwrap().insert(phone.into(), "u77".into());

    h.deliver(h.text_event(phone, "wamid.chat.1", "hello")).await;
    h.graph.clear();

    h.deliver(h.text_event(phone, "wamid.chat.2", "how much protein do I need?")).await;
    assert_eq!(
        h.chat.messages.lock().unwrap().as_slice(),
        ["how much protein do I need?"]
    );
    let texts = h.graph.texts();
    assert_eq!(texts[0], "Lean protein with every meal helps.");
    assert_eq!(h.graph.list_count(), 1, "menu re-shown after chat");
}

#[tokio::test]
async fn chat_text_keeps_original_whitespace() {
    let h = start().await;
    let phone = "15550011000";
    h.app.phones.lock().unwrap().insert(phone.into(), "u77".into());

    h.deliver(h.text_event(phone, "wamid.raw.1", "hello")).await;
    h.graph.clear();

    h.deliver(h.text_event(phone, "wamid.raw.2", "  is rice ok?  ")).await;
    assert_eq!(
        h.chat.messages.lock().unwrap().as_slice(),
        ["  is rice ok?  "],
        "free text must be forwarded as typed"
    );
}

#[tokio::test]
async fn blank_chat_reply_gets_its_own_message() {
    let h = start().await;
    let phone = "15550012000";
    h.app.phones.lock().unwrap().insert(phone.into(), "u77".into());
    *h.chat.reply.lock().unwrap() = Some(String::new());

    h.deliver(h.text_event(phone, "wamid.blank.1", "hello")).await;
    h.graph.clear();

    h.deliver(h.text_event(phone, "wamid.blank.2", "any tips?")).await;
    let texts = h.graph.texts();
    assert_eq!(
        texts[0],
        "I couldn't form a reply right now. Please try again."
    );
    assert_eq!(h.graph.list_count(), 1, "menu re-shown after the reply");
}

#[tokio::test]
async fn unauthenticated_free_text_prompts_greeting() {
    let h = start().await;

    h.deliver(h.text_event("15550010000", "wamid.cold.1", "what is this?")).await;
    let texts = h.graph.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("hello"));
}

// ── Malformed and status deliveries ─────────────────────────────────────

#[tokio::test]
async fn malformed_body_is_acked_without_side_effects() {
    let h = start().await;

    let resp = h
        .client
        .post(&h.webhook_url)
        .header("content-type", "application/json")
        .body("this is {not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "EVENT_RECEIVED");

    assert!(h.app.hits().is_empty(), "no collaborator calls expected");
    assert!(h.graph.texts().is_empty(), "no sends expected");
}

#[tokio::test]
async fn non_utf8_body_is_acked_without_side_effects() {
    let h = start().await;

    let resp = h
        .client
        .post(&h.webhook_url)
        .header("content-type", "application/json")
        .body(vec![0xff, 0xfe, 0xfd])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "provider requires a 200 ack");
    assert_eq!(resp.text().await.unwrap(), "EVENT_RECEIVED");

    assert!(h.app.hits().is_empty(), "no collaborator calls expected");
    assert!(h.graph.texts().is_empty(), "no sends expected");
}

#[tokio::test]
async fn status_only_delivery_is_acked_without_processing() {
    let h = start().await;

    h.deliver(json!({
        "entry": [{ "changes": [{ "value": {
            "statuses": [{ "id": "wamid.x", "status": "delivered" }]
        } }] }]
    }))
    .await;

    assert!(h.app.hits().is_empty());
    assert!(h.graph.texts().is_empty());
}
