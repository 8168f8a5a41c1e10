use crate::app_with_state;
use crate::state::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use gm_llm::mock::{Script, ScriptedCompletion, ScriptedSummarizer};
use gm_session::{HydrateStatus, StaticScenarioSource, TurnOrchestrator, SNAPSHOT_KEY};
use gm_storage::MemoryKvStore;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn engine(scripts: Vec<Script>) -> TurnOrchestrator {
    let scenarios = StaticScenarioSource::new()
        .with(
            "heist.json",
            r#"{"name": "Heist", "context": [{"role": "system", "content": "Heist seed."}]}"#,
        )
        .with("chase.json", r#"{"name": "Chase", "tailPrompt": "Keep it tense."}"#);
    TurnOrchestrator::new(
        Arc::new(MemoryKvStore::new()),
        Arc::new(ScriptedCompletion::new(scripts)),
        Arc::new(ScriptedSummarizer::replying("digest")),
        Arc::new(scenarios),
    )
}

async fn hydrated_state(scripts: Vec<Script>) -> AppState {
    let mut engine = engine(scripts);
    engine.hydrate().await.unwrap();
    AppState::new(engine)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = app_with_state(hydrated_state(vec![]).await);
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["hydrated"], true);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = app_with_state(hydrated_state(vec![]).await);

    let (status, first) = send(&app, "POST", "/api/v1/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let first = first["id"].as_str().unwrap().to_string();
    let (_, second) = send(&app, "POST", "/api/v1/sessions", None).await;
    let second = second["id"].as_str().unwrap().to_string();

    let (_, list) = send(&app, "GET", "/api/v1/sessions", None).await;
    assert_eq!(list["sessions"].as_array().unwrap().len(), 2);
    assert_eq!(list["currentSessionId"], second.as_str());

    let (status, _) = send(&app, "POST", &format!("/api/v1/sessions/{first}/switch"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, current) = send(&app, "GET", "/api/v1/session", None).await;
    assert_eq!(current["session"]["id"], first.as_str());

    let (status, renamed) = send(
        &app,
        "PATCH",
        &format!("/api/v1/sessions/{first}"),
        Some(json!({ "name": "  Crow's   Foot " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Crow's Foot");

    let (status, deleted) = send(&app, "DELETE", &format!("/api/v1/sessions/{first}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["currentSessionId"], second.as_str());

    let (status, err) = send(&app, "POST", &format!("/api/v1/sessions/{first}/switch"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_turn_returns_reply() {
    let app = app_with_state(hydrated_state(vec![Script::reply("The door creaks open.")]).await);
    let input = json!({ "input": "I push the door." });
    let (status, body) = send(&app, "POST", "/api/v1/turn", Some(input)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "The door creaks open.");
    assert_eq!(body["compaction"], "skipped");

    let (_, current) = send(&app, "GET", "/api/v1/session", None).await;
    let messages = current["session"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["content"], "I push the door.");
    assert_eq!(messages[2]["role"], "assistant");
}

#[tokio::test]
async fn test_turn_rejects_blank_input() {
    let app = app_with_state(hydrated_state(vec![]).await);
    let (status, _) = send(&app, "POST", "/api/v1/turn", Some(json!({ "input": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_turn_upstream_failure() {
    let app = app_with_state(hydrated_state(vec![Script::Reject("HTTP 500".into())]).await);
    let input = json!({ "input": "Hello" });
    let (status, body) = send(&app, "POST", "/api/v1/turn", Some(input)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "upstream_error");

    // The user message survived the failure.
    let (_, current) = send(&app, "GET", "/api/v1/session", None).await;
    let messages = current["session"]["messages"].as_array().unwrap();
    assert_eq!(messages.last().unwrap()["content"], "Hello");
}

#[tokio::test]
async fn test_writes_before_hydration_unavailable() {
    let app = app_with_state(AppState::new(engine(vec![])));
    let (status, body) = send(&app, "POST", "/api/v1/sessions", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "not_ready");
    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["hydrated"], false);
}

#[tokio::test]
async fn test_scenarios_list_and_select() {
    let app = app_with_state(hydrated_state(vec![]).await);
    let (_, list) = send(&app, "GET", "/api/v1/scenarios", None).await;
    assert_eq!(list["scenarios"], json!(["chase.json", "heist.json"]));
    assert!(list["active"].is_null());

    let pick = json!({ "scenario": "heist.json" });
    let (status, selected) = send(&app, "POST", "/api/v1/scenarios/select", Some(pick)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(selected["name"], "Heist");
    let (_, current) = send(&app, "GET", "/api/v1/session", None).await;
    assert_eq!(current["session"]["messages"][0]["content"], "Heist seed.");
    assert_eq!(current["scenarioRef"], "heist.json");

    let pick = json!({ "scenario": "nope.json" });
    let (status, _) = send(&app, "POST", "/api/v1/scenarios/select", Some(pick)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_append_event() {
    let app = app_with_state(hydrated_state(vec![]).await);
    let event = json!({ "content": "dice: [5] -> success" });
    let (status, body) = send(&app, "POST", "/api/v1/events", Some(event)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["messageCount"], 2);
    let (_, current) = send(&app, "GET", "/api/v1/session", None).await;
    assert_eq!(current["session"]["messages"][1]["isSystemEvent"], true);
}

#[tokio::test]
async fn test_snapshot_export_import() {
    let app = app_with_state(hydrated_state(vec![Script::reply("Noted.")]).await);
    send(&app, "POST", "/api/v1/turn", Some(json!({ "input": "Remember this." }))).await;
    let (status, snapshot) = send(&app, "GET", "/api/v1/snapshot", None).await;
    assert_eq!(status, StatusCode::OK);
    let current = snapshot["currentSessionId"].as_str().unwrap().to_string();

    let other = app_with_state(hydrated_state(vec![]).await);
    let (status, imported) = send(&other, "PUT", "/api/v1/snapshot", Some(snapshot)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(imported["currentSessionId"], current.as_str());
    let (_, session) = send(&other, "GET", "/api/v1/session", None).await;
    assert_eq!(session["session"]["messages"].as_array().unwrap().len(), 3);

    let broken = json!({ "sessions": [] });
    let (status, err) = send(&other, "PUT", "/api/v1/snapshot", Some(broken)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"]["message"].as_str().unwrap().contains("Corrupt"));
}

#[tokio::test]
async fn test_abort_without_turn() {
    let app = app_with_state(hydrated_state(vec![]).await);
    let (status, body) = send(&app, "POST", "/api/v1/turn/abort", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["aborted"], false);
}

#[tokio::test]
async fn test_abort_in_flight_turn() {
    let state = hydrated_state(vec![Script::Stall(vec!["The guard ".into()])]).await;
    let app = app_with_state(state.clone());

    let turn_app = app.clone();
    let turn = tokio::spawn(async move {
        send(&turn_app, "POST", "/api/v1/turn", Some(json!({ "input": "I wait." }))).await
    });
    while state.active_turn.lock().unwrap().is_none() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // A second turn is refused while the first is running.
    let input = json!({ "input": "Again." });
    let (status, body) = send(&app, "POST", "/api/v1/turn", Some(input)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (_, aborted) = send(&app, "POST", "/api/v1/turn/abort", None).await;
    assert_eq!(aborted["aborted"], true);
    let (status, body) = turn.await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "cancelled");
    assert!(state.active_turn.lock().unwrap().is_none());

    // Partial text was discarded; only the user message remains.
    let (_, current) = send(&app, "GET", "/api/v1/session", None).await;
    let messages = current["session"]["messages"].as_array().unwrap();
    assert_eq!(messages.last().unwrap()["content"], "I wait.");
}

async fn send_raw(app: &Router, uri: &str, body: Value) -> (StatusCode, String) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn engine_on(kv: MemoryKvStore) -> TurnOrchestrator {
    TurnOrchestrator::new(
        Arc::new(kv),
        Arc::new(ScriptedCompletion::new(vec![])),
        Arc::new(ScriptedSummarizer::replying("digest")),
        Arc::new(StaticScenarioSource::new()),
    )
}

#[tokio::test]
async fn test_stream_turn_emits_chunks_then_report() {
    let app = app_with_state(hydrated_state(vec![Script::reply("The door creaks open.")]).await);
    let (status, body) = send_raw(&app, "/api/v1/turn/stream", json!({ "input": "Push." })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.matches("event: chunk").count(), 4);
    assert!(body.contains(r#"{"text":"creaks "}"#));
    let done = body.find("event: done").unwrap();
    assert!(body[..done].rfind("event: chunk").is_some());
    assert!(body[done..].contains(r#""reply":"The door creaks open.""#));

    let (_, current) = send(&app, "GET", "/api/v1/session", None).await;
    assert_eq!(current["session"]["messages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_stream_turn_reports_failure_as_event() {
    let app = app_with_state(hydrated_state(vec![Script::Reject("HTTP 500".into())]).await);
    let (status, body) = send_raw(&app, "/api/v1/turn/stream", json!({ "input": "Push." })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: error"));
    assert!(body.contains("upstream_error"));
    assert!(!body.contains("event: done"));
}

#[tokio::test]
async fn test_stream_turn_rejects_blank_input() {
    let app = app_with_state(hydrated_state(vec![]).await);
    let (status, _) = send_raw(&app, "/api/v1/turn/stream", json!({ "input": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_startup_hydrate_refuses_pending_storage() {
    let state = AppState::new(engine_on(MemoryKvStore::pending()));
    let err = state.hydrate().await.unwrap_err();
    assert!(err.to_string().contains("pending"));
    assert!(!state.engine.lock().await.is_hydrated());
}

#[tokio::test]
async fn test_startup_hydrate_replaces_corrupt_state() {
    let kv = MemoryKvStore::new().with_entry(SNAPSHOT_KEY, "{\"sessions\": 3}");
    let state = AppState::new(engine_on(kv));
    assert_eq!(state.hydrate().await.unwrap(), HydrateStatus::Fresh);
    assert!(state.engine.lock().await.is_hydrated());
}

#[tokio::test]
async fn test_startup_hydrate_restores_sessions() {
    let mut source = engine_on(MemoryKvStore::new());
    source.start_fresh();
    source.new_session().await.unwrap();
    let bytes = source.export_snapshot().unwrap();

    let state = AppState::new(engine_on(MemoryKvStore::new().with_entry(SNAPSHOT_KEY, bytes)));
    assert_eq!(state.hydrate().await.unwrap(), HydrateStatus::Restored { sessions: 1 });
}
