use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{delete, get, post},
    Json, Router,
};
use futures::Stream;
use gm_compactor::CompactionOutcome;
use gm_session::TurnReport;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio::sync::mpsc;

type ApiResult<T> = Result<T, ApiError>;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/sessions", get(list_sessions).post(create_session))
        .route(
            "/api/v1/sessions/{id}",
            delete(delete_session).patch(rename_session),
        )
        .route("/api/v1/sessions/{id}/switch", post(switch_session))
        .route("/api/v1/session", get(current_session))
}

pub fn scenario_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/scenarios", get(list_scenarios))
        .route("/api/v1/scenarios/select", post(select_scenario))
}

pub fn turn_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/turn", post(run_turn))
        .route("/api/v1/turn/stream", post(stream_turn))
        .route("/api/v1/turn/abort", post(abort_turn))
        .route("/api/v1/events", post(append_event))
}

pub fn snapshot_routes() -> Router<AppState> {
    Router::new().route("/api/v1/snapshot", get(export_snapshot).put(import_snapshot))
}

// ========== Health ==========

async fn health(State(state): State<AppState>) -> Json<Value> {
    let hydrated = match state.engine.try_lock() {
        Ok(engine) => json!(engine.is_hydrated()),
        // A turn holds the engine, so it was hydrated.
        Err(_) => json!(true),
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "hydrated": hydrated,
    }))
}

// ========== Sessions ==========

#[derive(Deserialize)]
struct RenameRequest {
    name: String,
}

async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let engine = state.engine.lock().await;
    Json(json!({
        "sessions": engine.list_sessions(),
        "currentSessionId": engine.store().current_id(),
    }))
}

async fn create_session(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let mut engine = state.engine.lock().await;
    let id = engine.new_session().await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn switch_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let mut engine = state.engine.lock().await;
    engine.switch_session(&id).await?;
    Ok(Json(json!({ "currentSessionId": id })))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let mut engine = state.engine.lock().await;
    engine.delete_session(&id).await?;
    Ok(Json(json!({
        "deleted": id,
        "currentSessionId": engine.store().current_id(),
    })))
}

async fn rename_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<Json<Value>> {
    let mut engine = state.engine.lock().await;
    engine.rename_session(&id, &req.name).await?;
    let name = engine.store().get(&id).map(|s| s.name.clone());
    Ok(Json(json!({ "id": id, "name": name })))
}

async fn current_session(State(state): State<AppState>) -> Json<Value> {
    let engine = state.engine.lock().await;
    Json(json!({
        "session": engine.current_session(),
        "scenario": engine.scenario(),
        "scenarioRef": engine.scenario_ref(),
    }))
}

// ========== Scenarios ==========

#[derive(Deserialize)]
struct SelectScenarioRequest {
    scenario: String,
}

async fn list_scenarios(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let engine = state.engine.lock().await;
    let scenarios = engine.list_scenarios().await?;
    Ok(Json(json!({
        "scenarios": scenarios,
        "active": engine.scenario_ref(),
    })))
}

async fn select_scenario(
    State(state): State<AppState>,
    Json(req): Json<SelectScenarioRequest>,
) -> ApiResult<Json<Value>> {
    let mut engine = state.engine.lock().await;
    engine.select_scenario(&req.scenario).await?;
    Ok(Json(json!({
        "active": engine.scenario_ref(),
        "name": engine.scenario().name,
        "currentSessionId": engine.store().current_id(),
    })))
}

// ========== Turns ==========

#[derive(Deserialize)]
struct TurnRequest {
    input: String,
}

#[derive(Deserialize)]
struct EventRequest {
    content: String,
}

fn outcome_label(outcome: CompactionOutcome) -> &'static str {
    match outcome {
        CompactionOutcome::Skipped => "skipped",
        CompactionOutcome::Summarized => "summarized",
        CompactionOutcome::SummaryFailed => "summary_failed",
    }
}

fn report_json(report: &TurnReport) -> Value {
    json!({
        "sessionId": report.session_id,
        "reply": report.reply,
        "compaction": outcome_label(report.compaction),
        "compressedCount": report.compressed_count,
    })
}

fn turn_input(req: &TurnRequest) -> ApiResult<String> {
    let input = req.input.trim();
    if input.is_empty() {
        return Err(ApiError::bad_request("input must not be empty"));
    }
    Ok(input.to_string())
}

/// Runs a turn and answers with the whole reply once it is complete.
async fn run_turn(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> ApiResult<Json<Value>> {
    let input = turn_input(&req)?;
    let guard = state
        .begin_turn()
        .ok_or_else(|| ApiError::conflict("a turn is already in progress"))?;

    let mut engine = state.engine.lock().await;
    let mut chunks = 0usize;
    let report = engine.run_turn(&input, &guard.token, |_| chunks += 1).await?;
    tracing::debug!(session = %report.session_id, chunks, "turn served");
    Ok(Json(report_json(&report)))
}

/// Runs a turn as server-sent events: one `chunk` event per model delta
/// (`{"text": ...}`), then a final `done` event carrying the report or an
/// `error` event carrying the error body. Dropping the connection aborts
/// the turn.
async fn stream_turn(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let input = turn_input(&req)?;
    let guard = state
        .begin_turn()
        .ok_or_else(|| ApiError::conflict("a turn is already in progress"))?;

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let engine = state.engine.clone();
    tokio::spawn(async move {
        let mut engine = engine.lock().await;
        let result = engine
            .run_turn(&input, &guard.token, |chunk| {
                let event = Event::default().event("chunk").json_data(json!({ "text": chunk }));
                if let Ok(event) = event {
                    if tx.send(event).is_err() {
                        guard.token.cancel();
                    }
                }
            })
            .await;
        let last = match result {
            Ok(report) => Event::default().event("done").json_data(report_json(&report)),
            Err(e) => {
                let err = ApiError::from(e);
                Event::default()
                    .event("error")
                    .json_data(json!({ "code": err.code, "message": err.message }))
            }
        };
        drop(engine);
        drop(guard);
        if let Ok(event) = last {
            let _ = tx.send(event);
        }
    });

    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn abort_turn(State(state): State<AppState>) -> Json<Value> {
    let aborted = state.abort_turn();
    if aborted {
        tracing::info!("turn abort requested");
    }
    Json(json!({ "aborted": aborted }))
}

async fn append_event(
    State(state): State<AppState>,
    Json(req): Json<EventRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }
    let mut engine = state.engine.lock().await;
    engine.append_event(&req.content).await?;
    let count = engine.current_session().map(|s| s.message_count()).unwrap_or(0);
    Ok((StatusCode::CREATED, Json(json!({ "messageCount": count }))))
}

// ========== Snapshots ==========

async fn export_snapshot(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let engine = state.engine.lock().await;
    let bytes = engine.export_snapshot()?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}

async fn import_snapshot(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let mut engine = state.engine.lock().await;
    engine.import_snapshot(&body).await?;
    Ok(Json(json!({
        "sessions": engine.store().count(),
        "currentSessionId": engine.store().current_id(),
    })))
}
