use axum::body::Body;
use axum::http::Request;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gm_llm::mock::{Script, ScriptedCompletion, ScriptedSummarizer};
use gm_server::{app_with_state, state::AppState};
use gm_session::{StaticScenarioSource, TurnOrchestrator};
use gm_storage::MemoryKvStore;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tower::ServiceExt;

fn state(turns: usize) -> AppState {
    let scripts = (0..turns).map(|i| Script::reply(&format!("Reply number {i} from the GM.")));
    let mut engine = TurnOrchestrator::new(
        Arc::new(MemoryKvStore::new()),
        Arc::new(ScriptedCompletion::new(scripts)),
        Arc::new(ScriptedSummarizer::replying("digest")),
        Arc::new(StaticScenarioSource::new()),
    );
    engine.start_fresh();
    AppState::new(engine)
}

fn bench_http_health(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let app = app_with_state(state(0));
    c.bench_function("http_health_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                for _ in 0..1000 {
                    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
                    let resp = app.clone().oneshot(req).await.unwrap();
                    black_box(resp.status());
                }
            })
        })
    });
}

fn bench_http_turns(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    c.bench_function("http_turns_50", |b| {
        b.iter(|| {
            rt.block_on(async {
                let app = app_with_state(state(50));
                for i in 0..50 {
                    let body = serde_json::json!({ "input": format!("action {i}") });
                    let req = Request::builder()
                        .method("POST")
                        .uri("/api/v1/turn")
                        .header("content-type", "application/json")
                        .body(Body::from(serde_json::to_vec(&body).unwrap()))
                        .unwrap();
                    let resp = app.clone().oneshot(req).await.unwrap();
                    black_box(resp.status());
                }
            })
        })
    });
}

criterion_group!(benches, bench_http_health, bench_http_turns);
criterion_main!(benches);
