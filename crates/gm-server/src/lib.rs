//! GM chat HTTP API server (Axum).
//!
//! A thin surface over [`gm_session::TurnOrchestrator`]: session management,
//! scenario selection, turns with abort, dice/system events and snapshot
//! import/export.

pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use state::AppState;

/// Build the application router with a custom state.
pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::session_routes())
        .merge(routes::scenario_routes())
        .merge(routes::turn_routes())
        .merge(routes::snapshot_routes())
        .with_state(state)
}

#[cfg(test)]
mod tests;
