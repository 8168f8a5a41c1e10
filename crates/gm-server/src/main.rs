//! gm-server entry point.

use anyhow::{Context, Result};
use gm_core::AppConfig;
use gm_server::{app_with_state, state::AppState};
use tracing_subscriber::EnvFilter;

/// Library modules logged at `warn` unless `RUST_LOG` says otherwise.
const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "tower_http"];

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = String::from("info");
        for module in NOISY_MODULES {
            directives.push_str(&format!(",{module}=warn"));
        }
        EnvFilter::new(directives)
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let config = AppConfig::from_env();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.storage.data_dir.display(),
        scenario_dir = %config.storage.scenario_dir.display(),
        base_url = %config.api.base_url,
        "starting gm-server"
    );

    let state = AppState::from_config(&config);
    state.hydrate().await?;

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!("listening on {addr}");
    axum::serve(listener, app_with_state(state)).await?;
    Ok(())
}
