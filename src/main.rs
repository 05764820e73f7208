use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use wardline::api::ApiContext;
use wardline::beacon;
use wardline::config::AppConfig;
use wardline::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load();
    info!("Starting {} v{}", wardline::config::APP_NAME, wardline::config::APP_VERSION);

    let state = Arc::new(AppState::new(config)?);

    let mut sweeper = beacon::start_expiry_sweeper(state.clone());

    let ctx = ApiContext::new(state);
    let result = wardline::api::server::serve(ctx).await;

    sweeper.shutdown();
    result
}
