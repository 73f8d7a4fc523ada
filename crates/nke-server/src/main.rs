//! nke-server — Neural Key Exchange daemon.

use std::sync::Arc;

use anyhow::Result;
use nke_api::ApiState;
use nke_core::NkeConfig;
use nke_services::Coordinator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing — RUST_LOG controls verbosity
    // e.g. RUST_LOG=debug cargo run -p nke-server
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = NkeConfig::load()?;
    tracing::info!(port = config.network.port, "nke-server starting");

    let coordinator = Arc::new(Coordinator::new(&config));
    let port = config.network.port;
    let state = ApiState { coordinator, config };

    nke_api::serve(state, port).await
}
