pub mod handlers;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

fn router(state: ApiState) -> Router {
    let cors_origins = state.config.network.cors_origins.clone();
    let cors = if cors_origins == "*" {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|o| o.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/sessions", post(handlers::handle_session_create))
        .route("/sessions/{id}", get(handlers::handle_session_inspect))
        .route("/ws/{session_id}/{user_id}", get(ws::handle_ws))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!(port, "nke-server listening");
    serve_with_listener(state, listener).await
}

/// Serve on an already-bound listener — lets tests bind an ephemeral port
/// (`127.0.0.1:0`) and read back the assigned address before connecting.
pub async fn serve_with_listener(state: ApiState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}
