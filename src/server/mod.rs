//! HTTP server — Axum router for the betting game API.
//!
//! Serves the JSON API and a self-contained HTML landing page.
//! CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    response::Html,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::SharedState;

/// The embedded landing page (compiled into the binary).
const INDEX_HTML: &str = include_str!("templates/index.html");

/// Run the API server until shutdown is signalled.
pub async fn run(state: SharedState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, "Server listening on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received.");
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().expect("static origin"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        // Account & session
        .route("/api/signup", post(routes::signup))
        .route("/api/login", post(routes::login))
        .route("/api/logout", post(routes::logout))
        .route("/api/me", get(routes::me))
        // Game
        .route("/api/bet", post(routes::bet))
        .route("/api/ranking", get(routes::ranking))
        .route("/api/pool", get(routes::pool))
        .route("/api/history/latest", get(routes::latest_history))
        // Admin
        .route("/api/admin/settle", post(routes::settle))
        .route("/api/admin/bonus", post(routes::bonus))
        .route("/api/admin/reset-code", get(routes::reset_code))
        .route("/api/admin/reset", post(routes::reset))
        // Misc
        .route("/health", get(routes::health))
        .route("/", get(serve_index))
        .layer(cors)
        .with_state(state)
}

/// Serve the embedded HTML landing page.
async fn serve_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
