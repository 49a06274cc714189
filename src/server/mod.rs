// src/server/mod.rs
// HTTP surface for the orchestration core. One route per exposed operation;
// everything else (case CRUD, uploads, auth, UI) lives in other services.

mod handlers;
pub mod types;

use anyhow::Result;
use axum::{
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/api/status", get(handlers::status_handler))
        // Session lifecycle
        .route("/api/sessions", post(handlers::create_session_handler))
        .route("/api/sessions/{id}", get(handlers::get_session_handler))
        .route("/api/sessions/{id}", delete(handlers::delete_handler))
        .route("/api/sessions/{id}/heartbeat", post(handlers::heartbeat_handler))
        .route("/api/sessions/{id}/status", post(handlers::set_status_handler))
        .route("/api/sessions/{id}/complete", post(handlers::complete_handler))
        .route("/api/sessions/{id}/kill", post(handlers::kill_handler))
        .route("/api/sessions/{id}/restart", post(handlers::restart_handler))
        // Timer
        .route("/api/sessions/{id}/timer/start", post(handlers::start_timer_handler))
        .route("/api/sessions/{id}/time-remaining", get(handlers::time_remaining_handler))
        .route("/api/sessions/{id}/hints", post(handlers::hints_handler))
        // Eligibility
        .route("/api/eligibility", get(handlers::eligibility_handler))
        .route("/api/scenario-completion", get(handlers::scenario_completion_handler))
        // Positions
        .route("/api/sessions/{id}/position", post(handlers::set_position_handler))
        .route("/api/sessions/{id}/positions", get(handlers::position_history_handler))
        // Model calls
        .route("/api/chat", post(handlers::chat_handler))
        .route("/api/evaluate", post(handlers::evaluate_handler))
        // Admin / telemetry
        .route("/api/admin/sweep", post(handlers::sweep_handler))
        .route("/api/usage/summary", get(handlers::usage_summary_handler))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(state: AppState, bind_address: &str) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!("casechat listening on http://{}", bind_address);
    axum::serve(listener, app).await?;
    Ok(())
}
