use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Live session control
        .route("/live/start", post(handlers::start_live))
        .route("/live/stop", post(handlers::stop_live))
        .route("/live/status", get(handlers::live_status))
        .route("/live/transcript", get(handlers::live_transcript))
        .route("/live/assistant", get(handlers::live_assistant))
        // Live session input
        .route("/live/audio", post(handlers::push_audio))
        .route("/live/image", post(handlers::push_image))
        .route("/live/text", post(handlers::push_text))
        .route("/live/turn/finish", post(handlers::finish_turn))
        .route("/live/mute", post(handlers::set_mute))
        // Transcript summarization
        .route("/summaries/diagnoses", post(handlers::refresh_diagnoses))
        .route("/summaries/treatment", post(handlers::treatment_plan))
        // Add tracing middleware for request logging; the clinician UI is
        // served from another origin
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
