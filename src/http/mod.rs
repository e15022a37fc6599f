//! HTTP API server for external control (clinician UI)
//!
//! This module provides a REST API over the single live session:
//! - POST /live/start, /live/stop - session lifecycle
//! - GET /live/status, /live/transcript, /live/assistant - query state
//! - POST /live/audio, /live/image, /live/text - push inputs
//! - POST /live/turn/finish, /live/mute - turn and mute control
//! - POST /summaries/diagnoses, /summaries/treatment - transcript summaries
//! - GET /health - health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
