use super::state::{read_lock, write_lock, AppState};
use crate::assistant::{AssistantChunk, AssistantChunkCallback};
use crate::error::{ErrorCallback, ServiceError};
use crate::live::{LiveCallbacks, LiveStats, ReconciledTranscript, StoredTranscript, TranscriptCallback};
use crate::summarize::SummaryChunkCallback;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartLiveResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopLiveResponse {
    pub status: String,
    pub message: String,
    pub stats: LiveStats,
}

#[derive(Debug, Serialize)]
pub struct LiveStatusResponse {
    pub stats: LiveStats,
    pub last_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioChunkRequest {
    /// Interleaved stereo s16le PCM
    pub pcm_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageChunkRequest {
    pub jpeg_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct TextInputRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct MuteResponse {
    pub muted: bool,
}

#[derive(Debug, Deserialize)]
pub struct DiagnosesRequest {
    /// Explicit transcript; defaults to the accumulated live transcript
    pub transcript: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TreatmentRequest {
    pub diagnosis: String,

    /// Explicit transcript; defaults to the one last summarized
    pub transcript: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TreatmentResponse {
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /live/start
/// Start the live session and begin accumulating transcripts
pub async fn start_live(State(state): State<AppState>) -> impl IntoResponse {
    if state.live.is_active() {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "A live session is already active".to_string(),
            }),
        )
            .into_response();
    }

    info!("Starting live session");

    // Fresh accumulation state per session
    write_lock(&state.transcript).clear();
    write_lock(&state.assistant_turns).clear();
    write_lock(&state.prev_diagnoses).clear();
    *write_lock(&state.last_error) = None;

    let callbacks = build_callbacks(&state);
    if let Err(e) = state.live.start(callbacks).await {
        error!("Failed to start live session: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to start live session: {}", e),
            }),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(StartLiveResponse {
            status: "active".to_string(),
            message: "Live session started".to_string(),
        }),
    )
        .into_response()
}

/// POST /live/stop
/// Stop the live session. Safe to call when none is active.
pub async fn stop_live(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stopping live session");

    state.live.stop().await;
    write_lock(&state.prev_diagnoses).clear();

    (
        StatusCode::OK,
        Json(StopLiveResponse {
            status: "stopped".to_string(),
            message: "Live session stopped".to_string(),
            stats: state.live.stats(),
        }),
    )
        .into_response()
}

/// GET /live/status
/// Current session statistics and the most recent out-of-band error
pub async fn live_status(State(state): State<AppState>) -> impl IntoResponse {
    let last_error = read_lock(&state.last_error).clone();

    (
        StatusCode::OK,
        Json(LiveStatusResponse {
            stats: state.live.stats(),
            last_error,
        }),
    )
        .into_response()
}

/// GET /live/transcript
/// Reconciled transcripts accumulated since the session started
pub async fn live_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let transcript: Vec<StoredTranscript> = read_lock(&state.transcript).clone();
    (StatusCode::OK, Json(transcript)).into_response()
}

/// GET /live/assistant
/// Assistant reply text, one entry per turn
pub async fn live_assistant(State(state): State<AppState>) -> impl IntoResponse {
    let turns: Vec<String> = read_lock(&state.assistant_turns).clone();
    (StatusCode::OK, Json(turns)).into_response()
}

/// POST /live/audio
/// Push one interleaved stereo PCM chunk into the live session
pub async fn push_audio(
    State(state): State<AppState>,
    Json(req): Json<AudioChunkRequest>,
) -> impl IntoResponse {
    let pcm = match base64::engine::general_purpose::STANDARD.decode(&req.pcm_base64) {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Invalid base64 audio: {}", e),
                }),
            )
                .into_response();
        }
    };

    state.live.send_audio_chunk(&pcm).await;
    StatusCode::NO_CONTENT.into_response()
}

/// POST /live/image
/// Push one base64 JPEG frame into the live session
pub async fn push_image(
    State(state): State<AppState>,
    Json(req): Json<ImageChunkRequest>,
) -> impl IntoResponse {
    state.live.send_image_chunk(&req.jpeg_base64).await;
    StatusCode::NO_CONTENT.into_response()
}

/// POST /live/text
/// Send a text input to the assistant
pub async fn push_text(
    State(state): State<AppState>,
    Json(req): Json<TextInputRequest>,
) -> impl IntoResponse {
    state.live.send_text_input(&req.text).await;
    StatusCode::NO_CONTENT.into_response()
}

/// POST /live/turn/finish
/// End the caller's current assistant turn
pub async fn finish_turn(State(state): State<AppState>) -> impl IntoResponse {
    state.live.finish_turn().await;
    StatusCode::NO_CONTENT.into_response()
}

/// POST /live/mute
/// Mute or unmute assistant audio forwarding
pub async fn set_mute(
    State(state): State<AppState>,
    Json(req): Json<MuteRequest>,
) -> impl IntoResponse {
    state.live.set_audio_muted(req.muted);
    (
        StatusCode::OK,
        Json(MuteResponse {
            muted: state.live.is_muted(),
        }),
    )
        .into_response()
}

/// POST /summaries/diagnoses
/// Refresh the differential from the accumulated (or supplied) transcript
pub async fn refresh_diagnoses(
    State(state): State<AppState>,
    Json(req): Json<DiagnosesRequest>,
) -> impl IntoResponse {
    let transcript = match req.transcript {
        Some(t) => t,
        None => accumulated_transcript(&state),
    };
    *write_lock(&state.last_transcript) = transcript.clone();

    let prev = read_lock(&state.prev_diagnoses).clone();
    let on_chunk: SummaryChunkCallback = Arc::new(|chunk| debug!("Diagnosis chunk: {}", chunk));

    match state
        .summarizer
        .stream_diagnoses(&prev, &transcript, on_chunk)
        .await
    {
        Ok(set) => {
            *write_lock(&state.prev_diagnoses) = set.likely_diagnoses.clone();
            (StatusCode::OK, Json(set)).into_response()
        }
        Err(e) => {
            error!("Diagnosis refresh failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("Diagnosis refresh failed: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /summaries/treatment
/// Stream a treatment plan for one chosen diagnosis
pub async fn treatment_plan(
    State(state): State<AppState>,
    Json(req): Json<TreatmentRequest>,
) -> impl IntoResponse {
    let transcript = match req.transcript {
        Some(t) => t,
        None => {
            let last = read_lock(&state.last_transcript).clone();
            if last.is_empty() {
                accumulated_transcript(&state)
            } else {
                last
            }
        }
    };

    let on_chunk: SummaryChunkCallback = Arc::new(|chunk| debug!("Treatment chunk: {}", chunk));

    match state
        .summarizer
        .stream_treatment_plan(&req.diagnosis, &transcript, on_chunk)
        .await
    {
        Ok(plan) => (StatusCode::OK, Json(TreatmentResponse { plan })).into_response(),
        Err(e) => {
            error!("Treatment plan failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("Treatment plan failed: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============================================================================
// Helpers
// ============================================================================

/// Wire the live session's callbacks into the shared accumulation state.
fn build_callbacks(state: &AppState) -> LiveCallbacks {
    let transcript = Arc::clone(&state.transcript);
    let on_transcript: TranscriptCallback = Arc::new(move |reconciled: ReconciledTranscript| {
        write_lock(&transcript).push(StoredTranscript::from_reconciled(&reconciled));
    });

    let turns = Arc::clone(&state.assistant_turns);
    let on_assistant_chunk: AssistantChunkCallback = Arc::new(move |chunk: AssistantChunk| {
        let mut turns = write_lock(&turns);
        if chunk.is_new_turn || turns.is_empty() {
            turns.push(chunk.text);
        } else if let Some(last) = turns.last_mut() {
            last.push_str(&chunk.text);
        }
    });

    let last_error = Arc::clone(&state.last_error);
    let on_error: ErrorCallback = Arc::new(move |err: ServiceError| {
        error!("Live session error: {}", err);
        *write_lock(&last_error) = Some(err.to_string());
    });

    LiveCallbacks {
        on_transcript: Some(on_transcript),
        on_assistant_chunk: Some(on_assistant_chunk),
        on_error: Some(on_error),
    }
}

fn accumulated_transcript(state: &AppState) -> String {
    read_lock(&state.transcript)
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
