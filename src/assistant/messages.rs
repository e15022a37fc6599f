use serde::{Deserialize, Serialize};

/// MIME type for realtime PCM input.
pub const AUDIO_PCM_MIME: &str = "audio/pcm;rate=16000";

/// MIME type for camera snapshots.
pub const IMAGE_JPEG_MIME: &str = "image/jpeg";

/// Voice-activity defaults tuned for near-immediate turn boundaries.
pub const START_SENSITIVITY: &str = "high";
pub const END_SENSITIVITY: &str = "high";
pub const PREFIX_PADDING_MS: u64 = 10;
pub const SILENCE_DURATION_MS: u64 = 5;

pub fn open_subject(session_id: &str) -> String {
    format!("assistant.live.open.{session_id}")
}

pub fn input_subject(session_id: &str) -> String {
    format!("assistant.live.input.{session_id}")
}

pub fn events_subject(session_id: &str) -> String {
    format!("assistant.live.events.{session_id}")
}

pub fn close_subject(session_id: &str) -> String {
    format!("assistant.live.close.{session_id}")
}

/// Session-open request sent to the assistant service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantOpenRequest {
    pub session_id: String,
    pub model: String,
    pub response_modalities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    pub start_sensitivity: String,
    pub end_sensitivity: String,
    pub prefix_padding_ms: u64,
    pub silence_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantOpenReply {
    pub ready: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Realtime inputs published to an open session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeInputMessage {
    Audio {
        /// Base64-encoded PCM bytes
        data: String,
        mime_type: String,
    },
    Text {
        text: String,
    },
    Image {
        /// Base64-encoded JPEG bytes
        data: String,
        mime_type: String,
    },
    /// No more audio for this turn; the assistant should reply
    AudioStreamEnd,
}

/// Events received from the assistant service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantEventMessage {
    /// One streamed piece of reply text
    Chunk { text: String },
    /// The assistant finished its reply
    TurnComplete,
    Error { message: String },
}

/// Published when the session is deliberately closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCloseMessage {
    pub session_id: String,
}
