use serde::{Deserialize, Serialize};

/// Subject for the open handshake (request/reply).
pub fn open_subject(session_id: &str) -> String {
    format!("stt.live.open.{session_id}")
}

/// Subject audio chunks are published to.
pub fn audio_subject(session_id: &str) -> String {
    format!("stt.live.audio.{session_id}")
}

/// Subject transcription events arrive on.
pub fn events_subject(session_id: &str) -> String {
    format!("stt.live.events.{session_id}")
}

/// Stream-open request sent to the transcription service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberOpenRequest {
    pub session_id: String,
    pub model: String,
    pub language: String,
    /// Always "linear16": little-endian signed 16-bit PCM
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Transcribe each channel independently
    pub multichannel: bool,
    pub interim_results: bool,
    pub smart_format: bool,
    pub utterance_end_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberOpenReply {
    pub ready: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Audio chunk published to the transcription service.
///
/// An empty chunk with `final` set closes the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunkMessage {
    pub session_id: String,
    pub sequence: u64,
    /// Base64-encoded PCM bytes
    pub pcm: String,
    #[serde(rename = "final")]
    pub final_chunk: bool,
}

/// Events received from the transcription service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriberEventMessage {
    Transcript {
        channel_index: u32,
        transcript: String,
        #[serde(default)]
        words: Vec<WireWord>,
        is_final: bool,
        #[serde(default)]
        start: Option<f64>,
        #[serde(default)]
        duration: Option<f64>,
    },
    UtteranceEnd {
        #[serde(default)]
        last_word_end: Option<f64>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireWord {
    pub word: String,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
}
