use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
    pub assistant: AssistantConfig,
    pub summarizer: SummarizerConfig,
    pub live: LiveConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_duration_ms: u64,
    /// Capture devices are acquired on session start when true. When false
    /// the service only accepts audio pushed over the control API.
    pub capture: bool,
    pub microphone_device: Option<String>,
    pub loopback_device: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionConfig {
    pub model: String,
    pub language: String,
    pub utterance_end_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    pub model: String,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    /// How long a lone final transcript is held back waiting for its
    /// overlapping result from the other channel.
    pub pairing_debounce_ms: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
