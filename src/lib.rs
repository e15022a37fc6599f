pub mod assistant;
pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod summarize;
pub mod transcribe;

pub use assistant::{AssistantChunk, ConversationalSession, SessionState};
pub use audio::{AudioCaptureEngine, AudioFrame, CaptureConfig, StereoMerger};
pub use config::Config;
pub use error::{ErrorCallback, ServiceError};
pub use http::{create_router, AppState};
pub use live::{LiveAudioService, LiveCallbacks, LiveStats, ReconciledTranscript};
pub use summarize::{Diagnosis, DiagnosisSet, SummaryClient};
pub use transcribe::{SpeakerChannel, TranscriptEvent, TranscriptionChannel};
