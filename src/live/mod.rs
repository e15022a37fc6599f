//! Live consultation orchestration.
//!
//! Binds capture, transcription and the conversational assistant into one
//! session: routes merged stereo frames, reconciles overlapping final
//! transcripts across channels, and drives assistant turn boundaries.

pub mod pairing;
pub mod service;
pub mod stats;

pub use pairing::{Offer, PairingBuffer, PairingDecision, ReconciledTranscript};
pub use service::{LiveAudioService, LiveCallbacks, TranscriptCallback};
pub use stats::{LiveStats, StoredTranscript};
