use chrono::{DateTime, Utc};
use serde::Serialize;

use super::pairing::{PairingDecision, ReconciledTranscript};
use crate::transcribe::SpeakerChannel;

/// Statistics about the live session
#[derive(Debug, Clone, Serialize)]
pub struct LiveStats {
    /// Whether the session is currently active
    pub active: bool,

    /// Whether assistant audio forwarding is muted
    pub muted: bool,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Number of audio chunks forwarded so far
    pub frames_forwarded: usize,

    /// Number of reconciled final transcripts emitted
    pub transcripts_reconciled: usize,
}

/// A reconciled transcript as accumulated for the control API
#[derive(Debug, Clone, Serialize)]
pub struct StoredTranscript {
    /// Transcribed text
    pub text: String,

    /// Which channel the winning event came from
    pub channel: SpeakerChannel,

    /// Why this event won its reconciliation
    pub decision: PairingDecision,

    /// Start of the utterance in stream seconds, if known
    pub start_time: Option<f64>,

    /// End of the utterance in stream seconds, if known
    pub end_time: Option<f64>,

    /// When the transcript was received
    pub received_at: DateTime<Utc>,
}

impl StoredTranscript {
    pub fn from_reconciled(reconciled: &ReconciledTranscript) -> Self {
        Self {
            text: reconciled.event.text.clone(),
            channel: reconciled.event.channel,
            decision: reconciled.decision,
            start_time: reconciled.event.start_time,
            end_time: reconciled.event.end_time,
            received_at: Utc::now(),
        }
    }
}
