use serde::{Deserialize, Serialize};

/// Which side of the consultation a transcript came from.
///
/// Channel 0 is the local microphone (the clinician), channel 1 is the
/// system/loopback feed (the remote party or device audio).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SpeakerChannel {
    Local,
    Remote,
}

impl SpeakerChannel {
    pub fn index(&self) -> u32 {
        match self {
            SpeakerChannel::Local => 0,
            SpeakerChannel::Remote => 1,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(SpeakerChannel::Local),
            1 => Some(SpeakerChannel::Remote),
            _ => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SpeakerChannel::Remote)
    }
}

impl From<SpeakerChannel> for u8 {
    fn from(channel: SpeakerChannel) -> Self {
        channel.index() as u8
    }
}

impl TryFrom<u8> for SpeakerChannel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SpeakerChannel::from_index(value as u32)
            .ok_or_else(|| format!("invalid speaker channel {value}"))
    }
}

/// One word of a transcript, attributed to its channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptWord {
    pub text: String,
    pub channel: SpeakerChannel,
}

/// A transcription result for one channel.
///
/// Partial events revise freely until the final event for the same span
/// arrives; only final events carry trustworthy start/end times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub channel: SpeakerChannel,
    pub is_final: bool,
    pub words: Vec<TranscriptWord>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

/// Domain-level updates emitted by the transcription channel.
#[derive(Debug, Clone)]
pub enum TranscriberUpdate {
    Transcript(TranscriptEvent),
    /// The speaker stopped; downstream turn handling may finalize.
    UtteranceEnd,
    /// The stream ended, deliberately or not. No further updates follow.
    Closed { reason: Option<String> },
}
