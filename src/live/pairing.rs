// Cross-channel reconciliation of final transcripts.
//
// With multichannel transcription, overlapping speech often produces two
// final events for the same utterance, one per channel, arriving within a
// short window of each other. The buffer holds the first final event; the
// caller arms a debounce timer alongside. A second event within the window
// resolves the pair immediately; timer expiry releases a lone event.

use serde::Serialize;

use crate::transcribe::TranscriptEvent;

/// Why a reconciled transcript was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingDecision {
    /// No overlapping event arrived inside the window
    Solo,
    /// A pair resolved and the remote (channel 1) event won
    RemotePreferred,
    /// A pair resolved and the earlier event won
    FirstArrived,
}

/// The winning transcript of a reconciliation, with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledTranscript {
    pub event: TranscriptEvent,
    pub decision: PairingDecision,
}

/// Outcome of offering a final event to the buffer.
#[derive(Debug)]
pub enum Offer {
    /// Event held; the caller arms the debounce timer
    Buffered,
    /// A pair resolved; the caller cancels the timer and emits
    Resolved(ReconciledTranscript),
}

/// Single-slot holding area for the first event of a potential pair.
///
/// Invariant: the slot is occupied exactly while the caller's debounce
/// timer is armed.
#[derive(Default)]
pub struct PairingBuffer {
    slot: Option<TranscriptEvent>,
}

impl PairingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.slot.is_some()
    }

    /// Offer a final event. Exactly one transcript is emitted per
    /// buffered-or-paired group; the loser of a pair is discarded.
    pub fn offer(&mut self, event: TranscriptEvent) -> Offer {
        match self.slot.take() {
            None => {
                self.slot = Some(event);
                Offer::Buffered
            }
            Some(buffered) => {
                // The remote channel wins a mixed pair; otherwise first in.
                let (winner, decision) =
                    if event.channel.is_remote() && !buffered.channel.is_remote() {
                        (event, PairingDecision::RemotePreferred)
                    } else {
                        (buffered, PairingDecision::FirstArrived)
                    };
                Offer::Resolved(ReconciledTranscript {
                    event: winner,
                    decision,
                })
            }
        }
    }

    /// Release the held event after the debounce window elapsed.
    pub fn take_expired(&mut self) -> Option<ReconciledTranscript> {
        self.slot.take().map(|event| ReconciledTranscript {
            event,
            decision: PairingDecision::Solo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::{SpeakerChannel, TranscriptEvent};

    fn final_event(channel: SpeakerChannel, text: &str) -> TranscriptEvent {
        TranscriptEvent {
            text: text.to_string(),
            channel,
            is_final: true,
            words: Vec::new(),
            start_time: Some(0.0),
            end_time: Some(1.0),
        }
    }

    #[test]
    fn test_first_event_is_buffered() {
        let mut buffer = PairingBuffer::new();
        assert!(!buffer.is_armed());

        let offer = buffer.offer(final_event(SpeakerChannel::Local, "chest pain"));
        assert!(matches!(offer, Offer::Buffered));
        assert!(buffer.is_armed());
    }

    #[test]
    fn test_remote_wins_over_buffered_local() {
        let mut buffer = PairingBuffer::new();
        buffer.offer(final_event(SpeakerChannel::Local, "chest pain"));

        match buffer.offer(final_event(SpeakerChannel::Remote, "chest pain")) {
            Offer::Resolved(winner) => {
                assert_eq!(winner.event.channel, SpeakerChannel::Remote);
                assert_eq!(winner.decision, PairingDecision::RemotePreferred);
            }
            other => panic!("unexpected offer outcome: {other:?}"),
        }
        assert!(!buffer.is_armed());
    }

    #[test]
    fn test_buffered_remote_beats_late_local() {
        let mut buffer = PairingBuffer::new();
        buffer.offer(final_event(SpeakerChannel::Remote, "device speech"));

        match buffer.offer(final_event(SpeakerChannel::Local, "device speech")) {
            Offer::Resolved(winner) => {
                assert_eq!(winner.event.channel, SpeakerChannel::Remote);
                assert_eq!(winner.decision, PairingDecision::FirstArrived);
            }
            other => panic!("unexpected offer outcome: {other:?}"),
        }
    }

    #[test]
    fn test_same_channel_pair_keeps_first() {
        let mut buffer = PairingBuffer::new();
        buffer.offer(final_event(SpeakerChannel::Local, "first"));

        match buffer.offer(final_event(SpeakerChannel::Local, "second")) {
            Offer::Resolved(winner) => {
                assert_eq!(winner.event.text, "first");
                assert_eq!(winner.decision, PairingDecision::FirstArrived);
            }
            other => panic!("unexpected offer outcome: {other:?}"),
        }
    }

    #[test]
    fn test_expiry_releases_solo_event() {
        let mut buffer = PairingBuffer::new();
        buffer.offer(final_event(SpeakerChannel::Local, "headache"));

        let solo = buffer.take_expired().unwrap();
        assert_eq!(solo.event.text, "headache");
        assert_eq!(solo.decision, PairingDecision::Solo);
        assert!(!buffer.is_armed());
        assert!(buffer.take_expired().is_none());
    }
}
