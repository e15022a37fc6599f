use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::{SpeakerChannel, TranscriberUpdate, TranscriptEvent, TranscriptWord};
use super::link::TranscriberLink;
use super::messages::TranscriberEventMessage;
use crate::error::ServiceError;

/// Capacity of the domain update channel consumed by the orchestrator.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Long-lived multichannel transcription stream.
///
/// Wraps a [`TranscriberLink`] with open-state tracking: frames sent while
/// the stream is not open are dropped with a warning, and `finish` is
/// idempotent. Connection failures before readiness reject `start`; after
/// readiness they arrive as a `Closed` update on the stream.
pub struct TranscriptionChannel {
    link: Arc<dyn TranscriberLink>,
    open: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl TranscriptionChannel {
    pub fn new(link: Arc<dyn TranscriberLink>) -> Self {
        Self {
            link,
            open: Arc::new(AtomicBool::new(false)),
            pump: Mutex::new(None),
        }
    }

    /// Open the stream and return the update receiver.
    pub async fn start(&self) -> Result<mpsc::Receiver<TranscriberUpdate>, ServiceError> {
        let wire_rx = self.link.open().await?;
        self.open.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let open = Arc::clone(&self.open);
        let pump = tokio::spawn(pump_updates(wire_rx, tx, open));
        *self.pump.lock().await = Some(pump);

        info!("Transcription channel ready");
        Ok(rx)
    }

    /// Forward one chunk of stereo PCM. Dropped with a warning when the
    /// stream is not open; callers tolerate lost frames around reconnects.
    pub async fn send_frame(&self, pcm: &[u8]) {
        if !self.open.load(Ordering::SeqCst) {
            warn!("Transcription stream not open; dropping audio frame");
            return;
        }
        if let Err(e) = self.link.send_audio(pcm).await {
            warn!("Failed to forward audio to transcription: {}", e);
        }
    }

    /// Signal end of audio and close the stream. Safe to call repeatedly.
    pub async fn finish(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        self.link.close().await;
        if let Some(pump) = self.pump.lock().await.take() {
            let _ = pump.await;
        }
    }
}

/// Translate wire events into domain updates, tracking the open flag.
async fn pump_updates(
    mut wire_rx: mpsc::Receiver<TranscriberEventMessage>,
    tx: mpsc::Sender<TranscriberUpdate>,
    open: Arc<AtomicBool>,
) {
    while let Some(message) = wire_rx.recv().await {
        let update = match message {
            TranscriberEventMessage::Transcript {
                channel_index,
                transcript,
                words,
                is_final,
                start,
                duration,
            } => {
                match event_from_wire(channel_index, transcript, words, is_final, start, duration)
                {
                    Some(event) => TranscriberUpdate::Transcript(event),
                    None => continue,
                }
            }
            TranscriberEventMessage::UtteranceEnd { .. } => TranscriberUpdate::UtteranceEnd,
            TranscriberEventMessage::Error { message } => {
                warn!("Transcription service reported an error: {}", message);
                open.store(false, Ordering::SeqCst);
                let _ = tx
                    .send(TranscriberUpdate::Closed {
                        reason: Some(message),
                    })
                    .await;
                return;
            }
        };

        if tx.send(update).await.is_err() {
            return;
        }
    }

    // Wire stream ended: deliberate close or lost connection.
    open.store(false, Ordering::SeqCst);
    let _ = tx.send(TranscriberUpdate::Closed { reason: None }).await;
    debug!("Transcription update pump stopped");
}

fn event_from_wire(
    channel_index: u32,
    transcript: String,
    words: Vec<super::messages::WireWord>,
    is_final: bool,
    start: Option<f64>,
    duration: Option<f64>,
) -> Option<TranscriptEvent> {
    let channel = match SpeakerChannel::from_index(channel_index) {
        Some(channel) => channel,
        None => {
            debug!("Dropping transcript with unknown channel {}", channel_index);
            return None;
        }
    };

    if transcript.trim().is_empty() {
        return None;
    }

    let words = words
        .into_iter()
        .map(|w| TranscriptWord {
            text: w.word,
            channel,
        })
        .collect();

    let end_time = match (start, duration) {
        (Some(s), Some(d)) => Some(s + d),
        _ => None,
    };

    Some(TranscriptEvent {
        text: transcript,
        channel,
        is_final,
        words,
        start_time: start,
        end_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::messages::WireWord;

    fn transcript_message(channel_index: u32, text: &str, is_final: bool) -> TranscriberEventMessage {
        TranscriberEventMessage::Transcript {
            channel_index,
            transcript: text.to_string(),
            words: vec![WireWord {
                word: text.to_string(),
                start: Some(0.0),
                end: Some(0.4),
            }],
            is_final,
            start: Some(0.0),
            duration: Some(0.4),
        }
    }

    #[tokio::test]
    async fn test_pump_translates_transcripts() {
        let (wire_tx, wire_rx) = mpsc::channel(8);
        let (tx, mut rx) = mpsc::channel(8);
        let open = Arc::new(AtomicBool::new(true));
        tokio::spawn(pump_updates(wire_rx, tx, Arc::clone(&open)));

        wire_tx
            .send(transcript_message(1, "chest pain", true))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            TranscriberUpdate::Transcript(event) => {
                assert_eq!(event.text, "chest pain");
                assert_eq!(event.channel, SpeakerChannel::Remote);
                assert!(event.is_final);
                assert_eq!(event.end_time, Some(0.4));
                assert_eq!(event.words[0].channel, SpeakerChannel::Remote);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pump_drops_unknown_channels_and_empty_text() {
        let (wire_tx, wire_rx) = mpsc::channel(8);
        let (tx, mut rx) = mpsc::channel(8);
        let open = Arc::new(AtomicBool::new(true));
        tokio::spawn(pump_updates(wire_rx, tx, Arc::clone(&open)));

        wire_tx
            .send(transcript_message(7, "out of range", true))
            .await
            .unwrap();
        wire_tx.send(transcript_message(0, "   ", true)).await.unwrap();
        wire_tx.send(transcript_message(0, "kept", true)).await.unwrap();

        match rx.recv().await.unwrap() {
            TranscriberUpdate::Transcript(event) => assert_eq!(event.text, "kept"),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_service_error_closes_the_stream() {
        let (wire_tx, wire_rx) = mpsc::channel(8);
        let (tx, mut rx) = mpsc::channel(8);
        let open = Arc::new(AtomicBool::new(true));
        tokio::spawn(pump_updates(wire_rx, tx, Arc::clone(&open)));

        wire_tx
            .send(TranscriberEventMessage::Error {
                message: "upstream hiccup".to_string(),
            })
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            TranscriberUpdate::Closed { reason } => {
                assert_eq!(reason.as_deref(), Some("upstream hiccup"));
            }
            other => panic!("unexpected update: {other:?}"),
        }
        assert!(!open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_wire_stream_end_yields_closed() {
        let (wire_tx, wire_rx) = mpsc::channel::<TranscriberEventMessage>(8);
        let (tx, mut rx) = mpsc::channel(8);
        let open = Arc::new(AtomicBool::new(true));
        tokio::spawn(pump_updates(wire_rx, tx, Arc::clone(&open)));

        drop(wire_tx);

        match rx.recv().await.unwrap() {
            TranscriberUpdate::Closed { reason } => assert!(reason.is_none()),
            other => panic!("unexpected update: {other:?}"),
        }
        assert!(!open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_utterance_end_passes_through() {
        let (wire_tx, wire_rx) = mpsc::channel(8);
        let (tx, mut rx) = mpsc::channel(8);
        let open = Arc::new(AtomicBool::new(true));
        tokio::spawn(pump_updates(wire_rx, tx, open));

        wire_tx
            .send(TranscriberEventMessage::UtteranceEnd {
                last_word_end: Some(2.5),
            })
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            TranscriberUpdate::UtteranceEnd
        ));
    }
}
