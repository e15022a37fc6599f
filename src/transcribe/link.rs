use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::Engine;
use futures::stream::StreamExt;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use super::messages::{
    self, AudioChunkMessage, TranscriberEventMessage, TranscriberOpenReply, TranscriberOpenRequest,
};
use crate::config::TranscriptionConfig;
use crate::error::ServiceError;

/// Capacity of the wire event channel between the NATS pump and the
/// transcription channel wrapper.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Transport seam for the transcription service.
///
/// The production implementation speaks JSON over NATS; tests substitute
/// scripted links.
#[async_trait::async_trait]
pub trait TranscriberLink: Send + Sync {
    /// Open the stream. Resolves once the service acknowledges readiness;
    /// any failure before that rejects the whole call.
    async fn open(&self) -> Result<mpsc::Receiver<TranscriberEventMessage>, ServiceError>;

    /// Publish one chunk of stereo PCM.
    async fn send_audio(&self, pcm: &[u8]) -> Result<(), ServiceError>;

    /// Publish the end-of-audio marker and release the event subscription.
    /// Best-effort; never fails.
    async fn close(&self);
}

/// NATS-backed transcription link.
pub struct NatsTranscriberLink {
    client: async_nats::Client,
    session_id: String,
    open_request: TranscriberOpenRequest,
    sequence: AtomicU64,
    closed: Arc<Notify>,
}

impl NatsTranscriberLink {
    pub fn new(
        client: async_nats::Client,
        session_id: String,
        config: &TranscriptionConfig,
        sample_rate: u32,
    ) -> Self {
        let open_request = TranscriberOpenRequest {
            session_id: session_id.clone(),
            model: config.model.clone(),
            language: config.language.clone(),
            encoding: "linear16".to_string(),
            sample_rate,
            channels: 2,
            multichannel: true,
            interim_results: true,
            smart_format: true,
            utterance_end_ms: config.utterance_end_ms,
        };

        Self {
            client,
            session_id,
            open_request,
            sequence: AtomicU64::new(0),
            closed: Arc::new(Notify::new()),
        }
    }
}

#[async_trait::async_trait]
impl TranscriberLink for NatsTranscriberLink {
    async fn open(&self) -> Result<mpsc::Receiver<TranscriberEventMessage>, ServiceError> {
        let payload = serde_json::to_vec(&self.open_request)
            .map_err(|e| ServiceError::connection("transcription", e.to_string()))?;

        info!("Opening transcription stream: {}", self.session_id);

        let reply = self
            .client
            .request(messages::open_subject(&self.session_id), payload.into())
            .await
            .map_err(|e| ServiceError::connection("transcription", e.to_string()))?;

        let reply: TranscriberOpenReply = serde_json::from_slice(&reply.payload)
            .map_err(|e| ServiceError::connection("transcription", format!("bad open reply: {e}")))?;
        if !reply.ready {
            return Err(ServiceError::connection(
                "transcription",
                reply
                    .message
                    .unwrap_or_else(|| "service refused the stream".to_string()),
            ));
        }

        let mut subscriber = self
            .client
            .subscribe(messages::events_subject(&self.session_id))
            .await
            .map_err(|e| ServiceError::connection("transcription", e.to_string()))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let closed = Arc::clone(&self.closed);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = subscriber.next() => match msg {
                        Some(msg) => {
                            match serde_json::from_slice::<TranscriberEventMessage>(&msg.payload) {
                                Ok(event) => {
                                    if tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Ignoring malformed transcriber event: {}", e),
                            }
                        }
                        None => break,
                    },
                    _ = closed.notified() => break,
                }
            }
            debug!("Transcriber event pump stopped");
        });

        Ok(rx)
    }

    async fn send_audio(&self, pcm: &[u8]) -> Result<(), ServiceError> {
        let message = AudioChunkMessage {
            session_id: self.session_id.clone(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm),
            final_chunk: false,
        };
        let payload = serde_json::to_vec(&message)
            .map_err(|e| ServiceError::connection("transcription", e.to_string()))?;

        self.client
            .publish(messages::audio_subject(&self.session_id), payload.into())
            .await
            .map_err(|e| ServiceError::connection("transcription", e.to_string()))
    }

    async fn close(&self) {
        let message = AudioChunkMessage {
            session_id: self.session_id.clone(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            pcm: String::new(),
            final_chunk: true,
        };
        match serde_json::to_vec(&message) {
            Ok(payload) => {
                if let Err(e) = self
                    .client
                    .publish(messages::audio_subject(&self.session_id), payload.into())
                    .await
                {
                    warn!("Failed to publish final audio marker: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode final audio marker: {}", e),
        }

        self.closed.notify_one();
        info!("Transcription stream closed: {}", self.session_id);
    }
}
