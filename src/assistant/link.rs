use std::sync::{Arc, Mutex};

use futures::stream::StreamExt;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use super::messages::{
    self, AssistantEventMessage, AssistantOpenReply, AssistantOpenRequest, RealtimeInputMessage,
    SessionCloseMessage, END_SENSITIVITY, PREFIX_PADDING_MS, SILENCE_DURATION_MS,
    START_SENSITIVITY,
};
use crate::config::AssistantConfig;
use crate::error::ServiceError;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Transport seam for the conversational assistant.
///
/// One link may be opened, closed and opened again; the session wrapper
/// serializes those calls.
#[async_trait::async_trait]
pub trait AssistantLink: Send + Sync {
    /// Open a session. Resolves once the service acknowledges readiness.
    async fn open(&self) -> Result<mpsc::Receiver<AssistantEventMessage>, ServiceError>;

    /// Publish one realtime input to the open session.
    async fn send(&self, input: RealtimeInputMessage) -> Result<(), ServiceError>;

    /// Close the session and release the event subscription. Best-effort;
    /// never fails.
    async fn close(&self);
}

/// NATS-backed assistant link.
pub struct NatsAssistantLink {
    client: async_nats::Client,
    session_id: String,
    open_request: AssistantOpenRequest,
    // Fresh per open; closing notifies the matching pump only.
    close_notify: Mutex<Option<Arc<Notify>>>,
}

impl NatsAssistantLink {
    pub fn new(client: async_nats::Client, session_id: String, config: &AssistantConfig) -> Self {
        let open_request = AssistantOpenRequest {
            session_id: session_id.clone(),
            model: config.model.clone(),
            response_modalities: vec!["text".to_string()],
            system_instruction: config.system_instruction.clone(),
            start_sensitivity: START_SENSITIVITY.to_string(),
            end_sensitivity: END_SENSITIVITY.to_string(),
            prefix_padding_ms: PREFIX_PADDING_MS,
            silence_duration_ms: SILENCE_DURATION_MS,
        };

        Self {
            client,
            session_id,
            open_request,
            close_notify: Mutex::new(None),
        }
    }

    fn swap_notify(&self, next: Option<Arc<Notify>>) -> Option<Arc<Notify>> {
        match self.close_notify.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }
}

#[async_trait::async_trait]
impl AssistantLink for NatsAssistantLink {
    async fn open(&self) -> Result<mpsc::Receiver<AssistantEventMessage>, ServiceError> {
        let payload = serde_json::to_vec(&self.open_request)
            .map_err(|e| ServiceError::connection("assistant", e.to_string()))?;

        info!("Opening assistant session: {}", self.session_id);

        let reply = self
            .client
            .request(messages::open_subject(&self.session_id), payload.into())
            .await
            .map_err(|e| ServiceError::connection("assistant", e.to_string()))?;

        let reply: AssistantOpenReply = serde_json::from_slice(&reply.payload)
            .map_err(|e| ServiceError::connection("assistant", format!("bad open reply: {e}")))?;
        if !reply.ready {
            return Err(ServiceError::connection(
                "assistant",
                reply
                    .message
                    .unwrap_or_else(|| "service refused the session".to_string()),
            ));
        }

        let mut subscriber = self
            .client
            .subscribe(messages::events_subject(&self.session_id))
            .await
            .map_err(|e| ServiceError::connection("assistant", e.to_string()))?;

        let notify = Arc::new(Notify::new());
        // A leftover pump from an earlier open ends now.
        if let Some(stale) = self.swap_notify(Some(Arc::clone(&notify))) {
            stale.notify_one();
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = subscriber.next() => match msg {
                        Some(msg) => {
                            match serde_json::from_slice::<AssistantEventMessage>(&msg.payload) {
                                Ok(event) => {
                                    if tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Ignoring malformed assistant event: {}", e),
                            }
                        }
                        None => break,
                    },
                    _ = notify.notified() => break,
                }
            }
            debug!("Assistant event pump stopped");
        });

        Ok(rx)
    }

    async fn send(&self, input: RealtimeInputMessage) -> Result<(), ServiceError> {
        let payload = serde_json::to_vec(&input)
            .map_err(|e| ServiceError::connection("assistant", e.to_string()))?;

        self.client
            .publish(messages::input_subject(&self.session_id), payload.into())
            .await
            .map_err(|e| ServiceError::connection("assistant", e.to_string()))
    }

    async fn close(&self) {
        let message = SessionCloseMessage {
            session_id: self.session_id.clone(),
        };
        match serde_json::to_vec(&message) {
            Ok(payload) => {
                if let Err(e) = self
                    .client
                    .publish(messages::close_subject(&self.session_id), payload.into())
                    .await
                {
                    warn!("Failed to publish session close: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode session close: {}", e),
        }

        if let Some(notify) = self.swap_notify(None) {
            notify.notify_one();
        }
        info!("Assistant session closed: {}", self.session_id);
    }
}
