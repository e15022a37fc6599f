use std::sync::{Arc, Mutex, MutexGuard};

use base64::Engine;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::link::AssistantLink;
use super::messages::{
    AssistantEventMessage, RealtimeInputMessage, AUDIO_PCM_MIME, IMAGE_JPEG_MIME,
};
use super::state::{next_state, SessionEvent, SessionState};
use crate::error::{ErrorCallback, ServiceError};

/// One streamed piece of assistant reply text.
///
/// `is_new_turn` is set on the first chunk after the session opened and on
/// the first chunk after each completed turn, so consumers know when to
/// replace the displayed reply instead of appending.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantChunk {
    pub text: String,
    pub is_new_turn: bool,
}

pub type AssistantChunkCallback = Arc<dyn Fn(AssistantChunk) + Send + Sync>;

/// Turn-based conversational session over an [`AssistantLink`].
///
/// At most one underlying connection exists per instance: `start_session`
/// always tears the previous one down completely before connecting again.
pub struct ConversationalSession {
    link: Arc<dyn AssistantLink>,
    state: Arc<Mutex<SessionState>>,
    pump: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    // Serializes start/end so close-then-connect never overlaps.
    lifecycle: tokio::sync::Mutex<()>,
}

impl ConversationalSession {
    pub fn new(link: Arc<dyn AssistantLink>) -> Self {
        Self {
            link,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            pump: tokio::sync::Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Open a fresh session. Any prior session is closed first, swallowing
    /// close errors. Fails only when the new connection cannot be
    /// established; the session is then inactive.
    pub async fn start_session(
        &self,
        on_chunk: AssistantChunkCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<(), ServiceError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.end_session_inner().await;

        self.apply(SessionEvent::ConnectStarted);
        match self.link.open().await {
            Ok(events) => {
                self.apply(SessionEvent::ConnectSucceeded);
                let pump = tokio::spawn(pump_events(
                    events,
                    Arc::clone(&self.link),
                    Arc::clone(&self.state),
                    on_chunk,
                    on_error,
                ));
                *self.pump.lock().await = Some(pump);
                info!("Assistant session active");
                Ok(())
            }
            Err(e) => {
                self.apply(SessionEvent::ConnectFailed);
                Err(e)
            }
        }
    }

    /// Relay one chunk of mono PCM. Silent no-op when no session exists.
    pub async fn send_audio(&self, mono_pcm: &[u8]) {
        if !self.is_active() {
            return;
        }
        let input = RealtimeInputMessage::Audio {
            data: base64::engine::general_purpose::STANDARD.encode(mono_pcm),
            mime_type: AUDIO_PCM_MIME.to_string(),
        };
        if let Err(e) = self.link.send(input).await {
            warn!("Failed to send audio to assistant: {}", e);
        }
    }

    /// Relay a text input. Silent no-op unless fully active, so nothing is
    /// injected into a session that is already winding down.
    pub async fn send_text(&self, text: &str) {
        if !self.can_accept_text_input() {
            return;
        }
        let input = RealtimeInputMessage::Text {
            text: text.to_string(),
        };
        if let Err(e) = self.link.send(input).await {
            warn!("Failed to send text to assistant: {}", e);
        }
    }

    /// Relay a base64 JPEG frame. Silent no-op when no session exists.
    pub async fn send_image(&self, jpeg_base64: &str) {
        if !self.is_active() {
            return;
        }
        let input = RealtimeInputMessage::Image {
            data: jpeg_base64.to_string(),
            mime_type: IMAGE_JPEG_MIME.to_string(),
        };
        if let Err(e) = self.link.send(input).await {
            warn!("Failed to send image to assistant: {}", e);
        }
    }

    /// Signal the end of the caller's turn. The session keeps draining the
    /// assistant's reply and closes once the turn completes. No-op unless
    /// fully active.
    pub async fn finish_turn(&self) {
        {
            let mut state = lock_state(&self.state);
            if !state.accepts_text() {
                return;
            }
            let next = next_state(*state, SessionEvent::FinishTurnRequested);
            debug!("Session state: {:?} -> {:?}", *state, next);
            *state = next;
        }
        if let Err(e) = self.link.send(RealtimeInputMessage::AudioStreamEnd).await {
            warn!("Failed to signal end of turn: {}", e);
        }
    }

    /// Close the session from any state, swallowing close errors.
    pub async fn end_session(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.end_session_inner().await;
    }

    pub fn is_active(&self) -> bool {
        lock_state(&self.state).is_active()
    }

    /// Whether injected text would currently reach the assistant. False
    /// while a close is pending, so late transcripts are not injected into
    /// a session that is already winding down.
    pub fn can_accept_text_input(&self) -> bool {
        lock_state(&self.state).accepts_text()
    }

    async fn end_session_inner(&self) {
        let prev = self.apply(SessionEvent::SessionEnded);
        if matches!(
            prev,
            SessionState::Connecting | SessionState::Active | SessionState::ClosePending
        ) {
            self.link.close().await;
        }
        if let Some(pump) = self.pump.lock().await.take() {
            let _ = pump.await;
        }
    }

    fn apply(&self, event: SessionEvent) -> SessionState {
        let mut state = lock_state(&self.state);
        let prev = *state;
        let next = next_state(prev, event);
        if next != prev {
            debug!("Session state: {:?} -> {:?}", prev, next);
            *state = next;
        }
        prev
    }
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn pump_events(
    mut events: tokio::sync::mpsc::Receiver<AssistantEventMessage>,
    link: Arc<dyn AssistantLink>,
    state: Arc<Mutex<SessionState>>,
    on_chunk: AssistantChunkCallback,
    on_error: Option<ErrorCallback>,
) {
    let mut next_is_new_turn = true;

    while let Some(event) = events.recv().await {
        match event {
            AssistantEventMessage::Chunk { text } => {
                on_chunk(AssistantChunk {
                    text,
                    is_new_turn: next_is_new_turn,
                });
                next_is_new_turn = false;
            }
            AssistantEventMessage::TurnComplete => {
                next_is_new_turn = true;
                let close_now = {
                    let mut guard = lock_state(&state);
                    if matches!(*guard, SessionState::ClosePending) {
                        let next = next_state(*guard, SessionEvent::TurnCompleted);
                        debug!("Session state: {:?} -> {:?}", *guard, next);
                        *guard = next;
                        true
                    } else {
                        false
                    }
                };
                if close_now {
                    debug!("Pending close completed after final turn");
                    link.close().await;
                    break;
                }
            }
            AssistantEventMessage::Error { message } => {
                warn!("Assistant session error: {}", message);
                if let Some(on_error) = &on_error {
                    on_error(ServiceError::connection("assistant", message));
                }
            }
        }
    }

    // The stream ended underneath us or after a deliberate close; either
    // way the session no longer exists.
    {
        let mut guard = lock_state(&state);
        let next = next_state(*guard, SessionEvent::SessionEnded);
        if next != *guard {
            debug!("Session state: {:?} -> {:?}", *guard, next);
            *guard = next;
        }
    }
    debug!("Assistant session pump stopped");
}
