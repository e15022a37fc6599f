use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::pairing::{Offer, PairingBuffer, ReconciledTranscript};
use super::stats::LiveStats;
use crate::assistant::{AssistantChunkCallback, ConversationalSession};
use crate::audio::{extract_left_channel, AudioCaptureEngine, AudioFrame};
use crate::config::LiveConfig;
use crate::error::{ErrorCallback, ServiceError};
use crate::transcribe::{TranscriberUpdate, TranscriptEvent, TranscriptionChannel};

pub type TranscriptCallback = Arc<dyn Fn(ReconciledTranscript) + Send + Sync>;

/// Consumer-facing event hooks for one live session.
#[derive(Clone, Default)]
pub struct LiveCallbacks {
    /// Reconciled final transcripts
    pub on_transcript: Option<TranscriptCallback>,
    /// Streamed assistant reply text
    pub on_assistant_chunk: Option<AssistantChunkCallback>,
    /// Mid-stream failures after startup succeeded
    pub on_error: Option<ErrorCallback>,
}

/// Orchestrates one live consultation.
///
/// Composes the capture engine, the transcription channel and the
/// conversational session: stereo frames go to transcription whole, their
/// left channel goes to the assistant unless muted, final transcripts are
/// reconciled across channels, and utterance boundaries drive the
/// assistant's turns.
pub struct LiveAudioService {
    transcription: Arc<TranscriptionChannel>,
    session: Arc<ConversationalSession>,
    capture: Mutex<Option<AudioCaptureEngine>>,
    active: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    debounce: Duration,
    created_at: chrono::DateTime<Utc>,
    frames_forwarded: Arc<AtomicUsize>,
    transcripts_reconciled: Arc<AtomicUsize>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    capture_task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveAudioService {
    pub fn new(
        transcription: TranscriptionChannel,
        session: ConversationalSession,
        config: &LiveConfig,
    ) -> Self {
        Self {
            transcription: Arc::new(transcription),
            session: Arc::new(session),
            capture: Mutex::new(None),
            active: Arc::new(AtomicBool::new(false)),
            muted: Arc::new(AtomicBool::new(false)),
            debounce: Duration::from_millis(config.pairing_debounce_ms),
            created_at: Utc::now(),
            frames_forwarded: Arc::new(AtomicUsize::new(0)),
            transcripts_reconciled: Arc::new(AtomicUsize::new(0)),
            event_loop: Mutex::new(None),
            capture_task: Mutex::new(None),
        }
    }

    /// Attach a capture engine; `start` will then acquire the devices and
    /// pump merged frames through the service itself.
    pub fn with_capture(self, engine: AudioCaptureEngine) -> Self {
        Self {
            capture: Mutex::new(Some(engine)),
            ..self
        }
    }

    /// Start the live session: acquire capture (when attached), then
    /// connect transcription and assistant concurrently. Either failure
    /// rolls everything back and leaves the service inactive. A second
    /// call while active warns and returns.
    pub async fn start(&self, callbacks: LiveCallbacks) -> Result<(), ServiceError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Live session already active");
            return Ok(());
        }

        info!("Starting live session");

        let frames = {
            let mut capture = self.capture.lock().await;
            match capture.as_mut() {
                Some(engine) => match engine.start().await {
                    Ok(rx) => Some(rx),
                    Err(e) => {
                        self.active.store(false, Ordering::SeqCst);
                        return Err(e);
                    }
                },
                None => None,
            }
        };

        let on_chunk: AssistantChunkCallback = match &callbacks.on_assistant_chunk {
            Some(cb) => Arc::clone(cb),
            None => Arc::new(|_| {}),
        };

        let connected = tokio::try_join!(
            self.session
                .start_session(on_chunk, callbacks.on_error.clone()),
            self.transcription.start(),
        );

        let updates = match connected {
            Ok(((), updates)) => updates,
            Err(e) => {
                warn!("Live session startup failed: {}", e);
                self.release_everything().await;
                self.active.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        // A stop() racing this start wins: release what we just opened.
        if !self.active.load(Ordering::SeqCst) {
            warn!("Live session stopped during startup; releasing connections");
            self.release_everything().await;
            return Ok(());
        }

        let event_loop = tokio::spawn(run_event_loop(
            updates,
            Arc::clone(&self.session),
            callbacks.on_transcript.clone(),
            callbacks.on_error.clone(),
            self.debounce,
            Arc::clone(&self.transcripts_reconciled),
        ));
        *self.event_loop.lock().await = Some(event_loop);

        if let Some(frames) = frames {
            let task = tokio::spawn(forward_frames(
                frames,
                Arc::clone(&self.transcription),
                Arc::clone(&self.session),
                Arc::clone(&self.active),
                Arc::clone(&self.muted),
                Arc::clone(&self.frames_forwarded),
            ));
            *self.capture_task.lock().await = Some(task);
        }

        info!("Live session started");
        Ok(())
    }

    /// Stop the session and release everything. Idempotent; never fails.
    pub async fn stop(&self) {
        if self
            .active
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        info!("Stopping live session");

        {
            let mut capture = self.capture.lock().await;
            if let Some(engine) = capture.as_mut() {
                engine.stop().await;
            }
        }
        if let Some(task) = self.capture_task.lock().await.take() {
            let _ = task.await;
        }

        self.session.end_session().await;
        self.transcription.finish().await;

        if let Some(task) = self.event_loop.lock().await.take() {
            let _ = task.await;
        }

        info!("Live session stopped");
    }

    /// Route one interleaved stereo chunk. No-op while inactive.
    pub async fn send_audio_chunk(&self, stereo_pcm: &[u8]) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }

        self.frames_forwarded.fetch_add(1, Ordering::SeqCst);
        self.transcription.send_frame(stereo_pcm).await;

        if self.muted.load(Ordering::SeqCst) {
            return;
        }
        match extract_left_channel(stereo_pcm) {
            Some(mono) => self.session.send_audio(&mono).await,
            None => debug!(
                "Dropping malformed audio chunk ({} bytes is not whole stereo pairs)",
                stereo_pcm.len()
            ),
        }
    }

    /// Relay a text input; the session itself decides whether it can accept.
    pub async fn send_text_input(&self, text: &str) {
        self.session.send_text(text).await;
    }

    /// Relay a base64 JPEG frame. No-op while inactive.
    pub async fn send_image_chunk(&self, jpeg_base64: &str) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        self.session.send_image(jpeg_base64).await;
    }

    /// End the caller's current assistant turn.
    pub async fn finish_turn(&self) {
        self.session.finish_turn().await;
    }

    /// Mute or unmute assistant audio forwarding. Transcription always
    /// receives the full stereo stream.
    pub fn set_audio_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        info!("Assistant audio mute: {}", muted);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> LiveStats {
        let duration = Utc::now().signed_duration_since(self.created_at);
        LiveStats {
            active: self.active.load(Ordering::SeqCst),
            muted: self.muted.load(Ordering::SeqCst),
            started_at: self.created_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_forwarded: self.frames_forwarded.load(Ordering::SeqCst),
            transcripts_reconciled: self.transcripts_reconciled.load(Ordering::SeqCst),
        }
    }

    async fn release_everything(&self) {
        self.session.end_session().await;
        self.transcription.finish().await;
        let mut capture = self.capture.lock().await;
        if let Some(engine) = capture.as_mut() {
            engine.stop().await;
        }
    }
}

/// Pump merged capture frames through the per-chunk routing.
async fn forward_frames(
    mut frames: mpsc::Receiver<AudioFrame>,
    transcription: Arc<TranscriptionChannel>,
    session: Arc<ConversationalSession>,
    active: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    frames_forwarded: Arc<AtomicUsize>,
) {
    info!("Capture forwarding task started");

    while let Some(frame) = frames.recv().await {
        if !active.load(Ordering::SeqCst) {
            break;
        }

        let pcm = frame.to_le_bytes();
        debug!("Forwarding {} ms capture frame ({} bytes)", frame.duration_ms(), pcm.len());
        frames_forwarded.fetch_add(1, Ordering::SeqCst);
        transcription.send_frame(&pcm).await;

        if muted.load(Ordering::SeqCst) {
            continue;
        }
        match extract_left_channel(&pcm) {
            Some(mono) => session.send_audio(&mono).await,
            None => debug!("Dropping malformed capture frame ({} bytes)", pcm.len()),
        }
    }

    info!("Capture forwarding task stopped");
}

/// Consume transcription updates: reconcile finals across channels with a
/// single-slot debounce, finish assistant turns on utterance boundaries,
/// and report mid-stream closures.
async fn run_event_loop(
    mut updates: mpsc::Receiver<TranscriberUpdate>,
    session: Arc<ConversationalSession>,
    on_transcript: Option<TranscriptCallback>,
    on_error: Option<ErrorCallback>,
    debounce: Duration,
    transcripts_reconciled: Arc<AtomicUsize>,
) {
    let mut pairing = PairingBuffer::new();
    let sleep = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(sleep);
    let mut stream_done = false;

    loop {
        tokio::select! {
            // Armed exactly while an event sits in the pairing slot
            () = sleep.as_mut(), if pairing.is_armed() => {
                if let Some(solo) = pairing.take_expired() {
                    emit_reconciled(solo, &session, &on_transcript, &transcripts_reconciled).await;
                }
                if stream_done {
                    break;
                }
            }
            update = updates.recv(), if !stream_done => match update {
                Some(TranscriberUpdate::Transcript(event)) => {
                    if !event.is_final {
                        debug!("Partial transcript ({:?}): {}", event.channel, event.text);
                        continue;
                    }
                    match pairing.offer(event) {
                        Offer::Buffered => sleep.as_mut().reset(Instant::now() + debounce),
                        Offer::Resolved(winner) => {
                            emit_reconciled(winner, &session, &on_transcript, &transcripts_reconciled)
                                .await;
                        }
                    }
                }
                Some(TranscriberUpdate::UtteranceEnd) => {
                    debug!("Utterance ended; finishing assistant turn");
                    session.finish_turn().await;
                }
                Some(TranscriberUpdate::Closed { reason }) => {
                    if let Some(reason) = reason {
                        warn!("Transcription closed mid-session: {}", reason);
                        if let Some(on_error) = &on_error {
                            on_error(ServiceError::connection("transcription", reason));
                        }
                    }
                    // Drain any held event through the timer before ending
                    stream_done = true;
                    if !pairing.is_armed() {
                        break;
                    }
                }
                None => {
                    stream_done = true;
                    if !pairing.is_armed() {
                        break;
                    }
                }
            }
        }
    }

    debug!("Live event loop stopped");
}

async fn emit_reconciled(
    reconciled: ReconciledTranscript,
    session: &Arc<ConversationalSession>,
    on_transcript: &Option<TranscriptCallback>,
    transcripts_reconciled: &Arc<AtomicUsize>,
) {
    transcripts_reconciled.fetch_add(1, Ordering::SeqCst);
    info!(
        "Transcript ({:?}, {:?}): {}",
        reconciled.event.channel, reconciled.decision, reconciled.event.text
    );

    if let Some(on_transcript) = on_transcript {
        on_transcript(reconciled.clone());
    }

    // Device-audio speech is fed back to the assistant as labeled context,
    // but never into a session that is already winding down.
    if reconciled.event.channel.is_remote() && session.can_accept_text_input() {
        let line = device_transcript_line(&reconciled.event);
        session.send_text(&line).await;
    }
}

fn device_transcript_line(event: &TranscriptEvent) -> String {
    match (event.start_time, event.end_time) {
        (Some(start), Some(end)) => {
            format!(
                "Device audio transcript [{start:.2}-{end:.2}]: {}",
                event.text
            )
        }
        _ => format!("Device audio transcript: {}", event.text),
    }
}
