use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, CaptureConfig, CaptureSource, SourceChunk};
use super::device::{locate_loopback_device, CpalSource};
use super::merger::{MergerConfig, StereoMerger};
use crate::config::AudioConfig;
use crate::error::ServiceError;

/// Frame channel capacity between the merge loop and the consumer.
const FRAME_CHANNEL_CAPACITY: usize = 32;

/// Dual-source capture engine.
///
/// Acquires a microphone source and, when one exists, a system loopback
/// source, and emits merged interleaved stereo frames (microphone left,
/// loopback right). The microphone is acquired first; if the loopback
/// source then fails to open, the microphone is released again before the
/// error propagates so a failed start never leaks a device.
pub struct AudioCaptureEngine {
    microphone: Box<dyn CaptureSource>,
    loopback: Option<Box<dyn CaptureSource>>,
    merger_config: MergerConfig,
    merge_task: Option<JoinHandle<()>>,
    capturing: bool,
}

impl AudioCaptureEngine {
    /// Build an engine from configuration, discovering a loopback device by
    /// name pattern when none is configured explicitly.
    pub fn from_config(audio: &AudioConfig) -> Self {
        let capture_config = |device_name: Option<String>| CaptureConfig {
            target_sample_rate: audio.sample_rate,
            device_name,
        };

        let microphone = Box::new(CpalSource::microphone(capture_config(
            audio.microphone_device.clone(),
        )));

        let loopback_name = audio
            .loopback_device
            .clone()
            .or_else(locate_loopback_device);
        let loopback: Option<Box<dyn CaptureSource>> = match loopback_name {
            Some(name) => {
                info!("Using loopback device: {}", name);
                Some(Box::new(CpalSource::loopback(capture_config(Some(name)))))
            }
            None => {
                warn!("No loopback input found; right channel will mirror the microphone");
                None
            }
        };

        Self::new(
            microphone,
            loopback,
            MergerConfig::new(audio.sample_rate, audio.frame_duration_ms),
        )
    }

    /// Build an engine from explicit sources. Tests use this with scripted
    /// sources instead of real devices.
    pub fn new(
        microphone: Box<dyn CaptureSource>,
        loopback: Option<Box<dyn CaptureSource>>,
        merger_config: MergerConfig,
    ) -> Self {
        Self {
            microphone,
            loopback,
            merger_config,
            merge_task: None,
            capturing: false,
        }
    }

    /// Acquire the devices and start emitting merged frames.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, ServiceError> {
        if self.capturing {
            warn!("Capture engine already started");
            return Err(ServiceError::acquisition("capture already running"));
        }

        let mic_rx = self.microphone.start().await?;

        let loopback_rx = match &mut self.loopback {
            Some(source) => match source.start().await {
                Ok(rx) => Some(rx),
                Err(e) => {
                    // Release the partially-acquired microphone before failing
                    warn!(
                        "{} acquisition failed; releasing {}",
                        source.name(),
                        self.microphone.name()
                    );
                    self.microphone.stop().await;
                    return Err(e);
                }
            },
            None => None,
        };

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let merger = StereoMerger::new(self.merger_config.clone());
        self.merge_task = Some(tokio::spawn(merge_loop(
            merger, mic_rx, loopback_rx, frame_tx,
        )));
        self.capturing = true;

        info!(
            "Audio capture started ({} Hz, {} samples/frame)",
            self.merger_config.sample_rate, self.merger_config.frame_samples
        );

        Ok(frame_rx)
    }

    /// Release all capture resources. Safe to call repeatedly or before
    /// `start`.
    pub async fn stop(&mut self) {
        if !self.capturing {
            return;
        }
        self.capturing = false;

        if self.microphone.is_capturing() {
            self.microphone.stop().await;
        }
        if let Some(source) = &mut self.loopback {
            if source.is_capturing() {
                source.stop().await;
            }
        }

        // Sources stopped, so the chunk channels close and the merge loop
        // drains out on its own.
        if let Some(task) = self.merge_task.take() {
            let _ = task.await;
        }

        info!("Audio capture stopped");
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }
}

async fn merge_loop(
    mut merger: StereoMerger,
    mut mic_rx: mpsc::Receiver<SourceChunk>,
    mut loopback_rx: Option<mpsc::Receiver<SourceChunk>>,
    frame_tx: mpsc::Sender<AudioFrame>,
) {
    debug!("Merge loop started");

    loop {
        tokio::select! {
            chunk = mic_rx.recv() => match chunk {
                Some(chunk) => merger.push(chunk),
                None => break,
            },
            chunk = recv_loopback(&mut loopback_rx), if loopback_rx.is_some() => match chunk {
                Some(chunk) => merger.push(chunk),
                None => {
                    warn!("Loopback feed ended; continuing with microphone only");
                    loopback_rx = None;
                }
            },
        }

        while let Some(frame) = merger.next_frame() {
            if frame_tx.send(frame).await.is_err() {
                debug!("Frame consumer dropped; merge loop exiting");
                return;
            }
        }
    }

    debug!("Merge loop stopped");
}

async fn recv_loopback(rx: &mut Option<mpsc::Receiver<SourceChunk>>) -> Option<SourceChunk> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
