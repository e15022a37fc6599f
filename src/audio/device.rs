// cpal-backed capture devices.
//
// Each acquired device is owned by a dedicated OS thread because cpal
// streams are not Send. The thread builds the stream, reports readiness
// over a oneshot, then parks until the engine drops its stop handle.
// Device audio is converted to mono at the target rate inside the data
// callback and forwarded with try_send so the callback never blocks.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::mpsc as std_mpsc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::backend::{CaptureConfig, CaptureSource, SourceChunk, SourceKind};
use crate::error::ServiceError;

/// Names that suggest a loopback / "what you hear" input device.
const LOOPBACK_DEVICE_PATTERNS: &[&str] = &[
    "stereo mix",
    "wave out mix",
    "what u hear",
    "loopback",
    "system output",
    "monitor",
];

/// Channel capacity for sample batches in flight between the capture thread
/// and the merge loop.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// First input device whose name looks like a loopback feed, if any.
pub fn locate_loopback_device() -> Option<String> {
    let host = cpal::default_host();
    let devices = host.input_devices().ok()?;
    for device in devices {
        let name = device.name().unwrap_or_default();
        if is_loopback_name(&name) {
            return Some(name);
        }
    }
    None
}

fn is_loopback_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    LOOPBACK_DEVICE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// A single cpal input device acting as one channel of the merged stream.
pub struct CpalSource {
    kind: SourceKind,
    config: CaptureConfig,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
    capturing: bool,
}

impl CpalSource {
    pub fn microphone(config: CaptureConfig) -> Self {
        Self::new(SourceKind::Microphone, config)
    }

    pub fn loopback(config: CaptureConfig) -> Self {
        Self::new(SourceKind::Loopback, config)
    }

    fn new(kind: SourceKind, config: CaptureConfig) -> Self {
        Self {
            kind,
            config,
            stop_tx: None,
            thread: None,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureSource for CpalSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<SourceChunk>, ServiceError> {
        if self.capturing {
            return Err(ServiceError::acquisition(format!(
                "{} source already capturing",
                self.kind.label()
            )));
        }

        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();

        let kind = self.kind;
        let config = self.config.clone();
        let thread = std::thread::Builder::new()
            .name(format!("capture-{}", kind.label()))
            .spawn(move || capture_thread(kind, config, chunk_tx, ready_tx, stop_rx))
            .map_err(|e| ServiceError::acquisition(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                self.capturing = true;
                Ok(chunk_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(ServiceError::acquisition(format!(
                    "{} capture thread exited before reporting readiness",
                    kind.label()
                )))
            }
        }
    }

    async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            drop(stop_tx);
        }
        if let Some(thread) = self.thread.take() {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
        }
        self.capturing = false;
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        self.kind.label()
    }
}

/// Thread body: build the stream, hold it alive until the stop handle drops.
fn capture_thread(
    kind: SourceKind,
    config: CaptureConfig,
    chunk_tx: mpsc::Sender<SourceChunk>,
    ready_tx: oneshot::Sender<Result<(), ServiceError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let stream = match build_stream(kind, &config, chunk_tx) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Blocks until the engine drops the sender or sends an explicit stop.
    let _ = stop_rx.recv();
    drop(stream);
    debug!("{} capture thread exiting", kind.label());
}

fn build_stream(
    kind: SourceKind,
    config: &CaptureConfig,
    chunk_tx: mpsc::Sender<SourceChunk>,
) -> Result<cpal::Stream, ServiceError> {
    let device = select_device(kind, config)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device.default_input_config().map_err(|e| {
        ServiceError::acquisition(format!("{}: no default input config: {e}", kind.label()))
    })?;
    let device_rate = supported.sample_rate().0;
    let device_channels = supported.channels() as usize;
    let target_rate = config.target_sample_rate;
    let stream_config: StreamConfig = supported.clone().into();

    info!(
        "Acquired {} device '{}': {} Hz, {} channel(s)",
        kind.label(),
        device_name,
        device_rate,
        device_channels
    );

    let err_label = kind.label();
    let err_fn = move |err| warn!("{} stream error: {}", err_label, err);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => {
            let mut forward = Forwarder::new(kind, device_channels, device_rate, target_rate, chunk_tx);
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| forward.push(data),
                    err_fn,
                    None,
                )
                .map_err(|e| stream_error(kind, e))?
        }
        SampleFormat::I16 => {
            let mut forward = Forwarder::new(kind, device_channels, device_rate, target_rate, chunk_tx);
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                        forward.push(&floats);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| stream_error(kind, e))?
        }
        other => {
            return Err(ServiceError::acquisition(format!(
                "{}: unsupported sample format {other:?} (need F32 or I16)",
                kind.label()
            )));
        }
    };

    stream
        .play()
        .map_err(|e| ServiceError::acquisition(format!("{}: play failed: {e}", kind.label())))?;

    Ok(stream)
}

fn stream_error(kind: SourceKind, err: cpal::BuildStreamError) -> ServiceError {
    ServiceError::acquisition(format!("{}: build stream failed: {err}", kind.label()))
}

fn select_device(kind: SourceKind, config: &CaptureConfig) -> Result<cpal::Device, ServiceError> {
    let host = cpal::default_host();

    if let Some(wanted) = &config.device_name {
        let needle = wanted.to_lowercase();
        let devices = host.input_devices().map_err(|e| {
            ServiceError::acquisition(format!("failed to enumerate input devices: {e}"))
        })?;
        for device in devices {
            if device
                .name()
                .map(|n| n.to_lowercase().contains(&needle))
                .unwrap_or(false)
            {
                return Ok(device);
            }
        }
        return Err(ServiceError::acquisition(format!(
            "{} device '{}' not found",
            kind.label(),
            wanted
        )));
    }

    match kind {
        SourceKind::Microphone => host.default_input_device().ok_or_else(|| {
            ServiceError::acquisition("no default input device".to_string())
        }),
        SourceKind::Loopback => {
            let devices = host.input_devices().map_err(|e| {
                ServiceError::acquisition(format!("failed to enumerate input devices: {e}"))
            })?;
            for device in devices {
                let name = device.name().unwrap_or_default();
                if is_loopback_name(&name) {
                    return Ok(device);
                }
            }
            Err(ServiceError::acquisition(
                "no loopback input device found".to_string(),
            ))
        }
    }
}

/// Converts device batches to mono target-rate samples and forwards them
/// without ever blocking the audio callback.
struct Forwarder {
    kind: SourceKind,
    channels: usize,
    from_rate: u32,
    to_rate: u32,
    chunk_tx: mpsc::Sender<SourceChunk>,
    dropped: u64,
}

impl Forwarder {
    fn new(
        kind: SourceKind,
        channels: usize,
        from_rate: u32,
        to_rate: u32,
        chunk_tx: mpsc::Sender<SourceChunk>,
    ) -> Self {
        Self {
            kind,
            channels,
            from_rate,
            to_rate,
            chunk_tx,
            dropped: 0,
        }
    }

    fn push(&mut self, data: &[f32]) {
        let samples = to_mono_rate(data, self.channels, self.from_rate, self.to_rate);
        if samples.is_empty() {
            return;
        }
        let chunk = SourceChunk {
            source: self.kind,
            samples,
        };
        if self.chunk_tx.try_send(chunk).is_err() {
            self.dropped += 1;
            if self.dropped % 50 == 1 {
                warn!(
                    "{} consumer lagging; dropped {} sample batches",
                    self.kind.label(),
                    self.dropped
                );
            }
        }
    }
}

/// Convert interleaved multi-channel audio at any rate to mono at the target
/// rate, averaging channels and linearly interpolating between samples.
fn to_mono_rate(samples: &[f32], channels: usize, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if channels == 0 || samples.is_empty() {
        return Vec::new();
    }
    let mono: Vec<f32> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    if from_rate == to_rate {
        return mono;
    }

    let out_len = (mono.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = pos as usize;
        if idx >= mono.len() {
            break;
        }
        let frac = (pos - idx as f64) as f32;
        let a = mono[idx];
        let b = if idx + 1 < mono.len() { mono[idx + 1] } else { a };
        out.push(a + (b - a) * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_name_matching() {
        assert!(is_loopback_name("Stereo Mix (Realtek Audio)"));
        assert!(is_loopback_name("Monitor of Built-in Audio"));
        assert!(!is_loopback_name("USB Condenser Microphone"));
    }

    #[test]
    fn test_to_mono_rate_averages_channels() {
        let stereo = [0.2, 0.4, -0.2, -0.4];
        let mono = to_mono_rate(&stereo, 2, 16_000, 16_000);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!((mono[1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_to_mono_rate_downsamples() {
        let samples: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        let out = to_mono_rate(&samples, 1, 48_000, 16_000);
        assert_eq!(out.len(), 160);
        // Linear interpolation keeps a monotone ramp monotone
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_to_mono_rate_empty_input() {
        assert!(to_mono_rate(&[], 2, 48_000, 16_000).is_empty());
        assert!(to_mono_rate(&[0.1, 0.2], 0, 48_000, 16_000).is_empty());
    }
}
