use tokio::sync::mpsc;

use crate::error::ServiceError;

/// Which physical feed a capture source provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Local microphone input (left channel of the merged stream)
    Microphone,
    /// System/loopback audio (right channel of the merged stream)
    Loopback,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Microphone => "microphone",
            SourceKind::Loopback => "loopback",
        }
    }
}

/// A batch of mono float samples from one capture source, already converted
/// to the engine's target sample rate.
#[derive(Debug, Clone)]
pub struct SourceChunk {
    pub source: SourceKind,
    pub samples: Vec<f32>,
}

/// Merged two-channel PCM ready for the streaming services.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved i16 samples, left channel first (LRLR...)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Wire encoding: little-endian s16le bytes in sample order.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let per_channel = self.samples.len() as u64 / self.channels as u64;
        per_channel * 1000 / self.sample_rate as u64
    }
}

/// Configuration for a single capture source
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (device audio is resampled if needed)
    pub target_sample_rate: u32,
    /// Explicit device name to acquire; None picks a default
    pub device_name: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            device_name: None,
        }
    }
}

/// One acquired audio input.
///
/// The production implementation wraps a cpal device; tests substitute
/// scripted sources.
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync {
    /// Acquire the device and start capturing.
    ///
    /// Returns a channel receiver that will receive sample batches.
    async fn start(&mut self) -> Result<mpsc::Receiver<SourceChunk>, ServiceError>;

    /// Release the device. Safe to call repeatedly or before `start`.
    async fn stop(&mut self);

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_config_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.target_sample_rate, 16_000);
        assert!(config.device_name.is_none());
    }

    #[test]
    fn test_frame_wire_encoding_is_little_endian() {
        let frame = AudioFrame {
            samples: vec![0x0102, -2],
            sample_rate: 16_000,
            channels: 2,
            timestamp_ms: 0,
        };
        assert_eq!(frame.to_le_bytes(), vec![0x02, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame {
            samples: vec![0; 3200],
            sample_rate: 16_000,
            channels: 2,
            timestamp_ms: 0,
        };
        assert_eq!(frame.duration_ms(), 100);
    }
}
