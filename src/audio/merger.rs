// Stereo merger for the two capture feeds.
//
// The microphone feed drives the clock: a frame is emitted whenever a full
// frame of left-channel samples is available. The loopback feed fills the
// right channel for the same span; when it has produced nothing the left
// channel is duplicated into the right so downstream consumers always see
// two channels.

use std::collections::VecDeque;

use tracing::warn;

use super::backend::{AudioFrame, SourceChunk, SourceKind};
use super::pcm::{f32_to_i16, interleave};

/// Configuration for the stereo merger
#[derive(Debug, Clone)]
pub struct MergerConfig {
    /// Output sample rate
    pub sample_rate: u32,
    /// Samples per channel in each emitted frame
    pub frame_samples: usize,
    /// Maximum number of right-channel samples buffered beyond the left
    /// channel before the oldest are discarded
    pub max_right_lead: usize,
}

impl MergerConfig {
    pub fn new(sample_rate: u32, frame_duration_ms: u64) -> Self {
        let frame_samples = (sample_rate as u64 * frame_duration_ms / 1000) as usize;
        Self {
            sample_rate,
            frame_samples,
            max_right_lead: frame_samples * 2,
        }
    }
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self::new(16_000, 100)
    }
}

/// Merges microphone and loopback sample streams into interleaved stereo
/// frames (microphone left, loopback right).
pub struct StereoMerger {
    config: MergerConfig,
    left: VecDeque<f32>,
    right: VecDeque<f32>,
    frames_emitted: u64,
}

impl StereoMerger {
    pub fn new(config: MergerConfig) -> Self {
        Self {
            config,
            left: VecDeque::new(),
            right: VecDeque::new(),
            frames_emitted: 0,
        }
    }

    /// Route a sample batch into the matching channel queue.
    pub fn push(&mut self, chunk: SourceChunk) {
        match chunk.source {
            SourceKind::Microphone => self.left.extend(chunk.samples),
            SourceKind::Loopback => {
                self.right.extend(chunk.samples);
                self.trim_right_lead();
            }
        }
    }

    /// Emit the next stereo frame, or None until a full frame of left-channel
    /// samples has accumulated.
    pub fn next_frame(&mut self) -> Option<AudioFrame> {
        let n = self.config.frame_samples;
        if self.left.len() < n {
            return None;
        }

        let left: Vec<i16> = self.left.drain(..n).map(f32_to_i16).collect();

        let right: Vec<i16> = if self.right.is_empty() {
            // Loopback produced nothing for this span: duplicate the left
            // channel so the frame still carries two channels.
            left.clone()
        } else {
            let available = self.right.len().min(n);
            let mut right: Vec<i16> = self.right.drain(..available).map(f32_to_i16).collect();
            right.resize(n, 0);
            right
        };

        let timestamp_ms =
            self.frames_emitted * n as u64 * 1000 / self.config.sample_rate as u64;
        self.frames_emitted += 1;

        Some(AudioFrame {
            samples: interleave(&left, &right),
            sample_rate: self.config.sample_rate,
            channels: 2,
            timestamp_ms,
        })
    }

    /// Drop right-channel backlog the left channel can never catch up with.
    fn trim_right_lead(&mut self) {
        let limit = self.left.len() + self.config.max_right_lead;
        if self.right.len() > limit {
            let excess = self.right.len() - limit;
            self.right.drain(..excess);
            warn!("Loopback feed leads microphone; dropped {} samples", excess);
        }
    }
}
