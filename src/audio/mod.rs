pub mod backend;
pub mod device;
pub mod engine;
pub mod merger;
pub mod pcm;

pub use backend::{AudioFrame, CaptureConfig, CaptureSource, SourceChunk, SourceKind};
pub use device::{locate_loopback_device, CpalSource};
pub use engine::AudioCaptureEngine;
pub use merger::{MergerConfig, StereoMerger};
pub use pcm::extract_left_channel;
