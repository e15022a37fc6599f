//! Multichannel transcription stream
//!
//! This module wraps the external speech-to-text service:
//! - Wire message shapes and subjects (`messages`)
//! - The transport capability trait and its NATS implementation (`link`)
//! - The stream wrapper with open-state tracking (`channel`)
//! - Domain-level transcript types (`events`)

pub mod channel;
pub mod events;
pub mod link;
pub mod messages;

pub use channel::TranscriptionChannel;
pub use events::{SpeakerChannel, TranscriberUpdate, TranscriptEvent, TranscriptWord};
pub use link::{NatsTranscriberLink, TranscriberLink};
pub use messages::{AudioChunkMessage, TranscriberEventMessage, TranscriberOpenRequest};
